//! Domain model types for Settingsmith.
//!
//! This module defines the core types used throughout Settingsmith:
//! - [`TemplateId`], [`ServerId`], [`CredentialId`] - Identifier newtypes
//! - [`SettingsTemplate`] - A stored settings.xml template
//! - [`ServerCredentialMapping`] - A declared server → credential binding
//! - [`MergePolicy`] - Replace-all versus merge handling of `<server>` entries
//! - [`SettingsConfig`] - Template plus its mappings and policy

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }
    };
}

string_id! {
    /// Identifier of a settings template in the template store.
    TemplateId
}

string_id! {
    /// Identifier of a `<server>` entry (the text of its `<id>` child).
    ///
    /// Server ids are matched exactly; Maven treats them case-sensitively.
    ServerId
}

string_id! {
    /// Identifier of a credential in the credential store.
    ///
    /// Only identifiers are ever logged, never the credential's contents.
    CredentialId
}

/// An immutable settings.xml template owned by the template store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsTemplate {
    /// Store identifier.
    pub id: TemplateId,

    /// Human-readable name.
    pub name: String,

    /// Raw document text.
    pub content: String,
}

impl SettingsTemplate {
    /// Create a new template.
    pub fn new(id: impl Into<TemplateId>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// Whether the template has no meaningful content.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Declared intent to authenticate `server_id` with `credential_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCredentialMapping {
    /// The `<server>` id to inject into.
    pub server_id: ServerId,

    /// The credential to resolve for it.
    pub credential_id: CredentialId,
}

impl ServerCredentialMapping {
    /// Create a new mapping.
    pub fn new(server_id: impl Into<ServerId>, credential_id: impl Into<CredentialId>) -> Self {
        Self {
            server_id: server_id.into(),
            credential_id: credential_id.into(),
        }
    }
}

/// How an existing `<server>` entry is treated when a credential targets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    /// `true`: drop all children of a matching entry before injecting.
    /// `false`: only touch authentication children.
    pub replace_all: bool,
}

impl MergePolicy {
    /// Drop every child of a matching entry.
    pub const REPLACE_ALL: Self = Self { replace_all: true };

    /// Only rewrite authentication children of a matching entry.
    pub const MERGE: Self = Self { replace_all: false };
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::REPLACE_ALL
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replaceAll: {}", self.replace_all)
    }
}

/// A template together with the credential mappings declared for it.
///
/// A template stored without Maven-specific metadata becomes a config with
/// no mappings and the default policy via [`From<SettingsTemplate>`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// The template document.
    pub template: SettingsTemplate,

    /// Ordered server → credential mappings.
    #[serde(default)]
    pub server_credential_mappings: Vec<ServerCredentialMapping>,

    /// Replace-all or merge handling for matching entries.
    #[serde(default)]
    pub policy: MergePolicy,
}

impl SettingsConfig {
    /// Create a config with no mappings and the default policy.
    pub fn new(template: SettingsTemplate) -> Self {
        Self {
            template,
            server_credential_mappings: Vec::new(),
            policy: MergePolicy::default(),
        }
    }

    /// Add a server → credential mapping.
    pub fn with_mapping(
        mut self,
        server_id: impl Into<ServerId>,
        credential_id: impl Into<CredentialId>,
    ) -> Self {
        self.server_credential_mappings
            .push(ServerCredentialMapping::new(server_id, credential_id));
        self
    }

    /// Set the merge policy.
    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shortcut for the template id.
    pub fn id(&self) -> &TemplateId {
        &self.template.id
    }
}

impl From<SettingsTemplate> for SettingsConfig {
    fn from(template: SettingsTemplate) -> Self {
        Self::new(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_display_verbatim() {
        assert_eq!(ServerId::new("Nexus-Releases").to_string(), "Nexus-Releases");
        assert_eq!(CredentialId::from("deploy").as_str(), "deploy");
    }

    #[test]
    fn test_default_policy_is_replace_all() {
        assert!(MergePolicy::default().replace_all);
        let config = SettingsConfig::from(SettingsTemplate::new("t", "T", "<settings/>"));
        assert!(config.policy.replace_all);
        assert!(config.server_credential_mappings.is_empty());
    }

    #[test]
    fn test_blank_template() {
        assert!(SettingsTemplate::new("t", "T", "  \n\t").is_blank());
        assert!(!SettingsTemplate::new("t", "T", "<settings/>").is_blank());
    }

    #[test]
    fn test_config_builder_keeps_mapping_order() {
        let config = SettingsConfig::new(SettingsTemplate::new("t", "T", "<settings/>"))
            .with_mapping("b", "cred-b")
            .with_mapping("a", "cred-a")
            .with_policy(MergePolicy::MERGE);

        let servers: Vec<&str> = config
            .server_credential_mappings
            .iter()
            .map(|m| m.server_id.as_str())
            .collect();
        assert_eq!(servers, vec!["b", "a"]);
        assert!(!config.policy.replace_all);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let json = r#"{"template":{"id":"t","name":"T","content":"<settings/>"}}"#;
        let config: SettingsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.id().as_str(), "t");
        assert!(config.policy.replace_all);
    }
}
