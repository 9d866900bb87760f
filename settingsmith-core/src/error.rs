//! Top-level error type for supplying settings.

use std::io;
use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::merge::MergeError;
use crate::model::{CredentialId, TemplateId};
use crate::store::StoreError;

/// Errors that can stop [`SettingsProvider::supply_settings`](crate::SettingsProvider::supply_settings).
///
/// No variant ever carries secret material; credential problems are
/// reported by credential id only.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The configured template id does not exist (strict lookup only).
    #[error("Maven settings.xml with id '{template_id}' not found")]
    TemplateNotFound { template_id: TemplateId },

    /// The template could not be parsed or has no `<settings>` root.
    #[error("malformed settings template: {0}")]
    MalformedTemplate(#[from] MergeError),

    /// A key or certificate file could not be written.
    #[error("failed to write secret file for credential {credential_id}")]
    SecretFileWrite {
        credential_id: CredentialId,
        #[source]
        source: ArtifactError,
    },

    /// The final settings document could not be written.
    #[error("failed to write settings document: {0}")]
    Artifact(#[from] ArtifactError),

    /// The scratch directory could not be provided.
    #[error("failed to prepare scratch directory: {0}")]
    ScratchDir(#[source] io::Error),

    #[error("template store error: {0}")]
    Store(StoreError),

    /// The execution was interrupted. Never wrapped.
    #[error("interrupted")]
    Interrupted,

    /// Failure while injecting credentials, with the template and execution.
    #[error("Exception injecting credentials for maven settings file '{template_id}' during '{execution}'")]
    Injection {
        template_id: TemplateId,
        execution: String,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Attach the template id and execution name, leaving `Interrupted` as is.
    pub fn in_context(self, template_id: &TemplateId, execution: &str) -> Self {
        match self {
            Self::Interrupted | Self::Injection { .. } => self,
            other => Self::Injection {
                template_id: template_id.clone(),
                execution: execution.to_string(),
                source: Box::new(other),
            },
        }
    }
}

impl From<StoreError> for ProviderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Interrupted => Self::Interrupted,
            other => Self::Store(other),
        }
    }
}
