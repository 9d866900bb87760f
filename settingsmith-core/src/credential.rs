//! Credential handles and their materialized forms.
//!
//! A [`Credential`] is what a store hands back: opaque secret material of
//! some kind. A [`ResolvedCredential`] is what the settings merger consumes:
//! plaintext fields plus paths to any secret files written for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::store::Secret;

/// A credential as returned by a [`CredentialStore`](crate::store::CredentialStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
    /// Plain username and password.
    UsernamePassword { username: String, password: Secret },

    /// SSH user with one or more private keys in PEM/OpenSSH text form.
    SshPrivateKey {
        username: String,
        #[serde(default)]
        private_keys: Vec<Secret>,
        #[serde(default)]
        passphrase: Option<Secret>,
    },

    /// Client certificate bundle (PEM certificate chain and key).
    Certificate {
        #[serde(default)]
        username: Option<String>,
        certificate_pem: Secret,
        #[serde(default)]
        password: Option<Secret>,
    },

    /// A bare secret string. Maven servers cannot use it.
    SecretText { secret: Secret },
}

impl Credential {
    /// Short name of the credential kind, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UsernamePassword { .. } => "username_password",
            Self::SshPrivateKey { .. } => "ssh_private_key",
            Self::Certificate { .. } => "certificate",
            Self::SecretText { .. } => "secret_text",
        }
    }
}

/// A credential ready to be written into a `<server>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredential {
    /// `<username>` + `<password>`.
    UsernamePassword { username: String, password: Secret },

    /// `<username>` + `<privateKey>` (+ `<passphrase>`).
    SecretFile {
        username: String,
        file_path: PathBuf,
        passphrase: Option<Secret>,
    },

    /// (`<username>`) + `<privateKey>` pointing at the certificate bundle
    /// (+ `<passphrase>`).
    Certificate {
        username: Option<String>,
        certificate_path: PathBuf,
        password: Option<Secret>,
    },
}

impl ResolvedCredential {
    /// Path of the secret file this credential references, if any.
    pub fn secret_file(&self) -> Option<&PathBuf> {
        match self {
            Self::UsernamePassword { .. } => None,
            Self::SecretFile { file_path, .. } => Some(file_path),
            Self::Certificate { certificate_path, .. } => Some(certificate_path),
        }
    }

    /// The `<server>` child elements this credential contributes, in order.
    ///
    /// Values are raw (unescaped); the merger escapes them. The copies are
    /// zeroed when dropped.
    pub fn auth_fields(&self) -> Vec<(&'static str, Zeroizing<String>)> {
        let mut fields = Vec::with_capacity(3);
        let mut push = |name: &'static str, value: String| fields.push((name, Zeroizing::new(value)));
        match self {
            Self::UsernamePassword { username, password } => {
                push("username", username.clone());
                push("password", password.expose().to_string());
            }
            Self::SecretFile { username, file_path, passphrase } => {
                push("username", username.clone());
                push("privateKey", file_path.display().to_string());
                if let Some(passphrase) = passphrase {
                    push("passphrase", passphrase.expose().to_string());
                }
            }
            Self::Certificate { username, certificate_path, password } => {
                if let Some(username) = username {
                    push("username", username.clone());
                }
                push("privateKey", certificate_path.display().to_string());
                if let Some(password) = password {
                    push("passphrase", password.expose().to_string());
                }
            }
        }
        fields
    }
}

impl fmt::Display for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UsernamePassword { username, .. } => write!(f, "username/password for {}", username),
            Self::SecretFile { username, .. } => write!(f, "private key for {}", username),
            Self::Certificate { .. } => write!(f, "client certificate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_json_roundtrip_keeps_kind() {
        let json = r#"{"kind":"certificate","certificate_pem":"PEM","password":"pw"}"#;
        let credential: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(credential.kind(), "certificate");
        assert!(matches!(
            credential,
            Credential::Certificate { username: None, password: Some(_), .. }
        ));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"kind":"aws_keys","access_key":"a"}"#;
        assert!(serde_json::from_str::<Credential>(json).is_err());
    }

    #[test]
    fn test_debug_never_shows_secret() {
        let credential = Credential::UsernamePassword {
            username: "ci".to_string(),
            password: Secret::new("hunter2"),
        };
        let debug = format!("{:?}", credential);
        assert!(debug.contains("ci"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_auth_fields_per_variant() {
        let up = ResolvedCredential::UsernamePassword {
            username: "ci".to_string(),
            password: Secret::new("pw"),
        };
        let names: Vec<_> = up.auth_fields().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["username", "password"]);
        assert!(up.secret_file().is_none());

        let key = ResolvedCredential::SecretFile {
            username: "git".to_string(),
            file_path: PathBuf::from("/tmp/private-key-1.pem"),
            passphrase: Some(Secret::new("pp")),
        };
        let fields: Vec<(&str, String)> = key
            .auth_fields()
            .into_iter()
            .map(|(n, v)| (n, v.to_string()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("username", "git".to_string()),
                ("privateKey", "/tmp/private-key-1.pem".to_string()),
                ("passphrase", "pp".to_string()),
            ]
        );

        let cert = ResolvedCredential::Certificate {
            username: None,
            certificate_path: PathBuf::from("/tmp/certificate-1.pem"),
            password: None,
        };
        let names: Vec<_> = cert.auth_fields().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["privateKey"]);
        assert_eq!(cert.secret_file(), Some(&PathBuf::from("/tmp/certificate-1.pem")));
    }

    #[test]
    fn test_display_omits_secrets() {
        let up = ResolvedCredential::UsernamePassword {
            username: "ci".to_string(),
            password: Secret::new("hunter2"),
        };
        assert_eq!(up.to_string(), "username/password for ci");
    }
}
