//! CLI configuration handling.

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use settingsmith_core::{
    CredentialStore, MemoryTemplateStore, MergePolicy, ProviderOptions, ServerCredentialMapping,
    SettingsConfig, SettingsTemplate, create_credential_store,
};
use std::path::{Path, PathBuf};

/// Where credentials are looked up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialBackend {
    #[serde(rename = "keyring")]
    Keyring,
    #[serde(rename = "env")]
    Env,
    /// Keyring first, then environment variables.
    #[default]
    #[serde(rename = "keyring+env")]
    KeyringAndEnv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Logging level, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub credential_backend: CredentialBackend,

    /// Prefix of credential environment variables.
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    /// Root for per-execution scratch directories when no workspace is given.
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,

    #[serde(default)]
    pub provider: ProviderOptions,

    #[serde(default)]
    pub templates: Vec<TemplateEntry>,
}

/// A `[[templates]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Inline document text.
    #[serde(default)]
    pub content: Option<String>,

    /// Document file, relative to the configuration file.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_replace_all")]
    pub replace_all: bool,

    #[serde(default)]
    pub server_credentials: Vec<ServerCredentialMapping>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_env_prefix() -> String {
    "SETTINGSMITH".to_string()
}

fn default_replace_all() -> bool {
    true
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            log_level: default_log_level(),
            credential_backend: CredentialBackend::default(),
            env_prefix: default_env_prefix(),
            scratch_root: None,
            provider: ProviderOptions::default(),
            templates: Vec::new(),
        }
    }
}

impl TemplateEntry {
    /// Build the stored form, reading `path` relative to `base_dir`.
    pub fn to_settings_config(&self, base_dir: &Path) -> Result<SettingsConfig> {
        let content = match (&self.content, &self.path) {
            (Some(content), None) => content.clone(),
            (None, Some(path)) => {
                let path = base_dir.join(path);
                std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read template {} from {:?}", self.id, path))?
            }
            (Some(_), Some(_)) => bail!("Template {} sets both content and path", self.id),
            (None, None) => bail!("Template {} needs either content or path", self.id),
        };

        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        let mut config = SettingsConfig::new(SettingsTemplate::new(self.id.as_str(), name, content))
            .with_policy(MergePolicy {
                replace_all: self.replace_all,
            });
        config.server_credential_mappings = self.server_credentials.clone();
        Ok(config)
    }
}

impl CliConfig {
    /// Directory relative template paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Load every configured template into an in-memory store.
    pub fn template_store(&self) -> Result<MemoryTemplateStore> {
        let base_dir = self.base_dir();
        let configs = self
            .templates
            .iter()
            .map(|entry| entry.to_settings_config(base_dir))
            .collect::<Result<Vec<_>>>()?;
        Ok(MemoryTemplateStore::with_configs(configs))
    }

    /// The credential store selected by `credential_backend`.
    pub fn credential_store(&self) -> Box<dyn CredentialStore> {
        match self.credential_backend {
            CredentialBackend::Keyring => create_credential_store(true, None),
            CredentialBackend::Env => create_credential_store(false, Some(&self.env_prefix)),
            CredentialBackend::KeyringAndEnv => create_credential_store(true, Some(&self.env_prefix)),
        }
    }

    /// Scratch root for executions without a workspace.
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root.clone().unwrap_or_else(|| {
            project_dirs()
                .and_then(|d| d.runtime_dir().map(Path::to_path_buf))
                .unwrap_or_else(std::env::temp_dir)
                .join("settingsmith")
        })
    }
}

/// Load configuration from `explicit` or the default location.
///
/// An explicit path must exist; a missing default file yields the defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<CliConfig> {
    match explicit {
        Some(path) => load_from_path(path),
        None => {
            let path = default_config_path();
            if path.exists() {
                load_from_path(&path)
            } else {
                Ok(CliConfig {
                    config_path: path,
                    ..CliConfig::default()
                })
            }
        }
    }
}

pub fn load_from_path(path: &Path) -> Result<CliConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {:?}", path))?;
    let mut config: CliConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config from {:?}", path))?;
    config.config_path = path.to_path_buf();
    Ok(config)
}

pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("settingsmith.toml"))
        .unwrap_or_else(|| PathBuf::from("settingsmith.toml"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "settingsmith", "settingsmith")
}
