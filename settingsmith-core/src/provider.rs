//! Supplying a merged `settings.xml` to an execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::error::ProviderError;
use crate::execution::{Execution, ScratchDirProvider};
use crate::merge::SettingsMerger;
use crate::model::{SettingsConfig, TemplateId};
use crate::resolve::CredentialResolver;
use crate::store::{CredentialStore, StoreError, TemplateStore};

/// Tunables for [`ProvidedSettingsProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// Fail with [`ProviderError::TemplateNotFound`] instead of reporting
    /// an unknown template and continuing without one.
    pub strict_template_lookup: bool,

    /// Output variable that receives the settings path.
    pub output_variable: String,

    /// File name prefix of the final document.
    pub settings_prefix: String,

    /// File name suffix of the final document.
    pub settings_suffix: String,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            strict_template_lookup: false,
            output_variable: "MVN_SETTINGS".to_string(),
            settings_prefix: "maven-".to_string(),
            settings_suffix: "-settings.xml".to_string(),
        }
    }
}

/// Supplies the settings file an execution should run with.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Path of the settings file to use, or `None` for the build tool's own.
    ///
    /// Every file created is tracked against `execution` and deleted when
    /// it is released, whether or not this returns an error.
    async fn supply_settings(
        &self,
        execution: &Execution,
        scratch: &dyn ScratchDirProvider,
    ) -> Result<Option<PathBuf>, ProviderError>;
}

/// Use whatever settings the build tool finds on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSettingsProvider;

#[async_trait]
impl SettingsProvider for DefaultSettingsProvider {
    async fn supply_settings(
        &self,
        _execution: &Execution,
        _scratch: &dyn ScratchDirProvider,
    ) -> Result<Option<PathBuf>, ProviderError> {
        Ok(None)
    }
}

/// Builds the settings file from a stored template and its credential mappings.
pub struct ProvidedSettingsProvider {
    template_id: TemplateId,
    templates: Arc<dyn TemplateStore>,
    credentials: Arc<dyn CredentialStore>,
    options: ProviderOptions,
}

impl ProvidedSettingsProvider {
    pub fn new(
        template_id: impl Into<TemplateId>,
        templates: Arc<dyn TemplateStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            template_id: template_id.into(),
            templates,
            credentials,
            options: ProviderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    async fn inject(
        &self,
        execution: &Execution,
        scratch: &dyn ScratchDirProvider,
        config: &SettingsConfig,
    ) -> Result<PathBuf, ProviderError> {
        let scratch_dir = scratch
            .for_execution(execution)
            .map_err(ProviderError::ScratchDir)?;

        let resolved = CredentialResolver::new(execution, self.credentials.as_ref(), &scratch_dir)
            .resolve(&config.server_credential_mappings)
            .await?;

        if !resolved.is_empty() {
            let servers: Vec<&str> = resolved.server_ids().map(|id| id.as_str()).collect();
            execution.diagnostics().info(&format!(
                "Inject in Maven settings.xml credentials ({}) for: {}",
                config.policy,
                servers.join(",")
            ));
        }

        let merged = Zeroizing::new(
            SettingsMerger::new(config.policy).merge(&config.template.content, &resolved)?,
        );

        if execution.is_interrupted() {
            return Err(ProviderError::Interrupted);
        }

        let path = execution.tracker().write_artifact(
            execution.id(),
            &scratch_dir,
            &self.options.settings_prefix,
            &self.options.settings_suffix,
            merged.as_bytes(),
        )?;

        if let Some(outputs) = execution.output_variables() {
            outputs.set(&self.options.output_variable, &path.to_string_lossy());
        }

        tracing::debug!(
            template_id = %self.template_id,
            execution = %execution.id(),
            path = %path.display(),
            "created maven settings file"
        );
        Ok(path)
    }
}

impl std::fmt::Debug for ProvidedSettingsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidedSettingsProvider")
            .field("template_id", &self.template_id)
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait]
impl SettingsProvider for ProvidedSettingsProvider {
    async fn supply_settings(
        &self,
        execution: &Execution,
        scratch: &dyn ScratchDirProvider,
    ) -> Result<Option<PathBuf>, ProviderError> {
        if self.template_id.as_str().trim().is_empty() {
            tracing::debug!("no settings template configured");
            return Ok(None);
        }
        if execution.is_interrupted() {
            return Err(ProviderError::Interrupted);
        }

        let config = match self.templates.get_by_id(execution, &self.template_id).await {
            Ok(config) => config,
            Err(StoreError::Interrupted) => return Err(ProviderError::Interrupted),
            Err(e) => return Err(ProviderError::Store(e).in_context(&self.template_id, execution.name())),
        };

        let Some(config) = config else {
            if self.options.strict_template_lookup {
                return Err(ProviderError::TemplateNotFound {
                    template_id: self.template_id.clone(),
                });
            }
            execution.diagnostics().error(&format!(
                "Maven settings.xml with id '{}' not found",
                self.template_id
            ));
            return Ok(None);
        };

        if config.template.is_blank() {
            execution.diagnostics().info(&format!(
                "Ignore empty maven settings.xml with id {}",
                self.template_id
            ));
            return Ok(None);
        }

        self.inject(execution, scratch, &config)
            .await
            .map(Some)
            .map_err(|e| e.in_context(&self.template_id, execution.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::TempArtifactTracker;
    use crate::credential::Credential;
    use crate::diagnostics::{Level, RecordingDiagnostics};
    use crate::execution::{RecordedVariables, ScratchRoot};
    use crate::model::SettingsTemplate;
    use crate::store::{MemoryCredentialStore, MemoryTemplateStore, Secret};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        templates: Arc<MemoryTemplateStore>,
        credentials: Arc<MemoryCredentialStore>,
        diagnostics: Arc<RecordingDiagnostics>,
        outputs: Arc<RecordedVariables>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                templates: Arc::new(MemoryTemplateStore::new()),
                credentials: Arc::new(MemoryCredentialStore::new()),
                diagnostics: Arc::new(RecordingDiagnostics::new()),
                outputs: Arc::new(RecordedVariables::new()),
            }
        }

        fn execution(&self) -> Execution {
            Execution::new("provider-test", Arc::new(TempArtifactTracker::new()))
                .with_diagnostics(self.diagnostics.clone())
                .with_output_variables(self.outputs.clone())
        }

        fn provider(&self, template_id: &str) -> ProvidedSettingsProvider {
            ProvidedSettingsProvider::new(template_id, self.templates.clone(), self.credentials.clone())
        }

        fn scratch(&self) -> ScratchRoot {
            ScratchRoot::new(self.dir.path())
        }
    }

    #[tokio::test]
    async fn test_default_provider_supplies_nothing() {
        let fixture = Fixture::new();
        let execution = fixture.execution();
        let path = DefaultSettingsProvider
            .supply_settings(&execution, &fixture.scratch())
            .await
            .unwrap();
        assert!(path.is_none());
    }

    #[tokio::test]
    async fn test_blank_template_id_supplies_nothing() {
        let fixture = Fixture::new();
        let execution = fixture.execution();
        let path = fixture
            .provider("  ")
            .supply_settings(&execution, &fixture.scratch())
            .await
            .unwrap();
        assert!(path.is_none());
        assert!(fixture.diagnostics.lines().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_template_fails_open() {
        let fixture = Fixture::new();
        let execution = fixture.execution();
        let path = fixture
            .provider("missing")
            .supply_settings(&execution, &fixture.scratch())
            .await
            .unwrap();
        assert!(path.is_none());
        assert_eq!(
            fixture.diagnostics.messages_at(Level::Error),
            vec!["Maven settings.xml with id 'missing' not found"]
        );
    }

    #[tokio::test]
    async fn test_unknown_template_strict() {
        let fixture = Fixture::new();
        let execution = fixture.execution();
        let options = ProviderOptions {
            strict_template_lookup: true,
            ..Default::default()
        };
        let result = fixture
            .provider("missing")
            .with_options(options)
            .supply_settings(&execution, &fixture.scratch())
            .await;
        assert!(matches!(result, Err(ProviderError::TemplateNotFound { .. })));
    }

    #[tokio::test]
    async fn test_blank_template_content_is_ignored() {
        let fixture = Fixture::new();
        fixture.templates.insert(SettingsTemplate::new("blank", "Blank", " \n "));
        let execution = fixture.execution();

        let path = fixture
            .provider("blank")
            .supply_settings(&execution, &fixture.scratch())
            .await
            .unwrap();
        assert!(path.is_none());
        assert_eq!(
            fixture.diagnostics.messages_at(Level::Info),
            vec!["Ignore empty maven settings.xml with id blank"]
        );
        assert!(execution.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_supplies_settings_and_sets_output_variable() {
        let fixture = Fixture::new();
        fixture.templates.insert(
            SettingsConfig::new(SettingsTemplate::new(
                "corp",
                "Corporate",
                "<settings>\n  <servers>\n  </servers>\n</settings>\n",
            ))
            .with_mapping("central", "deploy"),
        );
        fixture.credentials.insert(
            "deploy",
            Credential::UsernamePassword {
                username: "ci".to_string(),
                password: Secret::new("pw"),
            },
        );
        let execution = fixture.execution();

        let path = fixture
            .provider("corp")
            .supply_settings(&execution, &fixture.scratch())
            .await
            .unwrap()
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("maven-") && name.ends_with("-settings.xml"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<id>central</id>"));
        assert!(content.contains("<password>pw</password>"));

        assert_eq!(
            fixture.outputs.get("MVN_SETTINGS").as_deref(),
            Some(path.to_string_lossy().as_ref())
        );
        assert_eq!(
            fixture.diagnostics.messages_at(Level::Info),
            vec!["Inject in Maven settings.xml credentials (replaceAll: true) for: central"]
        );
        assert_eq!(execution.artifacts().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_template_is_wrapped_with_context() {
        let fixture = Fixture::new();
        fixture.templates.insert(
            SettingsConfig::new(SettingsTemplate::new("bad", "Bad", "<settings><servers>"))
                .with_mapping("a", "deploy"),
        );
        fixture.credentials.insert(
            "deploy",
            Credential::UsernamePassword {
                username: "ci".to_string(),
                password: Secret::new("pw"),
            },
        );
        let execution = fixture.execution();

        let err = fixture
            .provider("bad")
            .supply_settings(&execution, &fixture.scratch())
            .await
            .unwrap_err();

        let ProviderError::Injection { template_id, execution: name, source } = err else {
            panic!("expected injection context");
        };
        assert_eq!(template_id.as_str(), "bad");
        assert_eq!(name, "provider-test");
        assert!(matches!(*source, ProviderError::MalformedTemplate(_)));
        assert!(execution.artifacts().is_empty());
    }
}
