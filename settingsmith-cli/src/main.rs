//! Settingsmith CLI
//!
//! Supplies a credential-injected Maven `settings.xml` to build commands
//! and deletes every secret file once the command finishes.
//!
//! # Usage
//!
//! ```bash
//! # Run a build with the "corp" template; MVN_SETTINGS points at the file
//! settingsmith exec --template corp -- sh -c 'mvn -s "$MVN_SETTINGS" deploy'
//!
//! # Verify a template parses and its credentials resolve
//! settingsmith check --template corp
//!
//! # Store a deploy password in the OS keyring
//! printf '%s' "$PASSWORD" | settingsmith store-credential deploy --kind username-password --username ci
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use settingsmith_core::{
    Credential, CredentialId, CredentialStore, Execution, KeyringCredentialStore, MergeError,
    ProvidedSettingsProvider, RecordedVariables, ResolvedCredential, ResolvedCredentialMap,
    ScratchRoot, Secret, SettingsConfig, SettingsMerger, SettingsProvider, TempArtifactTracker,
    TemplateId, TemplateStore, WorkspaceTempDir,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod config;

use config::CliConfig;

/// Keyring service name shared with the core's store factory.
const KEYRING_SERVICE: &str = "settingsmith";

#[derive(Parser)]
#[command(name = "settingsmith")]
#[command(about = "Credential-injected Maven settings for build executions")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command with MVN_SETTINGS pointing at a merged settings file
    Exec {
        /// Template id
        #[arg(short, long)]
        template: String,

        /// Workspace directory; secret files go to its `@tmp` sibling
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Command and arguments to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Check that a template parses and its credentials resolve
    Check {
        /// Template id
        #[arg(short, long)]
        template: String,
    },

    /// List configured templates
    ListTemplates,

    /// Store a credential in the OS keyring, reading the secret from stdin
    StoreCredential {
        /// Credential id
        id: String,

        /// Credential kind
        #[arg(short, long, value_enum)]
        kind: CredentialKind,

        /// Username for the credential
        #[arg(short, long)]
        username: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CredentialKind {
    UsernamePassword,
    SshKey,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    init_logging(if cli.verbose { "debug" } else { &config.log_level });
    debug!("Loaded configuration from {:?}", config.config_path);

    match cli.command {
        Commands::Exec { template, workspace, command } => {
            exec(&config, &template, workspace.as_deref(), &command).await
        }
        Commands::Check { template } => check(&config, &template).await,
        Commands::ListTemplates => list_templates(&config).await,
        Commands::StoreCredential { id, kind, username } => store_credential(&id, kind, username),
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn provider(config: &CliConfig, template: &str) -> Result<ProvidedSettingsProvider> {
    let templates = Arc::new(config.template_store()?);
    let credentials = Arc::from(config.credential_store());
    Ok(ProvidedSettingsProvider::new(template, templates, credentials).with_options(config.provider.clone()))
}

async fn exec(
    config: &CliConfig,
    template: &str,
    workspace: Option<&Path>,
    command: &[String],
) -> Result<ExitCode> {
    let (program, args) = command.split_first().context("No command given")?;
    let provider = provider(config, template)?;

    let outputs = Arc::new(RecordedVariables::new());
    let execution = Execution::new(format!("exec {}", program), Arc::new(TempArtifactTracker::new()))
        .with_output_variables(outputs.clone());

    let interrupt = execution.interrupt_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.interrupt();
        }
    });

    let scratch_root = ScratchRoot::new(config.scratch_root());
    let supplied = match workspace {
        Some(workspace) => {
            provider
                .supply_settings(&execution, &WorkspaceTempDir::new(workspace))
                .await
        }
        None => provider.supply_settings(&execution, &scratch_root).await,
    };

    let status = match supplied {
        Ok(settings) => {
            match &settings {
                Some(path) => info!("Running {} with settings {}", program, path.display()),
                None => info!("Running {} with the build tool's own settings", program),
            }
            let mut cmd = tokio::process::Command::new(program);
            cmd.args(args).envs(outputs.snapshot());
            if let Some(workspace) = workspace {
                cmd.current_dir(workspace);
            }
            cmd.status()
                .await
                .with_context(|| format!("Failed to run {}", program))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to supply settings from template {}", template)),
    };

    watcher.abort();
    let report = execution.release();
    if !report.failed.is_empty() {
        warn!("{} temporary file(s) could not be deleted", report.failed.len());
    }
    if workspace.is_none() {
        if let Err(e) = scratch_root.remove_if_empty(&execution) {
            warn!("Failed to remove scratch directory: {}", e);
        }
    }

    let status = status?;
    Ok(match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    })
}

async fn check(config: &CliConfig, template: &str) -> Result<ExitCode> {
    let templates = config.template_store()?;
    let credentials = config.credential_store();
    let execution = Execution::new(format!("check {}", template), Arc::new(TempArtifactTracker::new()));

    let Some(settings) = templates
        .get_by_id(&execution, &TemplateId::new(template))
        .await?
    else {
        bail!("Maven settings.xml with id '{}' not found", template);
    };

    println!(
        "Template {} ({}), {}",
        settings.id(),
        settings.template.name,
        settings.policy
    );

    if settings.template.is_blank() {
        println!("  empty template, would be ignored");
        return Ok(ExitCode::SUCCESS);
    }

    verify_template(&settings).with_context(|| format!("Template {} cannot be merged", template))?;

    let mut unresolved = 0;
    for mapping in &settings.server_credential_mappings {
        let status = match credentials.lookup(&execution, &mapping.credential_id).await {
            Ok(Some(credential)) => format!("ok ({})", credential.kind()),
            Ok(None) => {
                unresolved += 1;
                "not found".to_string()
            }
            Err(e) => {
                unresolved += 1;
                format!("error: {}", e)
            }
        };
        println!("  {} -> {}: {}", mapping.server_id, mapping.credential_id, status);
    }

    Ok(if unresolved == 0 { ExitCode::SUCCESS } else { ExitCode::from(2) })
}

/// Parse the template, then merge placeholder credentials for every mapped
/// server so the rewrite path runs without touching real secrets.
fn verify_template(settings: &SettingsConfig) -> Result<(), MergeError> {
    let merger = SettingsMerger::new(settings.policy);
    merger.validate(&settings.template.content)?;

    let mut placeholders = ResolvedCredentialMap::new();
    for mapping in &settings.server_credential_mappings {
        placeholders.insert(
            mapping.server_id.clone(),
            ResolvedCredential::UsernamePassword {
                username: String::new(),
                password: Secret::new(""),
            },
        );
    }
    merger.merge(&settings.template.content, &placeholders).map(|_| ())
}

async fn list_templates(config: &CliConfig) -> Result<ExitCode> {
    let templates = config.template_store()?;
    let execution = Execution::new("list-templates", Arc::new(TempArtifactTracker::new()));

    let configs = templates.list(&execution).await?;
    if configs.is_empty() {
        println!("No templates configured in {:?}", config.config_path);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Configured templates:");
    for settings in configs {
        println!(
            "  {} ({}): {} server mapping(s), {}",
            settings.id(),
            settings.template.name,
            settings.server_credential_mappings.len(),
            settings.policy
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn store_credential(id: &str, kind: CredentialKind, username: String) -> Result<ExitCode> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read secret from stdin")?;
    let secret = Secret::new(input);

    let credential = match kind {
        CredentialKind::UsernamePassword => {
            let password = secret.expose().trim_end_matches(['\r', '\n']);
            if password.is_empty() {
                bail!("No password given on stdin");
            }
            Credential::UsernamePassword {
                username,
                password: Secret::new(password),
            }
        }
        CredentialKind::SshKey => {
            if secret.expose().trim().is_empty() {
                bail!("No private key given on stdin");
            }
            Credential::SshPrivateKey {
                username,
                private_keys: vec![secret.clone()],
                passphrase: None,
            }
        }
    };

    let store = KeyringCredentialStore::try_new(KEYRING_SERVICE)?;
    store
        .store(&CredentialId::new(id), &credential)
        .with_context(|| format!("Failed to store credential {}", id))?;

    println!("Stored credential {} ({})", id, credential.kind());
    Ok(ExitCode::SUCCESS)
}
