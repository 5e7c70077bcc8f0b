//! Environment wiring, CLI errors, and logging setup shared by command handlers.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use anyhow::anyhow;
use wscopy_config::{ConfigError, EnvironmentConfig, MigrationConfig, read_token};
use wscopy_core::Environment;
use wscopy_engine::{LinkSettings, MigrationSettings};
use wscopy_rpc::{Transport, connect};
use wscopy_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, Metrics};

use crate::cli::LogFormatArg;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    /// Configuration errors exit as validation failures.
    pub(crate) fn from_config(error: ConfigError) -> Self {
        Self::validation(format!("{:#}", anyhow::Error::new(error)))
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

/// Install the tracing subscriber; flags win over the configuration file.
pub(crate) fn init_logging(
    config: &MigrationConfig,
    level: Option<&str>,
    format: Option<LogFormatArg>,
) -> CliResult<()> {
    let level = level
        .or(config.logging.level.as_deref())
        .unwrap_or(DEFAULT_LOG_LEVEL)
        .to_string();
    let format = match (format, config.logging.format.as_deref()) {
        (Some(flag), _) => flag.into(),
        (None, Some(value)) => LogFormat::from_str(value).map_err(CliError::failure)?,
        (None, None) => LogFormat::infer(),
    };
    wscopy_telemetry::init_logging(&LoggingConfig { level, format }).map_err(CliError::failure)
}

/// Everything a command handler needs: configuration, both environments, and metrics.
pub(crate) struct AppContext {
    pub(crate) config: MigrationConfig,
    pub(crate) source: Environment,
    pub(crate) target: Environment,
    pub(crate) metrics: Metrics,
}

impl AppContext {
    /// Read tokens and build the service clients of both environments.
    pub(crate) fn connect(config: MigrationConfig) -> CliResult<Self> {
        let metrics = Metrics::new().map_err(CliError::failure)?;
        let transport = Transport::build(config.http.timeout(), config.http.retry.policy())
            .map_err(|err| CliError::failure(anyhow!("failed to build HTTP client: {err}")))?
            .with_metrics(metrics.clone());
        let source = environment("source", &config.source, &transport)?;
        let target = environment("target", &config.target, &transport)?;
        Ok(Self {
            config,
            source,
            target,
            metrics,
        })
    }

    pub(crate) fn migration_settings(&self) -> MigrationSettings {
        let config = &self.config;
        let mut settings = MigrationSettings::new(
            config.containers.source,
            config.containers.target,
            config.object_type.clone(),
        );
        settings.strategy = config.match_strategy;
        settings.listing_limit = config.listing_limit;
        settings.continue_on_error = config.continue_on_error;
        settings.verify_checksums = config.verify_checksums;
        settings.staging_dir.clone_from(&config.staging_dir);
        settings
    }

    pub(crate) fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            target_container: self.config.containers.target,
            type_name: self.config.object_type.clone(),
            listing_limit: self.config.listing_limit,
        }
    }
}

fn environment(
    role: &str,
    config: &EnvironmentConfig,
    transport: &Transport,
) -> CliResult<Environment> {
    let token = read_token(&config.token_file).map_err(CliError::from_config)?;
    connect(&config.endpoints(), Some(token.as_str()), transport)
        .map_err(|err| CliError::validation(format!("invalid {role} service URL: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_operator_and_runtime_errors() {
        assert_eq!(CliError::validation("bad").exit_code(), 2);
        assert_eq!(CliError::failure(anyhow!("boom")).exit_code(), 3);
        assert_eq!(
            CliError::failure(anyhow!("boom").context("copying")).display_message(),
            "copying: boom"
        );
    }

    #[test]
    fn missing_token_file_is_a_validation_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let text = format!(
            "
source:
  url: https://source.test/services
  token_file: {dir}/absent.token
target:
  url: https://target.test/services
  token_file: {dir}/absent.token
containers:
  source: 1
  target: 2
object_type: KBaseGenomes.Genome
",
            dir = dir.path().display()
        );
        let config = wscopy_config::parse_config(&text, "test")?;
        let err = AppContext::connect(config)
            .err()
            .ok_or_else(|| anyhow!("expected an error"))?;
        assert_eq!(err.exit_code(), 2);
        assert!(err.display_message().contains("absent.token"));
        Ok(())
    }

    #[test]
    fn settings_follow_the_configuration() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let token = dir.path().join("token");
        std::fs::write(&token, "secret\n")?;
        let text = format!(
            "
source:
  url: https://source.test/services
  token_file: {token}
target:
  url: https://target.test/services
  token_file: {token}
containers:
  source: 1
  target: 2
object_type: KBaseGenomes.Genome
listing_limit: 50
continue_on_error: true
verify_checksums: false
",
            token = token.display()
        );
        let ctx = AppContext::connect(wscopy_config::parse_config(&text, "test")?)
            .map_err(|err| anyhow!(err.display_message()))?;
        let settings = ctx.migration_settings();
        assert_eq!(settings.listing_limit, 50);
        assert!(settings.continue_on_error);
        assert!(!settings.verify_checksums);
        assert_eq!(ctx.link_settings().target_container, 2);
        assert_eq!(ctx.source.identity(), "https://source.test/services/ws");
        Ok(())
    }
}
