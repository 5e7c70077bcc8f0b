//! Validation of a parsed configuration before any network call is made.

use std::str::FromStr;

use url::Url;
use wscopy_core::TypeString;
use wscopy_telemetry::LogFormat;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{EnvironmentConfig, MigrationConfig, RetryConfig};

/// Check every field of `config`.
///
/// # Errors
///
/// Returns the first `InvalidField` encountered.
pub fn validate(config: &MigrationConfig) -> ConfigResult<()> {
    validate_environment("source", &config.source)?;
    validate_environment("target", &config.target)?;

    if config.containers.source == 0 {
        return Err(ConfigError::invalid(
            "containers",
            "source",
            Some("0".into()),
            "must be a positive container id",
        ));
    }
    if config.containers.target == 0 {
        return Err(ConfigError::invalid(
            "containers",
            "target",
            Some("0".into()),
            "must be a positive container id",
        ));
    }
    if config.containers.source == config.containers.target
        && config.source.endpoints().workspace == config.target.endpoints().workspace
    {
        return Err(ConfigError::invalid(
            "containers",
            "target",
            Some(config.containers.target.to_string()),
            "must differ from the source container",
        ));
    }

    validate_object_type(&config.object_type)?;

    if config.listing_limit == 0 {
        return Err(ConfigError::invalid(
            "migration",
            "listing_limit",
            Some("0".into()),
            "must be positive",
        ));
    }
    if config.http.timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "http",
            "timeout_secs",
            Some("0".into()),
            "must be positive",
        ));
    }
    validate_retry(&config.http.retry)?;

    if let Some(format) = &config.logging.format {
        LogFormat::from_str(format).map_err(|_| {
            ConfigError::invalid(
                "logging",
                "format",
                Some(format.clone()),
                "must be 'json' or 'pretty'",
            )
        })?;
    }
    Ok(())
}

fn validate_environment(section: &'static str, env: &EnvironmentConfig) -> ConfigResult<()> {
    let endpoints = env.endpoints();
    for (field, value) in [
        ("url", env.url.as_str()),
        ("services.workspace", endpoints.workspace.as_str()),
        ("services.handle", endpoints.handle.as_str()),
        ("services.blobstore", endpoints.blobstore.as_str()),
        ("services.samples", endpoints.samples.as_str()),
    ] {
        validate_http_url(section, field, value)?;
    }
    if env.token_file.as_os_str().is_empty() {
        return Err(ConfigError::invalid(
            section,
            "token_file",
            None,
            "must name a file",
        ));
    }
    Ok(())
}

fn validate_http_url(section: &'static str, field: &'static str, value: &str) -> ConfigResult<()> {
    let url = Url::parse(value).map_err(|_| {
        ConfigError::invalid(section, field, Some(value.to_string()), "must be an absolute URL")
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            section,
            field,
            Some(value.to_string()),
            "must use http or https",
        ));
    }
    Ok(())
}

fn validate_object_type(value: &str) -> ConfigResult<()> {
    let invalid = |reason| {
        ConfigError::invalid("migration", "object_type", Some(value.to_string()), reason)
    };
    let parsed = TypeString::parse(value).map_err(|_| invalid("must be a type name"))?;
    if parsed.version().is_some() {
        return Err(invalid("must be a bare type name without a version"));
    }
    if !parsed.name().contains('.') {
        return Err(invalid("must be qualified by its module"));
    }
    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> ConfigResult<()> {
    if retry.max_attempts == 0 {
        return Err(ConfigError::invalid(
            "http.retry",
            "max_attempts",
            Some("0".into()),
            "must be at least 1",
        ));
    }
    if retry.multiplier == 0 {
        return Err(ConfigError::invalid(
            "http.retry",
            "multiplier",
            Some("0".into()),
            "must be at least 1",
        ));
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        return Err(ConfigError::invalid(
            "http.retry",
            "initial_backoff_ms",
            Some(retry.initial_backoff_ms.to_string()),
            "must not exceed max_backoff_ms",
        ));
    }
    Ok(())
}
