//! Typed configuration model deserialised from YAML.
//!
//! # Design
//! - Unknown keys are rejected so typos surface before any network call.
//! - Every optional setting has a default from `defaults.rs`.
//! - Service URLs default to the conventional paths below the environment's
//!   `url`; each can be overridden.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use wscopy_core::MatchStrategy;
use wscopy_rpc::{RetryPolicy, ServiceEndpoints};

use crate::defaults;

/// Root of a migration configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    /// Environment objects are copied from.
    pub source: EnvironmentConfig,
    /// Environment objects are copied into.
    pub target: EnvironmentConfig,
    /// Source and target container ids.
    pub containers: ContainerPair,
    /// Bare type name of the objects to copy, e.g. `KBaseGenomes.Genome`.
    pub object_type: String,
    /// How already-copied objects are recognised.
    #[serde(default)]
    pub match_strategy: MatchStrategy,
    /// Listing size treated as truncated.
    #[serde(default = "default_listing_limit")]
    pub listing_limit: usize,
    /// Record per-object failures and keep going.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Compare target blob checksums with the source.
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
    /// Directory for staged blobs; the system temp dir when absent.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Sample concordance file.
    #[serde(default = "default_concordance")]
    pub concordance: PathBuf,
    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,
    /// Log settings; CLI flags take precedence.
    #[serde(default)]
    pub logging: LoggingSection,
}

/// One deployment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Services root, e.g. `https://kbase.us/services/`.
    pub url: String,
    /// File holding the auth token.
    pub token_file: PathBuf,
    /// Per-service URL overrides.
    #[serde(default)]
    pub services: ServiceOverrides,
}

impl EnvironmentConfig {
    /// Effective service URLs.
    #[must_use]
    pub fn endpoints(&self) -> ServiceEndpoints {
        let mut endpoints = ServiceEndpoints::under(&self.url);
        let overrides = &self.services;
        if let Some(url) = &overrides.workspace {
            endpoints.workspace.clone_from(url);
        }
        if let Some(url) = &overrides.handle {
            endpoints.handle.clone_from(url);
        }
        if let Some(url) = &overrides.blobstore {
            endpoints.blobstore.clone_from(url);
        }
        if let Some(url) = &overrides.samples {
            endpoints.samples.clone_from(url);
        }
        endpoints
    }
}

/// Optional per-service URL overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceOverrides {
    /// Workspace endpoint.
    #[serde(default)]
    pub workspace: Option<String>,
    /// Handle service endpoint.
    #[serde(default)]
    pub handle: Option<String>,
    /// Blob store root.
    #[serde(default)]
    pub blobstore: Option<String>,
    /// Sample service endpoint.
    #[serde(default)]
    pub samples: Option<String>,
}

/// Source and target containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerPair {
    /// Source container id.
    pub source: u64,
    /// Target container id.
    pub target: u64,
}

/// HTTP client settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry schedule for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::HTTP_TIMEOUT_SECS,
            retry: RetryConfig::default(),
        }
    }
}

impl HttpConfig {
    /// Per-request timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Ceiling for a single delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth factor.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            initial_backoff_ms: defaults::RETRY_INITIAL_BACKOFF_MS,
            max_backoff_ms: defaults::RETRY_MAX_BACKOFF_MS,
            multiplier: defaults::RETRY_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// Policy consumed by the transport.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
        }
    }
}

/// Log settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Filter directive, e.g. `info` or `wscopy_engine=debug`.
    #[serde(default)]
    pub level: Option<String>,
    /// `json` or `pretty`.
    #[serde(default)]
    pub format: Option<String>,
}

const fn default_listing_limit() -> usize {
    defaults::LISTING_LIMIT
}

const fn default_true() -> bool {
    true
}

fn default_concordance() -> PathBuf {
    PathBuf::from(defaults::CONCORDANCE_FILE)
}

const fn default_timeout_secs() -> u64 {
    defaults::HTTP_TIMEOUT_SECS
}

const fn default_max_attempts() -> u32 {
    defaults::RETRY_MAX_ATTEMPTS
}

const fn default_initial_backoff_ms() -> u64 {
    defaults::RETRY_INITIAL_BACKOFF_MS
}

const fn default_max_backoff_ms() -> u64 {
    defaults::RETRY_MAX_BACKOFF_MS
}

const fn default_multiplier() -> u32 {
    defaults::RETRY_MULTIPLIER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_single_services() {
        let env = EnvironmentConfig {
            url: "https://ci.kbase.us/services".into(),
            token_file: PathBuf::from("token"),
            services: ServiceOverrides {
                blobstore: Some("https://blobs.example.org/shock".into()),
                ..ServiceOverrides::default()
            },
        };
        let endpoints = env.endpoints();
        assert_eq!(endpoints.workspace, "https://ci.kbase.us/services/ws");
        assert_eq!(endpoints.blobstore, "https://blobs.example.org/shock");
    }

    #[test]
    fn retry_defaults_match_transport_defaults() {
        assert_eq!(RetryConfig::default().policy(), RetryPolicy::default());
        assert_eq!(HttpConfig::default().timeout(), Duration::from_secs(300));
    }
}
