//! Default values applied when the configuration file omits a setting.
//!
//! # Design
//! - Keep every default in one place so the model and the docs agree.

/// Non-paginated listing maximum of the workspace service.
pub(crate) const LISTING_LIMIT: usize = 10_000;
/// Per-request HTTP timeout in seconds.
pub(crate) const HTTP_TIMEOUT_SECS: u64 = 300;
/// Attempts per remote call, including the first.
pub(crate) const RETRY_MAX_ATTEMPTS: u32 = 5;
/// Delay before the first retry.
pub(crate) const RETRY_INITIAL_BACKOFF_MS: u64 = 500;
/// Ceiling for a single retry delay.
pub(crate) const RETRY_MAX_BACKOFF_MS: u64 = 30_000;
/// Backoff growth factor.
pub(crate) const RETRY_MULTIPLIER: u32 = 2;
/// Concordance file used when neither the config nor the CLI names one.
pub(crate) const CONCORDANCE_FILE: &str = "sample_concordance.tsv";
