#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! YAML configuration for a migration run.
//!
//! Layout: `model.rs` (typed configuration model), `defaults.rs` (fallback
//! values), `validate.rs` (field checks), `loader.rs` (config and token files),
//! `error.rs` (error taxonomy).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, parse_config, read_token};
pub use model::{
    ContainerPair, EnvironmentConfig, HttpConfig, LoggingSection, MigrationConfig, RetryConfig,
    ServiceOverrides,
};
pub use validate::validate;
