//! Reading configuration and token files from disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::MigrationConfig;
use crate::validate::validate;

/// Read, parse, and validate the configuration at `path`.
///
/// Relative `token_file`, `staging_dir`, and `concordance` paths are resolved
/// against the directory holding the configuration file.
///
/// # Errors
///
/// Returns `Io` when the file cannot be read, `Parse` when it is not a valid
/// document, and `InvalidField` when validation fails.
pub fn load_config(path: &Path) -> ConfigResult<MigrationConfig> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "read_config",
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&text, &path.display().to_string())?;
    if let Some(base) = path.parent() {
        anchor_paths(&mut config, base);
    }
    debug!(
        path = %path.display(),
        object_type = %config.object_type,
        source_container = config.containers.source,
        target_container = config.containers.target,
        "configuration loaded"
    );
    Ok(config)
}

/// Parse and validate a configuration document; `origin` names it in errors.
///
/// # Errors
///
/// Returns `Parse` or `InvalidField`.
pub fn parse_config(text: &str, origin: &str) -> ConfigResult<MigrationConfig> {
    let config: MigrationConfig =
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
    validate(&config)?;
    Ok(config)
}

/// Read an auth token, expanding a leading `~/` to the home directory.
///
/// # Errors
///
/// Returns `Io` when the file cannot be read and `EmptyToken` when it holds
/// only whitespace.
pub fn read_token(path: &Path) -> ConfigResult<String> {
    let path = expand_home(path);
    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        operation: "read_token",
        path: path.clone(),
        source,
    })?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(ConfigError::EmptyToken { path });
    }
    Ok(token.to_string())
}

fn anchor_paths(config: &mut MigrationConfig, base: &Path) {
    let anchor = |path: &mut PathBuf| {
        if path.is_relative() && !path.starts_with("~") {
            *path = base.join(&*path);
        }
    };
    anchor(&mut config.source.token_file);
    anchor(&mut config.target.token_file);
    anchor(&mut config.concordance);
    if let Some(dir) = config.staging_dir.as_mut() {
        anchor(dir);
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_prefix_is_expanded_only_at_the_start() {
        let plain = Path::new("/etc/wscopy/token");
        assert_eq!(expand_home(plain), plain);
        let nested = Path::new("tokens/~/token");
        assert_eq!(expand_home(nested), nested);
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/.kbase/token")),
                PathBuf::from(home).join(".kbase/token")
            );
        }
    }
}
