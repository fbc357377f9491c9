//! Loading and validation of `warden` topology files.

mod adapter;
mod env;
mod graph;
mod model;
mod raw;

use std::path::{Path, PathBuf};

pub use model::Config;

/// File names probed, in order, when no configuration path is given.
pub const DEFAULT_FILENAMES: [&str; 2] = ["warden.toml", ".warden.toml"];

/// Error type for configuration parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[cfg(feature = "toml")]
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation error(s): {0}")]
    Validation(String),

    #[error("environment variable `{0}` is not set and has no default")]
    MissingVariable(String),

    #[error("service `{service}` depends on unknown service `{dependency}`")]
    UnknownDependency { service: String, dependency: String },

    #[error("unknown service `{0}`")]
    UnknownService(String),

    #[error("unknown profile `{0}`")]
    UnknownProfile(String),

    #[error("dependency cycle detected among: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Returns the first of [`DEFAULT_FILENAMES`] that exists in `dir`.
#[must_use]
pub fn find_default(dir: &Path) -> Option<PathBuf> {
    DEFAULT_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Load a project configuration from a file path.
///
/// Variable references are expanded from the process environment.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration file cannot be read or parsed.
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()))
        }
        Err(err) => return Err(err.into()),
    };
    tracing::debug!("Loaded configuration from {}", path.display());
    parse_auto(&text, path)
}

/// Parse a project configuration from a string.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration string cannot be parsed.
pub fn parse_auto(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml")]
        "toml" => parse_toml(text, path),
        _ => Err(ConfigError::Validation("unknown config extension".into())),
    }
}

/// Parse a TOML configuration, resolving relative paths against the
/// directory of `path` and expanding variables from the process environment.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration string cannot be parsed.
#[cfg(feature = "toml")]
pub fn parse_toml(config: &str, path: &Path) -> Result<Config, ConfigError> {
    parse_toml_with(config, path, |name| std::env::var(name).ok())
}

/// Like [`parse_toml`] with an explicit variable lookup.
///
/// # Errors
///
/// Returns a `ConfigError` if the configuration string cannot be parsed.
#[cfg(feature = "toml")]
pub fn parse_toml_with<F>(config: &str, path: &Path, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = toml::from_str::<raw::RawConfig>(config)?;
    raw.into_config(path, &lookup)
}
