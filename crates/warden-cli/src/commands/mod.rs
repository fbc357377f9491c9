mod logs;
mod start;
mod status;
mod stop;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use warden_config::{Config, ConfigError};
use warden_types::Topology;

use crate::config::Selection;

pub use logs::logs;
pub use start::start;
pub use status::status;
pub use stop::stop;

/// The configuration file to use: `explicit`, or the first default name
/// found in the current directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("cannot determine the current directory")?;
    warden_config::find_default(&cwd).ok_or_else(|| {
        ConfigError::NotFound(cwd.join(warden_config::DEFAULT_FILENAMES[0])).into()
    })
}

/// Loads `<config dir>/.env` into the process environment. Variables that
/// are already set win.
pub fn load_dotenv(config_path: &Path) {
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let env_file = dir.join(".env");
    if !env_file.is_file() {
        return;
    }
    match dotenvy::from_path(&env_file) {
        Ok(()) => tracing::debug!("Loaded environment from {}", env_file.display()),
        Err(err) => tracing::warn!("Ignoring {}: {err}", env_file.display()),
    }
}

pub fn load(config_path: &Path) -> Result<Config> {
    let config = warden_config::load_from_path(config_path)?;
    tracing::debug!(
        "{} services, profiles {:?}",
        config.services.len(),
        config.profile_names()
    );
    Ok(config)
}

pub fn select(config: &Config, selection: &Selection) -> Result<Topology> {
    Ok(config.topology(selection.profile.as_deref(), &selection.services)?)
}
