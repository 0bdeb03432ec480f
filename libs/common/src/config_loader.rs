//! Layered configuration loading
//!
//! Priority (lowest to highest):
//! 1. `T::default()`
//! 2. Configuration file (YAML, TOML or JSON, chosen by extension)
//! 3. Environment variables `{PREFIX}_SECTION__KEY`

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to load configuration: {0}")]
    Extract(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Extract(err.to_string())
    }
}

/// Return the first existing path among `candidates`
pub fn find_config_file<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|p| p.as_ref())
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment, ConfigError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("yaml")
        .to_lowercase();

    match extension.as_str() {
        "yaml" | "yml" | "conf" => Ok(figment.merge(Yaml::file(path))),
        "toml" => Ok(figment.merge(Toml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Load `T` from defaults, an optional file and prefixed environment variables
///
/// An explicitly given file must exist. Nested keys are addressed in the
/// environment with a double underscore: `TICKETSRV_TRACKER__QUEUE=ops`.
pub fn load_layered<T>(env_prefix: &str, path: Option<&Path>) -> Result<T, ConfigError>
where
    T: Serialize + DeserializeOwned + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        info!("Loading config file: {}", path.display());
        figment = file_provider(figment, path)?;
    } else {
        debug!("No config file given, using defaults and environment");
    }

    let prefix = format!("{}_", env_prefix.trim_end_matches('_'));
    figment = figment.merge(Env::prefixed(&prefix).split("__"));

    Ok(figment.extract()?)
}
