//! Configuration resolution and loading.
//!
//! Resolution order: CLI argument → environment variables → XDG paths →
//! system config → defaults.

use crate::settings::Settings;
use crate::validate::{validate_settings, ValidationError};
use crate::CONFIG_FILENAME;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where a configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/rcmd/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid TOML in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Environment variable names.
const ENV_CONFIG_PATH: &str = "RCMD_CONFIG";
const ENV_CONFIG_DIR: &str = "RCMD_CONFIG_DIR";
const ENV_STORE_URL: &str = "RCMD_STORE_URL";

/// Application name for XDG directories.
const APP_NAME: &str = "rcmd";

/// Settings together with their provenance.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Resolve the config file path using the standard resolution order.
///
/// 1. Explicit CLI path (must exist)
/// 2. `RCMD_CONFIG` environment variable (direct path)
/// 3. `RCMD_CONFIG_DIR` environment variable + `rcmd.toml`
/// 4. XDG config directory (`~/.config/rcmd/rcmd.toml`)
/// 5. System config (`/etc/rcmd/rcmd.toml`)
/// 6. Built-in defaults (None)
pub fn resolve_config(cli_path: Option<&Path>) -> Result<(Option<PathBuf>, ConfigSource), ConfigError> {
    // An explicit path that does not exist is a user error, not a fallback.
    if let Some(path) = cli_path {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return Ok((Some(path.to_path_buf()), ConfigSource::CliArgument));
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok((Some(path), ConfigSource::Environment));
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(CONFIG_FILENAME);
        if path.exists() {
            return Ok((Some(path), ConfigSource::Environment));
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return Ok((Some(path), ConfigSource::XdgConfig));
        }
    }

    let system_path = system_config_dir().join(CONFIG_FILENAME);
    if system_path.exists() {
        return Ok((Some(system_path), ConfigSource::SystemConfig));
    }

    Ok((None, ConfigSource::BuiltinDefault))
}

/// Resolve, read, apply env overrides and validate.
pub fn load_settings(cli_path: Option<&Path>) -> Result<LoadedSettings, ConfigError> {
    let (path, source) = resolve_config(cli_path)?;

    let mut settings = match &path {
        Some(p) => read_settings(p)?,
        None => Settings::default(),
    };

    if let Ok(url) = std::env::var(ENV_STORE_URL) {
        if !url.trim().is_empty() {
            settings.store.url = url.trim().to_string();
        }
    }

    validate_settings(&settings)?;

    Ok(LoadedSettings {
        settings,
        path,
        source,
    })
}

/// Read and parse a settings file without validation.
pub fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    Settings::from_toml(&text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

/// Get the XDG config directory for rcmd.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(format!("{}", ConfigSource::SystemConfig), "system config");
        assert_eq!(
            format!("{}", ConfigSource::BuiltinDefault),
            "builtin default"
        );
    }

    #[test]
    fn test_missing_cli_path_is_an_error() {
        let err = resolve_config(Some(Path::new("/nonexistent/rcmd.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_cli_path_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent]\npoll_interval_secs = 7").unwrap();

        let (path, source) = resolve_config(Some(file.path())).unwrap();
        assert_eq!(path.as_deref(), Some(file.path()));
        assert_eq!(source, ConfigSource::CliArgument);

        let loaded = load_settings(Some(file.path())).unwrap();
        assert_eq!(loaded.settings.agent.poll_interval_secs, 7);
        assert_eq!(loaded.source, ConfigSource::CliArgument);
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent\npoll_interval_secs = ").unwrap();

        let err = read_settings(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[controller]\npoll_attempts = 0").unwrap();

        let err = load_settings(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_system_config_dir() {
        assert_eq!(system_config_dir(), PathBuf::from("/etc/rcmd"));
    }
}
