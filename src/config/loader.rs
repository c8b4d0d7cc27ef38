use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::types::PyletConfig;
use crate::error::{PyletError, Result};

/// Get the default configuration file path
pub fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "pylet", "pylet") {
        proj_dirs.config_dir().join("config.toml")
    } else {
        // Fallback to home directory
        dirs_fallback().join(".pylet").join("config.toml")
    }
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load configuration from file, with defaults for missing values.
///
/// An explicitly named file must exist; the default location may be absent.
pub fn load_config(config_path: Option<&Path>) -> Result<PyletConfig> {
    let explicit = config_path.is_some();
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    if !path.exists() {
        if explicit {
            return Err(PyletError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        return Ok(PyletConfig::default());
    }

    debug!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(&path)?;
    let config: PyletConfig =
        toml::from_str(&content).map_err(|e| PyletError::TomlParse(e.to_string()))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &PyletConfig) -> Result<()> {
    if config.sandbox.max_recursion_depth == 0 {
        return Err(PyletError::Config(
            "sandbox.max_recursion_depth must be at least 1".to_string(),
        ));
    }
    if config.sandbox.stack_size_mb == 0 {
        return Err(PyletError::Config(
            "sandbox.stack_size_mb must be at least 1".to_string(),
        ));
    }
    if config.sandbox.timeout_seconds == Some(0) {
        return Err(PyletError::Config(
            "sandbox.timeout_seconds must be positive; omit it for no limit".to_string(),
        ));
    }
    Ok(())
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config(config: &PyletConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(config).map_err(|e| PyletError::Config(e.to_string()))?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_default_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        // An explicit path that is missing is an error...
        assert!(matches!(
            load_config(Some(&path)),
            Err(PyletError::ConfigNotFound { .. })
        ));
        // ...but once written it loads.
        save_config(&PyletConfig::default(), &path).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), PyletConfig::default());
    }

    #[test]
    fn test_load_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[sandbox]\ntimeout_seconds = 2\nmax_recursion_depth = 50\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.sandbox.timeout_seconds, Some(2));
        assert_eq!(config.sandbox.max_recursion_depth, 50);
        assert_eq!(config.sandbox.stack_size_mb, 64);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sandbox\n").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(PyletError::TomlParse(_))
        ));
    }

    #[test]
    fn test_zero_recursion_depth_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sandbox]\nmax_recursion_depth = 0\n").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(PyletError::Config(_))));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dir").join("config.toml");
        save_config(&PyletConfig::default(), &path).unwrap();
        assert!(path.exists());
    }
}
