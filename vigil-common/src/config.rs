//! Configuration file resolution and TOML loading
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`~/.config/vigil/<module>.toml`)
//! 4. System config directory (`/etc/vigil/<module>.toml`, Unix only)
//!
//! If no file is found the caller falls back to compiled defaults. A missing
//! file is never fatal; a file that exists but cannot be parsed is.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Logging configuration shared by all Vigil services
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter directive when `RUST_LOG` is not set (e.g. "info", "vigil_rd=debug")
    pub level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Resolves the configuration file for one Vigil module
#[derive(Debug, Clone)]
pub struct ConfigPathResolver {
    module_name: String,
    env_var_name: String,
}

impl ConfigPathResolver {
    /// Create a resolver for `module_name` (e.g. "vigil-rd")
    ///
    /// The environment variable consulted is the module name upper-cased with
    /// dashes replaced, suffixed with `_CONFIG` (`VIGIL_RD_CONFIG`).
    pub fn new(module_name: &str) -> Self {
        let env_var_name = format!("{}_CONFIG", module_name.to_uppercase().replace('-', "_"));
        Self {
            module_name: module_name.to_string(),
            env_var_name,
        }
    }

    /// Environment variable name consulted at priority 2
    pub fn env_var_name(&self) -> &str {
        &self.env_var_name
    }

    /// Resolve the config file path, if any candidate applies
    ///
    /// An explicit CLI or environment path is returned even when it does not
    /// exist so that the loader can warn about it; directory candidates are
    /// only returned when the file is present.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: User config directory
        let file_name = format!("{}.toml", self.module_name);
        if let Some(user_path) = dirs::config_dir().map(|d| d.join("vigil").join(&file_name)) {
            if user_path.exists() {
                return Some(user_path);
            }
        }

        // Priority 4: System config directory
        if cfg!(unix) {
            let system_path = PathBuf::from("/etc/vigil").join(&file_name);
            if system_path.exists() {
                return Some(system_path);
            }
        }

        None
    }
}

/// Load a TOML config of type `T`, degrading to defaults when the file is absent
///
/// - `None` path or missing file: warning + `T::default()`
/// - Unreadable or unparsable file: `Error::Config`
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} does not exist, using compiled defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write a config value to a TOML file (atomic via temp file + rename)
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reject a value outside [0, 1] (or non-finite)
pub fn require_unit_interval(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

/// Reject a non-positive (or non-finite) value
pub fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{} must be > 0, got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_name_derivation() {
        let resolver = ConfigPathResolver::new("vigil-rd");
        assert_eq!(resolver.env_var_name(), "VIGIL_RD_CONFIG");
    }

    #[test]
    fn test_cli_path_wins() {
        let resolver = ConfigPathResolver::new("vigil-test-cli");
        let path = PathBuf::from("/nonexistent/explicit.toml");
        assert_eq!(resolver.resolve(Some(&path)), Some(path));
    }

    #[test]
    fn test_unit_interval_validation() {
        assert!(require_unit_interval("x", 0.0).is_ok());
        assert!(require_unit_interval("x", 1.0).is_ok());
        assert!(require_unit_interval("x", 1.01).is_err());
        assert!(require_unit_interval("x", f64::NAN).is_err());
    }

    #[test]
    fn test_positive_validation() {
        assert!(require_positive("x", 0.1).is_ok());
        assert!(require_positive("x", 0.0).is_err());
        assert!(require_positive("x", f64::INFINITY).is_err());
    }
}
