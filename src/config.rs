use anyhow::{Context, Result, bail};
use integration::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("entitlements"))
}

/// Expand `~` in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Capabilities
// ============================================================================

/// How modules get enabled for a tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleInstallerMode {
    /// One stage per module, layered in parallel groups
    #[default]
    Folio,
    /// One batch stage per application
    Okapi,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Kong,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Keycloak,
    #[default]
    None,
}

/// Integrations enabled for this installation, read once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub module_installer: ModuleInstallerMode,
    pub gateway: GatewayMode,
    pub auth: AuthMode,
}

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            backoff_factor: defaults.backoff_factor,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

// ============================================================================
// App Config
// ============================================================================

/// Top-level configuration, `~/.config/entitlements/config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding application descriptor JSON files
    pub registry_dir: String,
    /// SQLite database for flows and entitlements
    pub database: String,
    /// Worker threads for parallel stages
    pub pool_size: usize,
    pub capabilities: Capabilities,
    pub retry: RetrySettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            registry_dir: "~/.config/entitlements/applications".to_string(),
            database: "~/.local/share/entitlements/state.db".to_string(),
            pool_size: 4,
            capabilities: Capabilities::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl AppConfig {
    /// Load the config from an explicit path or the default locations
    ///
    /// Without an explicit path, `config.toml` wins over `config.json`; a
    /// missing file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let dir = config_dir()?;
        for name in ["config.toml", "config.json"] {
            let path = dir.join(name);
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        log::debug!("No config file in {}, using defaults", dir.display());
        Ok(Self::default())
    }

    /// Load a config file, picking the format from its extension
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON format in {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML format in {}", path.display()))?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            bail!("pool_size must be at least 1");
        }
        if self.retry.backoff_factor < 1.0 {
            bail!("retry.backoff_factor must be >= 1.0");
        }
        Ok(())
    }

    pub fn registry_path(&self) -> PathBuf {
        expand_path(&self.registry_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        expand_path(&self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.capabilities.module_installer, ModuleInstallerMode::Folio);
        assert_eq!(config.capabilities.gateway, GatewayMode::None);
        assert_eq!(config.retry.to_retry_config(), RetryConfig::default());
    }

    #[test]
    fn test_load_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
registry_dir = "/srv/apps"
pool_size = 8

[capabilities]
module_installer = "okapi"
gateway = "kong"
auth = "keycloak"

[retry]
max_attempts = 5
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.registry_path(), PathBuf::from("/srv/apps"));
        assert_eq!(config.pool_size, 8);
        assert_eq!(
            config.capabilities,
            Capabilities {
                module_installer: ModuleInstallerMode::Okapi,
                gateway: GatewayMode::Kong,
                auth: AuthMode::Keycloak,
            }
        );
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.database, AppConfig::default().database);
    }

    #[test]
    fn test_load_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"database": "/tmp/e.db", "capabilities": {"gateway": "kong"}}"#)
            .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/e.db"));
        assert_eq!(config.capabilities.gateway, GatewayMode::Kong);
        assert_eq!(config.capabilities.auth, AuthMode::None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "pool_size = 0\n").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());

        fs::write(&path, "pool_size = \"many\"\n").unwrap();
        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid TOML format"));
    }

    #[test]
    fn test_tilde_expansion() {
        let path = expand_path("~/apps");
        assert!(!path.to_string_lossy().starts_with('~'));
    }
}
