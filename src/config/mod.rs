//! Configuration Management
//!
//! Loads named database connections and engine tuning from JSON config files.
//!
//! # Configuration Locations
//! - Local: `.querywise/config.json` (team-shareable, per-project)
//! - Global: `~/.config/querywise/config.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit command-line parameters (highest priority)
//! 2. Environment overrides (`OLLAMA_BASE_URL`, `OLLAMA_MODEL`)
//! 3. Local config file
//! 4. Global config file
//!
//! Connections from both files are merged by name, local winning. Every other section
//! is taken whole from the local file when present there.
//!
//! # Example
//! ```json
//! {
//!   "connections": {
//!     "clinic": {"engine": "mysql", "host": "db", "port": 3306, "user": "ro",
//!                "database": "sik", "password_env": "CLINIC_DB_PASSWORD"}
//!   },
//!   "default": "clinic",
//!   "oracle": {"base_url": "http://localhost:11434", "model": "qwen3"},
//!   "cache": {"ttl_minutes": 30},
//!   "domain_preset": "hospital"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{ConnectionConfig, ExecutionLimits};
use crate::error::{QueryError, Result};
use crate::oracle::OracleSettings;
use crate::profile::DomainProfile;
use crate::schema::CacheSettings;
use crate::validation::ValidationSettings;

/// Stored connection configuration
///
/// Like `ConnectionConfig`, plus an environment variable reference for the password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConnection {
    #[serde(flatten)]
    pub config: ConnectionConfig,

    /// Environment variable holding the password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredConnection {
    /// Connection config with the password resolved
    ///
    /// # Errors
    /// * `ConfigError` if `password_env` names an unset variable
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        let mut config = self.config.clone();

        if let Some(env_var) = &self.password_env {
            match std::env::var(env_var) {
                Ok(password) => config.password = Some(password),
                Err(_) => {
                    return Err(QueryError::config_error(format!(
                        "Environment variable {env_var} not found for password"
                    )));
                }
            }
        }

        Ok(config)
    }
}

/// One config file as written; absent sections stay `None`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub connections: HashMap<String, StoredConnection>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleSettings>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheSettings>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSettings>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<ExecutionLimits>,

    /// Built-in profile name (`default`, `hospital`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_preset: Option<String>,

    /// Full profile; takes precedence over `domain_preset`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainProfile>,
}

impl ConfigFile {
    /// Overlay `local` on top of `self`
    #[must_use]
    pub fn merge(mut self, local: Self) -> Self {
        self.connections.extend(local.connections);
        Self {
            connections: self.connections,
            default: local.default.or(self.default),
            oracle: local.oracle.or(self.oracle),
            cache: local.cache.or(self.cache),
            validation: local.validation.or(self.validation),
            limits: local.limits.or(self.limits),
            domain_preset: local.domain_preset.or(self.domain_preset),
            domain: local.domain.or(self.domain),
        }
    }
}

/// Effective settings after merging and defaults
#[derive(Debug, Clone)]
pub struct Settings {
    pub connections: HashMap<String, StoredConnection>,
    pub default: Option<String>,
    pub oracle: OracleSettings,
    pub cache: CacheSettings,
    pub validation: ValidationSettings,
    pub limits: ExecutionLimits,
    pub profile: DomainProfile,
}

impl Settings {
    /// Apply defaults to a merged config file
    ///
    /// # Errors
    /// * `ConfigError` for an unknown `domain_preset`
    pub fn from_file(file: ConfigFile) -> Result<Self> {
        let profile = match (file.domain, file.domain_preset) {
            (Some(profile), _) => profile,
            (None, Some(preset)) => DomainProfile::preset(&preset).ok_or_else(|| {
                QueryError::config_error(format!("Unknown domain preset '{preset}'"))
            })?,
            (None, None) => DomainProfile::default(),
        };

        Ok(Self {
            connections: file.connections,
            default: file.default,
            oracle: file.oracle.unwrap_or_default().with_env_overrides(),
            cache: file.cache.unwrap_or_default(),
            validation: file.validation.unwrap_or_default(),
            limits: file.limits.unwrap_or_default(),
            profile,
        })
    }

    /// Resolve a connection by name
    ///
    /// Without a name, uses the `default` connection, or the only connection when
    /// exactly one is configured.
    ///
    /// # Errors
    /// * `ConfigError` if no connection can be selected or its password is missing
    pub fn resolve_connection(&self, name: Option<&str>) -> Result<ConnectionConfig> {
        let name = match name.or(self.default.as_deref()) {
            Some(name) => name.to_string(),
            None if self.connections.len() == 1 => {
                self.connections.keys().next().cloned().unwrap_or_default()
            }
            None => {
                return Err(QueryError::config_error(
                    "No connection specified and no default connection configured",
                ))
            }
        };

        let stored = self.connections.get(&name).ok_or_else(|| {
            let mut known: Vec<&str> = self.connections.keys().map(String::as_str).collect();
            known.sort_unstable();
            QueryError::config_error(format!(
                "Connection '{name}' not found. Available: {}",
                if known.is_empty() { "none".to_string() } else { known.join(", ") }
            ))
        })?;
        stored.resolve()
    }
}

/// Get path to local config file (`.querywise/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        QueryError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".querywise").join("config.json"))
}

/// Get path to global config file (`~/.config/querywise/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| QueryError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("querywise").join("config.json"))
}

/// Read one config file; a missing file is empty
pub fn load_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| QueryError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents).map_err(|e| {
        QueryError::config_error(format!("Invalid config file {}: {e}", path.display()))
    })
}

/// Load settings with precedence (local over global)
pub fn load_settings() -> Result<Settings> {
    let global = load_file(&global_config_path()?)?;
    let local = load_file(&local_config_path()?)?;
    Settings::from_file(global.merge(local))
}

/// Load settings from one explicit file
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(QueryError::config_error(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    Settings::from_file(load_file(path)?)
}
