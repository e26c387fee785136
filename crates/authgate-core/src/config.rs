//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! identity provider endpoint and API key, session window, storage backend
//! and the last email used to log in.
//!
//! Configuration is stored at `~/.config/authgate/config.json`. A few fields
//! can be overridden from the environment (or a `.env` file loaded by the
//! shell).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::exchange::client::DEFAULT_AUTH_BASE_URL;
use crate::exchange::IdentityToolkitClient;
use crate::session::types::{DEFAULT_RECHECK_INTERVAL_SECS, DEFAULT_TTL_SECS};
use crate::session::SessionSettings;
use crate::store::file::SESSION_FILE;
use crate::store::{DurableStore, FileStore, KeyringStore};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "authgate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_API_KEY: &str = "AUTHGATE_API_KEY";
const ENV_AUTH_URL: &str = "AUTHGATE_AUTH_URL";
const ENV_SESSION_TTL_SECS: &str = "AUTHGATE_SESSION_TTL_SECS";

/// Longest session window accepted from config: 30 days
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Where the persisted session lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub auth_base_url: String,
    pub session_ttl_secs: u64,
    /// 0 disables the periodic wall-clock probe
    pub recheck_interval_secs: u64,
    pub store: StoreBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            session_ttl_secs: DEFAULT_TTL_SECS,
            recheck_interval_secs: DEFAULT_RECHECK_INTERVAL_SECS,
            store: StoreBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults if absent), then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_AUTH_URL).filter(|u| !u.is_empty()) {
            self.auth_base_url = url;
        }
        if let Some(raw) = lookup(ENV_SESSION_TTL_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if (1..=MAX_SESSION_TTL_SECS).contains(&secs) => {
                    self.session_ttl_secs = secs
                }
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_SESSION_TTL_SECS),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the session file and logs
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            ttl: Duration::from_secs(self.session_ttl_secs.clamp(1, MAX_SESSION_TTL_SECS)),
            recheck_interval: match self.recheck_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn open_store(&self) -> Result<Arc<dyn DurableStore>> {
        let store: Arc<dyn DurableStore> = match self.store {
            StoreBackend::File => Arc::new(FileStore::new(self.data_dir()?.join(SESSION_FILE))),
            StoreBackend::Keyring => Arc::new(KeyringStore::new(APP_NAME)),
        };
        Ok(store)
    }

    pub fn exchange_client(&self) -> Result<IdentityToolkitClient> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No API key configured - set {}", ENV_API_KEY))?;
        Ok(IdentityToolkitClient::new(api_key)?.with_base_url(&self.auth_base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = Config::default().session_settings();
        assert_eq!(settings.ttl, Duration::from_secs(3600));
        assert_eq!(settings.recheck_interval, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_recheck_interval_disables_probe() {
        let config = Config {
            recheck_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.session_settings().recheck_interval, None);
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"store": "keyring", "api_key": "k"}"#).unwrap();
        assert_eq!(config.store, StoreBackend::Keyring);
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.session_ttl_secs, DEFAULT_TTL_SECS);
        assert_eq!(config.auth_base_url, DEFAULT_AUTH_BASE_URL);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            (ENV_API_KEY, "from-env"),
            (ENV_AUTH_URL, "http://localhost:9099"),
            (ENV_SESSION_TTL_SECS, "120"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.auth_base_url, "http://localhost:9099");
        assert_eq!(config.session_ttl_secs, 120);
    }

    #[test]
    fn test_invalid_ttl_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[(ENV_SESSION_TTL_SECS, "soon"), (ENV_API_KEY, "")]));
        assert_eq!(config.session_ttl_secs, DEFAULT_TTL_SECS);
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn test_session_ttl_is_clamped() {
        let config: Config = serde_json::from_str(r#"{"session_ttl_secs": 18446744073709551615}"#).unwrap();
        assert_eq!(
            config.session_settings().ttl,
            Duration::from_secs(MAX_SESSION_TTL_SECS)
        );

        let config = Config {
            session_ttl_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.session_settings().ttl, Duration::from_secs(1));
    }

    #[test]
    fn test_oversized_ttl_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[(ENV_SESSION_TTL_SECS, "99999999999999")]));
        assert_eq!(config.session_ttl_secs, DEFAULT_TTL_SECS);

        config.apply_overrides(lookup_from(&[(ENV_SESSION_TTL_SECS, "2592000")]));
        assert_eq!(config.session_ttl_secs, MAX_SESSION_TTL_SECS);
    }

    #[test]
    fn test_exchange_client_requires_api_key() {
        assert!(Config::default().exchange_client().is_err());
        let config = Config {
            api_key: Some("k".to_string()),
            ..Config::default()
        };
        assert!(config.exchange_client().is_ok());
    }
}
