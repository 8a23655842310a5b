//! CLI configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/frameart/frameart.toml`
//! - Windows: `%APPDATA%/frameart/frameart.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use frameart_client::{ArtConfig, RetryPolicy};
use frameart_protocol::constants::TLS_PORT;
use serde::{Deserialize, Serialize};

/// Settings for the device the CLI talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Device address.
    #[serde(default)]
    pub host: String,

    /// Control port: 8002 (TLS) or 8001 (plain).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Pairing token accepted by the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Name shown on the device's connection prompt (hostname by default).
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Side-channel retries for store artwork.
    #[serde(default = "default_store_retries")]
    pub store_retries: u32,

    #[serde(default = "default_store_retry_delay_ms")]
    pub store_retry_delay_ms: u64,
}

fn default_port() -> u16 {
    TLS_PORT
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| frameart_client::config::DEFAULT_CLIENT_NAME.into())
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_store_retries() -> u32 {
    RetryPolicy::default().max_retries
}

fn default_store_retry_delay_ms() -> u64 {
    RetryPolicy::default().base_delay.as_millis() as u64
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            token: None,
            name: default_name(),
            timeout_secs: default_timeout_secs(),
            store_retries: default_store_retries(),
            store_retry_delay_ms: default_store_retry_delay_ms(),
        }
    }
}

impl CliConfig {
    /// Loads `path`, or the default location when `None`. A missing file
    /// yields defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: CliConfig = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            Ok(CliConfig::default())
        }
    }

    /// Writes the configuration to `path`, or the default location.
    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        // The pairing token is a credential.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(path)
    }

    pub fn art_config(&self) -> anyhow::Result<ArtConfig> {
        if self.host.is_empty() {
            anyhow::bail!("no device host configured (use --host or set `host` in the config file)");
        }
        let mut config = ArtConfig::new(self.host.clone())
            .port(self.port)
            .name(self.name.clone())
            .timeout(Duration::from_secs(self.timeout_secs))
            .store_retry(RetryPolicy {
                max_retries: self.store_retries,
                base_delay: Duration::from_millis(self.store_retry_delay_ms),
            });
        if let Some(token) = &self.token {
            config = config.token(token.clone());
        }
        Ok(config)
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("frameart").join("frameart.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("frameart")
            .join("frameart.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CliConfig::default();
        assert!(!config.name.is_empty());
        assert!(config.host.is_empty());
        assert_eq!(config.port, 8002);
        assert_eq!(config.store_retries, 2);
        assert_eq!(config.store_retry_delay_ms, 500);
    }

    #[test]
    fn partial_toml() {
        let config: CliConfig = toml::from_str(r#"host = "192.168.1.50""#).unwrap();
        assert_eq!(config.host, "192.168.1.50");
        assert_eq!(config.port, 8002);
        assert_eq!(config.timeout_secs, 5);
        assert!(config.token.is_none());
    }

    #[test]
    fn missing_host_is_an_error() {
        assert!(CliConfig::default().art_config().is_err());
    }

    #[test]
    fn art_config_carries_settings() {
        let config = CliConfig {
            host: "tv.local".into(),
            port: 8001,
            token: Some("1234".into()),
            store_retries: 0,
            ..CliConfig::default()
        };
        let art = config.art_config().unwrap();
        assert_eq!(art.host, "tv.local");
        assert!(!art.is_secure());
        assert_eq!(art.token.as_deref(), Some("1234"));
        assert_eq!(art.store_retry.max_retries, 0);
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("frameart.toml");

        let config = CliConfig {
            host: "10.0.0.9".into(),
            token: Some("secret".into()),
            ..CliConfig::default()
        };
        config.save(Some(&path)).unwrap();

        let loaded = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let loaded = CliConfig::load(Some(&tmp.path().join("absent.toml"))).unwrap();
        assert_eq!(loaded.port, 8002);
    }
}
