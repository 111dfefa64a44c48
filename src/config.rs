//! Configuration management for ledbridge
//!
//! Handles loading, parsing and validation of the YAML configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::store::DEFAULT_TABLE;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Address of this controller; scopes every device record
    pub switch_mac: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MQTT broker connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Capacity of the client request queue and the inbound channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Record store location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// sled directory; defaults to the state directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicsConfig {
    #[serde(default = "default_read_prefix")]
    pub read_prefix: String,
    #[serde(default = "default_write_prefix")]
    pub write_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Maximum number of inbound messages handled concurrently
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Also write a daily rolling log file in the logs directory
    #[serde(default)]
    pub file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_broker_host() -> String {
    "127.0.0.1".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    64
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_read_prefix() -> String {
    "/read".to_string()
}

fn default_write_prefix() -> String {
    "/write".to_string()
}

fn default_max_inflight() -> usize {
    32
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: None,
            keep_alive_secs: default_keep_alive_secs(),
            username: None,
            password: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: default_table(),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            read_prefix: default_read_prefix(),
            write_prefix: default_write_prefix(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_inflight: default_max_inflight(),
        }
    }
}

impl BrokerConfig {
    /// Configured client id, or `LED<hostname>`
    pub fn effective_client_id(&self) -> String {
        match &self.client_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let host = std::env::var("HOSTNAME")
                    .ok()
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| "ledbridge".to_string());
                format!("LED{}", host)
            }
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse, normalise and validate a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let mut config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Apply a command line override of the controller address
    pub fn override_switch_mac(&mut self, mac: &str) -> Result<()> {
        self.switch_mac = normalize_mac(mac);
        self.validate()
    }

    fn normalize(&mut self) {
        self.switch_mac = normalize_mac(&self.switch_mac);
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.switch_mac.is_empty() {
            anyhow::bail!("switch_mac cannot be empty");
        }
        if self.broker.host.is_empty() {
            anyhow::bail!("broker host cannot be empty");
        }
        if self.broker.port == 0 {
            anyhow::bail!("broker port cannot be 0");
        }
        if self.broker.channel_capacity == 0 {
            anyhow::bail!("broker channel_capacity must be at least 1");
        }
        if self.database.table.is_empty() {
            anyhow::bail!("database table cannot be empty");
        }
        for (name, prefix) in [
            ("read_prefix", &self.topics.read_prefix),
            ("write_prefix", &self.topics.write_prefix),
        ] {
            if !prefix.starts_with('/') {
                anyhow::bail!("topics.{} must start with '/' (got '{}')", name, prefix);
            }
        }
        if self.service.max_inflight == 0 {
            anyhow::bail!("service max_inflight must be at least 1");
        }
        Ok(())
    }
}

/// Upper-case a hardware address and drop its ':' separators
pub fn normalize_mac(mac: &str) -> String {
    mac.trim()
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::from_yaml_str("switch_mac: \"aa:bb:cc:dd:ee:ff\"\n").unwrap();

        assert_eq!(config.switch_mac, "AABBCCDDEEFF");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.broker.host, "127.0.0.1");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.keep_alive_secs, 30);
        assert_eq!(config.broker.channel_capacity, 64);
        assert_eq!(config.database.table, "leds");
        assert!(config.database.path.is_none());
        assert_eq!(config.topics.read_prefix, "/read");
        assert_eq!(config.topics.write_prefix, "/write");
        assert_eq!(config.service.max_inflight, 32);
        assert!(!config.logging.file);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
switch_mac: "001122334455"
log_level: debug
broker:
  host: broker.local
  port: 8883
  client_id: LEDtest
  username: user
  password: secret
database:
  path: /tmp/leds
  table: drivers
topics:
  read_prefix: /r
  write_prefix: /w
service:
  max_inflight: 4
logging:
  file: true
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.broker.host, "broker.local");
        assert_eq!(config.broker.port, 8883);
        assert_eq!(config.broker.effective_client_id(), "LEDtest");
        assert_eq!(config.broker.username.as_deref(), Some("user"));
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/leds")));
        assert_eq!(config.database.table, "drivers");
        assert_eq!(config.topics.read_prefix, "/r");
        assert_eq!(config.service.max_inflight, 4);
        assert!(config.logging.file);
    }

    #[test]
    fn test_missing_switch_mac_rejected() {
        assert!(AppConfig::from_yaml_str("log_level: info\n").is_err());
        assert!(AppConfig::from_yaml_str("switch_mac: \":::\"\n").is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            "switch_mac: AA\nbroker:\n  host: \"\"\n",
            "switch_mac: AA\nbroker:\n  port: 0\n",
            "switch_mac: AA\ndatabase:\n  table: \"\"\n",
            "switch_mac: AA\ntopics:\n  read_prefix: read\n",
            "switch_mac: AA\nservice:\n  max_inflight: 0\n",
        ];
        for yaml in cases {
            assert!(AppConfig::from_yaml_str(yaml).is_err(), "accepted: {}", yaml);
        }
    }

    #[test]
    fn test_override_switch_mac() {
        let mut config = AppConfig::from_yaml_str("switch_mac: AA\n").unwrap();
        config.override_switch_mac("de:ad:be:ef:00:01").unwrap();
        assert_eq!(config.switch_mac, "DEADBEEF0001");
        assert!(config.override_switch_mac("").is_err());
    }

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac(" aa:bb:cc:dd:ee:ff "), "AABBCCDDEEFF");
        assert_eq!(normalize_mac("AABBCC"), "AABBCC");
    }

    #[test]
    fn test_default_client_id_prefix() {
        let broker = BrokerConfig::default();
        assert!(broker.effective_client_id().starts_with("LED"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "switch_mac: \"aa:bb\"\n").unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.switch_mac, "AABB");

        assert!(AppConfig::load(dir.path().join("missing.yaml")).await.is_err());
    }
}
