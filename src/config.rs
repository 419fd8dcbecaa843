//! Configuration file support for weewx-wx.
//!
//! Loads settings from `~/.config/weewx-wx/config.toml` on Linux
//! (or platform-appropriate location on other OSes). Command-line flags
//! override anything set here.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{CLIENT_ID, LOOP_TOPIC, MQTT_HOST, MQTT_PORT, WxClientConfig};
use crate::output::{DEFAULT_JSON_OUTPUT, DEFAULT_TEXT_OUTPUT, OutputWriter};
use crate::render::{FieldFormats, MAX_PRECISION};

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker hostname.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// Optional broker username.
    pub username: Option<String>,

    /// Optional broker password.
    pub password: Option<String>,

    /// MQTT client identifier.
    pub client_id: String,

    /// Topic carrying loop packets.
    pub topic: String,

    /// MQTT keep-alive in seconds.
    pub keep_alive: u64,

    /// Path of the overlay text file.
    pub text_output: PathBuf,

    /// Path of the structured JSON file.
    pub json_output: PathBuf,

    /// Whether to write the JSON file at all.
    pub json_enabled: bool,

    /// Decimals shown for wind direction.
    pub wind_dir_precision: usize,

    /// Whether to reconnect after the connection fails.
    pub reconnect: bool,

    /// Initial reconnect delay in seconds.
    pub reconnect_delay: u64,

    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay: u64,

    /// Consecutive failed attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,

    /// Log statistics every N seconds (0 = never).
    pub stats_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: MQTT_HOST.to_string(),
            port: MQTT_PORT,
            username: None,
            password: None,
            client_id: CLIENT_ID.to_string(),
            topic: LOOP_TOPIC.to_string(),
            keep_alive: 60,
            text_output: PathBuf::from(DEFAULT_TEXT_OUTPUT),
            json_output: PathBuf::from(DEFAULT_JSON_OUTPUT),
            json_enabled: true,
            wind_dir_precision: 1,
            reconnect: true,
            reconnect_delay: 1,
            max_reconnect_delay: 60,
            max_reconnect_attempts: 0,
            stats_interval: 0,
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("weewx-wx/config.toml"))
    }

    /// Validate all configuration settings.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("Broker host must not be empty");
        }
        if self.port == 0 {
            bail!("Broker port must not be 0");
        }
        if self.client_id.is_empty() {
            bail!("Client id must not be empty");
        }
        if self.topic.is_empty() {
            bail!("Topic must not be empty");
        }
        if self.password.is_some() && self.username.is_none() {
            bail!("A password was given without a username");
        }
        if self.wind_dir_precision > MAX_PRECISION {
            bail!(
                "Wind direction precision {} exceeds maximum of {}",
                self.wind_dir_precision,
                MAX_PRECISION
            );
        }
        if self.text_output.as_os_str().is_empty() {
            bail!("Text output path must not be empty");
        }
        if self.json_enabled && self.json_output.as_os_str().is_empty() {
            bail!("JSON output path must not be empty");
        }
        Ok(())
    }

    /// Client settings for the broker connection.
    pub fn client_config(&self) -> WxClientConfig {
        WxClientConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            client_id: self.client_id.clone(),
            topic: self.topic.clone(),
            keep_alive: Duration::from_secs(self.keep_alive),
            auto_reconnect: self.reconnect,
            reconnect_delay: Duration::from_secs(self.reconnect_delay),
            max_reconnect_delay: Duration::from_secs(self.max_reconnect_delay),
            max_reconnect_attempts: self.max_reconnect_attempts,
            ..Default::default()
        }
    }

    /// Writer for the configured output files.
    pub fn output_writer(&self) -> OutputWriter {
        let json_output = self.json_enabled.then(|| self.json_output.clone());
        OutputWriter::new(self.text_output.clone(), json_output)
    }

    /// Field precisions for rendering.
    pub fn field_formats(&self) -> FieldFormats {
        FieldFormats::default().with_wind_dir_precision(self.wind_dir_precision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, MQTT_HOST);
        assert_eq!(config.port, MQTT_PORT);
        assert_eq!(config.client_id, CLIENT_ID);
        assert_eq!(config.topic, LOOP_TOPIC);
        assert!(config.json_enabled);
        assert!(config.reconnect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            host = "10.0.0.5"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.host, "10.0.0.5");
        // Other fields should use defaults
        assert_eq!(config.port, MQTT_PORT);
        assert_eq!(config.text_output, PathBuf::from(DEFAULT_TEXT_OUTPUT));
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            host = "broker.lan"
            port = 1884
            username = "weewx"
            password = "secret"
            client_id = "obs-overlay"
            topic = "station/loop"
            keep_alive = 30
            text_output = "/srv/obs/wx.txt"
            json_output = "/srv/obs/wx.json"
            json_enabled = false
            wind_dir_precision = 0
            reconnect = false
            reconnect_delay = 2
            max_reconnect_delay = 30
            max_reconnect_attempts = 5
            stats_interval = 300
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.host, "broker.lan");
        assert_eq!(config.port, 1884);
        assert_eq!(config.username.as_deref(), Some("weewx"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.client_id, "obs-overlay");
        assert_eq!(config.topic, "station/loop");
        assert_eq!(config.keep_alive, 30);
        assert_eq!(config.text_output, PathBuf::from("/srv/obs/wx.txt"));
        assert!(!config.json_enabled);
        assert_eq!(config.wind_dir_precision, 0);
        assert!(!config.reconnect);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.stats_interval, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config() {
        let config = Config {
            username: Some("weewx".to_string()),
            reconnect_delay: 3,
            max_reconnect_attempts: 4,
            ..Default::default()
        };
        let client = config.client_config();
        assert_eq!(client.host, MQTT_HOST);
        assert_eq!(client.username.as_deref(), Some("weewx"));
        assert_eq!(client.keep_alive, Duration::from_secs(60));
        assert_eq!(client.reconnect_delay, Duration::from_secs(3));
        assert_eq!(client.max_reconnect_attempts, 4);
    }

    #[test]
    fn test_output_writer_respects_json_toggle() {
        let config = Config::default();
        assert_eq!(
            config.output_writer().json_path(),
            Some(Path::new(DEFAULT_JSON_OUTPUT))
        );

        let config = Config {
            json_enabled: false,
            ..Default::default()
        };
        assert!(config.output_writer().json_path().is_none());
    }

    #[test]
    fn test_field_formats() {
        let config = Config {
            wind_dir_precision: 0,
            ..Default::default()
        };
        assert_eq!(config.field_formats().wind_dir.spec(), "{:.0f}");
        assert_eq!(config.field_formats().pressure.spec(), "{:.2f}");
    }

    #[test]
    fn test_validate_errors() {
        let invalid = [
            Config {
                port: 0,
                ..Default::default()
            },
            Config {
                topic: String::new(),
                ..Default::default()
            },
            Config {
                client_id: String::new(),
                ..Default::default()
            },
            Config {
                password: Some("secret".to_string()),
                ..Default::default()
            },
            Config {
                wind_dir_precision: 7,
                ..Default::default()
            },
            Config {
                text_output: PathBuf::new(),
                ..Default::default()
            },
        ];

        for config in invalid {
            assert!(config.validate().is_err(), "Should reject {:?}", config);
        }
    }

    #[test]
    fn test_invalid_toml_type() {
        let toml = r#"port = "not a number""#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let path = std::env::temp_dir().join("weewx-wx-no-such-config.toml");
        assert!(Config::load_from(&path).is_err());
    }
}
