use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub influx: InfluxConfig,
    pub model: ModelConfig,
    pub relay: RelayConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_qos")]
    pub qos: u8,
    pub keep_alive_secs: Option<u64>,
    pub clean_session: Option<bool>,
}

fn default_qos() -> u8 {
    0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// Base URL of the InfluxDB v2 instance (e.g., "http://localhost:8086")
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    #[serde(default = "default_measurement")]
    pub measurement: String,
    /// Readings buffered before a flush is forced.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum time a buffered reading waits before being flushed.
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,
}

fn default_measurement() -> String {
    "solar_power".into()
}

fn default_batch_size() -> usize {
    50
}

fn default_linger_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the JSON artifact holding the hourly output curve.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Identity recorded as the `device` tag on every reading. The wire
    /// payload is a bare number and carries no identity of its own.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Readings above this are treated as sensor glitches and dropped.
    #[serde(default = "default_max_power_kw")]
    pub max_power_kw: f64,
}

fn default_device_id() -> String {
    "ESP32".into()
}

fn default_max_power_kw() -> f64 {
    25.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Load configuration from a YAML file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        // Expand environment variables in the format $(VAR_NAME)
        let expanded = expand_env_vars(&content);

        let config: Config = serde_yaml::from_str(&expanded)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.mqtt.host.is_empty() {
            return Err(AppError::Config("MQTT host cannot be empty".to_string()));
        }

        if self.mqtt.topic.is_empty() {
            return Err(AppError::Config("MQTT topic cannot be empty".to_string()));
        }

        if self.influx.url.is_empty() {
            return Err(AppError::Config(
                "InfluxDB URL cannot be empty".to_string(),
            ));
        }

        if self.influx.org.is_empty() || self.influx.bucket.is_empty() {
            return Err(AppError::Config(
                "InfluxDB org and bucket cannot be empty".to_string(),
            ));
        }

        if self.influx.batch_size == 0 {
            return Err(AppError::Config(
                "InfluxDB batch_size must be at least 1".to_string(),
            ));
        }

        if self.model.path.is_empty() {
            return Err(AppError::Config("Model path cannot be empty".to_string()));
        }

        if !self.relay.max_power_kw.is_finite() || self.relay.max_power_kw <= 0.0 {
            return Err(AppError::Config(
                "relay max_power_kw must be a positive number".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }

        Ok(())
    }
}

/// Expand environment variables in the format $(VAR_NAME)
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    let re = regex::Regex::new(r"\$\(([A-Z_][A-Z0-9_]*)\)").unwrap();

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let var_name = &cap[1];

        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("RELAY_TEST_VAR", "test_value");

        let input = "token: $(RELAY_TEST_VAR)";
        let output = expand_env_vars(input);

        assert_eq!(output, "token: test_value");

        std::env::remove_var("RELAY_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_not_found() {
        let input = "token: $(RELAY_NONEXISTENT_VAR)";
        let output = expand_env_vars(input);

        // Should leave it unchanged if not found
        assert_eq!(output, "token: $(RELAY_NONEXISTENT_VAR)");
    }

    fn base_config() -> Config {
        Config {
            mqtt: MqttConfig {
                host: "broker.hivemq.com".into(),
                port: 1883,
                topic: "solar/power".into(),
                username: None,
                password: None,
                qos: default_qos(),
                keep_alive_secs: None,
                clean_session: None,
            },
            influx: InfluxConfig {
                url: "http://localhost:8086".into(),
                token: "my-token".into(),
                org: "my-org".into(),
                bucket: "solar_data".into(),
                measurement: default_measurement(),
                batch_size: default_batch_size(),
                linger_ms: default_linger_ms(),
            },
            model: ModelConfig {
                path: "model/solar_power_model.json".into(),
            },
            relay: RelayConfig {
                device_id: default_device_id(),
                max_power_kw: default_max_power_kw(),
            },
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 3001,
            },
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_topic() {
        let mut cfg = base_config();
        cfg.mqtt.topic = String::new();
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut cfg = base_config();
        cfg.server.port = 0;
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_nonpositive_max_power() {
        let mut cfg = base_config();
        cfg.relay.max_power_kw = 0.0;
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));

        cfg.relay.max_power_kw = f64::NAN;
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));
    }
}
