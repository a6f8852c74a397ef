//! Monitor configuration: YAML file + environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub mqtt: MqttConf,
    pub dashboard: DashboardConf,
    pub http: HttpConf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Appends a random suffix to `client_id` so that two dashboards never
    /// take over each other's broker session.
    pub unique_client_id: bool,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Subscription filter, MQTT wildcards allowed
    pub topic: String,
    pub tls: bool,
    /// PEM bundle; platform roots are used when absent
    pub ca_file: Option<PathBuf>,
    pub keep_alive_secs: u64,
    pub reconnect_delay_secs: u64,
    /// Retries after the first failure: `Some(2)` gives up on the third
    /// consecutive failure. `None` retries forever.
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConf {
    pub history_capacity: usize,
    pub refresh_interval_secs: u64,
    /// Drain the queue a second time at the end of each cycle
    pub late_drain: bool,
    pub recent_rows: usize,
    pub export_dir: PathBuf,
    /// Print the text dashboard on every cycle
    pub terminal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConf {
    pub enabled: bool,
    pub bind: String,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "sensor-monitor".into(),
            unique_client_id: true,
            username: None,
            password: None,
            topic: "iot/ml/monitor/data".into(),
            tls: false,
            ca_file: None,
            keep_alive_secs: 60,
            reconnect_delay_secs: 5,
            max_retries: None,
        }
    }
}

impl Default for DashboardConf {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            refresh_interval_secs: 2,
            late_drain: true,
            recent_rows: 20,
            export_dir: PathBuf::from("./exports"),
            terminal: true,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:8080".into(),
        }
    }
}

impl MqttConf {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl DashboardConf {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl MonitorConfig {
    pub fn from_yaml_str(txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(txt)?)
    }

    /// Applies `MQTT_*` overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            self.mqtt.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "MQTT_PORT",
                reason: format!("`{port}` is not a port number"),
            })?;
        }
        if let Some(user) = lookup("MQTT_USERNAME") {
            self.mqtt.username = Some(user);
        }
        if let Some(pass) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = Some(pass);
        }
        if let Some(topic) = lookup("MQTT_TOPIC") {
            self.mqtt.topic = topic;
        }
        if let Some(id) = lookup("MQTT_CLIENT_ID") {
            self.mqtt.client_id = id;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key, reason: &str| ConfigError::Invalid { key, reason: reason.into() };

        if self.mqtt.host.trim().is_empty() {
            return Err(invalid("mqtt.host", "must not be empty"));
        }
        if self.mqtt.port == 0 {
            return Err(invalid("mqtt.port", "must not be 0"));
        }
        if self.mqtt.topic.trim().is_empty() {
            return Err(invalid("mqtt.topic", "must not be empty"));
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err(invalid("mqtt.client_id", "must not be empty"));
        }
        if self.mqtt.keep_alive_secs < 5 {
            return Err(invalid("mqtt.keep_alive_secs", "must be at least 5"));
        }
        if self.mqtt.reconnect_delay_secs == 0 {
            return Err(invalid("mqtt.reconnect_delay_secs", "must be at least 1"));
        }
        if self.dashboard.history_capacity == 0 {
            return Err(invalid("dashboard.history_capacity", "must be at least 1"));
        }
        if self.dashboard.refresh_interval_secs == 0 {
            return Err(invalid("dashboard.refresh_interval_secs", "must be at least 1"));
        }
        Ok(())
    }
}

/// Loads the configuration from `SENSOR_MONITOR_CONFIG` (default `monitor.yaml`),
/// falling back to defaults when the file does not exist.
pub async fn load_config() -> Result<MonitorConfig, ConfigError> {
    let path = std::env::var("SENSOR_MONITOR_CONFIG").unwrap_or_else(|_| "monitor.yaml".into());
    let mut cfg = load_config_from(Path::new(&path)).await?;
    cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config_from(path: &Path) -> Result<MonitorConfig, ConfigError> {
    if !path.exists() {
        warn!(path = %path.display(), "no config file, using defaults");
        return Ok(MonitorConfig::default());
    }
    let txt = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), "loaded config");
    MonitorConfig::from_yaml_str(&txt)
}
