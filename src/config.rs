use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub listen_addr: String,
    pub command_log: Option<PathBuf>,
    pub flow: FlowConfig,
    pub hosts: HostConfig,
    pub telemetry: TelemetryConfig,
    pub log_rate_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub icmp_rule_priority: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub movement_cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub collector_url: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub probe_interval_secs: u64,
    pub startup_delay_secs: u64,
    pub queue_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:6653".to_string(),
            command_log: None,
            flow: FlowConfig::default(),
            hosts: HostConfig::default(),
            telemetry: TelemetryConfig::default(),
            log_rate_interval_secs: 5,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            idle_timeout: 10,
            hard_timeout: 30,
            priority: 32768,       // OpenFlow default priority
            icmp_rule_priority: 65535,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            movement_cooldown_secs: 5,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collector_url: "http://127.0.0.1:8000/path-data".to_string(),
            max_retries: 3,
            retry_delay_ms: 1000,
            request_timeout_ms: 2000,
            probe_interval_secs: 5,
            startup_delay_secs: 10,
            queue_capacity: 256,
        }
    }
}

impl ControllerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ControllerConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn log_rate_interval(&self) -> Duration {
        Duration::from_secs(self.log_rate_interval_secs)
    }
}

impl HostConfig {
    pub fn movement_cooldown(&self) -> Duration {
        Duration::from_secs(self.movement_cooldown_secs)
    }
}

impl TelemetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("controller.json");
        fs::write(&path, r#"{ "telemetry": { "max_retries": 5 } }"#).unwrap();

        let config = ControllerConfig::load(&path).unwrap();
        assert_eq!(config.telemetry.max_retries, 5);
        assert_eq!(config.telemetry.retry_delay_ms, 1000);
        assert_eq!(config.flow.idle_timeout, 10);
        assert_eq!(config.flow.hard_timeout, 30);
        assert_eq!(config.listen_addr, "127.0.0.1:6653");
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("controller.json");
        let mut config = ControllerConfig::default();
        config.telemetry.collector_url = "http://collector:9000/path-data".to_string();
        config.save(&path).unwrap();

        let loaded = ControllerConfig::load(&path).unwrap();
        assert_eq!(loaded.telemetry.collector_url, "http://collector:9000/path-data");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ControllerConfig::load("/nonexistent/controller.json").is_err());
    }
}
