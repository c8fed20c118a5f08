//! Configuration management for Voltaic
//!
//! This module handles loading, validation, and management of the regulator
//! configuration from YAML files. The config path can be overridden through
//! the `VOLTAIC_CONFIG` environment variable.

use crate::error::{Result, VoltaicError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// MQTT broker connection
    pub mqtt: MqttConfig,

    /// Telemetry and command topics
    pub topics: TopicsConfig,

    /// Home Assistant mode selector
    pub home_assistant: HomeAssistantConfig,

    /// Regulation thresholds and timings
    pub regulation: RegulationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Status API binding
    pub web: WebConfig,
}

/// MQTT broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name or IP address
    pub host: String,

    /// Broker TCP port (typically 1883)
    pub port: u16,

    /// Client identifier presented to the broker
    pub client_id: String,

    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,

    /// Optional broker credentials
    pub username: Option<String>,
    pub password: Option<String>,

    /// First reconnect delay after a connection error
    pub reconnect_initial_ms: u64,

    /// Upper bound for the exponential reconnect delay
    pub reconnect_max_ms: u64,
}

/// Topic names, one per telemetry channel plus the set-point command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Grid meter net power; negative means export
    pub grid_export: String,

    /// PV inverter input power
    pub pv_input: String,

    /// Home battery state of charge in percent
    pub battery_soc: String,

    /// Home battery charge (+) / discharge (-) power
    pub battery_power: String,

    /// Wallbox connection/readiness code
    pub wallbox_state: String,

    /// Wallbox reported consumption
    pub wallbox_consumption: String,

    /// Retained max-current command
    pub set_current: String,
}

/// Labels used by the external mode selector, one per operating mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeLabelsConfig {
    pub off: String,
    pub max_charge: String,
    pub min_charge: String,
    pub protect_battery: String,
    pub pv_prefer_battery: String,
    pub pv_prefer_charge: String,
}

/// Home Assistant REST configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    /// Base URL, e.g. `http://homeassistant.local:8123`. Empty disables the
    /// REST selector and keeps the static `fallback_label`.
    pub base_url: String,

    /// Long-lived access token
    pub token: String,

    /// `input_select` entity holding the charge mode
    pub mode_entity: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Label used when no REST selector is configured
    pub fallback_label: String,

    /// Mode labels as shown by the selector
    pub mode_labels: ModeLabelsConfig,
}

/// Regulation thresholds, limits and timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegulationConfig {
    /// Lowest non-zero set point accepted by the wallbox
    pub min_current: i32,

    /// Highest set point
    pub max_current: i32,

    /// Conversion factor between watts and amps
    pub volts_per_phase: f64,

    /// PV samples required before PV modes act
    pub pv_warmup_samples: usize,

    /// Average PV input above which charging from PV is considered
    pub pv_surplus_threshold_w: f64,

    /// Battery SoC strictly above which the battery gives up priority
    pub battery_full_soc: f64,

    /// Battery SoC below which an active session is stopped again
    pub battery_resume_soc: f64,

    /// Export (or battery charge power) needed to start a session
    pub start_export_threshold_w: f64,

    /// Export beyond which the set point is raised by one amp
    pub ramp_up_export_w: f64,

    /// Battery charge power beyond which prefer-charge raises the set point
    pub ramp_up_battery_w: f64,

    /// Grid import beyond which the set point is lowered
    pub ramp_down_import_w: f64,

    /// Protect-battery mode only charges at or below this SoC
    pub protect_battery_max_soc: f64,

    /// Protect-battery mode only charges when battery power magnitude is at
    /// or below this value
    pub protect_battery_max_power_w: f64,

    /// Wait after fixed modes and skipped ticks
    pub idle_interval_secs: u64,

    /// Wait after PV ticks and during warm-up
    pub pv_interval_secs: u64,

    /// Settle period after startup before the first tick
    pub settle_secs: u64,

    /// Upper bound for confirmation waits
    pub confirm_timeout_secs: u64,

    /// Polling interval inside confirmation waits
    pub confirm_poll_interval_secs: u64,

    /// Block after a start until the wallbox reports charging
    pub await_charging_start: bool,

    /// Block after a ramp until the reported consumption changes
    pub await_ramp_feedback: bool,

    /// Rolling window length for averaged channels
    pub window_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (DEBUG, INFO, WARNING, ERROR)
    pub level: String,

    /// Path to log file; its directory receives the daily rotated files
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Serve the read-only status API
    pub enabled: bool,

    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first existing default location
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("VOLTAIC_CONFIG")
            && !path.is_empty()
        {
            return Self::from_file(path);
        }

        let default_paths = [
            "voltaic.yaml",
            "/data/voltaic.yaml",
            "/etc/voltaic/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.is_empty() {
            return Err(VoltaicError::validation(
                "mqtt.host",
                "Host cannot be empty",
            ));
        }

        if self.mqtt.port == 0 {
            return Err(VoltaicError::validation(
                "mqtt.port",
                "Port must be greater than 0",
            ));
        }

        if self.mqtt.reconnect_initial_ms == 0
            || self.mqtt.reconnect_initial_ms > self.mqtt.reconnect_max_ms
        {
            return Err(VoltaicError::validation(
                "mqtt.reconnect_initial_ms",
                "Must be positive and not exceed reconnect_max_ms",
            ));
        }

        self.topics.validate()?;
        self.home_assistant.mode_labels.validate()?;
        self.regulation.validate()?;
        Ok(())
    }
}

impl TopicsConfig {
    /// All topics with their config field names
    pub fn entries(&self) -> [(&'static str, &str); 7] {
        [
            ("topics.grid_export", self.grid_export.as_str()),
            ("topics.pv_input", self.pv_input.as_str()),
            ("topics.battery_soc", self.battery_soc.as_str()),
            ("topics.battery_power", self.battery_power.as_str()),
            ("topics.wallbox_state", self.wallbox_state.as_str()),
            ("topics.wallbox_consumption", self.wallbox_consumption.as_str()),
            ("topics.set_current", self.set_current.as_str()),
        ]
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (field, topic) in self.entries() {
            if topic.is_empty() {
                return Err(VoltaicError::validation(field, "Topic cannot be empty"));
            }
            if !seen.insert(topic) {
                return Err(VoltaicError::validation(field, "Topic is used twice"));
            }
        }
        Ok(())
    }
}

impl ModeLabelsConfig {
    fn validate(&self) -> Result<()> {
        let labels = [
            &self.off,
            &self.max_charge,
            &self.min_charge,
            &self.protect_battery,
            &self.pv_prefer_battery,
            &self.pv_prefer_charge,
        ];
        let mut seen = HashSet::new();
        for label in labels {
            if label.trim().is_empty() {
                return Err(VoltaicError::validation(
                    "home_assistant.mode_labels",
                    "Labels cannot be empty",
                ));
            }
            if !seen.insert(label.as_str()) {
                return Err(VoltaicError::validation(
                    "home_assistant.mode_labels",
                    "Labels must be unique",
                ));
            }
        }
        Ok(())
    }
}

impl RegulationConfig {
    fn validate(&self) -> Result<()> {
        if self.min_current <= 0 {
            return Err(VoltaicError::validation(
                "regulation.min_current",
                "Must be positive",
            ));
        }

        if self.min_current >= self.max_current {
            return Err(VoltaicError::validation(
                "regulation.max_current",
                "Must be greater than min_current",
            ));
        }

        if self.volts_per_phase <= 0.0 {
            return Err(VoltaicError::validation(
                "regulation.volts_per_phase",
                "Must be positive",
            ));
        }

        if self.window_capacity == 0 {
            return Err(VoltaicError::validation(
                "regulation.window_capacity",
                "Must be greater than 0",
            ));
        }

        if self.pv_warmup_samples > self.window_capacity {
            return Err(VoltaicError::validation(
                "regulation.pv_warmup_samples",
                "Cannot exceed window_capacity",
            ));
        }

        if self.idle_interval_secs == 0 || self.pv_interval_secs == 0 {
            return Err(VoltaicError::validation(
                "regulation.idle_interval_secs",
                "Tick intervals must be greater than 0",
            ));
        }

        if self.confirm_poll_interval_secs == 0
            || self.confirm_poll_interval_secs > self.confirm_timeout_secs
        {
            return Err(VoltaicError::validation(
                "regulation.confirm_poll_interval_secs",
                "Must be positive and not exceed confirm_timeout_secs",
            ));
        }

        Ok(())
    }
}
