//! Telemetry buffer and latest-value registers
//!
//! Inbound telemetry arrives on six channels. Every channel keeps its most
//! recent value; grid export and PV input additionally keep a bounded FIFO
//! window whose arithmetic mean smooths the regulation inputs.
//!
//! The store is shared between the transport's ingest path and the
//! regulation tick. All state sits behind a single mutex that is only held
//! for one push or one read, so ingest never waits on the regulator and a
//! window is never observed half-appended.

use crate::config::TopicsConfig;
use crate::connection::ConnectionState;
use crate::error::{Result, VoltaicError};
use crate::logging::{StructuredLogger, get_logger};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Default rolling window length for averaged channels
pub const DEFAULT_WINDOW_CAPACITY: usize = 10;

/// Telemetry channels consumed by the regulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryChannel {
    /// Net power at the grid connection point in W; negative = export
    GridExport,
    /// PV inverter input power in W
    PvInput,
    /// Battery state of charge in percent
    BatterySoc,
    /// Battery power in W; positive = charging, negative = discharging
    BatteryPower,
    /// Wallbox connection/readiness code
    WallboxState,
    /// Wallbox reported consumption
    WallboxConsumption,
}

impl TelemetryChannel {
    pub const ALL: [TelemetryChannel; 6] = [
        TelemetryChannel::GridExport,
        TelemetryChannel::PvInput,
        TelemetryChannel::BatterySoc,
        TelemetryChannel::BatteryPower,
        TelemetryChannel::WallboxState,
        TelemetryChannel::WallboxConsumption,
    ];

    /// Whether the channel keeps a rolling window
    pub fn is_windowed(self) -> bool {
        matches!(self, TelemetryChannel::GridExport | TelemetryChannel::PvInput)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TelemetryChannel::GridExport => "grid_export",
            TelemetryChannel::PvInput => "pv_input",
            TelemetryChannel::BatterySoc => "battery_soc",
            TelemetryChannel::BatteryPower => "battery_power",
            TelemetryChannel::WallboxState => "wallbox_state",
            TelemetryChannel::WallboxConsumption => "wallbox_consumption",
        }
    }

    /// Topic carrying this channel
    pub fn topic(self, topics: &TopicsConfig) -> &str {
        match self {
            TelemetryChannel::GridExport => &topics.grid_export,
            TelemetryChannel::PvInput => &topics.pv_input,
            TelemetryChannel::BatterySoc => &topics.battery_soc,
            TelemetryChannel::BatteryPower => &topics.battery_power,
            TelemetryChannel::WallboxState => &topics.wallbox_state,
            TelemetryChannel::WallboxConsumption => &topics.wallbox_consumption,
        }
    }
}

impl std::fmt::Display for TelemetryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded FIFO of samples in arrival order
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Arithmetic mean, `0.0` when empty
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples oldest first
    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}

/// Point-in-time copy of every register and window statistic
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub grid_export_w: f64,
    pub grid_export_avg_w: f64,
    pub grid_export_samples: usize,
    pub pv_input_w: f64,
    pub pv_input_avg_w: f64,
    pub pv_input_samples: usize,
    pub battery_soc: f64,
    pub battery_power_w: f64,
    pub wallbox_state: i64,
    pub wallbox_consumption: f64,
}

#[derive(Debug)]
struct StoreInner {
    latest: HashMap<TelemetryChannel, f64>,
    grid_export: RollingWindow,
    pv_input: RollingWindow,
}

impl StoreInner {
    fn window(&self, channel: TelemetryChannel) -> Option<&RollingWindow> {
        match channel {
            TelemetryChannel::GridExport => Some(&self.grid_export),
            TelemetryChannel::PvInput => Some(&self.pv_input),
            _ => None,
        }
    }

    fn window_mut(&mut self, channel: TelemetryChannel) -> Option<&mut RollingWindow> {
        match channel {
            TelemetryChannel::GridExport => Some(&mut self.grid_export),
            TelemetryChannel::PvInput => Some(&mut self.pv_input),
            _ => None,
        }
    }
}

/// Shared telemetry registers, written by ingest and read by the regulator
#[derive(Debug)]
pub struct TelemetryStore {
    inner: Mutex<StoreInner>,
    topics: HashMap<String, TelemetryChannel>,
    logger: StructuredLogger,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl TelemetryStore {
    /// Create an empty store without topic routing
    pub fn new(window_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                latest: HashMap::new(),
                grid_export: RollingWindow::new(window_capacity),
                pv_input: RollingWindow::new(window_capacity),
            }),
            topics: HashMap::new(),
            logger: get_logger("telemetry"),
        }
    }

    /// Create a store that routes the configured topics to their channels
    pub fn with_topics(window_capacity: usize, topics: &TopicsConfig) -> Self {
        let mut store = Self::new(window_capacity);
        store.topics = TelemetryChannel::ALL
            .iter()
            .map(|channel| (channel.topic(topics).to_string(), *channel))
            .collect();
        store
    }

    /// Subscribed topics
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Channel routed from a topic, if any
    pub fn channel_for_topic(&self, topic: &str) -> Option<TelemetryChannel> {
        self.topics.get(topic).copied()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panicked writer leaves plain numbers behind; keep serving them
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a numeric sample: overwrite the register, append to the window
    pub fn record(&self, channel: TelemetryChannel, value: f64) {
        let mut inner = self.lock();
        inner.latest.insert(channel, value);
        if let Some(window) = inner.window_mut(channel) {
            window.push(value);
        }
    }

    /// Parse a text payload and record it. Malformed payloads are logged and
    /// leave the previous value untouched.
    pub fn record_payload(&self, channel: TelemetryChannel, payload: &str) -> Result<f64> {
        let value = match parse_payload(channel, payload) {
            Ok(v) => v,
            Err(e) => {
                self.logger.error(&format!(
                    "Dropping {} payload '{}': {}",
                    channel,
                    payload.trim(),
                    e
                ));
                return Err(e);
            }
        };

        if channel == TelemetryChannel::WallboxState {
            self.log_wallbox_state(value as i64);
        }

        self.record(channel, value);
        self.logger
            .debug(&format!("New {} value received: {}", channel, value));
        Ok(value)
    }

    /// Route a raw transport message to its channel
    pub fn ingest(&self, topic: &str, payload: &[u8]) -> Result<f64> {
        let Some(channel) = self.channel_for_topic(topic) else {
            self.logger
                .debug(&format!("Ignoring message on unrouted topic {}", topic));
            return Err(VoltaicError::telemetry(format!("Unrouted topic {}", topic)));
        };

        let text = match std::str::from_utf8(payload) {
            Ok(t) => t,
            Err(e) => {
                self.logger
                    .error(&format!("Dropping non UTF-8 payload on {}: {}", topic, e));
                return Err(VoltaicError::telemetry(format!("Invalid UTF-8: {}", e)));
            }
        };

        self.record_payload(channel, text)
    }

    fn log_wallbox_state(&self, code: i64) {
        let previous = self.connection_code();
        if previous == code {
            self.logger
                .debug(&format!("Wallbox state still: {}", code));
            return;
        }
        let state = ConnectionState::from_code(code);
        let message = format!("New wallbox state {}: {}", code, state.description());
        if state.is_known() {
            self.logger.info(&message);
        } else {
            self.logger.error(&message);
        }
    }

    /// Most recent value of a channel, `0.0` before the first sample
    pub fn latest(&self, channel: TelemetryChannel) -> f64 {
        self.lock().latest.get(&channel).copied().unwrap_or(0.0)
    }

    /// Window mean; `0.0` for empty windows and non-windowed channels
    pub fn average(&self, channel: TelemetryChannel) -> f64 {
        self.lock()
            .window(channel)
            .map(RollingWindow::average)
            .unwrap_or(0.0)
    }

    /// Current window length; `0` for non-windowed channels
    pub fn sample_count(&self, channel: TelemetryChannel) -> usize {
        self.lock().window(channel).map(RollingWindow::len).unwrap_or(0)
    }

    /// Window contents oldest first
    pub fn window_samples(&self, channel: TelemetryChannel) -> Vec<f64> {
        self.lock()
            .window(channel)
            .map(RollingWindow::samples)
            .unwrap_or_default()
    }

    /// Latest wallbox connection code, `0` (unknown) before the first message
    pub fn connection_code(&self) -> i64 {
        self.latest(TelemetryChannel::WallboxState) as i64
    }

    /// Consistent copy of everything, taken under one lock
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let inner = self.lock();
        let latest =
            |channel: TelemetryChannel| inner.latest.get(&channel).copied().unwrap_or(0.0);
        TelemetrySnapshot {
            grid_export_w: latest(TelemetryChannel::GridExport),
            grid_export_avg_w: inner.grid_export.average(),
            grid_export_samples: inner.grid_export.len(),
            pv_input_w: latest(TelemetryChannel::PvInput),
            pv_input_avg_w: inner.pv_input.average(),
            pv_input_samples: inner.pv_input.len(),
            battery_soc: latest(TelemetryChannel::BatterySoc),
            battery_power_w: latest(TelemetryChannel::BatteryPower),
            wallbox_state: latest(TelemetryChannel::WallboxState) as i64,
            wallbox_consumption: latest(TelemetryChannel::WallboxConsumption),
        }
    }
}

/// Largest power or percentage reading accepted from the bus (1 GW)
pub const MAX_READING_MAGNITUDE: f64 = 1.0e9;

/// Decode a decimal payload. The wallbox state channel only accepts integers.
pub fn parse_payload(channel: TelemetryChannel, payload: &str) -> Result<f64> {
    let text = payload.trim();
    if channel == TelemetryChannel::WallboxState {
        return text
            .parse::<i64>()
            .map(|code| code as f64)
            .map_err(|e| VoltaicError::telemetry(format!("Invalid wallbox state: {}", e)));
    }

    let value = text
        .parse::<f64>()
        .map_err(|e| VoltaicError::telemetry(format!("Invalid number: {}", e)))?;
    if !value.is_finite() {
        return Err(VoltaicError::telemetry("Value is not finite"));
    }
    // Bounded samples keep window sums finite
    if value.abs() > MAX_READING_MAGNITUDE {
        return Err(VoltaicError::telemetry(format!(
            "Value {} out of range",
            value
        )));
    }
    Ok(value)
}
