#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use voltaic::actuator::{Actuator, Clock};
use voltaic::config::Config;
use voltaic::regulator::Regulator;
use voltaic::selector::StaticSelector;
use voltaic::telemetry::{TelemetryChannel, TelemetryStore};

/// Simulated time: every sleep advances the clock instantly
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
    stop_after: Mutex<Option<(usize, Arc<Notify>)>>,
}

impl ManualClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Fire `notify` once `count` sleeps have been requested
    pub fn notify_after(&self, count: usize, notify: Arc<Notify>) {
        *self.stop_after.lock().unwrap() = Some((count, notify));
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
        let count = {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            sleeps.len()
        };
        if let Some((limit, notify)) = self.stop_after.lock().unwrap().as_ref()
            && count >= *limit
        {
            notify.notify_one();
        }
        tokio::task::yield_now().await;
    }
}

/// Records every published set point
#[derive(Default)]
pub struct RecordingActuator {
    pub sent: Mutex<Vec<i32>>,
    pub disconnects: Mutex<usize>,
}

impl RecordingActuator {
    pub fn sent(&self) -> Vec<i32> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn publish_setpoint(&self, amps: i32) -> voltaic::Result<()> {
        self.sent.lock().unwrap().push(amps);
        Ok(())
    }

    async fn disconnect(&self) -> voltaic::Result<()> {
        *self.disconnects.lock().unwrap() += 1;
        Ok(())
    }
}

pub struct Harness {
    pub regulator: Regulator,
    pub telemetry: Arc<TelemetryStore>,
    pub actuator: Arc<RecordingActuator>,
    pub selector: Arc<StaticSelector>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(label: &str) -> Self {
        Self::with_config(label, Config::default())
    }

    pub fn with_config(label: &str, config: Config) -> Self {
        let telemetry = Arc::new(TelemetryStore::with_topics(
            config.regulation.window_capacity,
            &config.topics,
        ));
        let actuator = Arc::new(RecordingActuator::default());
        let selector = Arc::new(StaticSelector::new(label));
        let clock = Arc::new(ManualClock::default());
        let regulator = Regulator::new(
            &config,
            selector.clone(),
            telemetry.clone(),
            actuator.clone(),
            clock.clone(),
        );
        Self {
            regulator,
            telemetry,
            actuator,
            selector,
            clock,
        }
    }

    pub fn record(&self, channel: TelemetryChannel, value: f64) {
        self.telemetry.record(channel, value);
    }

    pub fn fill(&self, channel: TelemetryChannel, value: f64, samples: usize) {
        for _ in 0..samples {
            self.telemetry.record(channel, value);
        }
    }
}
