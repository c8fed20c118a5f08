//! The regulation tick and its run loop
//!
//! One tick reads the selector label, resolves the operating mode, passes the
//! connection gate and then hands over to either the fixed-mode dispatcher or
//! the PV regulator. The tick returns how long to wait before the next one;
//! ticks never overlap. After every tick a [`StatusSnapshot`] is published on
//! a watch channel for read-only consumers.

use crate::actuator::{Actuator, ActuatorGateway, Clock};
use crate::config::{Config, RegulationConfig};
use crate::connection::{self, ConnectionState, GateDecision, SkipReason};
use crate::controls::{ControllerState, FixedModeDispatcher, PvInputs, PvOutcome, PvRegulator};
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::mode::{ModeResolver, OperatingMode};
use crate::selector::ModeSelector;
use crate::telemetry::{TelemetryChannel, TelemetrySnapshot, TelemetryStore};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Read-only view of the regulator after its last tick
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub timestamp: String,
    pub version: String,
    pub mode: OperatingMode,
    pub connection_code: i64,
    pub connection: String,
    pub state: ControllerState,
    pub last_setpoint: Option<i32>,
    pub telemetry: TelemetrySnapshot,
    pub mqtt_connected: bool,
    pub ticks: u64,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("APP_VERSION").to_string(),
            mode: OperatingMode::Off,
            connection_code: 0,
            connection: ConnectionState::Unknown.description().to_string(),
            state: ControllerState::default(),
            last_setpoint: None,
            telemetry: TelemetrySnapshot::default(),
            mqtt_connected: false,
            ticks: 0,
        }
    }
}

pub struct Regulator {
    config: RegulationConfig,
    resolver: ModeResolver,
    selector: Arc<dyn ModeSelector>,
    telemetry: Arc<TelemetryStore>,
    gateway: ActuatorGateway,
    clock: Arc<dyn Clock>,
    fixed: FixedModeDispatcher,
    pv: PvRegulator,
    state: ControllerState,
    mode: OperatingMode,
    ticks: u64,
    link_up: Option<Arc<AtomicBool>>,
    status_tx: watch::Sender<Arc<StatusSnapshot>>,
    logger: StructuredLogger,
}

impl Regulator {
    pub fn new(
        config: &Config,
        selector: Arc<dyn ModeSelector>,
        telemetry: Arc<TelemetryStore>,
        actuator: Arc<dyn Actuator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let regulation = config.regulation.clone();
        let gateway = ActuatorGateway::new(
            actuator,
            telemetry.clone(),
            clock.clone(),
            Duration::from_secs(regulation.confirm_poll_interval_secs),
        );
        let (status_tx, _) = watch::channel(Arc::new(StatusSnapshot::default()));

        Self {
            resolver: ModeResolver::new(&config.home_assistant.mode_labels),
            fixed: FixedModeDispatcher::new(&regulation),
            pv: PvRegulator::new(&regulation),
            config: regulation,
            selector,
            telemetry,
            gateway,
            clock,
            state: ControllerState::default(),
            mode: OperatingMode::Off,
            ticks: 0,
            link_up: None,
            status_tx,
            logger: get_logger("regulator"),
        }
    }

    /// Report transport connectivity in status snapshots
    pub fn with_link_status(mut self, flag: Arc<AtomicBool>) -> Self {
        self.link_up = Some(flag);
        self
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Arc<StatusSnapshot>> {
        self.status_tx.subscribe()
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn last_setpoint(&self) -> Option<i32> {
        self.gateway.last_sent()
    }

    /// Zero the set point, settle, then tick until `shutdown` resolves
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        self.logger
            .info("------------ Wallbox regulator started ------------");
        self.gateway.set_current(0).await;
        self.publish_status();

        let settle = Duration::from_secs(self.config.settle_secs);
        let clock = self.clock.clone();
        tokio::select! {
            _ = clock.sleep(settle) => {}
            _ = &mut shutdown => {
                self.logger.info("Shutdown requested during startup");
                return Ok(());
            }
        }

        loop {
            let stop = tokio::select! {
                _ = self.cycle() => false,
                _ = &mut shutdown => true,
            };
            if stop {
                self.logger.info("Shutdown signal received");
                break;
            }
        }
        Ok(())
    }

    async fn cycle(&mut self) {
        let delay = self.tick().await;
        if !delay.is_zero() {
            self.clock.sleep(delay).await;
        }
    }

    /// Run one regulation tick and return the wait before the next one
    pub async fn tick(&mut self) -> Duration {
        self.ticks = self.ticks.saturating_add(1);
        let delay = self.evaluate().await;
        self.publish_status();
        delay
    }

    async fn evaluate(&mut self) -> Duration {
        let idle = Duration::from_secs(self.config.idle_interval_secs);
        let pv_wait = Duration::from_secs(self.config.pv_interval_secs);

        let mode = self.read_mode().await;
        let logger = self.logger.for_mode(mode.as_str());

        let code = self.telemetry.connection_code();
        match connection::evaluate(code) {
            GateDecision::Skip(reason) => {
                let state = ConnectionState::from_code(code);
                match reason {
                    SkipReason::NoVehicle => logger.info(&format!(
                        "Wallbox state {} ({}), not charging",
                        code,
                        state.description()
                    )),
                    SkipReason::Fault => logger.error(&format!(
                        "Wallbox state {} ({}), not charging",
                        code,
                        state.description()
                    )),
                }
                self.state.stop();
                self.gateway.set_current(0).await;
                return idle;
            }
            GateDecision::Continue { clear_charging } => {
                if clear_charging {
                    logger.debug("Vehicle connected without charge request");
                    self.state.charging_active = false;
                }
            }
        }

        let soc = self.telemetry.latest(TelemetryChannel::BatterySoc);
        let battery = self.telemetry.latest(TelemetryChannel::BatteryPower);
        if let Some(amps) = self.fixed.dispatch(mode, &mut self.state, soc, battery) {
            self.gateway.set_current(amps).await;
            return idle;
        }

        let inputs = PvInputs::from_store(&self.telemetry);
        match self.pv.evaluate(mode, &mut self.state, &inputs) {
            PvOutcome::WarmingUp | PvOutcome::Idle | PvOutcome::Keep { .. } => pv_wait,
            PvOutcome::InsufficientPv | PvOutcome::BatteryDropout => {
                self.gateway.set_current(0).await;
                pv_wait
            }
            PvOutcome::Start { amps } => {
                self.gateway.set_current(amps).await;
                if self.config.await_charging_start {
                    self.gateway
                        .await_charging_started(self.confirm_timeout())
                        .await;
                }
                Duration::ZERO
            }
            PvOutcome::SwitchMode(target) => {
                let label = self.resolver.label_for(target).to_string();
                if let Err(e) = self.selector.set_mode(&label).await {
                    logger.error(&format!("Failed to switch mode to '{}': {}", label, e));
                }
                pv_wait
            }
            PvOutcome::Adjust { to, .. } => {
                let previous = self.telemetry.latest(TelemetryChannel::WallboxConsumption);
                self.gateway.set_current(to).await;
                if self.config.await_ramp_feedback {
                    self.gateway
                        .await_consumption_change(previous, self.confirm_timeout())
                        .await;
                }
                pv_wait
            }
        }
    }

    async fn read_mode(&mut self) -> OperatingMode {
        let mode = match self.selector.get_mode().await {
            Ok(label) => {
                if !self.resolver.is_known(&label) {
                    self.logger
                        .warn(&format!("Unknown mode label '{}', using off", label));
                }
                self.resolver.resolve(&label)
            }
            Err(e) => {
                self.logger
                    .error(&format!("Failed to read mode from selector: {}", e));
                OperatingMode::Off
            }
        };

        if mode != self.mode {
            self.logger
                .info(&format!("Mode changed from {} to {}", self.mode, mode));
            self.mode = mode;
        } else {
            self.logger.debug(&format!("Current mode: {}", mode));
        }
        mode
    }

    fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.config.confirm_timeout_secs)
    }

    fn publish_status(&self) {
        let telemetry = self.telemetry.snapshot();
        let code = telemetry.wallbox_state;
        let snapshot = StatusSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("APP_VERSION").to_string(),
            mode: self.mode,
            connection_code: code,
            connection: ConnectionState::from_code(code).description().to_string(),
            state: self.state,
            last_setpoint: self.gateway.last_sent(),
            telemetry,
            mqtt_connected: self
                .link_up
                .as_ref()
                .map(|flag| flag.load(Ordering::Relaxed))
                .unwrap_or(false),
            ticks: self.ticks,
        };
        self.status_tx.send_replace(Arc::new(snapshot));
    }
}
