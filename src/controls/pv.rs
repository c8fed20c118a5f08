//! PV-adaptive regulation for `pv_prefer_battery` and `pv_prefer_charge`
//!
//! A tick runs three phases:
//!
//! * **A** PV sufficiency: at least `pv_warmup_samples` PV readings whose
//!   average exceeds `pv_surplus_threshold_w`.
//! * **B** battery priority: in prefer-battery mode the home battery keeps
//!   priority until it is nearly full; prefer-charge always yields it.
//! * **C** start a session from export (or battery charge power), or ramp an
//!   active session one rule at a time.
//!
//! The regulator only mutates [`ControllerState`] and returns a [`PvOutcome`];
//! the caller performs the actuation and any confirmation wait.

use super::{ControllerState, CurrentLimits};
use crate::config::RegulationConfig;
use crate::logging::{StructuredLogger, get_logger};
use crate::mode::OperatingMode;
use crate::telemetry::{TelemetrySnapshot, TelemetryStore};
use serde::Serialize;

/// Telemetry read once at the start of a PV tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PvInputs {
    pub pv_samples: usize,
    pub pv_average_w: f64,
    pub export_average_w: f64,
    pub battery_soc: f64,
    pub battery_power_w: f64,
}

impl PvInputs {
    pub fn from_store(store: &TelemetryStore) -> Self {
        Self::from(&store.snapshot())
    }
}

impl From<&TelemetrySnapshot> for PvInputs {
    fn from(snapshot: &TelemetrySnapshot) -> Self {
        Self {
            pv_samples: snapshot.pv_input_samples,
            pv_average_w: snapshot.pv_input_avg_w,
            export_average_w: snapshot.grid_export_avg_w,
            battery_soc: snapshot.battery_soc,
            battery_power_w: snapshot.battery_power_w,
        }
    }
}

/// What the regulation tick has to do after a PV evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvOutcome {
    /// Too few PV samples; nothing changed
    WarmingUp,
    /// PV average below the threshold; set point forced to 0
    InsufficientPv,
    /// Battery dropped below the resume level while charging; set point 0
    BatteryDropout,
    /// Not charging and no start condition met
    Idle,
    /// Start a session at the given current, then wait for the wallbox
    Start { amps: i32 },
    /// Ask the selector to switch to another mode instead of starting
    SwitchMode(OperatingMode),
    /// Active session, set point changed
    Adjust { from: i32, to: i32 },
    /// Active session, set point unchanged
    Keep { amps: i32 },
}

/// Which ramp rule fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampReason {
    BatteryDischarging,
    GridExport,
    BatteryCharging,
    AtMaximum,
    GridImport,
}

/// Signed set-point change from one ramp rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampStep {
    pub delta: i32,
    pub reason: RampReason,
}

#[derive(Debug, Clone)]
pub struct PvRegulator {
    config: RegulationConfig,
    limits: CurrentLimits,
    logger: StructuredLogger,
}

impl PvRegulator {
    pub fn new(config: &RegulationConfig) -> Self {
        Self {
            config: config.clone(),
            limits: CurrentLimits::from_config(config),
            logger: get_logger("pv"),
        }
    }

    pub fn limits(&self) -> CurrentLimits {
        self.limits
    }

    /// Run phases A to C for one tick
    pub fn evaluate(
        &self,
        mode: OperatingMode,
        state: &mut ControllerState,
        inputs: &PvInputs,
    ) -> PvOutcome {
        if !mode.is_pv() {
            return PvOutcome::Idle;
        }
        let logger = self.logger.for_mode(mode.as_str());

        // Phase A
        if inputs.pv_samples < self.config.pv_warmup_samples {
            logger.info(&format!(
                "Warming up, {} PV samples, average {:.0} W",
                inputs.pv_samples, inputs.pv_average_w
            ));
            return PvOutcome::WarmingUp;
        }

        state.pv_sufficient = inputs.pv_average_w > self.config.pv_surplus_threshold_w;
        if state.pv_sufficient {
            logger.info(&format!(
                "PV production sufficient for charging ({:.0} W)",
                inputs.pv_average_w
            ));
        } else {
            state.stop();
            logger.info(&format!(
                "Not enough PV production for charging, stopping ({:.0} W over {} samples)",
                inputs.pv_average_w, inputs.pv_samples
            ));
        }

        // Phase B
        if let Some(outcome) = self.arbitrate_battery(mode, state, inputs, &logger) {
            return outcome;
        }
        if !state.pv_sufficient {
            return PvOutcome::InsufficientPv;
        }

        // Phase C
        if state.charging_active {
            self.ramp(mode, state, inputs, &logger)
        } else if state.battery_has_priority {
            PvOutcome::Idle
        } else {
            self.start(mode, state, inputs, &logger)
        }
    }

    fn arbitrate_battery(
        &self,
        mode: OperatingMode,
        state: &mut ControllerState,
        inputs: &PvInputs,
        logger: &StructuredLogger,
    ) -> Option<PvOutcome> {
        let soc = inputs.battery_soc;
        match mode {
            OperatingMode::PvPreferBattery if state.pv_sufficient => {
                if soc > self.config.battery_full_soc {
                    state.battery_has_priority = false;
                    logger.info(&format!("Battery at {:.1}%, fine to charge", soc));
                } else if state.charging_active && soc < self.config.battery_resume_soc {
                    logger.info(&format!(
                        "Battery dropped to {:.1}% while charging, stopping",
                        soc
                    ));
                    state.stop();
                    state.battery_has_priority = true;
                    return Some(PvOutcome::BatteryDropout);
                } else {
                    let direction = if inputs.battery_power_w > 0.0 {
                        "charging"
                    } else {
                        "discharging"
                    };
                    logger.info(&format!(
                        "Battery at {:.1}% has priority, not starting ({} at {:.0} W)",
                        soc, direction, inputs.battery_power_w
                    ));
                    state.battery_has_priority = true;
                }
            }
            OperatingMode::PvPreferCharge => {
                state.battery_has_priority = false;
                logger.info(&format!(
                    "Battery at {:.1}%, ignored as vehicle charging is preferred",
                    soc
                ));
            }
            _ => {}
        }
        None
    }

    fn start(
        &self,
        mode: OperatingMode,
        state: &mut ControllerState,
        inputs: &PvInputs,
        logger: &StructuredLogger,
    ) -> PvOutcome {
        let threshold = self.config.start_export_threshold_w;
        let volts = self.config.volts_per_phase;

        let (available_w, source) = match mode {
            OperatingMode::PvPreferBattery => (-inputs.export_average_w, "grid export"),
            OperatingMode::PvPreferCharge => (inputs.battery_power_w, "battery charge power"),
            _ => return PvOutcome::Idle,
        };

        if available_w > threshold {
            let amps = self.limits.clamp_round(available_w / volts);
            if amps > 0 {
                state.charging_active = true;
                state.current_setpoint_amps = amps;
                logger.info(&format!(
                    "Starting to charge with {} A, {} is {:.0} W",
                    amps, source, available_w
                ));
                return PvOutcome::Start { amps };
            }
        }

        state.charging_active = false;
        if mode == OperatingMode::PvPreferCharge && inputs.battery_soc == 100.0 {
            logger.info("Battery at 100%, switching to prefer battery");
            return PvOutcome::SwitchMode(OperatingMode::PvPreferBattery);
        }

        logger.info(&format!(
            "Not enough power left to start charging, {} is {:.0} W",
            source, available_w
        ));
        PvOutcome::Idle
    }

    /// First matching ramp rule for an active session, if any
    pub fn ramp_step(&self, mode: OperatingMode, current: i32, inputs: &PvInputs) -> Option<RampStep> {
        let volts = self.config.volts_per_phase;
        let battery = inputs.battery_power_w;
        let export = inputs.export_average_w;

        if battery < 0.0 {
            let delta = ((battery.abs() / volts).floor() as i32).max(1);
            return Some(RampStep {
                delta: -delta,
                reason: RampReason::BatteryDischarging,
            });
        }

        if export < -self.config.ramp_up_export_w {
            return Some(RampStep {
                delta: 1,
                reason: RampReason::GridExport,
            });
        }

        if mode == OperatingMode::PvPreferCharge && battery > self.config.ramp_up_battery_w {
            if current >= self.limits.max {
                return Some(RampStep {
                    delta: 0,
                    reason: RampReason::AtMaximum,
                });
            }
            return Some(RampStep {
                delta: (battery / volts).floor() as i32,
                reason: RampReason::BatteryCharging,
            });
        }

        if export > self.config.ramp_down_import_w {
            let delta = self.limits.clamp_round(export / volts).max(1);
            return Some(RampStep {
                delta: -delta,
                reason: RampReason::GridImport,
            });
        }

        None
    }

    fn ramp(
        &self,
        mode: OperatingMode,
        state: &mut ControllerState,
        inputs: &PvInputs,
        logger: &StructuredLogger,
    ) -> PvOutcome {
        let from = state.current_setpoint_amps;
        let mut to = from;

        match self.ramp_step(mode, from, inputs) {
            Some(step) => {
                to = from + step.delta;
                match step.reason {
                    RampReason::BatteryDischarging => logger.info(&format!(
                        "Decreasing by {} A from {} A, battery discharging at {:.0} W",
                        -step.delta, from, inputs.battery_power_w
                    )),
                    RampReason::GridExport => logger.info(&format!(
                        "Increasing by 1 A to {} A, grid export is {:.0} W",
                        to, inputs.export_average_w
                    )),
                    RampReason::BatteryCharging => logger.info(&format!(
                        "Increasing by {} A to {} A, battery charging at {:.0} W",
                        step.delta, to, inputs.battery_power_w
                    )),
                    RampReason::AtMaximum => {
                        logger.info("Already at maximum current, not increasing")
                    }
                    RampReason::GridImport => logger.info(&format!(
                        "Decreasing by {} A to {} A, grid import is {:.0} W",
                        -step.delta, to, inputs.export_average_w
                    )),
                }
            }
            None => logger.debug("No ramp rule matched"),
        }

        if to < self.limits.min {
            logger.info("Below minimum charging current, stopping");
            to = 0;
            state.charging_active = false;
        } else if to > self.limits.max {
            logger.info(&format!("Reached maximum, resetting to {} A", self.limits.max));
            to = self.limits.max;
        }
        state.current_setpoint_amps = to;

        if to != from {
            logger.info(&format!("Setting new current {} A, was {} A", to, from));
            PvOutcome::Adjust { from, to }
        } else {
            logger.info(&format!("Keeping current of {} A", to));
            PvOutcome::Keep { amps: to }
        }
    }
}
