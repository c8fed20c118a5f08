//! Modes whose set point does not depend on PV telemetry

use super::{ControllerState, CurrentLimits};
use crate::config::RegulationConfig;
use crate::logging::{StructuredLogger, get_logger};
use crate::mode::OperatingMode;

/// Handles `off`, `max_charge`, `min_charge` and `protect_battery`
#[derive(Debug, Clone)]
pub struct FixedModeDispatcher {
    limits: CurrentLimits,
    protect_max_soc: f64,
    protect_max_power_w: f64,
    logger: StructuredLogger,
}

impl FixedModeDispatcher {
    pub fn new(config: &RegulationConfig) -> Self {
        Self {
            limits: CurrentLimits::from_config(config),
            protect_max_soc: config.protect_battery_max_soc,
            protect_max_power_w: config.protect_battery_max_power_w,
            logger: get_logger("controls"),
        }
    }

    /// Decide the set point for a fixed mode.
    ///
    /// Returns `None` for PV modes, which are left to the PV regulator.
    pub fn dispatch(
        &self,
        mode: OperatingMode,
        state: &mut ControllerState,
        battery_soc: f64,
        battery_power_w: f64,
    ) -> Option<i32> {
        let logger = self.logger.for_mode(mode.as_str());
        match mode {
            OperatingMode::MaxCharge => {
                self.start(state, self.limits.max);
                logger.info(&format!("Charging at maximum current {} A", self.limits.max));
            }
            OperatingMode::MinCharge => {
                self.start(state, self.limits.min);
                logger.info(&format!("Charging at minimum current {} A", self.limits.min));
            }
            OperatingMode::Off => {
                state.stop();
                logger.info("Charging off");
            }
            OperatingMode::ProtectBattery => {
                if battery_soc <= self.protect_max_soc
                    && battery_power_w.abs() <= self.protect_max_power_w
                {
                    self.start(state, self.limits.max);
                    logger.info(&format!(
                        "Battery at {:.1}% and idle ({:.0} W), charging at {} A",
                        battery_soc, battery_power_w, self.limits.max
                    ));
                } else {
                    state.stop();
                    logger.info(&format!(
                        "Battery at {:.1}% ({:.0} W), not charging",
                        battery_soc, battery_power_w
                    ));
                }
            }
            OperatingMode::PvPreferBattery | OperatingMode::PvPreferCharge => return None,
        }
        Some(state.current_setpoint_amps)
    }

    fn start(&self, state: &mut ControllerState, amps: i32) {
        state.current_setpoint_amps = amps;
        state.charging_active = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> FixedModeDispatcher {
        FixedModeDispatcher::new(&RegulationConfig::default())
    }

    #[test]
    fn max_and_min_charge() {
        let d = dispatcher();
        let mut state = ControllerState::default();
        assert_eq!(d.dispatch(OperatingMode::MaxCharge, &mut state, 50.0, 0.0), Some(16));
        assert!(state.charging_active);
        assert_eq!(d.dispatch(OperatingMode::MinCharge, &mut state, 50.0, 0.0), Some(6));
        assert_eq!(state.current_setpoint_amps, 6);
    }

    #[test]
    fn off_stops() {
        let d = dispatcher();
        let mut state = ControllerState {
            charging_active: true,
            current_setpoint_amps: 10,
            ..ControllerState::default()
        };
        assert_eq!(d.dispatch(OperatingMode::Off, &mut state, 50.0, 0.0), Some(0));
        assert!(!state.charging_active);
    }

    #[test]
    fn protect_battery_requires_empty_idle_battery() {
        let d = dispatcher();
        let mut state = ControllerState::default();
        assert_eq!(
            d.dispatch(OperatingMode::ProtectBattery, &mut state, 2.0, -5.0),
            Some(16)
        );
        assert!(state.charging_active);
        assert_eq!(
            d.dispatch(OperatingMode::ProtectBattery, &mut state, 2.0, -300.0),
            Some(0)
        );
        assert!(!state.charging_active);
        assert_eq!(
            d.dispatch(OperatingMode::ProtectBattery, &mut state, 35.0, 0.0),
            Some(0)
        );
    }

    #[test]
    fn pv_modes_are_not_fixed() {
        let d = dispatcher();
        let mut state = ControllerState::default();
        assert_eq!(d.dispatch(OperatingMode::PvPreferBattery, &mut state, 50.0, 0.0), None);
        assert_eq!(d.dispatch(OperatingMode::PvPreferCharge, &mut state, 50.0, 0.0), None);
        assert_eq!(state, ControllerState::default());
    }
}
