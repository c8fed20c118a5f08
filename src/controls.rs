//! Charging control algorithms for Voltaic
//!
//! This module contains the decision logic of the regulator: the set-point
//! domain, the controller state shared by all modes, the fixed-mode
//! dispatcher and the PV-adaptive regulator. Nothing in here performs I/O;
//! decisions are returned to the regulation tick, which actuates them.

use crate::config::RegulationConfig;
use serde::Serialize;

pub mod fixed;
pub mod pv;

pub use fixed::FixedModeDispatcher;
pub use pv::{PvInputs, PvOutcome, PvRegulator, RampReason, RampStep};

/// Lowest non-zero set point in amps
pub const MIN_CURRENT: i32 = 6;

/// Highest set point in amps
pub const MAX_CURRENT: i32 = 16;

/// Process-wide regulation state, mutated only by the regulation tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControllerState {
    pub charging_active: bool,
    pub battery_has_priority: bool,
    pub current_setpoint_amps: i32,
    pub pv_sufficient: bool,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            charging_active: false,
            battery_has_priority: true,
            current_setpoint_amps: 0,
            pv_sufficient: false,
        }
    }
}

impl ControllerState {
    /// Set point 0 with charging cleared
    pub fn stop(&mut self) {
        self.current_setpoint_amps = 0;
        self.charging_active = false;
    }
}

/// Set-point domain: exactly 0, or within `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentLimits {
    pub min: i32,
    pub max: i32,
}

impl Default for CurrentLimits {
    fn default() -> Self {
        Self {
            min: MIN_CURRENT,
            max: MAX_CURRENT,
        }
    }
}

impl CurrentLimits {
    pub fn from_config(config: &RegulationConfig) -> Self {
        Self {
            min: config.min_current,
            max: config.max_current,
        }
    }

    /// Collapse below `min` to 0, clamp above `max`
    pub fn clamp(&self, amps: i32) -> i32 {
        if amps < self.min {
            0
        } else if amps > self.max {
            self.max
        } else {
            amps
        }
    }

    /// Round to the nearest integer (ties to even), then clamp
    pub fn clamp_round(&self, value: f64) -> i32 {
        let rounded = value.round_ties_even();
        if rounded.is_nan() || rounded < self.min as f64 {
            0
        } else if rounded > self.max as f64 {
            self.max
        } else {
            rounded as i32
        }
    }

    /// Whether `amps` is a legal set point
    pub fn contains(&self, amps: i32) -> bool {
        amps == 0 || (self.min..=self.max).contains(&amps)
    }
}

/// [`CurrentLimits::clamp_round`] with the default 6/16 A domain
pub fn clamp_round(value: f64) -> i32 {
    CurrentLimits::default().clamp_round(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_round_examples() {
        assert_eq!(clamp_round(1500.0 / 230.0), 7);
        assert_eq!(clamp_round(300.0 / 230.0), 0);
        assert_eq!(clamp_round(5.4), 0);
        assert_eq!(clamp_round(5.6), 6);
        assert_eq!(clamp_round(16.4), 16);
        assert_eq!(clamp_round(40.0), 16);
        assert_eq!(clamp_round(-12.0), 0);
        assert_eq!(clamp_round(f64::NAN), 0);
    }

    #[test]
    fn clamp_round_ties_to_even() {
        assert_eq!(clamp_round(6.5), 6);
        assert_eq!(clamp_round(7.5), 8);
        assert_eq!(clamp_round(5.5), 6);
    }

    #[test]
    fn clamp_round_is_idempotent() {
        let mut x = -50.0;
        while x <= 50.0 {
            let once = clamp_round(x);
            assert_eq!(clamp_round(once as f64), once, "x = {}", x);
            x += 0.25;
        }
    }

    #[test]
    fn clamp_round_image_on_integers() {
        let limits = CurrentLimits::default();
        for i in -100..=100 {
            let amps = clamp_round(i as f64);
            assert!(limits.contains(amps), "{} -> {}", i, amps);
        }
        let image: std::collections::BTreeSet<i32> =
            (-100..=100).map(|i| clamp_round(i as f64)).collect();
        let expected: std::collections::BTreeSet<i32> =
            std::iter::once(0).chain(6..=16).collect();
        assert_eq!(image, expected);
    }

    #[test]
    fn integer_clamp() {
        let limits = CurrentLimits::default();
        assert_eq!(limits.clamp(5), 0);
        assert_eq!(limits.clamp(6), 6);
        assert_eq!(limits.clamp(17), 16);
        assert_eq!(limits.clamp(-3), 0);
    }

    #[test]
    fn initial_state() {
        let state = ControllerState::default();
        assert!(!state.charging_active);
        assert!(state.battery_has_priority);
        assert_eq!(state.current_setpoint_amps, 0);
        assert!(!state.pv_sufficient);
    }
}
