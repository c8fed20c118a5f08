//! Wallbox connection state codes and the connection gate

use serde::Serialize;

/// Code reported while the vehicle draws current
pub const CHARGING_CODE: i64 = 7;

/// Wallbox connection/readiness state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unknown,
    NotConnected,
    ConnectedNotReady,
    Ready,
    ConnectedNoRequest,
    RequestDenied,
    RequestGranted,
    Charging,
    /// 8 and above
    Fault(i64),
    /// Negative codes never sent by a healthy wallbox
    Invalid(i64),
}

impl ConnectionState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ConnectionState::Unknown,
            1 => ConnectionState::NotConnected,
            2 => ConnectionState::ConnectedNotReady,
            3 => ConnectionState::Ready,
            4 => ConnectionState::ConnectedNoRequest,
            5 => ConnectionState::RequestDenied,
            6 => ConnectionState::RequestGranted,
            7 => ConnectionState::Charging,
            c if c >= 8 => ConnectionState::Fault(c),
            c => ConnectionState::Invalid(c),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConnectionState::Unknown => "state unknown",
            ConnectionState::NotConnected => "vehicle not connected",
            ConnectionState::ConnectedNotReady => "vehicle connected, not ready",
            ConnectionState::Ready => "ready to charge",
            ConnectionState::ConnectedNoRequest => "vehicle connected, no charge request",
            ConnectionState::RequestDenied => "vehicle connected, charge request denied",
            ConnectionState::RequestGranted => "vehicle connected, charge request granted",
            ConnectionState::Charging => "vehicle charging",
            ConnectionState::Fault(_) => "wallbox error",
            ConnectionState::Invalid(_) => "invalid state code",
        }
    }

    /// Codes the wallbox documents; faults and invalid codes are not
    pub fn is_known(&self) -> bool {
        !matches!(self, ConnectionState::Fault(_) | ConnectionState::Invalid(_))
    }
}

/// Why a tick was cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No vehicle, or not far enough in the handshake to charge
    NoVehicle,
    /// Wallbox reports an error condition
    Fault,
}

/// Outcome of the connection gate for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Force set point 0, clear charging, skip the rest of the tick
    Skip(SkipReason),
    /// Carry on with mode logic, clearing `charging_active` first if asked
    Continue { clear_charging: bool },
}

/// Evaluate the connection gate for a raw state code.
///
/// Below 4 and above 8 skip; 4 clears charging; 5 to 8 pass through.
pub fn evaluate(code: i64) -> GateDecision {
    match code {
        c if c < 4 => GateDecision::Skip(SkipReason::NoVehicle),
        4 => GateDecision::Continue {
            clear_charging: true,
        },
        5..=8 => GateDecision::Continue {
            clear_charging: false,
        },
        _ => GateDecision::Skip(SkipReason::Fault),
    }
}
