//! Error types and handling for Voltaic
//!
//! This module defines the error types used throughout the regulator,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Voltaic operations
pub type Result<T> = std::result::Result<T, VoltaicError>;

/// Main error type for Voltaic
#[derive(Debug, Error)]
pub enum VoltaicError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// MQTT transport errors
    #[error("MQTT error: {message}")]
    Mqtt { message: String },

    /// External mode selector errors (Home Assistant)
    #[error("Mode selector error: {message}")]
    ModeSelector { message: String },

    /// Malformed or unroutable telemetry
    #[error("Telemetry error: {message}")]
    Telemetry { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl VoltaicError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        VoltaicError::Config {
            message: message.into(),
        }
    }

    /// Create a new MQTT error
    pub fn mqtt<S: Into<String>>(message: S) -> Self {
        VoltaicError::Mqtt {
            message: message.into(),
        }
    }

    /// Create a new mode selector error
    pub fn mode_selector<S: Into<String>>(message: S) -> Self {
        VoltaicError::ModeSelector {
            message: message.into(),
        }
    }

    /// Create a new telemetry error
    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        VoltaicError::Telemetry {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        VoltaicError::Web {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        VoltaicError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        VoltaicError::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        VoltaicError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        VoltaicError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for VoltaicError {
    fn from(err: std::io::Error) -> Self {
        VoltaicError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for VoltaicError {
    fn from(err: serde_yaml::Error) -> Self {
        VoltaicError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for VoltaicError {
    fn from(err: serde_json::Error) -> Self {
        VoltaicError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for VoltaicError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VoltaicError::timeout(err.to_string())
        } else {
            VoltaicError::mode_selector(err.to_string())
        }
    }
}

impl From<rumqttc::ClientError> for VoltaicError {
    fn from(err: rumqttc::ClientError) -> Self {
        VoltaicError::mqtt(err.to_string())
    }
}
