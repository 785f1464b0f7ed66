//! Error types for the multi-call coordinator
//!
//! Errors are split by the capability that raises them. None of them is fatal to
//! the coordinator: the dispatch loop logs them and keeps the session context in a
//! consistent state. Only startup and configuration loading return them to callers.

use thiserror::Error;

/// Result type for coordinator operations
pub type MultiCallResult<T> = Result<T, MultiCallError>;

/// Errors reported by the telephony transport capability
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Audio constraint rejected by the device (invalid or unsupported)
    #[error("Invalid audio constraint: {message}")]
    InvalidConstraint { message: String },

    /// Device registration failed
    #[error("Registration failed: {message}")]
    Registration { message: String },

    /// Input or output device could not be selected
    #[error("Audio device error for {device_id}: {message}")]
    AudioDevice { device_id: String, message: String },

    /// Call could not be accepted
    #[error("Accept failed for call {call_id}: {message}")]
    Accept { call_id: String, message: String },

    /// Operation attempted on a destroyed device
    #[error("Device has been destroyed")]
    DeviceDestroyed,

    /// Any other transport failure
    #[error("Transport error: {message}")]
    Other { message: String },
}

impl TransportError {
    /// Create an invalid constraint error
    pub fn invalid_constraint(message: impl Into<String>) -> Self {
        Self::InvalidConstraint {
            message: message.into(),
        }
    }

    /// Create a registration error
    pub fn registration(message: impl Into<String>) -> Self {
        Self::Registration {
            message: message.into(),
        }
    }

    /// Create an audio device error
    pub fn audio_device(device_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AudioDevice {
            device_id: device_id.into(),
            message: message.into(),
        }
    }

    /// Create an accept error
    pub fn accept(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Accept {
            call_id: call_id.into(),
            message: message.into(),
        }
    }

    /// Create a generic transport error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Errors reported by the conference control capability
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConferenceError {
    /// Hold command was rejected
    #[error("Hold failed for participant {target_sid}: {message}")]
    HoldFailed { target_sid: String, message: String },

    /// Task referenced by the command is unknown
    #[error("Task not found: {task_sid}")]
    TaskNotFound { task_sid: String },
}

/// Top-level errors for the coordinator
#[derive(Debug, Error)]
pub enum MultiCallError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Conference control error
    #[error(transparent)]
    Conference(#[from] ConferenceError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Multi-call handling is switched off in configuration
    #[error("Multi-call feature is disabled")]
    FeatureDisabled,

    /// The dispatch loop is no longer running
    #[error("Coordinator has stopped")]
    CoordinatorStopped,
}

impl MultiCallError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
