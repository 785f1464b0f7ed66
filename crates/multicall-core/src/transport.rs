//! Telephony transport capability
//!
//! The coordinator never touches signaling or media itself. It drives a softphone
//! SDK through the traits in this module: a [`TelephonyTransport`] that constructs
//! devices, the [`Device`] endpoints those produce, and the [`CallHandle`] legs that
//! arrive on them. Lifecycle notifications flow back through the sinks handed to
//! [`Device::subscribe`] and [`CallHandle::subscribe`].
//!
//! # Device lifecycle
//!
//! ```text
//! Unregistered ──register()──▶ Registering ──▶ Registered
//!       │                           │               │
//!       └───────────── destroy() ───┴───────────────┴──▶ Destroyed (terminal)
//! ```
//!
//! A destroyed device is never reused; a fresh instance is constructed instead.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{AcceptOptions, AudioConstraints};
use crate::device::DeviceOptions;
use crate::error::TransportError;
use crate::events::{CallEventSink, DeviceEventSink};

/// Stable correlation key of a call leg ("call SID")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    /// Create a call id from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Logical line a device or call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Line {
    /// Externally supplied device owned by the host application
    Primary,
    /// On-demand device owned by the coordinator
    Secondary,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Primary => write!(f, "primary"),
            Line::Secondary => write!(f, "secondary"),
        }
    }
}

/// Lifecycle state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Unregistered,
    Registering,
    Registered,
    Destroyed,
}

/// Lifecycle state of a call leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Incoming,
    Accepted,
    Connected,
    Disconnected,
    Rejected,
}

impl CallState {
    /// Whether the leg has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Disconnected | CallState::Rejected)
    }
}

/// Codecs a device can be told to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Opus,
    Pcmu,
}

/// A selectable audio input or output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    /// Platform device id; `"default"` denotes the system default
    pub device_id: String,
    /// Human-readable label
    pub label: String,
}

impl AudioDeviceInfo {
    /// Id the platform uses for its default device
    pub const DEFAULT_ID: &'static str = "default";

    pub fn new(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
        }
    }

    /// Whether this entry is the platform default
    pub fn is_default(&self) -> bool {
        self.device_id == Self::DEFAULT_ID
    }
}

/// Factory for softphone devices
pub trait TelephonyTransport: Send + Sync {
    /// Access token for new devices
    fn token(&self) -> String;

    /// Construct an unregistered device
    fn new_device(
        &self,
        token: &str,
        options: &DeviceOptions,
    ) -> Result<Arc<dyn Device>, TransportError>;
}

/// A client-side endpoint able to carry one call on a line
#[async_trait]
pub trait Device: Send + Sync {
    /// Current lifecycle state
    fn state(&self) -> DeviceState;

    /// Route this device's `incoming`, `registered` and `error` notifications to `sink`
    fn subscribe(&self, sink: DeviceEventSink);

    /// Register with the signaling service
    async fn register(&self) -> Result<(), TransportError>;

    /// Release underlying resources; the device becomes [`DeviceState::Destroyed`]
    async fn destroy(&self);

    /// Apply audio constraints to the capture pipeline
    fn set_audio_constraints(&self, constraints: &AudioConstraints) -> Result<(), TransportError>;

    /// Remove any audio constraints
    fn unset_audio_constraints(&self);

    /// Currently selected input device, if any
    fn input_device(&self) -> Option<AudioDeviceInfo>;

    /// Select the input device
    async fn set_input_device(&self, device_id: &str) -> Result<(), TransportError>;

    /// Currently selected output devices
    fn output_devices(&self) -> Vec<AudioDeviceInfo>;

    /// Add an output device to the selection
    fn set_output_device(&self, device_id: &str) -> Result<(), TransportError>;
}

/// One leg of a conversation on one device
#[async_trait]
pub trait CallHandle: Send + Sync {
    /// Stable correlation key
    fn call_id(&self) -> CallId;

    /// Current lifecycle state
    fn state(&self) -> CallState;

    /// Route this call's `accept`, `disconnect` and `reject` notifications to `sink`
    fn subscribe(&self, sink: CallEventSink);

    /// Answer the call
    async fn accept(&self, options: Option<&AcceptOptions>) -> Result<(), TransportError>;

    /// Mute or unmute the local leg
    fn mute(&self, mute: bool);

    /// Whether the local leg is muted
    fn is_muted(&self) -> bool;
}
