//! Coordinator configuration
//!
//! Mirrors the host application's service configuration: a feature flag, the
//! initial-device-check switch, and the voice SDK options the primary device was
//! built with. The secondary device is constructed from the same voice options so
//! both lines behave identically.
//!
//! # Example
//!
//! ```rust
//! use multicall_core::config::MultiCallConfig;
//!
//! let config = MultiCallConfig::from_json_str(r#"{
//!     "enabled": true,
//!     "initialDeviceCheck": true,
//!     "sdkOptions": {
//!         "voice": {
//!             "codecPreferences": ["opus", "pcmu"],
//!             "acceptOptions": { "rtcConstraints": { "audio": true } },
//!             "edge": "roaming"
//!         }
//!     }
//! }"#).unwrap();
//!
//! assert!(config.enabled);
//! assert!(config.initial_device_check);
//! assert_eq!(config.sdk_options.voice.extra["edge"], "roaming");
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MultiCallResult;
use crate::transport::Codec;

/// Application name stamped into secondary-device options
pub const DEFAULT_APP_NAME: &str = "flex-ui";

/// Top-level coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultiCallConfig {
    /// Feature flag; the coordinator refuses to start when false
    pub enabled: bool,

    /// Mirror the primary device's input selection before auto-accepting
    pub initial_device_check: bool,

    /// Name reported by the secondary device
    pub app_name: String,

    /// Version reported by the secondary device
    pub app_version: String,

    /// SDK options shared with the primary device
    pub sdk_options: SdkOptions,
}

impl Default for MultiCallConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_device_check: false,
            app_name: DEFAULT_APP_NAME.to_string(),
            app_version: crate::VERSION.to_string(),
            sdk_options: SdkOptions::default(),
        }
    }
}

impl MultiCallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON service configuration
    pub fn from_json_str(json: &str) -> MultiCallResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON service configuration from disk
    pub fn from_file(path: impl AsRef<Path>) -> MultiCallResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_initial_device_check(mut self, check: bool) -> Self {
        self.initial_device_check = check;
        self
    }

    pub fn with_voice(mut self, voice: VoiceSdkOptions) -> Self {
        self.sdk_options.voice = voice;
        self
    }

    pub fn with_app(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.app_name = name.into();
        self.app_version = version.into();
        self
    }

    /// Options passed to `accept` on the secondary call
    pub fn accept_options(&self) -> Option<&AcceptOptions> {
        self.sdk_options.voice.accept_options.as_ref()
    }
}

/// SDK option groups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SdkOptions {
    pub voice: VoiceSdkOptions,
}

/// Voice SDK options the devices are constructed from
///
/// `accept_options` and `audio_constraints` are not device-construction options:
/// the first is applied when a call is accepted, the second after construction.
/// Anything not modelled explicitly is kept in `extra` and passed through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSdkOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_options: Option<AcceptOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_constraints: Option<AudioConstraints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_incoming_while_busy: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_preferences: Option<Vec<Codec>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VoiceSdkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec_preferences(mut self, codecs: Vec<Codec>) -> Self {
        self.codec_preferences = Some(codecs);
        self
    }

    pub fn with_audio_constraints(mut self, constraints: AudioConstraints) -> Self {
        self.audio_constraints = Some(constraints);
        self
    }

    pub fn with_accept_options(mut self, options: AcceptOptions) -> Self {
        self.accept_options = Some(options);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Options applied when accepting a call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtc_constraints: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtc_configuration: Option<Value>,
}

/// Capture constraints applied to a device's audio pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_cancellation: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_suppression: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_gain_control: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}
