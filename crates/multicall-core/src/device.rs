//! Secondary device lifecycle
//!
//! The secondary line's device is created lazily when the primary line rings, so
//! that a second call can be taken while the first is live, and destroyed once
//! neither line carries a call. The manager owns the only reference to it.
//!
//! # Construction options
//!
//! Options are the voice SDK options the primary device was built with, minus the
//! accept-time and audio-constraint groups, over the defaults below:
//!
//! | option                   | value                                   |
//! |--------------------------|-----------------------------------------|
//! | `allowIncomingWhileBusy` | `false` unless the caller overrides it  |
//! | `codecPreferences`       | caller value; field absent when unset   |
//! | `appName` / `appVersion` | always from [`MultiCallConfig`]         |
//!
//! The transport treats an absent `codecPreferences` differently from an empty
//! one, so an unset or empty list is never serialized.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::MultiCallConfig;
use crate::error::TransportError;
use crate::transport::{Codec, Device, DeviceState, TelephonyTransport};

const RESERVED_OPTION_KEYS: [&str; 4] = [
    "appName",
    "appVersion",
    "allowIncomingWhileBusy",
    "codecPreferences",
];

/// Options a device is constructed with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOptions {
    pub allow_incoming_while_busy: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_preferences: Option<Vec<Codec>>,

    pub app_name: String,

    pub app_version: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceOptions {
    /// Merge the configured voice options over the secondary-device defaults
    pub fn from_config(config: &MultiCallConfig) -> Self {
        let voice = &config.sdk_options.voice;

        let mut extra = voice.extra.clone();
        for key in RESERVED_OPTION_KEYS {
            extra.remove(key);
        }

        Self {
            allow_incoming_while_busy: voice.allow_incoming_while_busy.unwrap_or(false),
            codec_preferences: voice
                .codec_preferences
                .clone()
                .filter(|codecs| !codecs.is_empty()),
            app_name: config.app_name.clone(),
            app_version: config.app_version.clone(),
            extra,
        }
    }
}

/// Outcome of mirroring one output device onto the secondary device
#[derive(Debug, Clone, PartialEq)]
pub struct OutputMirrorOutcome {
    pub device_id: String,
    pub label: String,
    pub result: Result<(), TransportError>,
}

/// Owner of the secondary device slot
pub struct DeviceLifecycleManager {
    transport: Arc<dyn TelephonyTransport>,
    device: Option<Arc<dyn Device>>,
    generation: u64,
}

impl DeviceLifecycleManager {
    pub fn new(transport: Arc<dyn TelephonyTransport>) -> Self {
        Self {
            transport,
            device: None,
            generation: 0,
        }
    }

    /// A device reference is usable when present and not destroyed
    pub fn is_usable(device: Option<&Arc<dyn Device>>) -> bool {
        device.map_or(false, |d| d.state() != DeviceState::Destroyed)
    }

    /// Current secondary device, destroyed or not
    pub fn device(&self) -> Option<&Arc<dyn Device>> {
        self.device.as_ref()
    }

    /// Current secondary device if it can still carry calls
    pub fn usable_device(&self) -> Option<&Arc<dyn Device>> {
        self.device.as_ref().filter(|d| d.state() != DeviceState::Destroyed)
    }

    pub fn has_usable_device(&self) -> bool {
        Self::is_usable(self.device.as_ref())
    }

    /// Generation of the device currently in the slot; bumped on every creation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> Option<DeviceState> {
        self.device.as_ref().map(|d| d.state())
    }

    /// Construct a fresh secondary device and place it in the slot
    ///
    /// Audio constraints are applied after construction; a rejected constraint set
    /// is cleared rather than left half-applied.
    pub fn create_device(
        &mut self,
        config: &MultiCallConfig,
    ) -> Result<Arc<dyn Device>, TransportError> {
        let options = DeviceOptions::from_config(config);
        let token = self.transport.token();
        let device = self.transport.new_device(&token, &options)?;

        if let Some(constraints) = &config.sdk_options.voice.audio_constraints {
            if let Err(e) = device.set_audio_constraints(constraints) {
                warn!("Audio constraints rejected by secondary device, clearing: {}", e);
                device.unset_audio_constraints();
            }
        }

        self.generation += 1;
        self.device = Some(device.clone());
        info!(generation = self.generation, "Created secondary device");

        Ok(device)
    }

    /// Release the secondary device; no-op when absent or already destroyed
    ///
    /// Returns whether a device was actually torn down.
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use multicall_core::{DeviceLifecycleManager, MultiCallConfig};
    /// # use multicall_core::sim::SimTransport;
    /// # tokio_test::block_on(async {
    /// let mut devices = DeviceLifecycleManager::new(Arc::new(SimTransport::new("token")));
    /// devices.create_device(&MultiCallConfig::new()).unwrap();
    ///
    /// assert!(devices.destroy_device().await);
    /// assert!(!devices.destroy_device().await);
    /// # })
    /// ```
    pub async fn destroy_device(&mut self) -> bool {
        match &self.device {
            Some(device) if device.state() != DeviceState::Destroyed => {
                device.destroy().await;
                debug!(generation = self.generation, "Secondary device destroyed");
                true
            }
            Some(_) => {
                debug!("Secondary device already destroyed");
                false
            }
            None => false,
        }
    }
}

/// Copy every non-default output selected on `primary` onto `secondary`
///
/// Each output is attempted independently; failures are logged and collected.
pub fn mirror_output_devices(primary: &dyn Device, secondary: &dyn Device) -> Vec<OutputMirrorOutcome> {
    primary
        .output_devices()
        .into_iter()
        .filter(|output| !output.is_default())
        .map(|output| {
            let result = secondary.set_output_device(&output.device_id);
            match &result {
                Ok(()) => info!("Set output device to {}", output.label),
                Err(e) => error!("Unable to change output device to {}: {}", output.label, e),
            }
            OutputMirrorOutcome {
                device_id: output.device_id,
                label: output.label,
                result,
            }
        })
        .collect()
}
