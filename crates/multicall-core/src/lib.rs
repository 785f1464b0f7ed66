//! # multicall-core - Dual-Line Call Coordination
//!
//! Lets an agent carry two simultaneous voice calls on two independent softphone
//! devices. The host application owns the primary device; this crate creates a
//! secondary device on demand, keeps track of both call legs, and makes sure only
//! one call the agent participates in is live (unheld and unmuted) at any time.
//!
//! ## Architecture
//!
//! ```text
//!  transport adapters ──▶ events (typed sinks) ──▶ coordinator dispatch loop
//!                                                     │
//!                    ┌────────────────┬───────────────┼──────────────┐
//!                    ▼                ▼               ▼              ▼
//!                 device           registry          hold          state
//!          (secondary device)  (call legs)   (single active)   (publisher)
//! ```
//!
//! Signaling, media and conference control are capabilities supplied by the host
//! through the traits in [`transport`], [`conference`] and [`state`]. The [`sim`]
//! module provides in-memory implementations of all of them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use multicall_core::{CoordinatorDeps, MultiCallConfig, MultiCallCoordinator};
//! use multicall_core::sim::{RecordingPublisher, SimCall, SimDevice, SimTaskBoard, SimTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let primary = SimDevice::standalone();
//!     let board = SimTaskBoard::new();
//!     let handle = MultiCallCoordinator::start(
//!         MultiCallConfig::new().with_enabled(true),
//!         CoordinatorDeps {
//!             transport: Arc::new(SimTransport::new("token")),
//!             primary_device: Arc::new(primary.clone()),
//!             tasks: Arc::new(board.clone()),
//!             conference: Arc::new(board),
//!             publisher: Arc::new(RecordingPublisher::new()),
//!         },
//!     )?;
//!
//!     primary.ring(&SimCall::new("CA1"));
//!     println!("{:?}", handle.snapshot().await?);
//!     handle.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod conference;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod events;
pub mod hold;
pub mod logging;
pub mod registry;
pub mod sim;
pub mod state;
pub mod transport;

pub use conference::{
    Conference, ConferenceControl, ConferenceParticipant, HoldParticipantRequest, ParticipantRole,
    ParticipantStatus, Task, TaskSource,
};
pub use config::{AcceptOptions, AudioConstraints, MultiCallConfig, VoiceSdkOptions};
pub use coordinator::{CoordinatorDeps, CoordinatorHandle, MultiCallCoordinator, SessionSnapshot};
pub use device::{DeviceLifecycleManager, DeviceOptions};
pub use error::{ConferenceError, MultiCallError, MultiCallResult, TransportError};
pub use events::{CallEvent, DeviceEvent, EventSender, SignalingEvent};
pub use hold::{HoldOrchestrator, HoldReport, UnholdTarget};
pub use registry::{CallSession, CallSnapshot, SessionRegistry};
pub use state::{StateAction, StatePublisher};
pub use transport::{CallHandle, CallId, CallState, Codec, Device, DeviceState, Line, TelephonyTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
