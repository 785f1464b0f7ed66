//! Typed signaling event stream
//!
//! Transport adapters never call into the coordinator directly. Each device and
//! call is handed a sink at subscription time; the sink tags every notification
//! with its line (and the secondary device's generation) and enqueues it on the
//! coordinator's single ordered queue.
//!
//! ```text
//!  primary device ──DeviceEventSink(primary)──┐
//!  primary call   ──CallEventSink(primary)────┤
//!  second device  ──DeviceEventSink(gen n)────┼──▶ mpsc queue ──▶ dispatch loop
//!  second call    ──CallEventSink(secondary)──┘
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::coordinator::Envelope;
use crate::error::TransportError;
use crate::transport::{CallHandle, CallId, Line};

/// Generation number reserved for the externally owned primary device
pub const PRIMARY_GENERATION: u64 = 0;

/// Device-level notifications
pub enum DeviceEvent {
    /// A call is ringing on the device
    Incoming(Arc<dyn CallHandle>),
    /// Registration with the signaling service completed
    Registered,
    /// Asynchronous registration or runtime failure
    Error(TransportError),
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceEvent::Incoming(call) => f.debug_tuple("Incoming").field(&call.call_id()).finish(),
            DeviceEvent::Registered => f.write_str("Registered"),
            DeviceEvent::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}

/// Call-level notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    Accept,
    Disconnect,
    Reject,
}

/// Event routed into the dispatch loop
#[derive(Debug)]
pub enum SignalingEvent {
    Device {
        line: Line,
        generation: u64,
        event: DeviceEvent,
    },
    Call {
        line: Line,
        call_id: CallId,
        event: CallEvent,
    },
}

impl SignalingEvent {
    /// Incoming call on the externally owned primary device
    pub fn primary_incoming(call: Arc<dyn CallHandle>) -> Self {
        SignalingEvent::Device {
            line: Line::Primary,
            generation: PRIMARY_GENERATION,
            event: DeviceEvent::Incoming(call),
        }
    }

    pub fn line(&self) -> Line {
        match self {
            SignalingEvent::Device { line, .. } | SignalingEvent::Call { line, .. } => *line,
        }
    }
}

/// Cloneable handle onto the coordinator queue
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { tx }
    }

    /// Enqueue a signaling event; false once the coordinator has stopped
    pub fn send(&self, event: SignalingEvent) -> bool {
        self.tx.send(Envelope::Signal(event)).is_ok()
    }

    pub(crate) fn send_envelope(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).is_ok()
    }

    /// Sink for a device on `line`
    pub fn device_sink(&self, line: Line, generation: u64) -> DeviceEventSink {
        DeviceEventSink {
            line,
            generation,
            sender: self.clone(),
        }
    }

    /// Sink for a call leg on `line`
    pub fn call_sink(&self, line: Line, call_id: CallId) -> CallEventSink {
        CallEventSink {
            line,
            call_id,
            sender: self.clone(),
        }
    }
}

/// Subscription target for a device's notifications
#[derive(Clone)]
pub struct DeviceEventSink {
    line: Line,
    generation: u64,
    sender: EventSender,
}

impl DeviceEventSink {
    pub fn line(&self) -> Line {
        self.line
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: DeviceEvent) -> bool {
        self.sender.send(SignalingEvent::Device {
            line: self.line,
            generation: self.generation,
            event,
        })
    }

    pub fn incoming(&self, call: Arc<dyn CallHandle>) -> bool {
        self.emit(DeviceEvent::Incoming(call))
    }

    pub fn registered(&self) -> bool {
        self.emit(DeviceEvent::Registered)
    }

    pub fn error(&self, error: TransportError) -> bool {
        self.emit(DeviceEvent::Error(error))
    }
}

/// Subscription target for a call leg's notifications
#[derive(Clone)]
pub struct CallEventSink {
    line: Line,
    call_id: CallId,
    sender: EventSender,
}

impl CallEventSink {
    pub fn line(&self) -> Line {
        self.line
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn emit(&self, event: CallEvent) -> bool {
        self.sender.send(SignalingEvent::Call {
            line: self.line,
            call_id: self.call_id.clone(),
            event,
        })
    }

    pub fn accept(&self) -> bool {
        self.emit(CallEvent::Accept)
    }

    pub fn disconnect(&self) -> bool {
        self.emit(CallEvent::Disconnect)
    }

    pub fn reject(&self) -> bool {
        self.emit(CallEvent::Reject)
    }
}
