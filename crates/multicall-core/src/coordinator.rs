//! Dual-line call coordinator
//!
//! [`MultiCallCoordinator::start`] spawns a single dispatch loop that exclusively
//! owns the session context: the secondary device slot, the call registry and the
//! hold orchestrator. Every signaling event, every deferred step and every host
//! command is an [`Envelope`] on one queue, so handlers run to completion in
//! arrival order and always read the current slots before deciding.
//!
//! # Event handling
//!
//! | event                          | action |
//! |--------------------------------|--------|
//! | primary `incoming`             | bind primary leg; provision the secondary device if absent, otherwise hold the live secondary leg |
//! | secondary `incoming`           | remember as pending; mirror the input device if required, then accept |
//! | secondary `accept`             | bind secondary leg; hold everything else; publish it |
//! | secondary `disconnect`/`reject`| release it; destroy the device if the primary line is idle |
//! | primary `disconnect`/`reject`  | release it; republish the secondary leg, or destroy the device |
//! | secondary `registered`         | mirror the primary device's outputs |
//! | `error` on either device       | log only |
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use multicall_core::{CoordinatorDeps, MultiCallConfig, MultiCallCoordinator, UnholdTarget};
//! use multicall_core::sim::{RecordingPublisher, SimDevice, SimTaskBoard, SimTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let board = SimTaskBoard::new();
//! let deps = CoordinatorDeps {
//!     transport: Arc::new(SimTransport::new("token")),
//!     primary_device: Arc::new(SimDevice::standalone()),
//!     tasks: Arc::new(board.clone()),
//!     conference: Arc::new(board.clone()),
//!     publisher: Arc::new(RecordingPublisher::new()),
//! };
//!
//! let handle = MultiCallCoordinator::start(MultiCallConfig::new().with_enabled(true), deps)?;
//! handle.unhold(UnholdTarget::TaskSid("WT1".to_string())).await?;
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::MultiCallConfig;
use crate::conference::{ConferenceControl, TaskSource};
use crate::device::{mirror_output_devices, DeviceLifecycleManager};
use crate::error::{MultiCallError, MultiCallResult, TransportError};
use crate::events::{CallEvent, DeviceEvent, EventSender, SignalingEvent, PRIMARY_GENERATION};
use crate::hold::{HoldOrchestrator, HoldReport, UnholdTarget};
use crate::registry::{CallSnapshot, SessionRegistry};
use crate::state::{StateAction, StatePublisher};
use crate::transport::{CallHandle, CallId, CallState, Device, DeviceState, Line, TelephonyTransport};

/// Unit of work on the dispatch queue
pub(crate) enum Envelope {
    Signal(SignalingEvent),
    /// Input-device mirroring finished; the pending secondary call may be accepted
    AcceptReady {
        call_id: CallId,
        input_result: Result<(), TransportError>,
    },
    Command(Command),
}

pub(crate) enum Command {
    Unhold {
        target: UnholdTarget,
        reply: oneshot::Sender<Option<HoldReport>>,
    },
    HoldOthers {
        call_id: CallId,
        reply: oneshot::Sender<HoldReport>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Capabilities the coordinator drives
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub transport: Arc<dyn TelephonyTransport>,
    /// Host-owned device carrying the primary line
    pub primary_device: Arc<dyn Device>,
    pub tasks: Arc<dyn TaskSource>,
    pub conference: Arc<dyn ConferenceControl>,
    pub publisher: Arc<dyn StatePublisher>,
}

/// Point-in-time view of the session context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub primary_call: Option<CallSnapshot>,
    pub secondary_call: Option<CallSnapshot>,
    pub pending_secondary: Option<CallId>,
    pub secondary_device: Option<DeviceState>,
    pub device_generation: u64,
}

/// Owner of the session context; lives inside the dispatch loop
pub struct MultiCallCoordinator {
    config: MultiCallConfig,
    primary_device: Arc<dyn Device>,
    devices: DeviceLifecycleManager,
    registry: SessionRegistry,
    hold: HoldOrchestrator,
    publisher: Arc<dyn StatePublisher>,
    sender: EventSender,
}

impl MultiCallCoordinator {
    /// Subscribe to the primary device and spawn the dispatch loop
    pub fn start(config: MultiCallConfig, deps: CoordinatorDeps) -> MultiCallResult<CoordinatorHandle> {
        if !config.enabled {
            return Err(MultiCallError::FeatureDisabled);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sender = EventSender::new(tx);

        deps.primary_device
            .subscribe(sender.device_sink(Line::Primary, PRIMARY_GENERATION));

        let coordinator = Self {
            config,
            primary_device: deps.primary_device,
            devices: DeviceLifecycleManager::new(deps.transport),
            registry: SessionRegistry::new(),
            hold: HoldOrchestrator::new(deps.tasks, deps.conference),
            publisher: deps.publisher,
            sender: sender.clone(),
        };

        tokio::spawn(coordinator.run(rx).instrument(info_span!("multicall")));
        info!("Multi-call coordinator started");

        Ok(CoordinatorHandle { sender })
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = rx.recv().await {
            match envelope {
                Envelope::Signal(event) => self.handle_signal(event).await,
                Envelope::AcceptReady { call_id, input_result } => {
                    if let Err(e) = input_result {
                        warn!(%call_id, "Unable to mirror input device onto secondary device: {}", e);
                    }
                    self.accept_pending(&call_id).await;
                }
                Envelope::Command(Command::Shutdown { reply }) => {
                    self.devices.destroy_device().await;
                    self.registry.clear();
                    let _ = reply.send(());
                    break;
                }
                Envelope::Command(command) => self.handle_command(command).await,
            }
        }
        info!("Multi-call coordinator stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Unhold { target, reply } => {
                let report = self.hold.unhold(&mut self.registry, target).await;
                let _ = reply.send(report);
            }
            Command::HoldOthers { call_id, reply } => {
                let report = self.hold.hold_others(&mut self.registry, &call_id).await;
                let _ = reply.send(report);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            primary_call: self.registry.primary().map(|s| s.snapshot()),
            secondary_call: self.registry.secondary().map(|s| s.snapshot()),
            pending_secondary: self.registry.pending_secondary_id(),
            secondary_device: self.devices.state(),
            device_generation: self.devices.generation(),
        }
    }

    async fn handle_signal(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Device {
                line: Line::Primary,
                event,
                ..
            } => match event {
                DeviceEvent::Incoming(call) => self.on_primary_incoming(call).await,
                DeviceEvent::Registered => debug!("Primary device registered"),
                DeviceEvent::Error(e) => error!("Error in primary device: {}", e),
            },
            SignalingEvent::Device {
                line: Line::Secondary,
                generation,
                event,
            } => {
                if generation != self.devices.generation() {
                    debug!(generation, ?event, "Ignoring event from a replaced secondary device");
                    return;
                }
                match event {
                    DeviceEvent::Incoming(call) => self.on_secondary_incoming(call).await,
                    DeviceEvent::Registered => self.on_secondary_registered(),
                    DeviceEvent::Error(e) => error!("Error in secondary device: {}", e),
                }
            }
            SignalingEvent::Call {
                line: Line::Primary,
                call_id,
                event,
            } => match event {
                CallEvent::Accept => self.registry.set_state(&call_id, CallState::Accepted),
                CallEvent::Disconnect => self.on_primary_ended(&call_id, CallState::Disconnected).await,
                CallEvent::Reject => self.on_primary_ended(&call_id, CallState::Rejected).await,
            },
            SignalingEvent::Call {
                line: Line::Secondary,
                call_id,
                event,
            } => match event {
                CallEvent::Accept => self.on_secondary_accept(&call_id).await,
                CallEvent::Disconnect => self.on_secondary_ended(&call_id, CallState::Disconnected).await,
                CallEvent::Reject => self.on_secondary_ended(&call_id, CallState::Rejected).await,
            },
        }
    }

    async fn on_primary_incoming(&mut self, call: Arc<dyn CallHandle>) {
        let call_id = call.call_id();
        debug!(%call_id, "Primary call incoming");

        if let Some(previous) = self.registry.bind(Line::Primary, call.clone()) {
            if previous.call_id != call_id {
                warn!(previous = %previous.call_id, %call_id, "Primary call replaced before it ended");
            }
        }
        call.subscribe(self.sender.call_sink(Line::Primary, call_id.clone()));

        if !self.devices.has_usable_device() {
            self.provision_secondary_device();
        } else if self.registry.secondary().is_some() {
            self.hold.hold_others(&mut self.registry, &call_id).await;
        }
    }

    fn provision_secondary_device(&mut self) {
        let device = match self.devices.create_device(&self.config) {
            Ok(device) => device,
            Err(e) => {
                error!("Unable to create secondary device: {}", e);
                return;
            }
        };

        let sink = self.sender.device_sink(Line::Secondary, self.devices.generation());
        device.subscribe(sink.clone());

        tokio::spawn(async move {
            if let Err(e) = device.register().await {
                sink.error(e);
            }
        });
    }

    async fn on_secondary_incoming(&mut self, call: Arc<dyn CallHandle>) {
        let call_id = call.call_id();
        debug!(%call_id, "Secondary call incoming");

        if !self.devices.has_usable_device() {
            warn!(%call_id, "Incoming call on a destroyed secondary device, ignoring");
            return;
        }
        if let Some(active) = self.registry.secondary() {
            warn!(active = %active.call_id, %call_id, "Secondary line busy, not accepting");
            return;
        }
        if let Some(pending) = self.registry.pending_secondary_id() {
            warn!(%pending, %call_id, "Secondary call already being accepted, not accepting");
            return;
        }

        self.registry.set_pending_secondary(call.clone());
        call.subscribe(self.sender.call_sink(Line::Secondary, call_id.clone()));

        let input = if self.config.initial_device_check {
            self.primary_device.input_device()
        } else {
            None
        };

        match (input, self.devices.usable_device().cloned()) {
            (Some(input), Some(device)) => {
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let input_result = device.set_input_device(&input.device_id).await;
                    sender.send_envelope(Envelope::AcceptReady { call_id, input_result });
                });
            }
            _ => self.accept_pending(&call_id).await,
        }
    }

    async fn accept_pending(&mut self, call_id: &CallId) {
        let Some(call) = self
            .registry
            .pending_secondary()
            .filter(|c| &c.call_id() == call_id)
            .cloned()
        else {
            debug!(%call_id, "Secondary call ended before it could be accepted");
            return;
        };

        if let Err(e) = call.accept(self.config.accept_options()).await {
            error!(%call_id, "Unable to accept secondary call: {}", e);
            self.registry.take_pending_secondary(call_id);
            self.teardown_if_idle().await;
        }
    }

    async fn on_secondary_accept(&mut self, call_id: &CallId) {
        let Some(handle) = self.registry.take_pending_secondary(call_id) else {
            debug!(%call_id, "Accept for a secondary call that is no longer pending");
            return;
        };

        debug!(%call_id, "Secondary call accepted");
        self.registry.bind(Line::Secondary, handle);
        self.registry.set_state(call_id, CallState::Accepted);

        self.hold.hold_others(&mut self.registry, call_id).await;
        self.publish_secondary();
    }

    async fn on_secondary_ended(&mut self, call_id: &CallId, state: CallState) {
        let was_pending = self.registry.take_pending_secondary(call_id).is_some();
        let was_bound = self.registry.release(Line::Secondary, call_id).is_some();
        debug!(%call_id, ?state, was_pending, was_bound, "Secondary call ended");

        if self.registry.primary().is_none() {
            self.teardown_if_idle().await;
        }
    }

    async fn on_primary_ended(&mut self, call_id: &CallId, state: CallState) {
        if self.registry.release(Line::Primary, call_id).is_none() {
            debug!(%call_id, ?state, "Primary call already released");
            return;
        }
        debug!(%call_id, ?state, "Primary call ended");

        if self.registry.secondary().is_some() {
            self.publish_secondary();
        } else {
            self.teardown_if_idle().await;
        }
    }

    fn on_secondary_registered(&self) {
        debug!("Secondary device registered");
        if let Some(device) = self.devices.usable_device() {
            mirror_output_devices(self.primary_device.as_ref(), device.as_ref());
        }
    }

    fn publish_secondary(&self) {
        if let Some(session) = self.registry.secondary() {
            self.publisher
                .dispatch(StateAction::AddSecondaryCall(session.snapshot()));
        }
    }

    /// Destroy the secondary device once no call uses it or is being set up on it
    async fn teardown_if_idle(&mut self) {
        let idle = self.registry.primary().is_none()
            && self.registry.secondary().is_none()
            && self.registry.pending_secondary().is_none();
        if idle && self.devices.destroy_device().await {
            info!("No calls remain, secondary device destroyed");
        }
    }
}

/// Cloneable handle onto a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: EventSender,
}

impl CoordinatorHandle {
    /// Raw event sender for transport adapters that route their own events
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Report an incoming call on the primary device
    pub fn primary_incoming(&self, call: Arc<dyn CallHandle>) -> MultiCallResult<()> {
        if self.sender.send(SignalingEvent::primary_incoming(call)) {
            Ok(())
        } else {
            Err(MultiCallError::CoordinatorStopped)
        }
    }

    /// Make the target task's call the sole active one
    pub async fn unhold(&self, target: UnholdTarget) -> MultiCallResult<Option<HoldReport>> {
        self.request(|reply| Command::Unhold { target, reply }).await
    }

    /// Hold every live call except `call_id`
    pub async fn hold_others(&self, call_id: CallId) -> MultiCallResult<HoldReport> {
        self.request(|reply| Command::HoldOthers { call_id, reply }).await
    }

    /// Current session context, after every event queued before this call
    pub async fn snapshot(&self) -> MultiCallResult<SessionSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Tear the session down: destroy the secondary device and stop the loop
    pub async fn shutdown(&self) -> MultiCallResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> MultiCallResult<T> {
        let (reply, rx) = oneshot::channel();
        if !self.sender.send_envelope(Envelope::Command(build(reply))) {
            return Err(MultiCallError::CoordinatorStopped);
        }
        rx.await.map_err(|_| MultiCallError::CoordinatorStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RecordingPublisher, SimCall, SimDevice, SimTaskBoard, SimTransport};
    use std::time::Duration;
    use tracing_test::traced_test;

    struct Fixture {
        transport: SimTransport,
        primary: SimDevice,
        board: SimTaskBoard,
        handle: CoordinatorHandle,
    }

    fn fixture() -> Fixture {
        let transport = SimTransport::new("token");
        let primary = SimDevice::standalone();
        let board = SimTaskBoard::new();
        let handle = MultiCallCoordinator::start(
            MultiCallConfig::new().with_enabled(true),
            CoordinatorDeps {
                transport: Arc::new(transport.clone()),
                primary_device: Arc::new(primary.clone()),
                tasks: Arc::new(board.clone()),
                conference: Arc::new(board.clone()),
                publisher: Arc::new(RecordingPublisher::new()),
            },
        )
        .unwrap();
        Fixture {
            transport,
            primary,
            board,
            handle,
        }
    }

    async fn settle(handle: &CoordinatorHandle) -> SessionSnapshot {
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle.snapshot().await.unwrap();
        }
        handle.snapshot().await.unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_device_errors_are_only_logged() {
        let f = fixture();
        f.board
            .add_task(SimTaskBoard::voice_task("WT1", "CA1", "CA1-customer"));
        f.primary.ring(&SimCall::new("CA1"));
        let before = settle(&f.handle).await;

        let secondary = f.transport.last_device().unwrap();
        assert!(secondary.raise_error(TransportError::other("media lost")));
        assert!(f.primary.raise_error(TransportError::other("token expired")));
        let after = settle(&f.handle).await;

        assert_eq!(before, after);
        assert!(logs_contain("Error in secondary device"));
        assert!(logs_contain("Error in primary device"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_replaced_device_events_are_ignored() {
        let f = fixture();
        let first = SimCall::new("CA1");
        f.primary.ring(&first);
        settle(&f.handle).await;
        let stale = f.transport.last_device().unwrap();

        first.disconnect();
        f.primary.ring(&SimCall::new("CA2"));
        let snapshot = settle(&f.handle).await;
        assert_eq!(snapshot.device_generation, 2);

        assert!(stale.ring(&SimCall::new("CA-stale")));
        let snapshot = settle(&f.handle).await;

        assert!(snapshot.pending_secondary.is_none());
        assert!(snapshot.secondary_call.is_none());
        assert!(logs_contain("Ignoring event from a replaced secondary device"));
    }

    #[tokio::test]
    async fn test_shutdown_destroys_device_and_stops_loop() {
        let f = fixture();
        f.primary.ring(&SimCall::new("CA1"));
        settle(&f.handle).await;
        let secondary = f.transport.last_device().unwrap();

        f.handle.shutdown().await.unwrap();

        assert_eq!(secondary.state(), DeviceState::Destroyed);
        assert!(matches!(
            f.handle.snapshot().await,
            Err(MultiCallError::CoordinatorStopped)
        ));
    }
}
