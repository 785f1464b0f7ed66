//! In-memory telephony and task simulator
//!
//! Stand-ins for the softphone SDK, the host's task list and its conference
//! control, used by the `multicall-sim` binary and by tests. Every handle is a
//! cheap clone over shared state so a test can keep one copy while the
//! coordinator drives another, then assert on what was recorded.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::conference::{
    Conference, ConferenceControl, ConferenceParticipant, HoldParticipantRequest, ParticipantRole,
    ParticipantStatus, Task, TaskSource,
};
use crate::config::{AcceptOptions, AudioConstraints};
use crate::device::DeviceOptions;
use crate::error::{ConferenceError, TransportError};
use crate::events::{CallEventSink, DeviceEventSink};
use crate::state::{StateAction, StatePublisher};
use crate::transport::{AudioDeviceInfo, CallHandle, CallId, CallState, Device, DeviceState, TelephonyTransport};

// ===== TRANSPORT =====

#[derive(Default)]
struct TransportInner {
    token: String,
    devices: Vec<SimDevice>,
    reject_constraints: bool,
    fail_creation: bool,
}

/// Device factory that records every device it constructs
#[derive(Clone, Default)]
pub struct SimTransport {
    inner: Arc<Mutex<TransportInner>>,
}

impl SimTransport {
    pub fn new(token: impl Into<String>) -> Self {
        let transport = Self::default();
        transport.inner.lock().token = token.into();
        transport
    }

    /// Devices built from now on reject any audio constraint
    pub fn reject_audio_constraints(&self, reject: bool) {
        self.inner.lock().reject_constraints = reject;
    }

    /// Device construction fails from now on
    pub fn fail_device_creation(&self, fail: bool) {
        self.inner.lock().fail_creation = fail;
    }

    pub fn devices(&self) -> Vec<SimDevice> {
        self.inner.lock().devices.clone()
    }

    pub fn last_device(&self) -> Option<SimDevice> {
        self.inner.lock().devices.last().cloned()
    }
}

impl TelephonyTransport for SimTransport {
    fn token(&self) -> String {
        self.inner.lock().token.clone()
    }

    fn new_device(&self, token: &str, options: &DeviceOptions) -> Result<Arc<dyn Device>, TransportError> {
        let mut inner = self.inner.lock();
        if inner.fail_creation {
            return Err(TransportError::other("device construction failed"));
        }

        let device = SimDevice::with_state(DeviceInner {
            token: token.to_string(),
            options: Some(options.clone()),
            state: DeviceState::Unregistered,
            reject_constraints: inner.reject_constraints,
            ..Default::default()
        });
        inner.devices.push(device.clone());
        Ok(Arc::new(device))
    }
}

// ===== DEVICE =====

struct DeviceInner {
    token: String,
    options: Option<DeviceOptions>,
    state: DeviceState,
    sink: Option<DeviceEventSink>,
    constraints: Option<AudioConstraints>,
    reject_constraints: bool,
    constraint_resets: usize,
    input: Option<AudioDeviceInfo>,
    fail_input: bool,
    outputs: Vec<AudioDeviceInfo>,
    failing_outputs: HashSet<String>,
    registration_error: Option<TransportError>,
    destroy_count: usize,
}

impl Default for DeviceInner {
    fn default() -> Self {
        Self {
            token: String::new(),
            options: None,
            state: DeviceState::Unregistered,
            sink: None,
            constraints: None,
            reject_constraints: false,
            constraint_resets: 0,
            input: None,
            fail_input: false,
            outputs: Vec::new(),
            failing_outputs: HashSet::new(),
            registration_error: None,
            destroy_count: 0,
        }
    }
}

/// Simulated softphone device
#[derive(Clone)]
pub struct SimDevice {
    inner: Arc<Mutex<DeviceInner>>,
}

impl SimDevice {
    fn with_state(inner: DeviceInner) -> Self {
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// An already-registered device, as the host's primary device would be
    pub fn standalone() -> Self {
        Self::with_state(DeviceInner {
            state: DeviceState::Registered,
            ..Default::default()
        })
    }

    pub fn token(&self) -> String {
        self.inner.lock().token.clone()
    }

    pub fn options(&self) -> Option<DeviceOptions> {
        self.inner.lock().options.clone()
    }

    pub fn audio_constraints(&self) -> Option<AudioConstraints> {
        self.inner.lock().constraints.clone()
    }

    pub fn constraint_resets(&self) -> usize {
        self.inner.lock().constraint_resets
    }

    pub fn destroy_count(&self) -> usize {
        self.inner.lock().destroy_count
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.lock().sink.is_some()
    }

    pub fn input_device_id(&self) -> Option<String> {
        self.inner.lock().input.as_ref().map(|i| i.device_id.clone())
    }

    pub fn select_input(&self, input: AudioDeviceInfo) {
        self.inner.lock().input = Some(input);
    }

    pub fn fail_input_selection(&self, fail: bool) {
        self.inner.lock().fail_input = fail;
    }

    pub fn select_outputs(&self, outputs: Vec<AudioDeviceInfo>) {
        self.inner.lock().outputs = outputs;
    }

    /// Selecting `device_id` as an output fails
    pub fn fail_output(&self, device_id: impl Into<String>) {
        self.inner.lock().failing_outputs.insert(device_id.into());
    }

    pub fn output_ids(&self) -> Vec<String> {
        self.inner.lock().outputs.iter().map(|o| o.device_id.clone()).collect()
    }

    /// Registration fails with `error` from now on
    pub fn fail_registration(&self, error: TransportError) {
        self.inner.lock().registration_error = Some(error);
    }

    /// Deliver an incoming call through the subscribed sink
    pub fn ring(&self, call: &SimCall) -> bool {
        let sink = self.inner.lock().sink.clone();
        match sink {
            Some(sink) => sink.incoming(Arc::new(call.clone())),
            None => false,
        }
    }

    /// Raise a runtime error through the subscribed sink
    pub fn raise_error(&self, error: TransportError) -> bool {
        let sink = self.inner.lock().sink.clone();
        sink.map_or(false, |sink| sink.error(error))
    }
}

#[async_trait]
impl Device for SimDevice {
    fn state(&self) -> DeviceState {
        self.inner.lock().state
    }

    fn subscribe(&self, sink: DeviceEventSink) {
        self.inner.lock().sink = Some(sink);
    }

    async fn register(&self) -> Result<(), TransportError> {
        let sink = {
            let mut inner = self.inner.lock();
            if inner.state == DeviceState::Destroyed {
                return Err(TransportError::DeviceDestroyed);
            }
            if let Some(error) = inner.registration_error.clone() {
                return Err(error);
            }
            inner.state = DeviceState::Registered;
            inner.sink.clone()
        };

        if let Some(sink) = sink {
            sink.registered();
        }
        Ok(())
    }

    async fn destroy(&self) {
        let mut inner = self.inner.lock();
        inner.state = DeviceState::Destroyed;
        inner.destroy_count += 1;
    }

    fn set_audio_constraints(&self, constraints: &AudioConstraints) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if inner.reject_constraints {
            return Err(TransportError::invalid_constraint(format!("{:?}", constraints)));
        }
        inner.constraints = Some(constraints.clone());
        Ok(())
    }

    fn unset_audio_constraints(&self) {
        let mut inner = self.inner.lock();
        inner.constraints = None;
        inner.constraint_resets += 1;
    }

    fn input_device(&self) -> Option<AudioDeviceInfo> {
        self.inner.lock().input.clone()
    }

    async fn set_input_device(&self, device_id: &str) -> Result<(), TransportError> {
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock();
        if inner.fail_input {
            return Err(TransportError::audio_device(device_id, "input not available"));
        }
        inner.input = Some(AudioDeviceInfo::new(device_id, device_id));
        Ok(())
    }

    fn output_devices(&self) -> Vec<AudioDeviceInfo> {
        self.inner.lock().outputs.clone()
    }

    fn set_output_device(&self, device_id: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if inner.failing_outputs.contains(device_id) {
            return Err(TransportError::audio_device(device_id, "output not available"));
        }
        if !inner.outputs.iter().any(|o| o.device_id == device_id) {
            inner.outputs.push(AudioDeviceInfo::new(device_id, device_id));
        }
        Ok(())
    }
}

// ===== CALL =====

struct CallInner {
    call_id: CallId,
    state: CallState,
    muted: bool,
    mute_history: Vec<bool>,
    sink: Option<CallEventSink>,
    accept_count: usize,
    accepted_with: Option<AcceptOptions>,
    fail_accept: bool,
    announce_accept: bool,
}

/// Simulated call leg
#[derive(Clone)]
pub struct SimCall {
    inner: Arc<Mutex<CallInner>>,
}

impl SimCall {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CallInner {
                call_id: CallId::new(call_id),
                state: CallState::Incoming,
                muted: false,
                mute_history: Vec::new(),
                sink: None,
                accept_count: 0,
                accepted_with: None,
                fail_accept: false,
                announce_accept: true,
            })),
        }
    }

    /// Call with a fresh `CA`-prefixed sid
    pub fn generated() -> Self {
        Self::new(format!("CA{}", Uuid::new_v4().simple()))
    }

    /// Keep `accept` from emitting the accept notification; use [`SimCall::emit_accept`]
    pub fn hold_accept_notification(&self) {
        self.inner.lock().announce_accept = false;
    }

    pub fn fail_accept(&self, fail: bool) {
        self.inner.lock().fail_accept = fail;
    }

    pub fn id(&self) -> CallId {
        self.inner.lock().call_id.clone()
    }

    pub fn accept_count(&self) -> usize {
        self.inner.lock().accept_count
    }

    pub fn accepted_with(&self) -> Option<AcceptOptions> {
        self.inner.lock().accepted_with.clone()
    }

    pub fn mute_history(&self) -> Vec<bool> {
        self.inner.lock().mute_history.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.lock().sink.is_some()
    }

    fn notify(&self, state: Option<CallState>, emit: impl FnOnce(&CallEventSink) -> bool) -> bool {
        let sink = {
            let mut inner = self.inner.lock();
            if let Some(state) = state {
                inner.state = state;
            }
            inner.sink.clone()
        };
        sink.map_or(false, |sink| emit(&sink))
    }

    pub fn emit_accept(&self) -> bool {
        self.notify(Some(CallState::Accepted), |sink| sink.accept())
    }

    /// Remote hangup
    pub fn disconnect(&self) -> bool {
        self.notify(Some(CallState::Disconnected), |sink| sink.disconnect())
    }

    pub fn reject(&self) -> bool {
        self.notify(Some(CallState::Rejected), |sink| sink.reject())
    }
}

#[async_trait]
impl CallHandle for SimCall {
    fn call_id(&self) -> CallId {
        self.id()
    }

    fn state(&self) -> CallState {
        self.inner.lock().state
    }

    fn subscribe(&self, sink: CallEventSink) {
        self.inner.lock().sink = Some(sink);
    }

    async fn accept(&self, options: Option<&AcceptOptions>) -> Result<(), TransportError> {
        let announce = {
            let mut inner = self.inner.lock();
            if inner.fail_accept {
                return Err(TransportError::accept(inner.call_id.0.clone(), "media setup failed"));
            }
            inner.accept_count += 1;
            inner.accepted_with = options.cloned();
            inner.announce_accept
        };

        if announce {
            self.emit_accept();
        }
        Ok(())
    }

    fn mute(&self, mute: bool) {
        let mut inner = self.inner.lock();
        inner.muted = mute;
        inner.mute_history.push(mute);
    }

    fn is_muted(&self) -> bool {
        self.inner.lock().muted
    }
}

// ===== TASKS AND CONFERENCES =====

/// Agent task list with a conference backend that applies hold commands
#[derive(Clone, Default)]
pub struct SimTaskBoard {
    tasks: Arc<Mutex<Vec<Task>>>,
    holds: Arc<Mutex<Vec<HoldParticipantRequest>>>,
}

impl SimTaskBoard {
    /// Worker sid of the simulated agent
    pub const AGENT_WORKER_SID: &'static str = "WK-agent";

    pub fn new() -> Self {
        Self::default()
    }

    /// Two-party voice task: the agent's leg and one customer, both joined
    pub fn voice_task(task_sid: &str, agent_call_sid: &str, customer_call_sid: &str) -> Task {
        let mut task = Task::new(task_sid).with_conference(Conference {
            conference_sid: Some(format!("CF-{task_sid}")),
            participants: vec![
                ConferenceParticipant {
                    participant_type: ParticipantRole::Worker,
                    status: ParticipantStatus::Joined,
                    is_current_worker: true,
                    call_sid: Some(CallId::from(agent_call_sid)),
                    worker_sid: Some(Self::AGENT_WORKER_SID.to_string()),
                },
                ConferenceParticipant {
                    participant_type: ParticipantRole::Customer,
                    status: ParticipantStatus::Joined,
                    is_current_worker: false,
                    call_sid: Some(CallId::from(customer_call_sid)),
                    worker_sid: None,
                },
            ],
        });
        task.attributes = Value::Object(Default::default());
        task
    }

    pub fn add_task(&self, task: Task) {
        self.tasks.lock().push(task);
    }

    pub fn remove_task(&self, task_sid: &str) {
        self.tasks.lock().retain(|t| t.task_sid != task_sid);
    }

    pub fn task(&self, task_sid: &str) -> Option<Task> {
        self.tasks.lock().iter().find(|t| t.task_sid == task_sid).cloned()
    }

    /// Add a participant row to a task's conference
    pub fn add_participant(&self, task_sid: &str, participant: ConferenceParticipant) {
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks.iter_mut().find(|t| t.task_sid == task_sid) {
            task.conference
                .get_or_insert_with(Conference::default)
                .participants
                .push(participant);
        }
    }

    /// Resume every held party of a task, as the host does for an unheld call
    pub fn resume_participants(&self, task_sid: &str) {
        let mut tasks = self.tasks.lock();
        if let Some(conference) = tasks
            .iter_mut()
            .find(|t| t.task_sid == task_sid)
            .and_then(|t| t.conference.as_mut())
        {
            for p in conference.participants.iter_mut() {
                if !p.is_current_worker && p.status == ParticipantStatus::Holding {
                    p.status = ParticipantStatus::Joined;
                }
            }
        }
    }

    pub fn hold_requests(&self) -> Vec<HoldParticipantRequest> {
        self.holds.lock().clone()
    }

    /// Status of the row addressed by `target_sid` in a task's conference
    pub fn participant_status(&self, task_sid: &str, target_sid: &str) -> Option<ParticipantStatus> {
        self.task(task_sid)?
            .participants()
            .iter()
            .find(|p| p.target_sid().as_deref() == Some(target_sid))
            .map(|p| p.status)
    }
}

impl TaskSource for SimTaskBoard {
    fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }
}

#[async_trait]
impl ConferenceControl for SimTaskBoard {
    async fn hold_participant(&self, request: HoldParticipantRequest) -> Result<(), ConferenceError> {
        self.holds.lock().push(request.clone());

        let mut tasks = self.tasks.lock();
        let task = tasks
            .iter_mut()
            .find(|t| t.task_sid == request.task_sid)
            .ok_or_else(|| ConferenceError::TaskNotFound {
                task_sid: request.task_sid.clone(),
            })?;

        let row = task
            .conference
            .as_mut()
            .and_then(|c| {
                c.participants
                    .iter_mut()
                    .find(|p| p.target_sid().as_deref() == Some(request.target_sid.as_str()))
            })
            .ok_or_else(|| ConferenceError::HoldFailed {
                target_sid: request.target_sid.clone(),
                message: "participant not in conference".to_string(),
            })?;

        row.status = ParticipantStatus::Holding;
        Ok(())
    }
}

// ===== SHARED STATE =====

/// Publisher that keeps every dispatched action
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    actions: Arc<Mutex<Vec<StateAction>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<StateAction> {
        self.actions.lock().clone()
    }
}

impl StatePublisher for RecordingPublisher {
    fn dispatch(&self, action: StateAction) {
        self.actions.lock().push(action);
    }
}
