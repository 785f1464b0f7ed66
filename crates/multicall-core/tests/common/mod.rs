//! Shared harness: a running coordinator wired to the simulator

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use multicall_core::sim::{RecordingPublisher, SimCall, SimDevice, SimTaskBoard, SimTransport};
use multicall_core::{
    CallHandle, CoordinatorDeps, CoordinatorHandle, MultiCallConfig, MultiCallCoordinator, SessionRegistry,
    SessionSnapshot,
};

pub struct Harness {
    pub transport: SimTransport,
    pub primary: SimDevice,
    pub board: SimTaskBoard,
    pub publisher: RecordingPublisher,
    pub handle: CoordinatorHandle,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with(MultiCallConfig::new().with_enabled(true))
    }

    pub fn start_with(config: MultiCallConfig) -> Self {
        let transport = SimTransport::new("test-token");
        let primary = SimDevice::standalone();
        let board = SimTaskBoard::new();
        let publisher = RecordingPublisher::new();

        let handle = MultiCallCoordinator::start(
            config,
            CoordinatorDeps {
                transport: Arc::new(transport.clone()),
                primary_device: Arc::new(primary.clone()),
                tasks: Arc::new(board.clone()),
                conference: Arc::new(board.clone()),
                publisher: Arc::new(publisher.clone()),
            },
        )
        .expect("coordinator should start");

        Self {
            transport,
            primary,
            board,
            publisher,
            handle,
        }
    }

    /// Let spawned steps report back, then drain the queue
    pub async fn settle(&self) -> SessionSnapshot {
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.handle.snapshot().await.expect("coordinator running");
        }
        self.handle.snapshot().await.expect("coordinator running")
    }

    /// Put a two-party task on the board and ring its call on the primary line
    pub async fn primary_call(&self, task_sid: &str, call_sid: &str) -> SimCall {
        self.board.add_task(SimTaskBoard::voice_task(
            task_sid,
            call_sid,
            &format!("{call_sid}-customer"),
        ));
        let call = SimCall::new(call_sid);
        assert!(self.primary.ring(&call), "primary device not subscribed");
        self.settle().await;
        call
    }

    /// Put a two-party task on the board and ring its call on the secondary device
    pub async fn secondary_call(&self, task_sid: &str, call_sid: &str) -> SimCall {
        self.board.add_task(SimTaskBoard::voice_task(
            task_sid,
            call_sid,
            &format!("{call_sid}-customer"),
        ));
        let call = SimCall::new(call_sid);
        assert!(self.secondary_device().ring(&call), "secondary device not subscribed");
        self.settle().await;
        call
    }

    pub fn secondary_device(&self) -> SimDevice {
        self.transport.last_device().expect("secondary device provisioned")
    }

    /// Tasks on which the agent has a joined, unmuted leg among `calls`
    pub fn live_unheld_tasks(&self, calls: &[&SimCall]) -> Vec<String> {
        use multicall_core::TaskSource;

        self.board
            .tasks()
            .into_iter()
            .filter(|task| {
                SessionRegistry::my_call_id(task).map_or(false, |id| {
                    calls
                        .iter()
                        .any(|c| c.call_id() == id && !c.is_muted() && !c.state().is_terminal())
                })
            })
            .map(|task| task.task_sid)
            .collect()
    }
}
