//! Hold orchestration across the agent's live tasks
//!
//! Only one call the agent participates in may be active at a time. Making a call
//! active is defined as holding everything else: every other task's leg is muted
//! (holding a conference does not stop the agent's leg from being recorded), and
//! every other party still joined to those conferences is placed on hold through
//! conference control.
//!
//! ```text
//! unhold(task B)
//!   ├─ unmute B's leg
//!   └─ hold_others(B's leg)
//!        ├─ task A: mute A's leg, hold A's joined parties
//!        ├─ task B: skipped
//!        └─ task C: mute C's leg, hold C's joined parties
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use crate::conference::{ConferenceControl, HoldParticipantRequest, Task, TaskSource};
use crate::registry::SessionRegistry;
use crate::transport::CallId;

/// Task whose call should become the active one
#[derive(Debug, Clone)]
pub enum UnholdTarget {
    /// The task itself
    Task(Task),
    /// A live task, looked up by sid
    TaskSid(String),
}

/// What a hold pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoldReport {
    /// Legs muted on this device pair
    pub muted: Vec<CallId>,
    /// Hold commands accepted by conference control
    pub held: Vec<HoldParticipantRequest>,
    /// Hold commands that failed
    pub failed: Vec<HoldParticipantRequest>,
}

pub struct HoldOrchestrator {
    tasks: Arc<dyn TaskSource>,
    conference: Arc<dyn ConferenceControl>,
}

impl HoldOrchestrator {
    pub fn new(tasks: Arc<dyn TaskSource>, conference: Arc<dyn ConferenceControl>) -> Self {
        Self { tasks, conference }
    }

    /// Hold every live task except the one whose leg is `ignore_call_id`
    pub async fn hold_others(&self, registry: &mut SessionRegistry, ignore_call_id: &CallId) -> HoldReport {
        let mut report = HoldReport::default();

        for task in self.tasks.tasks() {
            let call_id = SessionRegistry::my_call_id(&task);
            if call_id.as_ref() == Some(ignore_call_id) {
                continue;
            }

            if let Some(call_id) = call_id {
                if registry.mute_call(&call_id, true) {
                    report.muted.push(call_id);
                }
            }

            for participant in task.participants() {
                if participant.is_current_worker || !participant.is_joined() {
                    continue;
                }
                let Some(target_sid) = participant.target_sid() else {
                    warn!(task_sid = %task.task_sid, "Joined participant has no addressable sid");
                    continue;
                };

                let request = HoldParticipantRequest {
                    participant_type: participant.participant_type,
                    task_sid: task.task_sid.clone(),
                    target_sid,
                };
                match self.conference.hold_participant(request.clone()).await {
                    Ok(()) => {
                        debug!(task_sid = %request.task_sid, target_sid = %request.target_sid, "Held participant");
                        report.held.push(request);
                    }
                    Err(e) => {
                        warn!("Failed to hold participant: {}", e);
                        report.failed.push(request);
                    }
                }
            }
        }

        report
    }

    /// Make the target task's call the only active one
    ///
    /// Returns `None` when the task cannot be resolved or the agent has no joined
    /// leg on it.
    pub async fn unhold(&self, registry: &mut SessionRegistry, target: UnholdTarget) -> Option<HoldReport> {
        let task = match target {
            UnholdTarget::Task(task) => task,
            UnholdTarget::TaskSid(sid) => match self.tasks.task_by_sid(&sid) {
                Some(task) => task,
                None => {
                    debug!(task_sid = %sid, "Unhold for unknown task");
                    return None;
                }
            },
        };

        let call_id = SessionRegistry::my_call_id(&task)?;
        registry.mute_call(&call_id, false);
        Some(self.hold_others(registry, &call_id).await)
    }
}
