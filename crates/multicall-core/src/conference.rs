//! Tasks, conference rosters and the capabilities that expose them
//!
//! The coordinator reads the agent's live task set through [`TaskSource`] and
//! changes a roster only by issuing hold commands through [`ConferenceControl`].
//! Neither collection is ever written directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConferenceError;
use crate::transport::CallId;

/// Role of a conference participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Worker,
    Customer,
    Other,
}

/// Roster status of a conference participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Joined,
    Holding,
    Leaving,
    Left,
}

/// One party in a call's multi-party session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceParticipant {
    pub participant_type: ParticipantRole,
    pub status: ParticipantStatus,
    /// Row represents the agent running this coordinator
    pub is_current_worker: bool,
    #[serde(default)]
    pub call_sid: Option<CallId>,
    #[serde(default)]
    pub worker_sid: Option<String>,
}

impl ConferenceParticipant {
    /// Identifier hold commands are addressed to: the worker sid for workers,
    /// the call sid for everyone else
    pub fn target_sid(&self) -> Option<String> {
        match self.participant_type {
            ParticipantRole::Worker => self.worker_sid.clone(),
            _ => self.call_sid.as_ref().map(|sid| sid.0.clone()),
        }
    }

    pub fn is_joined(&self) -> bool {
        self.status == ParticipantStatus::Joined
    }
}

/// Conference attached to a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conference {
    #[serde(default)]
    pub conference_sid: Option<String>,
    #[serde(default)]
    pub participants: Vec<ConferenceParticipant>,
}

/// A work item assigned to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_sid: String,
    #[serde(default)]
    pub conference: Option<Conference>,
    #[serde(default)]
    pub attributes: Value,
}

impl Task {
    pub fn new(task_sid: impl Into<String>) -> Self {
        Self {
            task_sid: task_sid.into(),
            conference: None,
            attributes: Value::Null,
        }
    }

    pub fn with_conference(mut self, conference: Conference) -> Self {
        self.conference = Some(conference);
        self
    }

    /// Participants of the attached conference, empty without one
    pub fn participants(&self) -> &[ConferenceParticipant] {
        self.conference
            .as_ref()
            .map(|c| c.participants.as_slice())
            .unwrap_or(&[])
    }
}

/// Hold command addressed to one participant of a task's conference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldParticipantRequest {
    pub participant_type: ParticipantRole,
    pub task_sid: String,
    pub target_sid: String,
}

/// Read-only view of the agent's live tasks
pub trait TaskSource: Send + Sync {
    /// Snapshot of every task currently assigned to the agent
    fn tasks(&self) -> Vec<Task>;

    /// Look up a live task by sid
    fn task_by_sid(&self, task_sid: &str) -> Option<Task> {
        self.tasks().into_iter().find(|t| t.task_sid == task_sid)
    }
}

/// Conference control capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConferenceControl: Send + Sync {
    async fn hold_participant(&self, request: HoldParticipantRequest) -> Result<(), ConferenceError>;
}
