//! Session registry
//!
//! Holds the at-most-two call legs the agent is carrying: one on the primary line
//! and one on the secondary line, plus the secondary call that is ringing but not
//! yet accepted. The registry is owned by the dispatch loop; nothing else mutates
//! it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::conference::Task;
use crate::transport::{CallHandle, CallId, CallState, Line};

/// A call leg observed by the coordinator
#[derive(Clone)]
pub struct CallSession {
    pub call_id: CallId,
    pub line: Line,
    pub state: CallState,
    pub muted: bool,
    pub bound_at: DateTime<Utc>,
    handle: Arc<dyn CallHandle>,
}

impl CallSession {
    pub fn new(line: Line, handle: Arc<dyn CallHandle>) -> Self {
        Self {
            call_id: handle.call_id(),
            line,
            state: handle.state(),
            muted: handle.is_muted(),
            bound_at: Utc::now(),
            handle,
        }
    }

    pub fn handle(&self) -> &Arc<dyn CallHandle> {
        &self.handle
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            call_id: self.call_id.clone(),
            line: self.line,
            state: self.state,
            muted: self.muted,
        }
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("call_id", &self.call_id)
            .field("line", &self.line)
            .field("state", &self.state)
            .field("muted", &self.muted)
            .finish()
    }
}

/// Serializable view of a call leg, published to shared state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub call_id: CallId,
    pub line: Line,
    pub state: CallState,
    pub muted: bool,
}

/// Primary and secondary call slots
#[derive(Default)]
pub struct SessionRegistry {
    primary: Option<CallSession>,
    secondary: Option<CallSession>,
    pending_secondary: Option<Arc<dyn CallHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call identifier of the agent's own leg in a task's conference
    ///
    /// Scans the roster for the row that is the current worker and still joined.
    /// A task without a conference, or without such a row, yields `None`.
    pub fn my_call_id(task: &Task) -> Option<CallId> {
        task.participants()
            .iter()
            .filter(|p| p.is_current_worker && p.is_joined())
            .filter_map(|p| p.call_sid.clone())
            .last()
    }

    pub fn call(&self, line: Line) -> Option<&CallSession> {
        match line {
            Line::Primary => self.primary.as_ref(),
            Line::Secondary => self.secondary.as_ref(),
        }
    }

    fn slot_mut(&mut self, line: Line) -> &mut Option<CallSession> {
        match line {
            Line::Primary => &mut self.primary,
            Line::Secondary => &mut self.secondary,
        }
    }

    pub fn primary(&self) -> Option<&CallSession> {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> Option<&CallSession> {
        self.secondary.as_ref()
    }

    /// Bind a call into a slot, returning whatever it replaced
    pub fn bind(&mut self, line: Line, handle: Arc<dyn CallHandle>) -> Option<CallSession> {
        let session = CallSession::new(line, handle);
        debug!(call_id = %session.call_id, %line, "Bound call");
        self.slot_mut(line).replace(session)
    }

    /// Clear a slot only if it still holds `call_id`
    pub fn release(&mut self, line: Line, call_id: &CallId) -> Option<CallSession> {
        let slot = self.slot_mut(line);
        if slot.as_ref().map_or(false, |s| &s.call_id == call_id) {
            debug!(%call_id, %line, "Released call");
            slot.take()
        } else {
            None
        }
    }

    /// Line whose slot holds `call_id`
    pub fn line_of(&self, call_id: &CallId) -> Option<Line> {
        [Line::Primary, Line::Secondary]
            .into_iter()
            .find(|line| self.call(*line).map_or(false, |s| &s.call_id == call_id))
    }

    pub fn set_state(&mut self, call_id: &CallId, state: CallState) {
        if let Some(line) = self.line_of(call_id) {
            if let Some(session) = self.slot_mut(line).as_mut() {
                session.state = state;
            }
        }
    }

    /// Mute or unmute whichever slot owns `call_id`
    ///
    /// Returns false when neither slot matches; that is an expected miss.
    pub fn mute_call(&mut self, call_id: &CallId, mute: bool) -> bool {
        let Some(line) = self.line_of(call_id) else {
            trace!(%call_id, "No call leg to mute");
            return false;
        };

        match self.slot_mut(line).as_mut() {
            Some(session) => {
                session.handle.mute(mute);
                session.muted = mute;
                debug!(%call_id, %line, mute, "Muted call leg");
                true
            }
            None => false,
        }
    }

    pub fn set_pending_secondary(&mut self, handle: Arc<dyn CallHandle>) {
        self.pending_secondary = Some(handle);
    }

    pub fn pending_secondary(&self) -> Option<&Arc<dyn CallHandle>> {
        self.pending_secondary.as_ref()
    }

    pub fn pending_secondary_id(&self) -> Option<CallId> {
        self.pending_secondary.as_ref().map(|h| h.call_id())
    }

    /// Drop the ringing secondary call if it is `call_id`
    pub fn take_pending_secondary(&mut self, call_id: &CallId) -> Option<Arc<dyn CallHandle>> {
        if self.pending_secondary_id().as_ref() == Some(call_id) {
            self.pending_secondary.take()
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.primary = None;
        self.secondary = None;
        self.pending_secondary = None;
    }
}
