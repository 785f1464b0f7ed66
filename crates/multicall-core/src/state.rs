//! Shared application state publishing
//!
//! The host UI learns about the secondary call through a single fire-and-forget
//! dispatch of a tagged action.

use serde::{Deserialize, Serialize};

use crate::registry::CallSnapshot;

/// Action pushed into process-wide application state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateAction {
    /// A call on the secondary line is live
    AddSecondaryCall(CallSnapshot),
}

/// Dispatch primitive of the host application's store
pub trait StatePublisher: Send + Sync {
    fn dispatch(&self, action: StateAction);
}

/// Publisher that drops every action
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl StatePublisher for NoopPublisher {
    fn dispatch(&self, _action: StateAction) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{CallId, CallState, Line};

    #[test]
    fn test_action_wire_shape() {
        let action = StateAction::AddSecondaryCall(CallSnapshot {
            call_id: CallId::from("CA2"),
            line: Line::Secondary,
            state: CallState::Accepted,
            muted: false,
        });

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "ADD_SECONDARY_CALL");
        assert_eq!(json["payload"]["call_id"], "CA2");
        assert_eq!(json["payload"]["line"], "secondary");
    }
}
