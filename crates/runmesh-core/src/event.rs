//! Cluster-wide session notifications. Never persisted.

use serde::{Deserialize, Serialize};

use crate::id::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEventKind {
    KillAction,
    Close,
}

/// `{kind, run_id, payload}`; `KillAction` carries `{"action": <name>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub run_id: RunId,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SessionEvent {
    pub fn kill_action(run_id: RunId, action_name: impl Into<String>) -> Self {
        Self {
            kind: SessionEventKind::KillAction,
            run_id,
            payload: serde_json::json!({ "action": action_name.into() }),
        }
    }

    pub fn close(run_id: RunId) -> Self {
        Self {
            kind: SessionEventKind::Close,
            run_id,
            payload: serde_json::Value::Null,
        }
    }

    /// Target action of a kill notification.
    pub fn action_name(&self) -> Option<&str> {
        self.payload.get("action").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_event_round_trips_through_json() {
        let e = SessionEvent::kill_action(RunId::new("r1"), "crawl");
        let text = serde_json::to_string(&e).unwrap();
        assert!(text.contains("KILL_ACTION"));
        let back: SessionEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back.action_name(), Some("crawl"));
        assert_eq!(SessionEvent::close(RunId::new("r1")).action_name(), None);
    }
}
