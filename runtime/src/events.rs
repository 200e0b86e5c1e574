//! Events - What Listeners See
//!
//! Two events leave a machine:
//! - `ready`: the cursor settled on a regular node
//! - `error`: a request failed
//!
//! Branch nodes never produce a `ready` event; listeners only see where a
//! branch chain ends.

use revir_flow::{FlowError, FlowFault, Graph};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    State,
    Branch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyEvent {
    pub current: String,
    /// The node's props, `null` when it has none.
    pub props: Value,
    pub state_type: StateType,
}

impl ReadyEvent {
    /// Describe `current` as found in `graph`.
    pub fn describe(graph: Option<&Graph>, current: &str) -> Self {
        let node = graph.and_then(|g| g.node(current));
        Self {
            current: current.to_string(),
            props: node.map(|n| n.props.clone()).unwrap_or(Value::Null),
            state_type: match node {
                Some(n) if n.is_branch() => StateType::Branch,
                _ => StateType::State,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEvent {
    pub error: FlowError,
    /// Number of the request that failed.
    pub attempt: u64,
}

impl From<&FlowFault> for ErrorEvent {
    fn from(fault: &FlowFault) -> Self {
        Self {
            error: fault.error.clone(),
            attempt: fault.attempt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum FlowEvent {
    Ready(ReadyEvent),
    Error(ErrorEvent),
}

impl FlowEvent {
    pub fn name(&self) -> EventName {
        match self {
            FlowEvent::Ready(_) => EventName::Ready,
            FlowEvent::Error(_) => EventName::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Unknown event '{0}', expected 'ready' or 'error'")]
    UnknownEvent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Ready,
    Error,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Ready => "ready",
            EventName::Error => "error",
        }
    }
}

impl FromStr for EventName {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(EventName::Ready),
            "error" => Ok(EventName::Error),
            other => Err(EventError::UnknownEvent(other.to_string())),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revir_flow::Node;
    use serde_json::json;

    #[test]
    fn test_event_names() {
        assert_eq!("ready".parse::<EventName>(), Ok(EventName::Ready));
        assert_eq!("error".parse::<EventName>(), Ok(EventName::Error));
        assert_eq!(
            "changed".parse::<EventName>(),
            Err(EventError::UnknownEvent("changed".into()))
        );
        assert_eq!(EventName::Ready.to_string(), "ready");
    }

    #[test]
    fn test_ready_event_shape() {
        let graph = Graph::new("RunPayroll").with_node(
            "RunPayroll",
            Node::new().with_props(json!({"layout": "trowser"})),
        );
        let event = FlowEvent::Ready(ReadyEvent::describe(Some(&graph), "RunPayroll"));
        assert_eq!(event.name(), EventName::Ready);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "ready",
                "current": "RunPayroll",
                "props": {"layout": "trowser"},
                "stateType": "state"
            })
        );
    }

    #[test]
    fn test_unknown_node_describes_as_plain_state() {
        let event = ReadyEvent::describe(None, "Anywhere");
        assert_eq!(event.props, Value::Null);
        assert_eq!(event.state_type, StateType::State);
    }
}
