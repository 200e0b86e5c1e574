use serde::Serialize;
use thiserror::Error;

/// Graph traversal failures.
///
/// These are domain errors: the machine records them as the flow's error and
/// broadcasts them instead of returning them to the caller that requested
/// the transition. `current` is never moved by a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowError {
    #[error("No transitions available at node '{node}' for '{transition}'")]
    NoTransitions { node: String, transition: String },

    #[error("No '{transition}' transition found at node '{node}'")]
    UnknownTransition { node: String, transition: String },

    #[error("No '{node}' node available to transition to")]
    UnknownNode { node: String },

    #[error("Branch chain exceeded {limit} resolutions at node '{node}'")]
    CyclicBranch { node: String, limit: usize },

    #[error("Resolver of branch node '{node}' failed: {message}")]
    ResolverFailed { node: String, message: String },

    #[error("Resolver of branch node '{node}' timed out after {timeout_ms} ms")]
    ResolverTimeout { node: String, timeout_ms: u64 },

    #[error("Flow has no current node; supply a graph first")]
    NotStarted,
}

/// Payload-free tag of a [`FlowError`], handy for matching in listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoTransitions,
    UnknownTransition,
    UnknownNode,
    CyclicBranch,
    ResolverFailed,
    ResolverTimeout,
    NotStarted,
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::NoTransitions { .. } => ErrorKind::NoTransitions,
            FlowError::UnknownTransition { .. } => ErrorKind::UnknownTransition,
            FlowError::UnknownNode { .. } => ErrorKind::UnknownNode,
            FlowError::CyclicBranch { .. } => ErrorKind::CyclicBranch,
            FlowError::ResolverFailed { .. } => ErrorKind::ResolverFailed,
            FlowError::ResolverTimeout { .. } => ErrorKind::ResolverTimeout,
            FlowError::NotStarted => ErrorKind::NotStarted,
        }
    }
}
