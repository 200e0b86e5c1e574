//! FlowState - The Cursor Snapshot
//!
//! Everything a flow knows at one instant: which node is current, the graph
//! it walks, how to get back, what was last requested and what last failed.

use crate::error::FlowError;
use crate::graph::{Graph, Node};
use serde::Serialize;

/// Where the cursor stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No graph has been supplied yet.
    Idle,
    /// The current node is a regular node waiting for the application.
    Ready,
    /// The current node is a branch node waiting for its resolver.
    Resolving,
}

/// A recorded failure.
///
/// `attempt` numbers every request a machine processes, so two identical
/// failures in a row are still two distinct records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowFault {
    pub attempt: u64,
    pub error: FlowError,
}

/// Snapshot of a flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowState {
    /// Name of the current node; `None` until a graph is supplied.
    pub current: Option<String>,
    pub nodes: Option<Graph>,
    /// Back-navigation stack of regular nodes, oldest first.
    pub history: Vec<String>,
    /// The last transition name that was applied.
    pub transition: Option<String>,
    /// The last failure. Never cleared automatically.
    pub error: Option<FlowFault>,
}

impl FlowState {
    pub fn with_graph(graph: Graph) -> Self {
        Self {
            nodes: Some(graph),
            ..Default::default()
        }
    }

    pub fn current_node(&self) -> Option<&Node> {
        let current = self.current.as_deref()?;
        self.nodes.as_ref()?.node(current)
    }

    /// `false` for unknown names and before a graph is supplied.
    pub fn is_branch(&self, name: &str) -> bool {
        self.nodes.as_ref().is_some_and(|g| g.is_branch(name))
    }

    pub fn phase(&self) -> Phase {
        match self.current_node() {
            None if self.current.is_none() => Phase::Idle,
            Some(node) if node.is_branch() => Phase::Resolving,
            _ => Phase::Ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revir_core::resolver::{ResolverError, resolver_fn};

    #[test]
    fn test_phase_follows_current_node() {
        let graph = Graph::new("List")
            .with_node("List", Node::new().transition("check", "Check"))
            .with_node(
                "Check",
                Node::new().with_resolver(resolver_fn(|_| async {
                    Ok::<_, ResolverError>("Ready".to_string())
                })),
            );

        let mut state = FlowState::default();
        assert_eq!(state.phase(), Phase::Idle);

        state.nodes = Some(graph);
        state.current = Some("List".into());
        assert_eq!(state.phase(), Phase::Ready);

        state.current = Some("Check".into());
        assert_eq!(state.phase(), Phase::Resolving);
        assert!(state.is_branch("Check"));
        assert!(!state.is_branch("List"));
    }
}
