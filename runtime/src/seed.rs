//! Seed - Initial Machine State
//!
//! Only the fields a seed sets are applied; everything else keeps its
//! default. A seed without `current` lets the machine derive it from the
//! graph's start node.

use revir_flow::{FlowState, Graph};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowSeed {
    pub nodes: Option<Graph>,
    pub current: Option<String>,
    pub history: Option<Vec<String>>,
}

impl FlowSeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(mut self, graph: Graph) -> Self {
        self.nodes = Some(graph);
        self
    }

    pub fn with_current(mut self, node: impl Into<String>) -> Self {
        self.current = Some(node.into());
        self
    }

    pub fn with_history<I, S>(mut self, history: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.history = Some(history.into_iter().map(Into::into).collect());
        self
    }

    /// Overwrite the fields of `defaults` this seed sets.
    pub fn apply_to(self, mut defaults: FlowState) -> FlowState {
        if let Some(nodes) = self.nodes {
            defaults.nodes = Some(nodes);
        }
        if let Some(current) = self.current {
            defaults.current = Some(current);
        }
        if let Some(history) = self.history {
            defaults.history = history;
        }
        defaults
    }
}

impl From<Graph> for FlowSeed {
    fn from(graph: Graph) -> Self {
        Self::new().with_nodes(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revir_flow::Node;

    #[test]
    fn test_only_present_fields_are_applied() {
        let defaults = FlowState {
            current: Some("Keep".into()),
            history: vec!["Old".into()],
            ..Default::default()
        };

        let state = FlowSeed::new().with_history(["A", "B"]).apply_to(defaults);
        assert_eq!(state.current.as_deref(), Some("Keep"));
        assert_eq!(state.history, vec!["A", "B"]);
        assert_eq!(state.nodes, None);
    }

    #[test]
    fn test_graph_seed_leaves_current_unset() {
        let graph = Graph::new("Start").with_node("Start", Node::new());
        let state = FlowSeed::from(graph.clone()).apply_to(FlowState::default());
        assert_eq!(state.nodes, Some(graph));
        assert_eq!(state.current, None);
    }
}
