//! Reducer - The Pure Transition Function
//!
//! `reduce(state, command)` computes the next [`FlowState`] without touching
//! a store, a channel or a clock. It also names the branch node whose
//! resolver must run next, if any; running it is the runtime's job.
//!
//! # Rules
//! - A node leaving `current` is pushed onto `history` unless it is a branch.
//! - A failed request changes nothing; the error is returned instead.
//! - Placing the cursor on a graph can fail while the rest of the request
//!   still applies. That failure rides along in [`Reduction::error`].
//! - Going back skips any branch node found in `history`.

use crate::error::FlowError;
use crate::graph::Graph;
use crate::state::FlowState;

/// A request against a flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Settle a freshly seeded state: derive `current` from the graph's start
    /// node and resolve it if it is a branch.
    Start,
    /// Follow the named transition of the current node. An empty name on a
    /// node without transitions means "go back".
    Transition(String),
    /// Pop the history.
    Previous,
    /// Swap the graph. `current`, `history` and `error` are kept.
    Replace(Graph),
    /// Move to the named node without consulting any transition table.
    Jump(String),
}

impl Command {
    pub fn label(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Transition(_) => "transition",
            Command::Previous => "previous",
            Command::Replace(_) => "replace",
            Command::Jump(_) => "jump",
        }
    }

    /// The transition name carried by the command, if any.
    pub fn transition_name(&self) -> Option<&str> {
        match self {
            Command::Transition(name) => Some(name),
            _ => None,
        }
    }
}

/// The result of a successful reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub state: FlowState,
    /// Branch node whose resolver has to run before the flow is `Ready`.
    pub resolve: Option<String>,
    /// A failure to record next to `state`.
    pub error: Option<FlowError>,
}

impl Reduction {
    fn settled(state: FlowState) -> Self {
        Self {
            state,
            resolve: None,
            error: None,
        }
    }

    fn faulted(state: FlowState, error: FlowError) -> Self {
        Self {
            state,
            resolve: None,
            error: Some(error),
        }
    }
}

pub fn reduce(state: &FlowState, command: Command) -> Result<Reduction, FlowError> {
    match command {
        Command::Start => start(state),
        Command::Transition(name) => transition(state, name),
        Command::Previous => Ok(previous(state)),
        Command::Replace(graph) => replace(state, graph),
        Command::Jump(name) => jump(state, &name),
    }
}

/// Place the cursor: keep a seeded `current`, otherwise use the start node.
///
/// A cursor naming a node the graph lacks is cleared and reported, leaving
/// the graph in place so a later jump can recover.
fn start(state: &FlowState) -> Result<Reduction, FlowError> {
    let Some(graph) = state.nodes.as_ref() else {
        return Ok(Reduction::settled(state.clone()));
    };
    let mut next = state.clone();
    let current = state.current.clone().unwrap_or_else(|| graph.start.clone());
    if !graph.contains(&current) {
        next.current = None;
        return Ok(Reduction::faulted(next, FlowError::UnknownNode { node: current }));
    }
    let resolve = graph.is_branch(&current).then(|| current.clone());
    next.current = Some(current);
    Ok(Reduction {
        state: next,
        resolve,
        error: None,
    })
}

fn transition(state: &FlowState, name: String) -> Result<Reduction, FlowError> {
    let graph = state.nodes.as_ref().ok_or(FlowError::NotStarted)?;
    let current = state.current.as_deref().ok_or(FlowError::NotStarted)?;

    let Some(table) = graph.transition_table(current)? else {
        if name.is_empty() {
            tracing::debug!(node = current, "No transitions at node, going back");
            return Ok(previous(state));
        }
        return Err(FlowError::NoTransitions {
            node: current.to_string(),
            transition: name,
        });
    };

    let target = table
        .get(&name)
        .ok_or_else(|| FlowError::UnknownTransition {
            node: current.to_string(),
            transition: name.clone(),
        })?;
    if !graph.contains(target) {
        return Err(FlowError::UnknownNode {
            node: target.clone(),
        });
    }

    let mut reduction = enter(state, graph, target);
    reduction.state.transition = Some(name);
    Ok(reduction)
}

fn previous(state: &FlowState) -> Reduction {
    let mut next = state.clone();
    while let Some(name) = next.history.pop() {
        if state.is_branch(&name) {
            tracing::debug!(node = %name, "Skipping branch node in history");
            continue;
        }
        next.current = Some(name);
        break;
    }
    Reduction::settled(next)
}

fn replace(state: &FlowState, graph: Graph) -> Result<Reduction, FlowError> {
    let mut next = state.clone();
    next.nodes = Some(graph);
    if state.current.is_some() {
        return Ok(Reduction::settled(next));
    }
    // First graph assignment also places the cursor.
    start(&next)
}

fn jump(state: &FlowState, name: &str) -> Result<Reduction, FlowError> {
    let graph = state.nodes.as_ref().ok_or(FlowError::NotStarted)?;
    if !graph.contains(name) {
        return Err(FlowError::UnknownNode {
            node: name.to_string(),
        });
    }
    Ok(enter(state, graph, name))
}

fn enter(state: &FlowState, graph: &Graph, target: &str) -> Reduction {
    let mut next = state.clone();
    if let Some(current) = &state.current {
        if !graph.is_branch(current) {
            next.history.push(current.clone());
        }
    }
    next.current = Some(target.to_string());
    Reduction {
        state: next,
        resolve: graph.is_branch(target).then(|| target.to_string()),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use revir_core::resolver::{ResolverError, resolver_fn};

    fn branch() -> Node {
        Node::new().with_resolver(resolver_fn(|_| async {
            Ok::<_, ResolverError>("Ready".to_string())
        }))
    }

    fn list_graph() -> Graph {
        Graph::new("List")
            .with_node(
                "List",
                Node::new()
                    .transition("add", "Add")
                    .transition("check", "Check")
                    .transition("ghost", "Ghost"),
            )
            .with_node("Add", Node::new().transition("back", "List"))
            .with_node("Edit", Node::new().alias("Add"))
            .with_node(
                "Check",
                branch()
                    .transition("Ready", "Done")
                    .transition("Again", "Check"),
            )
            .with_node("Done", Node::new())
    }

    fn started() -> FlowState {
        reduce(&FlowState::with_graph(list_graph()), Command::Start)
            .unwrap()
            .state
    }

    fn apply(state: &FlowState, command: Command) -> FlowState {
        reduce(state, command).unwrap().state
    }

    #[test]
    fn test_start_derives_current_from_start_node() {
        let state = started();
        assert_eq!(state.current.as_deref(), Some("List"));
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_start_without_graph_is_noop() {
        let reduction = reduce(&FlowState::default(), Command::Start).unwrap();
        assert_eq!(reduction.state, FlowState::default());
    }

    #[test]
    fn test_start_reports_missing_start_node() {
        let graph = Graph::new("Nowhere");
        let reduction = reduce(&FlowState::with_graph(graph.clone()), Command::Start).unwrap();
        assert_eq!(
            reduction.error,
            Some(FlowError::UnknownNode {
                node: "Nowhere".into()
            })
        );
        assert_eq!(reduction.state.current, None);
        assert_eq!(reduction.state.nodes, Some(graph));
    }

    #[test]
    fn test_start_clears_seeded_cursor_outside_graph() {
        let mut state = FlowState::with_graph(list_graph());
        state.current = Some("Ghost".into());
        state.history = vec!["List".into()];

        let reduction = reduce(&state, Command::Start).unwrap();
        assert_eq!(
            reduction.error,
            Some(FlowError::UnknownNode {
                node: "Ghost".into()
            })
        );
        assert_eq!(reduction.state.current, None);
        assert_eq!(reduction.state.history, vec!["List"]);
        assert_eq!(reduction.resolve, None);
    }

    #[test]
    fn test_start_keeps_seeded_cursor() {
        let mut state = FlowState::with_graph(list_graph());
        state.current = Some("Add".into());
        let reduction = reduce(&state, Command::Start).unwrap();
        assert_eq!(reduction.error, None);
        assert_eq!(reduction.state.current.as_deref(), Some("Add"));
    }

    #[test]
    fn test_transition_and_previous() {
        let state = apply(&started(), Command::Transition("add".into()));
        assert_eq!(state.current.as_deref(), Some("Add"));
        assert_eq!(state.history, vec!["List"]);
        assert_eq!(state.transition.as_deref(), Some("add"));

        let state = apply(&state, Command::Previous);
        assert_eq!(state.current.as_deref(), Some("List"));
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_previous_with_empty_history_is_noop() {
        let state = started();
        assert_eq!(apply(&state, Command::Previous), state);
    }

    #[test]
    fn test_alias_table_is_used() {
        let mut state = started();
        state.current = Some("Edit".into());
        let state = apply(&state, Command::Transition("back".into()));
        assert_eq!(state.current.as_deref(), Some("List"));
        assert_eq!(state.history, vec!["Edit"]);
    }

    #[test]
    fn test_unknown_transition_leaves_state_alone() {
        assert_eq!(
            reduce(&started(), Command::Transition("bogus".into())),
            Err(FlowError::UnknownTransition {
                node: "List".into(),
                transition: "bogus".into()
            })
        );
    }

    #[test]
    fn test_unknown_target_node() {
        assert_eq!(
            reduce(&started(), Command::Transition("ghost".into())),
            Err(FlowError::UnknownNode {
                node: "Ghost".into()
            })
        );
    }

    #[test]
    fn test_end_node_rejects_named_transition() {
        let mut state = started();
        state.current = Some("Done".into());
        assert_eq!(
            reduce(&state, Command::Transition("next".into())),
            Err(FlowError::NoTransitions {
                node: "Done".into(),
                transition: "next".into()
            })
        );
    }

    #[test]
    fn test_end_node_empty_transition_goes_back() {
        let state = apply(&started(), Command::Transition("add".into()));
        let mut state = apply(&state, Command::Jump("Done".into()));
        assert_eq!(state.history, vec!["List", "Add"]);

        state = apply(&state, Command::Transition(String::new()));
        assert_eq!(state.current.as_deref(), Some("Add"));
        assert_eq!(state.history, vec!["List"]);
    }

    #[test]
    fn test_entering_branch_requests_resolution() {
        let reduction = reduce(&started(), Command::Transition("check".into())).unwrap();
        assert_eq!(reduction.resolve.as_deref(), Some("Check"));
        assert_eq!(reduction.state.current.as_deref(), Some("Check"));
        assert_eq!(reduction.state.history, vec!["List"]);

        // Leaving the branch does not record it.
        let next = reduce(&reduction.state, Command::Transition("Ready".into())).unwrap();
        assert_eq!(next.resolve, None);
        assert_eq!(next.state.current.as_deref(), Some("Done"));
        assert_eq!(next.state.history, vec!["List"]);
    }

    #[test]
    fn test_previous_skips_branch_nodes() {
        let mut state = started();
        state.history = vec!["List".into(), "Check".into()];
        state.current = Some("Done".into());

        let state = apply(&state, Command::Previous);
        assert_eq!(state.current.as_deref(), Some("List"));
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_previous_over_only_branches_keeps_current() {
        let mut state = started();
        state.history = vec!["Check".into()];
        state.current = Some("Done".into());

        let state = apply(&state, Command::Previous);
        assert_eq!(state.current.as_deref(), Some("Done"));
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_replace_keeps_cursor() {
        let state = apply(&started(), Command::Transition("add".into()));
        let graph = Graph::new("Other").with_node("Other", Node::new());
        let replaced = apply(&state, Command::Replace(graph.clone()));

        assert_eq!(replaced.nodes, Some(graph));
        assert_eq!(replaced.current.as_deref(), Some("Add"));
        assert_eq!(replaced.history, vec!["List"]);
    }

    #[test]
    fn test_first_replace_places_cursor() {
        let reduction = reduce(&FlowState::default(), Command::Replace(list_graph())).unwrap();
        assert_eq!(reduction.state.current.as_deref(), Some("List"));

        let graph = list_graph().with_node("List", branch());
        let reduction = reduce(&FlowState::default(), Command::Replace(graph)).unwrap();
        assert_eq!(reduction.resolve.as_deref(), Some("List"));
    }

    #[test]
    fn test_first_replace_keeps_graph_with_missing_start() {
        let graph = Graph::new("Missing").with_node("A", Node::new());
        let reduction = reduce(&FlowState::default(), Command::Replace(graph.clone())).unwrap();
        assert_eq!(reduction.state.nodes, Some(graph));
        assert_eq!(reduction.state.current, None);
        assert_eq!(
            reduction.error,
            Some(FlowError::UnknownNode {
                node: "Missing".into()
            })
        );

        // The kept graph lets a jump place the cursor.
        let state = apply(&reduction.state, Command::Jump("A".into()));
        assert_eq!(state.current.as_deref(), Some("A"));
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_jump_pushes_history_and_validates_target() {
        let state = apply(&started(), Command::Jump("Done".into()));
        assert_eq!(state.current.as_deref(), Some("Done"));
        assert_eq!(state.history, vec!["List"]);

        assert!(matches!(
            reduce(&state, Command::Jump("Ghost".into())),
            Err(FlowError::UnknownNode { .. })
        ));
    }

    #[test]
    fn test_requests_before_graph_fail() {
        let idle = FlowState::default();
        assert_eq!(
            reduce(&idle, Command::Transition("add".into())),
            Err(FlowError::NotStarted)
        );
        assert_eq!(reduce(&idle, Command::Jump("List".into())), Err(FlowError::NotStarted));
        assert_eq!(apply(&idle, Command::Previous), idle);
    }
}
