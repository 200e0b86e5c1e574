//! Graph - Nodes and Named Transitions
//!
//! A graph maps node names to [`Node`]s and names the node a flow starts at.
//! Each node either owns a transition table, borrows another node's table by
//! naming that node (an alias), or has no table at all (an end node).
//!
//! Nothing is validated up front. A dangling target or alias is only
//! reported when a transition actually tries to use it.

use crate::error::FlowError;
use revir_core::resolver::Resolver;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Transition name -> target node name.
pub type TransitionTable = BTreeMap<String, String>;

/// The outgoing edges of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transitions {
    /// The node's own table.
    Table(TransitionTable),
    /// Use the table of the named node instead (one level only).
    Alias(String),
}

/// A named vertex of the flow.
///
/// A node with a resolver is a branch node: it is entered, resolved and left
/// without ever being shown to listeners or recorded for back-navigation.
#[derive(Clone, Default, Serialize)]
pub struct Node {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transitions: Option<Transitions>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub props: Value,
    #[serde(skip)]
    pub resolver: Option<Arc<dyn Resolver>>,
}

impl Node {
    /// A node without transitions, props or resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry to the node's own table.
    ///
    /// Replaces an alias if one was set.
    pub fn transition(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut table = match self.transitions.take() {
            Some(Transitions::Table(table)) => table,
            _ => TransitionTable::new(),
        };
        table.insert(name.into(), target.into());
        self.transitions = Some(Transitions::Table(table));
        self
    }

    /// Borrow the transition table of another node.
    pub fn alias(mut self, node: impl Into<String>) -> Self {
        self.transitions = Some(Transitions::Alias(node.into()));
        self
    }

    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    /// Make this a branch node.
    pub fn with_resolver<R: Resolver>(self, resolver: R) -> Self {
        self.with_shared_resolver(Arc::new(resolver))
    }

    pub fn with_shared_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn is_branch(&self) -> bool {
        self.resolver.is_some()
    }
}

/// Resolvers compare by identity; everything else by value.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        let same_resolver = match (&self.resolver, &other.resolver) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_resolver && self.transitions == other.transitions && self.props == other.props
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("transitions", &self.transitions)
            .field("props", &self.props)
            .field("branch", &self.is_branch())
            .finish()
    }
}

/// A flow graph: named nodes plus the name of the start node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Graph {
    pub start: String,
    pub nodes: BTreeMap<String, Node>,
}

impl Graph {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            nodes: BTreeMap::new(),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_node(mut self, name: impl Into<String>, node: Node) -> Self {
        self.insert(name, node);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, node: Node) -> Option<Node> {
        self.nodes.insert(name.into(), node)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// `false` for unknown names.
    pub fn is_branch(&self, name: &str) -> bool {
        self.node(name).is_some_and(Node::is_branch)
    }

    /// The table a transition from `name` is looked up in.
    ///
    /// An alias is followed exactly once. `Ok(None)` means the node has no
    /// usable table: it is an end node, or its alias points at an end node or
    /// at another alias.
    pub fn transition_table(&self, name: &str) -> Result<Option<&TransitionTable>, FlowError> {
        let node = self.node(name).ok_or_else(|| FlowError::UnknownNode {
            node: name.to_string(),
        })?;
        match &node.transitions {
            None => Ok(None),
            Some(Transitions::Table(table)) => Ok(Some(table)),
            Some(Transitions::Alias(other)) => {
                let referenced = self.node(other).ok_or_else(|| FlowError::UnknownNode {
                    node: other.clone(),
                })?;
                match &referenced.transitions {
                    Some(Transitions::Table(table)) => Ok(Some(table)),
                    _ => Ok(None),
                }
            }
        }
    }
}
