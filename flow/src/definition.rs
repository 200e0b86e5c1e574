//! Definition - Declarative Graphs
//!
//! Graphs can be written as data. The start node sits beside the node
//! entries, and branch nodes name their resolver instead of embedding it:
//!
//! ```json
//! {
//!   "start": "EmployeeList",
//!   "EmployeeList": { "transitions": { "Run payroll": "EnterRunPayroll" } },
//!   "EnterRunPayroll": {
//!     "resolver": "payroll-ready",
//!     "transitions": { "No employees": "AddEmployee", "Ready": "RunPayroll" }
//!   },
//!   "EditEmployee": { "transitions": "AddEmployee" },
//!   "RunPayroll": { "props": { "layout": "trowser" } }
//! }
//! ```
//!
//! Resolver names are bound through a [`ResolverRegistry`] when the
//! definition is built into a [`Graph`].

use crate::graph::{Graph, Node, Transitions};
use revir_core::resolver::Resolver;
use revir_core::telemetry::Traced;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Invalid graph definition: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Node '{node}' names unknown resolver '{resolver}'")]
    UnknownResolver { node: String, resolver: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitions: Option<Transitions>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub props: Value,
    /// Name of a resolver registered in the [`ResolverRegistry`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub start: String,
    #[serde(flatten)]
    pub nodes: BTreeMap<String, NodeDefinition>,
}

impl GraphDefinition {
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Bind resolver names and produce a runnable graph.
    pub fn build(self, registry: &ResolverRegistry) -> Result<Graph, DefinitionError> {
        let mut graph = Graph::new(self.start);
        for (name, definition) in self.nodes {
            let resolver = match definition.resolver {
                Some(resolver) => Some(registry.get(&resolver).ok_or_else(|| {
                    DefinitionError::UnknownResolver {
                        node: name.clone(),
                        resolver,
                    }
                })?),
                None => None,
            };
            graph.insert(
                name,
                Node {
                    transitions: definition.transitions,
                    props: definition.props,
                    resolver,
                },
            );
        }
        Ok(graph)
    }
}

impl Graph {
    /// Parse a JSON [`GraphDefinition`] and bind its resolvers.
    pub fn from_json(json: &str, registry: &ResolverRegistry) -> Result<Graph, DefinitionError> {
        GraphDefinition::from_json(json)?.build(registry)
    }
}

/// Named resolvers available to graph definitions.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver` under `name`, traced under that name.
    pub fn register<R: Resolver>(mut self, name: impl Into<String>, resolver: R) -> Self {
        let name = name.into();
        let traced = Traced::new(resolver, &name);
        self.insert(name, Arc::new(traced));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, resolver: Arc<dyn Resolver>) {
        self.resolvers.insert(name.into(), resolver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Resolver>> {
        self.resolvers.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.resolvers.keys().collect();
        names.sort();
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revir_core::resolver::{ResolverError, resolver_fn};
    use serde_json::json;

    const PAYROLL: &str = r#"{
        "start": "EmployeeList",
        "EmployeeList": {
            "transitions": {
                "Add employee": "AddEmployee",
                "Edit employee": "EditEmployee",
                "Run payroll": "EnterRunPayroll"
            }
        },
        "AddEmployee": {
            "transitions": { "Edit W-4": "W4", "View employee list": "EmployeeList" }
        },
        "EditEmployee": { "transitions": "AddEmployee" },
        "W4": {},
        "EnterRunPayroll": {
            "resolver": "payroll-ready",
            "transitions": { "No employees": "AddEmployee", "Ready": "RunPayroll" }
        },
        "RunPayroll": { "props": { "layout": "trowser" } }
    }"#;

    fn registry() -> ResolverRegistry {
        ResolverRegistry::new().register(
            "payroll-ready",
            resolver_fn(|_| async { Ok::<_, ResolverError>("Ready".to_string()) }),
        )
    }

    #[test]
    fn test_parse_keeps_start_beside_nodes() {
        let definition = GraphDefinition::from_json(PAYROLL).unwrap();
        assert_eq!(definition.start, "EmployeeList");
        assert_eq!(definition.nodes.len(), 6);
        assert!(!definition.nodes.contains_key("start"));
        assert_eq!(
            definition.nodes["EditEmployee"].transitions,
            Some(Transitions::Alias("AddEmployee".into()))
        );
        assert_eq!(definition.nodes["W4"], NodeDefinition::default());
    }

    #[test]
    fn test_build_binds_resolvers() {
        let graph = Graph::from_json(PAYROLL, &registry()).unwrap();
        assert!(graph.is_branch("EnterRunPayroll"));
        assert!(!graph.is_branch("EmployeeList"));
        assert_eq!(
            graph.node("RunPayroll").map(|n| &n.props),
            Some(&json!({"layout": "trowser"}))
        );
    }

    #[test]
    fn test_unknown_resolver_is_rejected() {
        let err = Graph::from_json(PAYROLL, &ResolverRegistry::new()).unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::UnknownResolver { ref node, ref resolver }
                if node == "EnterRunPayroll" && resolver == "payroll-ready"
        ));
    }

    #[test]
    fn test_missing_start_is_a_parse_error() {
        let err = GraphDefinition::from_value(json!({"A": {}})).unwrap_err();
        assert!(matches!(err, DefinitionError::Parse(_)));
    }
}
