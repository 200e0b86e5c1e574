//! Revir facade crate.
//!
//! This crate re-exports core, flow and runtime with a single entry point.
//! A [`Revir`] is a started [`FlowMachine`]; every machine method is
//! available on it directly.
//!
//! ```rust,no_run
//! use revir::prelude::*;
//!
//! # async fn run() -> Result<(), revir::RevirError> {
//! let graph = Graph::new("List")
//!     .with_node("List", Node::new().transition("add", "Add"))
//!     .with_node("Add", Node::new().transition("back", "List"));
//!
//! let flow = Revir::new(graph)?;
//! flow.on_ready(|ready| println!("now at {}", ready.current))?;
//! flow.transition("add");
//! flow.settled().await;
//! # Ok(())
//! # }
//! ```

pub use revir_core as core;
pub use revir_flow as flow;
pub use revir_runtime as runtime;

pub use revir_core::{ObjectDriver, PropertyStore, Resolver, ResolverError, resolver_fn};
pub use revir_flow::{FlowError, FlowState, Graph, Node, ResolverRegistry};
pub use revir_runtime::{EventName, FlowConfig, FlowEvent, FlowMachine, FlowSeed};

use revir_core::store::StoreError;
use revir_flow::{DefinitionError, GraphDefinition};
use revir_runtime::{ConfigError, MachineError};
use serde::Deserialize;
use serde_json::Value;
use std::ops::Deref;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RevirError {
    #[error("Flow definition must provide a 'states' object")]
    MissingStates,

    #[error("Invalid flow definition: {0}")]
    Parse(#[source] serde_json::Error),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The JSON shape accepted by [`Revir::from_json`].
#[derive(Debug, Deserialize)]
struct FlowDocument {
    states: Option<Value>,
    current: Option<String>,
    history: Option<Vec<String>>,
    #[serde(default)]
    config: FlowConfig,
}

/// A running flow.
#[derive(Debug)]
pub struct Revir {
    machine: FlowMachine,
}

impl Revir {
    /// Start a flow over `graph` with configuration read from `REVIR_*`
    /// environment variables.
    pub fn new(graph: Graph) -> Result<Self, RevirError> {
        Self::with_config(graph, FlowConfig::from_env()?)
    }

    pub fn with_config(seed: impl Into<FlowSeed>, config: FlowConfig) -> Result<Self, RevirError> {
        let machine = FlowMachine::spawn(seed, config)?;
        tracing::info!(machine = %machine.id(), current = ?machine.current(), "Flow started");
        Ok(Self { machine })
    }

    /// Start a flow from a JSON document:
    ///
    /// ```json
    /// {
    ///   "states": { "start": "List", "List": {} },
    ///   "current": "List",
    ///   "history": [],
    ///   "config": { "max_branch_depth": 8 }
    /// }
    /// ```
    ///
    /// Only `states` is required. Resolver names inside it are bound through
    /// `registry`.
    pub fn from_json(json: &str, registry: &ResolverRegistry) -> Result<Self, RevirError> {
        let document: FlowDocument = serde_json::from_str(json).map_err(RevirError::Parse)?;
        let states = match document.states {
            Some(states @ Value::Object(_)) => states,
            _ => return Err(RevirError::MissingStates),
        };
        let graph = GraphDefinition::from_value(states)?.build(registry)?;

        let mut seed = FlowSeed::from(graph);
        seed.current = document.current;
        seed.history = document.history;
        Self::with_config(seed, document.config)
    }

    pub fn into_machine(self) -> FlowMachine {
        self.machine
    }
}

impl Deref for Revir {
    type Target = FlowMachine;

    fn deref(&self) -> &FlowMachine {
        &self.machine
    }
}

pub mod prelude {
    pub use crate::{Revir, RevirError};
    pub use revir_core::prelude::*;
    pub use revir_flow::{FlowError, FlowState, Graph, Node, Phase, ResolverRegistry};
    pub use revir_runtime::prelude::*;
}
