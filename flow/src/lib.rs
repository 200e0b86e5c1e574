//! Revir Flow - Node Graph Layer
//!
//! This crate defines the **structural** aspects of a flow:
//! - `Graph` / `Node`: named nodes joined by named transitions
//! - `GraphDefinition`: graphs written as data, resolvers bound by name
//! - `FlowState`: the cursor snapshot (current node, history, last error)
//! - `reduce`: the pure transition function
//!
//! **IMPORTANT**: This layer is Pure Rust - no channels, no IO, no Async.
//! Resolvers are stored here but only ever run by the runtime.

pub mod definition;
pub mod error;
pub mod graph;
pub mod reducer;
pub mod state;

pub use definition::{DefinitionError, GraphDefinition, NodeDefinition, ResolverRegistry};
pub use error::{ErrorKind, FlowError};
pub use graph::{Graph, Node, TransitionTable, Transitions};
pub use reducer::{Command, Reduction, reduce};
pub use state::{FlowFault, FlowState, Phase};
