//! Revir Runtime - Asynchronous Flow Machine
//!
//! Runs a [`revir_flow::Graph`] on Tokio:
//! - `FlowMachine`: serialised request queue, branch resolution, events
//! - `FlowConfig`: branch depth and resolver timeout, from code, TOML or env
//! - `FlowSeed`: start a machine from a partially known state

pub mod config;
pub mod events;
pub mod machine;
pub mod seed;

pub use config::{ConfigError, FlowConfig};
pub use events::{ErrorEvent, EventError, EventName, FlowEvent, ReadyEvent, StateType};
pub use machine::{FlowMachine, MachineError, WriteOrigin, keys};
pub use seed::FlowSeed;

pub mod prelude {
    pub use crate::config::FlowConfig;
    pub use crate::events::{EventName, FlowEvent};
    pub use crate::machine::FlowMachine;
    pub use crate::seed::FlowSeed;
}
