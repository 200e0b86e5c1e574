//! Revir Core
//!
//! The building blocks every flow sits on:
//! - `PropertyStore`: typed properties that broadcast each change
//! - `ObjectDriver`: object-style snapshots and streams over a store
//! - `Resolver`: the asynchronous decision behind a branch node
//! - `telemetry`: tracing decorators and subscriber bootstrap

pub mod driver;
pub mod resolver;
pub mod store;
pub mod telemetry;

pub use driver::{DriverError, ObjectDriver, PropertyStream};
pub use resolver::{BranchContext, FnResolver, Resolver, ResolverError, resolver_fn};
pub use store::{
    Batch, Key, Property, PropertyChange, PropertyStore, RESERVED_KEY, StoreError, StoreView,
    Subscription, WeakStore,
};
pub use telemetry::{Traced, init_tracing};

pub mod prelude {
    pub use crate::driver::ObjectDriver;
    pub use crate::resolver::{BranchContext, Resolver, ResolverError, resolver_fn};
    pub use crate::store::{Key, PropertyChange, PropertyStore, StoreError};
}
