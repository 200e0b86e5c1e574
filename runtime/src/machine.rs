//! FlowMachine - The Asynchronous Cursor
//!
//! A machine keeps its [`FlowState`] in a [`PropertyStore`] and owns a single
//! worker task that applies requests one at a time, in the order they were
//! made. A request that lands on a branch node keeps the worker busy until
//! the whole branch chain has resolved, so the next request always starts
//! from a settled cursor.
//!
//! # Philosophy
//! > One writer, many readers.
//!
//! Request methods never fail: traversal errors are recorded in the `error`
//! property and broadcast to `error` listeners.

use crate::config::FlowConfig;
use crate::events::{ErrorEvent, EventName, FlowEvent, ReadyEvent, StateType};
use crate::seed::FlowSeed;
use revir_core::driver::ObjectDriver;
use revir_core::resolver::{BranchContext, Resolver};
use revir_core::store::{PropertyStore, StoreError, Subscription};
use revir_flow::{Command, FlowError, FlowFault, FlowState, Graph, Phase, reduce};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Who made the write being published.
///
/// Ready listeners skip writes that only undo a failed branch chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOrigin {
    Request,
    Rollback,
}

/// The properties a machine publishes.
pub mod keys {
    use super::WriteOrigin;
    use revir_core::store::Key;
    use revir_flow::{FlowFault, Graph};

    pub const CURRENT: Key<Option<String>> = Key::new("current");
    pub const NODES: Key<Option<Graph>> = Key::new("nodes");
    pub const HISTORY: Key<Vec<String>> = Key::new("history");
    pub const TRANSITION: Key<Option<String>> = Key::new("transition");
    pub const ERROR: Key<Option<FlowFault>> = Key::new("error");
    pub const ORIGIN: Key<WriteOrigin> = Key::new("origin");
}

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("FlowMachine must be spawned from within a Tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Store(#[from] StoreError),
}

enum Job {
    Apply(Command),
    /// Resolve a branch the machine was seeded on.
    Resolve {
        node: String,
        origin: FlowState,
    },
    Barrier(oneshot::Sender<()>),
}

// ============================================================================
// Store access
// ============================================================================

fn build_store(state: &FlowState) -> Result<PropertyStore, StoreError> {
    Ok(PropertyStore::builder()
        .with(&keys::NODES, state.nodes.clone())?
        .with_json(&keys::HISTORY, state.history.clone())?
        .with_json(&keys::TRANSITION, state.transition.clone())?
        .with(&keys::ERROR, state.error.clone())?
        .with_json(&keys::CURRENT, state.current.clone())?
        .with(&keys::ORIGIN, WriteOrigin::Request)?
        .build())
}

fn snapshot(store: &PropertyStore) -> FlowState {
    store.view(|v| FlowState {
        current: v.get(&keys::CURRENT).flatten(),
        nodes: v.get(&keys::NODES).flatten(),
        history: v.get(&keys::HISTORY).unwrap_or_default(),
        transition: v.get(&keys::TRANSITION).flatten(),
        error: v.get(&keys::ERROR).flatten(),
    })
}

/// `current` is written last so ready listeners see the rest already landed.
fn commit(store: &PropertyStore, state: &FlowState) {
    let result = store
        .batch()
        .set(&keys::NODES, state.nodes.clone())
        .set(&keys::HISTORY, state.history.clone())
        .set(&keys::TRANSITION, state.transition.clone())
        .set(&keys::ERROR, state.error.clone())
        .set(&keys::CURRENT, state.current.clone())
        .commit();
    if let Err(e) = result {
        tracing::error!(error = %e, "Failed to publish flow state");
    }
}

fn record(
    store: &PropertyStore,
    fault: FlowFault,
    transition: Option<String>,
    rollback: Option<&FlowState>,
) {
    let mut batch = store.batch();
    if let Some(name) = transition {
        batch = batch.set(&keys::TRANSITION, Some(name));
    }
    batch = batch.set(&keys::ERROR, Some(fault));
    if let Some(origin) = rollback {
        batch = batch
            .set(&keys::ORIGIN, WriteOrigin::Rollback)
            .set(&keys::HISTORY, origin.history.clone())
            .set(&keys::CURRENT, origin.current.clone());
    }
    if let Err(e) = batch.commit() {
        tracing::error!(error = %e, "Failed to record flow error");
    }
    // The tag only has to hold while the batch above is flushed.
    if rollback.is_some() {
        if let Err(e) = store.set(&keys::ORIGIN, WriteOrigin::Request) {
            tracing::error!(error = %e, "Failed to reset write origin");
        }
    }
}

/// The state a failed branch chain returns to, if the request started from a
/// regular node.
fn rollback_target(origin: &FlowState) -> Option<&FlowState> {
    let current = origin.current.as_deref()?;
    (!origin.is_branch(current)).then_some(origin)
}

// ============================================================================
// Worker
// ============================================================================

struct Worker {
    store: PropertyStore,
    config: FlowConfig,
    attempt: u64,
    queue: mpsc::UnboundedReceiver<Job>,
}

impl Worker {
    async fn run(mut self) {
        while let Some(job) = self.queue.recv().await {
            match job {
                Job::Apply(command) => self.apply(command).await,
                Job::Resolve { node, origin } => {
                    self.attempt += 1;
                    self.resolve_chain(node, &origin).await;
                }
                Job::Barrier(done) => {
                    let _ = done.send(());
                }
            }
        }
        tracing::debug!("Request queue closed, worker stopping");
    }

    async fn apply(&mut self, command: Command) {
        self.attempt += 1;
        let label = command.label();
        let requested = command.transition_name().map(str::to_string);
        let before = snapshot(&self.store);

        match reduce(&before, command) {
            Ok(reduction) => {
                tracing::debug!(
                    command = label,
                    current = ?reduction.state.current,
                    "Request applied"
                );
                commit(&self.store, &reduction.state);
                if let Some(error) = reduction.error {
                    tracing::warn!(command = label, %error, "Request applied with error");
                    self.fail(error, requested, None);
                    return;
                }
                if let Some(node) = reduction.resolve {
                    self.resolve_chain(node, &before).await;
                }
            }
            Err(error) => {
                tracing::warn!(command = label, %error, "Request rejected");
                self.fail(error, requested, None);
            }
        }
    }

    /// Resolve branch nodes until the cursor rests on a regular node.
    ///
    /// Any failure puts `current` and `history` back to `origin`.
    async fn resolve_chain(&mut self, mut node: String, origin: &FlowState) {
        let limit = self.config.max_branch_depth;
        let rollback = rollback_target(origin);

        for depth in 1.. {
            if depth > limit {
                tracing::error!(%node, limit, "Branch chain did not settle");
                self.fail(FlowError::CyclicBranch { node, limit }, None, rollback);
                return;
            }

            let state = snapshot(&self.store);
            let Some(branch_node) = state.current_node().filter(|n| n.is_branch()) else {
                return;
            };
            let Some(resolver) = branch_node.resolver.clone() else {
                return;
            };
            let branch = BranchContext {
                node: node.clone(),
                props: branch_node.props.clone(),
                history: state.history.clone(),
            };

            let outcome = match self.call(&*resolver, &branch).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(%node, %error, "Branch resolution failed");
                    self.fail(error, None, rollback);
                    return;
                }
            };
            tracing::debug!(%node, %outcome, depth, "Branch resolved");

            match reduce(&state, Command::Transition(outcome.clone())) {
                Ok(reduction) => {
                    commit(&self.store, &reduction.state);
                    match reduction.resolve {
                        Some(next) => node = next,
                        None => return,
                    }
                }
                Err(error) => {
                    tracing::warn!(%node, %outcome, %error, "Branch outcome rejected");
                    self.fail(error, Some(outcome), rollback);
                    return;
                }
            }
        }
    }

    async fn call(
        &self,
        resolver: &dyn Resolver,
        branch: &BranchContext,
    ) -> Result<String, FlowError> {
        let result = match self.config.resolver_timeout_ms {
            Some(timeout_ms) => {
                let limit = Duration::from_millis(timeout_ms);
                match tokio::time::timeout(limit, resolver.resolve(branch)).await {
                    Ok(result) => result,
                    Err(_) => {
                        return Err(FlowError::ResolverTimeout {
                            node: branch.node.clone(),
                            timeout_ms,
                        });
                    }
                }
            }
            None => resolver.resolve(branch).await,
        };
        result.map_err(|e| FlowError::ResolverFailed {
            node: branch.node.clone(),
            message: e.to_string(),
        })
    }

    fn fail(&self, error: FlowError, transition: Option<String>, rollback: Option<&FlowState>) {
        let fault = FlowFault {
            attempt: self.attempt,
            error,
        };
        record(&self.store, fault, transition, rollback);
    }
}

// ============================================================================
// Machine
// ============================================================================

/// Handle to a running flow.
///
/// Dropping the handle stops the worker; requests still queued are discarded.
pub struct FlowMachine {
    id: Uuid,
    store: PropertyStore,
    jobs: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

impl FlowMachine {
    /// Start a machine over `graph` with default configuration.
    pub fn new(graph: Graph) -> Result<Self, MachineError> {
        Self::spawn(graph, FlowConfig::default())
    }

    /// Start a machine from a seed.
    ///
    /// `current` is settled before this returns. If it is a branch node, its
    /// resolution is the first job of the worker.
    ///
    /// On a multi-threaded runtime that job may finish before the caller gets
    /// to register a listener, so the `ready` event for the settled start node
    /// can be missed. Await [`settled`](Self::settled) and read
    /// [`current`](Self::current) instead of waiting for that event.
    pub fn spawn(seed: impl Into<FlowSeed>, config: FlowConfig) -> Result<Self, MachineError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| MachineError::NoRuntime)?;
        let id = Uuid::new_v4();
        let seeded = seed.into().apply_to(FlowState::default());
        let store = build_store(&seeded)?;
        let (jobs, queue) = mpsc::unbounded_channel();

        match reduce(&seeded, Command::Start) {
            Ok(reduction) => {
                commit(&store, &reduction.state);
                if let Some(error) = reduction.error {
                    tracing::warn!(machine = %id, %error, "Flow could not start");
                    record(&store, FlowFault { attempt: 0, error }, None, None);
                }
                if let Some(node) = reduction.resolve {
                    let _ = jobs.send(Job::Resolve {
                        node,
                        origin: seeded,
                    });
                }
            }
            Err(error) => {
                tracing::warn!(machine = %id, %error, "Flow could not start");
                let fault = FlowFault { attempt: 0, error };
                record(&store, fault, None, None);
            }
        }

        let worker = Worker {
            store: store.clone(),
            config,
            attempt: 0,
            queue,
        };
        let span = tracing::info_span!("FlowMachine", revir.machine = %id);
        let worker = runtime.spawn(worker.run().instrument(span));
        tracing::debug!(
            machine = %id,
            current = ?store.get(&keys::CURRENT).flatten(),
            "Flow machine started"
        );

        Ok(Self {
            id,
            store,
            jobs,
            worker,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Follow the named transition of the current node.
    ///
    /// An empty name on a node without transitions goes back instead.
    pub fn transition(&self, name: impl Into<String>) {
        self.send(Job::Apply(Command::Transition(name.into())));
    }

    /// Return to the most recent regular node in the history.
    pub fn previous(&self) {
        self.send(Job::Apply(Command::Previous));
    }

    /// Swap the graph. The cursor and history are kept.
    pub fn replace(&self, graph: Graph) {
        self.send(Job::Apply(Command::Replace(graph)));
    }

    /// Move to `node` without consulting a transition table.
    pub fn start_at(&self, node: impl Into<String>) {
        self.send(Job::Apply(Command::Jump(node.into())));
    }

    /// Wait until every request made so far has been applied.
    pub async fn settled(&self) {
        let (done, wait) = oneshot::channel();
        self.send(Job::Barrier(done));
        let _ = wait.await;
    }

    fn send(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            tracing::warn!(machine = %self.id, "Flow worker has stopped, request dropped");
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// A consistent snapshot of every property.
    pub fn inspect(&self) -> FlowState {
        snapshot(&self.store)
    }

    pub fn phase(&self) -> Phase {
        self.inspect().phase()
    }

    pub fn current(&self) -> Option<String> {
        self.store.get(&keys::CURRENT).flatten()
    }

    pub fn history(&self) -> Vec<String> {
        self.store.get(&keys::HISTORY).unwrap_or_default()
    }

    pub fn error(&self) -> Option<FlowFault> {
        self.store.get(&keys::ERROR).flatten()
    }

    /// Object-style reads and streams over the machine's properties.
    pub fn driver(&self) -> ObjectDriver {
        ObjectDriver::new(self.store.clone())
    }

    // ------------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------------

    /// Register a listener by event name.
    ///
    /// Listeners only hear about changes made after they were registered.
    pub fn on<F>(&self, event: EventName, f: F) -> Result<Subscription, StoreError>
    where
        F: Fn(&FlowEvent) + Send + Sync + 'static,
    {
        match event {
            EventName::Ready => self.on_ready(move |e| f(&FlowEvent::Ready(e.clone()))),
            EventName::Error => self.on_error(move |e| f(&FlowEvent::Error(e.clone()))),
        }
    }

    /// Called whenever the cursor settles on a new regular node.
    ///
    /// Neither branch visits nor the return to the origin after a failed
    /// branch chain are reported. See [`spawn`](Self::spawn) for the start
    /// node of a machine seeded on a branch.
    pub fn on_ready<F>(&self, f: F) -> Result<Subscription, StoreError>
    where
        F: Fn(&ReadyEvent) + Send + Sync + 'static,
    {
        let store = self.store.downgrade();
        self.store.subscribe(&keys::CURRENT, move |change| {
            let Some(current) = change.value.as_deref() else {
                return;
            };
            let Some(store) = store.upgrade() else {
                return;
            };
            let (event, origin) = store.view(|v| {
                let event = v
                    .read_with(&keys::NODES, |nodes| {
                        ReadyEvent::describe(nodes.as_ref(), current)
                    })
                    .unwrap_or_else(|| ReadyEvent::describe(None, current));
                (event, v.get(&keys::ORIGIN))
            });
            if event.state_type == StateType::Branch || origin == Some(WriteOrigin::Rollback) {
                return;
            }
            f(&event);
        })
    }

    /// Called for every failed request, including repeats of the same error.
    pub fn on_error<F>(&self, f: F) -> Result<Subscription, StoreError>
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.store.subscribe(&keys::ERROR, move |change| {
            if let Some(fault) = &change.value {
                f(&ErrorEvent::from(fault));
            }
        })
    }
}

impl Drop for FlowMachine {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl fmt::Debug for FlowMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowMachine")
            .field("id", &self.id)
            .field("current", &self.current())
            .finish()
    }
}
