//! Driver - Object Adapter
//!
//! Reads a [`PropertyStore`] the way an application reads a plain object:
//! by space-separated property names. `current` returns one combined
//! snapshot; `get` returns a stream of combined snapshots that starts with
//! the current one and follows every later change.
//!
//! Asking for a single name yields the bare value instead of an object.
//!
//! `update` goes the other way: it writes a whole object back, one typed
//! property per key, in a single batch.

use crate::store::{PropertyStore, StoreError, Subscription};
use futures_core::Stream;
use serde_json::{Map, Value};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("No property name given")]
    NoKeys,

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn parse_keys(keys: &str) -> Result<Vec<String>, DriverError> {
    let names: Vec<String> = keys.split_whitespace().map(str::to_string).collect();
    if names.is_empty() {
        return Err(DriverError::NoKeys);
    }
    Ok(names)
}

fn combine(mut projection: Map<String, Value>, names: &[String]) -> Value {
    match names {
        [single] => projection.remove(single).unwrap_or(Value::Null),
        _ => Value::Object(projection),
    }
}

/// Object-style access to a store.
#[derive(Debug, Clone)]
pub struct ObjectDriver {
    store: PropertyStore,
}

impl ObjectDriver {
    pub fn new(store: PropertyStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    /// One snapshot of the named properties, read atomically.
    pub fn current(&self, keys: &str) -> Result<Value, DriverError> {
        let names = parse_keys(keys)?;
        Ok(combine(self.store.project(&names)?, &names))
    }

    /// Write every entry of `object` to the property of the same name.
    ///
    /// Entries equal to the stored value change nothing and notify no one.
    /// `commit` and unknown names are rejected, and a rejected update writes
    /// nothing. Returns the number of properties that changed.
    pub fn update(&self, object: Map<String, Value>) -> Result<usize, DriverError> {
        Ok(self.store.merge_json(object)?)
    }

    /// Stream of combined snapshots of the named properties.
    ///
    /// The first item is the current combination. Afterwards an item is
    /// produced whenever any of the named properties changes.
    pub fn get(&self, keys: &str) -> Result<PropertyStream, DriverError> {
        let names = parse_keys(keys)?;
        let (tx, rx) = mpsc::unbounded_channel();
        // Validates every name before anything is subscribed.
        let initial = combine(self.store.project(&names)?, &names);
        let _ = tx.send(initial);

        let mut subscriptions = Vec::with_capacity(names.len());
        for name in &names {
            let store = self.store.downgrade();
            let tx = tx.clone();
            let names = names.clone();
            let subscribed = self.store.subscribe_untyped(name, move |_| {
                if let Some(store) = store.upgrade()
                    && let Ok(projection) = store.project(&names)
                {
                    let _ = tx.send(combine(projection, &names));
                }
            });
            match subscribed {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => {
                    for subscription in subscriptions {
                        subscription.unsubscribe();
                    }
                    return Err(e.into());
                }
            }
        }

        Ok(PropertyStream { rx, subscriptions })
    }
}

/// Snapshots produced by [`ObjectDriver::get`].
///
/// Dropping the stream cancels its store subscriptions.
pub struct PropertyStream {
    rx: mpsc::UnboundedReceiver<Value>,
    subscriptions: Vec<Subscription>,
}

impl PropertyStream {
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Take a snapshot if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

impl Stream for PropertyStream {
    type Item = Value;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for PropertyStream {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}
