//! Store - Property Broadcast Store
//!
//! A fixed set of named, typed properties. Every accepted write publishes a
//! [`PropertyChange`] to the subscribers of that property, and the latest
//! value can always be read without subscribing.
//!
//! # Philosophy
//! > Read is a snapshot, write is a broadcast.
//!
//! Writes grouped with [`PropertyStore::batch`] all land before any
//! subscriber runs, so an observer reacting to one property already sees
//! every co-written property at its new value.

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use thiserror::Error;

/// Property name taken by batched writes. No property may use it.
pub const RESERVED_KEY: &str = "commit";

/// Values a [`PropertyStore`] can hold.
///
/// `PartialEq` lets the store absorb writes of an unchanged value, and
/// `Serialize` backs the JSON projections used by the object driver.
pub trait Property: Clone + PartialEq + Serialize + Send + Sync + 'static {}

impl<T> Property for T where T: Clone + PartialEq + Serialize + Send + Sync + 'static {}

/// A typed property name.
///
/// Keys are usually declared as constants next to the code that owns the
/// store:
///
/// ```rust
/// use revir_core::store::Key;
///
/// const CURRENT: Key<Option<String>> = Key::new("current");
/// assert_eq!(CURRENT.name(), "current");
/// ```
pub struct Key<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    pub const fn new(name: &'static str) -> Self {
        Key {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("type", &type_name::<T>())
            .finish()
    }
}

/// A published change of one property.
///
/// `prev` is `None` only for the replayed value delivered by
/// [`PropertyStore::watch`]; every real change carries the value it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange<T> {
    pub key: &'static str,
    pub value: T,
    pub prev: Option<T>,
}

/// Store misuse. These are programmer errors and are always returned to the
/// direct caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Property name '{0}' is reserved")]
    ReservedKey(String),

    #[error("Unknown property '{0}'")]
    UnknownKey(String),

    #[error("Property '{key}' does not hold values of type {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("Property '{0}' cannot be written from JSON")]
    ReadOnly(String),

    #[error("Invalid JSON for property '{key}': {message}")]
    Decode { key: String, message: String },
}

// ============================================================================
// Internals
// ============================================================================

trait StoredValue: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn value_type(&self) -> TypeId;
    fn to_json(&self) -> Value;
}

impl<T: Property> StoredValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn value_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;
type WriteFn = Box<dyn FnOnce(&mut StoreState) -> Option<Pending> + Send>;
type Decoder = fn(&'static str, Value) -> Result<WriteFn, serde_json::Error>;

struct Slot {
    value: Box<dyn StoredValue>,
    subscribers: Vec<(u64, Callback)>,
    /// Set for properties registered with [`StoreBuilder::with_json`].
    decode: Option<Decoder>,
}

fn decode_write<T>(key: &'static str, json: Value) -> Result<WriteFn, serde_json::Error>
where
    T: Property + DeserializeOwned,
{
    let value: T = serde_json::from_value(json)?;
    Ok(Box::new(move |state| write(state, key, value)))
}

#[derive(Default)]
struct StoreState {
    slots: HashMap<&'static str, Slot>,
    next_subscription: u64,
}

impl StoreState {
    fn check(
        &self,
        key: &str,
        value_type: TypeId,
        expected: &'static str,
    ) -> Result<&Slot, StoreError> {
        if key == RESERVED_KEY {
            return Err(StoreError::ReservedKey(key.to_string()));
        }
        let slot = self
            .slots
            .get(key)
            .ok_or_else(|| StoreError::UnknownKey(key.to_string()))?;
        if slot.value.value_type() != value_type {
            return Err(StoreError::TypeMismatch {
                key: key.to_string(),
                expected,
            });
        }
        Ok(slot)
    }

    fn add_subscriber(&mut self, key: &'static str, callback: Callback) -> u64 {
        let id = self.next_subscription;
        self.next_subscription += 1;
        if let Some(slot) = self.slots.get_mut(key) {
            slot.subscribers.push((id, callback));
        }
        id
    }
}

/// A notification captured under the lock and delivered after it is released.
struct Pending {
    callbacks: Vec<Callback>,
    change: Box<dyn Any>,
}

impl Pending {
    fn flush(self) {
        for callback in &self.callbacks {
            callback(self.change.as_ref());
        }
    }
}

/// Stores `value` if it differs from the current one.
/// Returns `None` when the write was absorbed.
fn write<T: Property>(state: &mut StoreState, key: &'static str, value: T) -> Option<Pending> {
    let slot = state.slots.get_mut(key)?;
    let current = slot.value.as_any_mut().downcast_mut::<T>()?;
    if *current == value {
        return None;
    }
    let prev = std::mem::replace(current, value.clone());
    Some(Pending {
        callbacks: slot.subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
        change: Box::new(PropertyChange {
            key,
            value,
            prev: Some(prev),
        }),
    })
}

fn erase<T, F>(f: F) -> Callback
where
    T: Property,
    F: Fn(&PropertyChange<T>) + Send + Sync + 'static,
{
    Arc::new(move |change: &dyn Any| {
        if let Some(change) = change.downcast_ref::<PropertyChange<T>>() {
            f(change);
        }
    })
}

// ============================================================================
// Public API
// ============================================================================

/// Builds a [`PropertyStore`] with its fixed set of properties.
#[derive(Default)]
pub struct StoreBuilder {
    slots: HashMap<&'static str, Slot>,
}

impl StoreBuilder {
    /// Register a property with its initial value.
    pub fn with<T: Property>(self, key: &Key<T>, initial: T) -> Result<Self, StoreError> {
        self.register(key, initial, None)
    }

    /// Register a property that [`PropertyStore::merge_json`] may also write.
    pub fn with_json<T>(self, key: &Key<T>, initial: T) -> Result<Self, StoreError>
    where
        T: Property + DeserializeOwned,
    {
        self.register(key, initial, Some(decode_write::<T>))
    }

    fn register<T: Property>(
        mut self,
        key: &Key<T>,
        initial: T,
        decode: Option<Decoder>,
    ) -> Result<Self, StoreError> {
        if key.name == RESERVED_KEY {
            return Err(StoreError::ReservedKey(key.name.to_string()));
        }
        self.slots.insert(
            key.name,
            Slot {
                value: Box::new(initial),
                subscribers: Vec::new(),
                decode,
            },
        );
        Ok(self)
    }

    pub fn build(self) -> PropertyStore {
        PropertyStore {
            state: Arc::new(Mutex::new(StoreState {
                slots: self.slots,
                next_subscription: 0,
            })),
        }
    }
}

/// Typed key/value container that broadcasts every change.
///
/// Cloning is cheap and every clone refers to the same properties.
/// Subscriber callbacks run on the writing thread after the internal lock has
/// been released, so they may read from or write to the store.
#[derive(Clone)]
pub struct PropertyStore {
    state: Arc<Mutex<StoreState>>,
}

impl PropertyStore {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Latest value of a property.
    ///
    /// Returns `None` only when the store was not built with `key` or holds a
    /// different type under that name.
    pub fn get<T: Property>(&self, key: &Key<T>) -> Option<T> {
        self.read_with(key, T::clone)
    }

    /// Read several properties under one lock.
    ///
    /// `f` must not call back into this store.
    pub fn view<R>(&self, f: impl FnOnce(&StoreView<'_>) -> R) -> R {
        let state = self.state.lock();
        f(&StoreView { state: &state })
    }

    /// Borrow a property without cloning it.
    ///
    /// `f` must not call back into this store.
    pub fn read_with<T: Property, R>(&self, key: &Key<T>, f: impl FnOnce(&T) -> R) -> Option<R> {
        let state = self.state.lock();
        StoreView { state: &state }.read_with(key, f)
    }

    /// Write a single property.
    ///
    /// Returns `Ok(false)` when `value` equals the stored value; nothing is
    /// published in that case.
    pub fn set<T: Property>(&self, key: &Key<T>, value: T) -> Result<bool, StoreError> {
        self.batch().set(key, value).commit().map(|changed| changed > 0)
    }

    /// Start a batched write. See [`Batch::commit`].
    pub fn batch(&self) -> Batch<'_> {
        Batch {
            store: self,
            writes: Vec::new(),
        }
    }

    /// Receive every future change of `key`. The current value is not replayed.
    pub fn subscribe<T, F>(&self, key: &Key<T>, f: F) -> Result<Subscription, StoreError>
    where
        T: Property,
        F: Fn(&PropertyChange<T>) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        state.check(key.name, TypeId::of::<T>(), type_name::<T>())?;
        let id = state.add_subscriber(key.name, erase(f));
        Ok(self.handle(key.name, id))
    }

    /// Like [`subscribe`](Self::subscribe), but first delivers the current
    /// value with `prev: None`.
    pub fn watch<T, F>(&self, key: &Key<T>, f: F) -> Result<Subscription, StoreError>
    where
        T: Property,
        F: Fn(&PropertyChange<T>) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let (subscription, current) = {
            let mut state = self.state.lock();
            let current = state
                .check(key.name, TypeId::of::<T>(), type_name::<T>())?
                .value
                .as_any()
                .downcast_ref::<T>()
                .cloned();
            let forward = f.clone();
            let id = state.add_subscriber(key.name, erase(move |c: &PropertyChange<T>| forward(c)));
            (self.handle(key.name, id), current)
        };
        if let Some(value) = current {
            f(&PropertyChange {
                key: key.name,
                value,
                prev: None,
            });
        }
        Ok(subscription)
    }

    /// Subscribe by name without knowing the value type. `f` is told which
    /// property changed.
    pub fn subscribe_untyped<F>(&self, name: &str, f: F) -> Result<Subscription, StoreError>
    where
        F: Fn(&'static str) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if name == RESERVED_KEY {
            return Err(StoreError::ReservedKey(name.to_string()));
        }
        let key = state
            .slots
            .get_key_value(name)
            .map(|(key, _)| *key)
            .ok_or_else(|| StoreError::UnknownKey(name.to_string()))?;
        let id = state.add_subscriber(key, Arc::new(move |_: &dyn Any| f(key)));
        Ok(self.handle(key, id))
    }

    /// Read several properties as JSON under a single lock.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Result<Map<String, Value>, StoreError> {
        let state = self.state.lock();
        let mut out = Map::new();
        for name in names.iter().map(AsRef::as_ref) {
            let slot = state
                .slots
                .get(name)
                .ok_or_else(|| StoreError::UnknownKey(name.to_string()))?;
            out.insert(name.to_string(), slot.value.to_json());
        }
        Ok(out)
    }

    /// Write properties from a JSON object in one batch.
    ///
    /// A value whose JSON form equals the stored one is absorbed, whether or
    /// not the property was registered with [`StoreBuilder::with_json`]. Any
    /// other value needs a JSON-writable property. Nothing is written unless
    /// every entry is accepted. Returns the number of changed properties.
    pub fn merge_json(&self, update: Map<String, Value>) -> Result<usize, StoreError> {
        let pending: Vec<Pending> = {
            let mut state = self.state.lock();
            let mut writes = Vec::with_capacity(update.len());
            for (name, json) in update {
                if name == RESERVED_KEY {
                    return Err(StoreError::ReservedKey(name));
                }
                let Some((key, slot)) = state.slots.get_key_value(name.as_str()) else {
                    return Err(StoreError::UnknownKey(name));
                };
                if slot.value.to_json() == json {
                    continue;
                }
                let decode = slot.decode.ok_or_else(|| StoreError::ReadOnly(name.clone()))?;
                let write = decode(*key, json).map_err(|e| StoreError::Decode {
                    key: name,
                    message: e.to_string(),
                })?;
                writes.push(write);
            }
            writes
                .into_iter()
                .filter_map(|apply| apply(&mut *state))
                .collect()
        };
        let changed = pending.len();
        for notification in pending {
            notification.flush();
        }
        Ok(changed)
    }

    /// Names of all properties, sorted.
    pub fn keys(&self) -> Vec<&'static str> {
        let state = self.state.lock();
        let mut keys: Vec<_> = state.slots.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn subscriber_count<T>(&self, key: &Key<T>) -> usize {
        self.state
            .lock()
            .slots
            .get(key.name)
            .map_or(0, |slot| slot.subscribers.len())
    }

    /// A handle that does not keep the properties alive.
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            state: Arc::downgrade(&self.state),
        }
    }

    fn handle(&self, key: &'static str, id: u64) -> Subscription {
        Subscription {
            store: Arc::downgrade(&self.state),
            key,
            id,
        }
    }
}

impl fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyStore")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Consistent read access to several properties. See [`PropertyStore::view`].
pub struct StoreView<'a> {
    state: &'a StoreState,
}

impl StoreView<'_> {
    pub fn get<T: Property>(&self, key: &Key<T>) -> Option<T> {
        self.read_with(key, T::clone)
    }

    pub fn read_with<T: Property, R>(&self, key: &Key<T>, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.state
            .slots
            .get(key.name)?
            .value
            .as_any()
            .downcast_ref::<T>()
            .map(f)
    }
}

/// Non-owning reference to a [`PropertyStore`], for subscribers that need
/// to read the store they are registered on.
#[derive(Clone)]
pub struct WeakStore {
    state: Weak<Mutex<StoreState>>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<PropertyStore> {
        self.state.upgrade().map(|state| PropertyStore { state })
    }
}

/// A set of writes applied together.
#[must_use = "a batch does nothing until committed"]
pub struct Batch<'a> {
    store: &'a PropertyStore,
    writes: Vec<PendingWrite>,
}

struct PendingWrite {
    key: &'static str,
    value_type: TypeId,
    expected: &'static str,
    apply: WriteFn,
}

impl Batch<'_> {
    pub fn set<T: Property>(mut self, key: &Key<T>, value: T) -> Self {
        let name = key.name;
        self.writes.push(PendingWrite {
            key: name,
            value_type: TypeId::of::<T>(),
            expected: type_name::<T>(),
            apply: Box::new(move |state| write(state, name, value)),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every write, then notify.
    ///
    /// All keys are validated before anything is stored, so a failing batch
    /// leaves the store untouched. Notifications are delivered in write order
    /// once the last write has landed. Returns the number of writes that
    /// actually changed a value.
    pub fn commit(self) -> Result<usize, StoreError> {
        let pending: Vec<Pending> = {
            let mut state = self.store.state.lock();
            for w in &self.writes {
                state.check(w.key, w.value_type, w.expected)?;
            }
            self.writes
                .into_iter()
                .filter_map(|w| (w.apply)(&mut state))
                .collect()
        };
        let changed = pending.len();
        for notification in pending {
            notification.flush();
        }
        Ok(changed)
    }
}

/// Handle to one registered subscriber.
///
/// Dropping the handle keeps the subscriber registered; call
/// [`unsubscribe`](Self::unsubscribe) to cancel it.
pub struct Subscription {
    store: Weak<Mutex<StoreState>>,
    key: &'static str,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Cancel the subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(state) = self.store.upgrade() else {
            return false;
        };
        let mut state = state.lock();
        match state.slots.get_mut(self.key) {
            Some(slot) => {
                let before = slot.subscribers.len();
                slot.subscribers.retain(|(id, _)| *id != self.id);
                slot.subscribers.len() != before
            }
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
