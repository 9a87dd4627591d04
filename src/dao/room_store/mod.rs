//! Path-addressed JSON document store shared by every room.
//!
//! Documents live under slash separated paths such as `rooms/lobby/state`.
//! Every mutation that depends on the current value goes through
//! [`RoomStore::transact`], which re-runs the supplied closure until it
//! commits against an unchanged document, so concurrent writers never
//! overwrite each other.

#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use futures::{future::BoxFuture, stream::BoxStream};
use serde_json::{Map, Value};

use crate::dao::storage::StorageResult;

/// Decision returned by a transaction closure.
#[derive(Debug, Clone, PartialEq)]
pub enum Transaction<T> {
    /// Write the value (`None` deletes the document).
    Commit(Option<T>),
    /// Leave the document untouched.
    Abort,
}

/// Result of a [`RoomStore::transact`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactOutcome {
    /// Whether the closure committed.
    pub committed: bool,
    /// Document value after the call: the written value on commit, the value
    /// the closure last saw on abort.
    pub snapshot: Option<Value>,
}

/// Closure deciding the next value of a document from its current one.
///
/// It may run several times when the backend detects a concurrent write, so
/// it must not have side effects beyond its own captured state.
pub type TransactFn = Box<dyn FnMut(Option<&Value>) -> Transaction<Value> + Send>;

/// Notification emitted after a document changed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    /// Path of the changed document.
    pub path: String,
    /// New value, `None` once deleted.
    pub value: Option<Value>,
}

/// Abstraction over the shared document store.
pub trait RoomStore: Send + Sync {
    /// Short backend name reported by the health endpoint.
    fn backend(&self) -> &'static str;
    fn get(&self, path: String) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    /// Unconditional write; `None` deletes.
    fn set(&self, path: String, value: Option<Value>) -> BoxFuture<'static, StorageResult<()>>;
    /// Every document whose path starts with `prefix`, ordered by path.
    fn list(&self, prefix: String) -> BoxFuture<'static, StorageResult<Vec<(String, Value)>>>;
    fn transact(
        &self,
        path: String,
        apply: TransactFn,
    ) -> BoxFuture<'static, StorageResult<TransactOutcome>>;
    /// Stream of changes to documents under `prefix`.
    fn subscribe(&self, prefix: String) -> BoxStream<'static, StoreChange>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Merge `fields` into the object stored at `path`.
    ///
    /// A `null` field removes the key. Missing documents are left alone and
    /// yield `None`; otherwise the merged document is returned.
    fn update(
        &self,
        path: String,
        fields: Map<String, Value>,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let pending = self.transact(
            path,
            Box::new(move |current| match current {
                Some(existing) => Transaction::Commit(Some(merge_fields(existing, &fields))),
                None => Transaction::Abort,
            }),
        );
        Box::pin(async move {
            let outcome = pending.await?;
            Ok(outcome.committed.then_some(outcome.snapshot).flatten())
        })
    }
}

fn merge_fields(current: &Value, fields: &Map<String, Value>) -> Value {
    let mut object = match current {
        Value::Object(existing) => existing.clone(),
        _ => Map::new(),
    };
    for (key, value) in fields {
        if value.is_null() {
            object.remove(key);
        } else {
            object.insert(key.clone(), value.clone());
        }
    }
    Value::Object(object)
}
