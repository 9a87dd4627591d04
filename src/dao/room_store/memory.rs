//! Process-local store used when no database is configured and in tests.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    future::{self, BoxFuture},
    stream::BoxStream,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::warn;

use crate::dao::storage::StorageResult;

use super::{RoomStore, StoreChange, TransactFn, TransactOutcome, Transaction};

const CHANGE_CAPACITY: usize = 256;

/// In-memory [`RoomStore`] backed by a concurrent map.
///
/// Each transaction runs while holding the map entry, which makes it atomic
/// without any retry loop.
#[derive(Clone)]
pub struct MemoryRoomStore {
    docs: Arc<DashMap<String, Value>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryRoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            docs: Arc::new(DashMap::new()),
            changes,
        }
    }

    fn publish(&self, path: &str, value: Option<Value>) {
        let _ = self.changes.send(StoreChange {
            path: path.to_string(),
            value,
        });
    }

    fn transact_now(&self, path: &str, mut apply: TransactFn) -> TransactOutcome {
        match self.docs.entry(path.to_string()) {
            Entry::Occupied(mut entry) => match apply(Some(entry.get())) {
                Transaction::Commit(Some(value)) => {
                    entry.insert(value.clone());
                    self.publish(path, Some(value.clone()));
                    TransactOutcome {
                        committed: true,
                        snapshot: Some(value),
                    }
                }
                Transaction::Commit(None) => {
                    entry.remove();
                    self.publish(path, None);
                    TransactOutcome {
                        committed: true,
                        snapshot: None,
                    }
                }
                Transaction::Abort => TransactOutcome {
                    committed: false,
                    snapshot: Some(entry.get().clone()),
                },
            },
            Entry::Vacant(entry) => match apply(None) {
                Transaction::Commit(Some(value)) => {
                    entry.insert(value.clone());
                    self.publish(path, Some(value.clone()));
                    TransactOutcome {
                        committed: true,
                        snapshot: Some(value),
                    }
                }
                Transaction::Commit(None) => TransactOutcome {
                    committed: true,
                    snapshot: None,
                },
                Transaction::Abort => TransactOutcome {
                    committed: false,
                    snapshot: None,
                },
            },
        }
    }
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore for MemoryRoomStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn get(&self, path: String) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let value = self.docs.get(&path).map(|entry| entry.value().clone());
        Box::pin(future::ready(Ok(value)))
    }

    fn set(&self, path: String, value: Option<Value>) -> BoxFuture<'static, StorageResult<()>> {
        match value {
            Some(value) => {
                self.docs.insert(path.clone(), value.clone());
                self.publish(&path, Some(value));
            }
            None => {
                if self.docs.remove(&path).is_some() {
                    self.publish(&path, None);
                }
            }
        }
        Box::pin(future::ready(Ok(())))
    }

    fn list(&self, prefix: String) -> BoxFuture<'static, StorageResult<Vec<(String, Value)>>> {
        let mut docs: Vec<(String, Value)> = self
            .docs
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        Box::pin(future::ready(Ok(docs)))
    }

    fn transact(
        &self,
        path: String,
        apply: TransactFn,
    ) -> BoxFuture<'static, StorageResult<TransactOutcome>> {
        let outcome = self.transact_now(&path, apply);
        Box::pin(future::ready(Ok(outcome)))
    }

    fn subscribe(&self, prefix: String) -> BoxStream<'static, StoreChange> {
        let stream = BroadcastStream::new(self.changes.subscribe()).filter_map(move |item| {
            match item {
                Ok(change) if change.path.starts_with(&prefix) => Some(change),
                Ok(_) => None,
                Err(err) => {
                    warn!(error = %err, prefix = %prefix, "store change subscriber lagged");
                    None
                }
            }
        });
        Box::pin(stream)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn counter_increment() -> TransactFn {
        Box::new(|current| {
            let count = current.and_then(Value::as_i64).unwrap_or(0);
            Transaction::Commit(Some(json!(count + 1)))
        })
    }

    #[tokio::test]
    async fn get_set_and_delete() {
        let store = MemoryRoomStore::new();
        assert_eq!(store.get("a/b".into()).await.unwrap(), None);

        store.set("a/b".into(), Some(json!(1))).await.unwrap();
        assert_eq!(store.get("a/b".into()).await.unwrap(), Some(json!(1)));

        store.set("a/b".into(), None).await.unwrap();
        assert_eq!(store.get("a/b".into()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_is_prefix_filtered_and_sorted() {
        let store = MemoryRoomStore::new();
        store.set("rooms/x/players/b".into(), Some(json!("b"))).await.unwrap();
        store.set("rooms/x/players/a".into(), Some(json!("a"))).await.unwrap();
        store.set("rooms/y/players/c".into(), Some(json!("c"))).await.unwrap();

        let listed = store.list("rooms/x/players/".into()).await.unwrap();
        let paths: Vec<_> = listed.iter().map(|(path, _)| path.as_str()).collect();
        assert_eq!(paths, ["rooms/x/players/a", "rooms/x/players/b"]);
    }

    #[tokio::test]
    async fn abort_leaves_document_untouched() {
        let store = MemoryRoomStore::new();
        store.set("slot".into(), Some(json!("first"))).await.unwrap();

        let outcome = store
            .transact("slot".into(), Box::new(|_| Transaction::Abort))
            .await
            .unwrap();
        assert!(!outcome.committed);
        assert_eq!(outcome.snapshot, Some(json!("first")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transactions_do_not_lose_updates() {
        let store = MemoryRoomStore::new();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.transact("count".into(), counter_increment()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.get("count".into()).await.unwrap(), Some(json!(50)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn only_one_claim_commits_on_empty_slot() {
        let store = MemoryRoomStore::new();
        let winners = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let winners = winners.clone();
            handles.push(tokio::spawn(async move {
                let outcome = store
                    .transact(
                        "buzz".into(),
                        Box::new(move |current| match current {
                            Some(_) => Transaction::Abort,
                            None => Transaction::Commit(Some(json!(i))),
                        }),
                    )
                    .await
                    .unwrap();
                if outcome.committed {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribers_only_see_their_prefix() {
        let store = MemoryRoomStore::new();
        let mut changes = store.subscribe("rooms/x/".into());

        store.set("rooms/y/state".into(), Some(json!(1))).await.unwrap();
        store.set("rooms/x/state".into(), Some(json!(2))).await.unwrap();

        let change = changes.next().await.unwrap();
        assert_eq!(change.path, "rooms/x/state");
        assert_eq!(change.value, Some(json!(2)));
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = MemoryRoomStore::new();
        store
            .set("p".into(), Some(json!({ "name": "Ana", "online": true })))
            .await
            .unwrap();
        let merged = store
            .update("p".into(), json!({ "online": false }).as_object().cloned().unwrap())
            .await
            .unwrap();
        assert_eq!(merged, Some(json!({ "name": "Ana", "online": false })));
        assert_eq!(store.get("p".into()).await.unwrap(), merged);
    }

    #[tokio::test]
    async fn update_leaves_missing_documents_alone() {
        let store = MemoryRoomStore::new();
        let merged = store
            .update("ghost".into(), json!({ "online": true }).as_object().cloned().unwrap())
            .await
            .unwrap();
        assert_eq!(merged, None);
        assert_eq!(store.get("ghost".into()).await.unwrap(), None);
    }
}
