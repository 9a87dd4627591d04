use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use futures::{future::BoxFuture, stream::BoxStream};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tokio::{sync::broadcast, time::sleep};
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::{debug, warn};

use crate::dao::{
    room_store::{RoomStore, StoreChange, TransactFn, TransactOutcome, Transaction},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        ALL_DOCS, AllDocsResponse, CHANGES, ChangesResponse, CouchValueDocument, DESIGN_PREFIX,
        END_SUFFIX, doc_url_segment, seq_param,
    },
};

const MAX_TRANSACT_ATTEMPTS: usize = 16;
const CHANGE_CAPACITY: usize = 256;
const LONGPOLL_TIMEOUT_MS: u64 = 25_000;
const FOLLOW_RETRY_DELAY: Duration = Duration::from_secs(2);

/// HTTP access to one CouchDB database.
#[derive(Clone)]
struct CouchHttp {
    client: Client,
    database_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

/// [`RoomStore`] backed by a CouchDB database, one document per path.
///
/// Transactions use the document revision as the compare-and-swap token and
/// retry on `409 Conflict`. Changes are read from the `_changes` feed by a
/// background follower that stops once every handle to the store is dropped.
#[derive(Clone)]
pub struct CouchRoomStore {
    http: CouchHttp,
    changes: Arc<broadcast::Sender<StoreChange>>,
}

impl CouchRoomStore {
    /// Establish a connection to CouchDB, ensure the database exists and start following changes.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let http = CouchHttp {
            client,
            database_url: Arc::<str>::from(config.database_url()),
            database: Arc::<str>::from(config.database),
            auth: config
                .credentials
                .map(|creds| (Arc::<str>::from(creds.username), Arc::<str>::from(creds.password))),
        };
        http.ensure_database().await?;

        let (changes, _rx) = broadcast::channel(CHANGE_CAPACITY);
        let changes = Arc::new(changes);
        tokio::spawn(follow_changes(http.clone(), Arc::downgrade(&changes)));

        Ok(Self { http, changes })
    }
}

impl CouchHttp {
    fn request(&self, method: Method, segment: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url, segment);
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url.to_string();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it in the meantime.
                let status = create.status();
                if status.is_success() || status == StatusCode::PRECONDITION_FAILED {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus { database, status })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document(&self, path: &str) -> CouchResult<Option<CouchValueDocument>> {
        let response = self
            .request(Method::GET, &doc_url_segment(path))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CouchValueDocument>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: path.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: path.to_string(),
                status: other,
            }),
        }
    }

    /// Write or delete a document at a known revision. Returns `false` on conflict.
    async fn write_document(
        &self,
        path: &str,
        rev: Option<String>,
        value: Option<Value>,
    ) -> CouchResult<bool> {
        let segment = doc_url_segment(path);
        let request = match (value, rev) {
            (Some(value), rev) => self.request(Method::PUT, &segment).json(&CouchValueDocument {
                id: path.to_string(),
                rev,
                value,
            }),
            (None, Some(rev)) => self
                .request(Method::DELETE, &segment)
                .query(&[("rev", rev)]),
            (None, None) => return Ok(true),
        };

        let response = request
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            // Deleting a document that is already gone.
            StatusCode::NOT_FOUND => Ok(true),
            other => Err(CouchDaoError::RequestStatus {
                path: path.to_string(),
                status: other,
            }),
        }
    }

    async fn transact_document(
        &self,
        path: &str,
        mut apply: TransactFn,
    ) -> StorageResult<TransactOutcome> {
        for attempt in 1..=MAX_TRANSACT_ATTEMPTS {
            let current = self.get_document(path).await?;
            let (rev, value) = match current {
                Some(doc) => (doc.rev, Some(doc.value)),
                None => (None, None),
            };

            match apply(value.as_ref()) {
                Transaction::Abort => {
                    return Ok(TransactOutcome {
                        committed: false,
                        snapshot: value,
                    });
                }
                Transaction::Commit(next) => {
                    if self.write_document(path, rev, next.clone()).await? {
                        return Ok(TransactOutcome {
                            committed: true,
                            snapshot: next,
                        });
                    }
                    debug!(path, attempt, "document revision conflict; retrying transaction");
                }
            }
        }

        Err(StorageError::Contention {
            path: path.to_string(),
            attempts: MAX_TRANSACT_ATTEMPTS,
        })
    }

    async fn list_documents(&self, prefix: &str) -> CouchResult<Vec<(String, Value)>> {
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", Value::from(prefix).to_string()),
            (
                "endkey",
                Value::from(format!("{prefix}{END_SUFFIX}")).to_string(),
            ),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        // _all_docs is already sorted by id.
        Ok(payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc.map(|doc| (row.id, doc.value)))
            .collect())
    }

    async fn poll_changes(&self, since: &Value) -> CouchResult<ChangesResponse> {
        let query = [
            ("feed", "longpoll".to_string()),
            ("include_docs", "true".to_string()),
            ("timeout", LONGPOLL_TIMEOUT_MS.to_string()),
            ("since", seq_param(since)),
        ];

        let response = self
            .request(Method::GET, CHANGES)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: CHANGES.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: CHANGES.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ChangesResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: CHANGES.to_string(),
                source,
            })
    }
}

/// Forward the `_changes` feed to local subscribers until the store is dropped.
async fn follow_changes(http: CouchHttp, sender: Weak<broadcast::Sender<StoreChange>>) {
    let mut since = Value::from("now");
    loop {
        let outcome = http.poll_changes(&since).await;
        let Some(sender) = sender.upgrade() else {
            debug!("couch store dropped; stopping change follower");
            return;
        };

        match outcome {
            Ok(payload) => {
                for row in payload.results {
                    if row.id.starts_with(DESIGN_PREFIX) {
                        continue;
                    }
                    let path = row.id.clone();
                    let _ = sender.send(StoreChange {
                        path,
                        value: row.value(),
                    });
                }
                since = payload.last_seq;
            }
            Err(err) => {
                drop(sender);
                warn!(error = %err, "couch change feed failed; retrying");
                sleep(FOLLOW_RETRY_DELAY).await;
            }
        }
    }
}

impl RoomStore for CouchRoomStore {
    fn backend(&self) -> &'static str {
        "couchdb"
    }

    fn get(&self, path: String) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let http = self.http.clone();
        Box::pin(async move {
            let doc = http.get_document(&path).await?;
            Ok(doc.map(|doc| doc.value))
        })
    }

    fn set(&self, path: String, value: Option<Value>) -> BoxFuture<'static, StorageResult<()>> {
        let http = self.http.clone();
        Box::pin(async move {
            http.transact_document(&path, Box::new(move |_| Transaction::Commit(value.clone())))
                .await
                .map(|_| ())
        })
    }

    fn list(&self, prefix: String) -> BoxFuture<'static, StorageResult<Vec<(String, Value)>>> {
        let http = self.http.clone();
        Box::pin(async move { http.list_documents(&prefix).await.map_err(Into::into) })
    }

    fn transact(
        &self,
        path: String,
        apply: TransactFn,
    ) -> BoxFuture<'static, StorageResult<TransactOutcome>> {
        let http = self.http.clone();
        Box::pin(async move { http.transact_document(&path, apply).await })
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
        let http = self.http.clone();
        Box::pin(async move {
            let url = http.database_url.to_string();
            let response = http
                .authorize(http.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let http = self.http.clone();
        Box::pin(async move { http.ensure_database().await.map_err(Into::into) })
    }
}
