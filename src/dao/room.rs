use std::sync::{Arc, Mutex};

use futures::stream::BoxStream;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};

use crate::dao::{
    models::{
        AnswerEntity, BuzzEntity, LastResultEntity, PlayerEntity, QuestionScore, RoomStateEntity,
        RoundEntity,
    },
    room_store::{RoomStore, StoreChange, Transaction},
    storage::{StorageError, StorageResult, decode, encode},
};

const ROUND: &str = "round";
const STATE: &str = "state";
const BUZZ: &str = "buzz";
const ANSWER: &str = "answer";
const PLAYERS: &str = "players";
const LAST_RESULT: &str = "last_result";

/// Outcome of a buzz claim against the room's buzz slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// The slot was free for this question and now holds the candidate.
    Won(BuzzEntity),
    /// Someone else already holds the slot for this question.
    Lost(BuzzEntity),
}

enum Rejection<E> {
    Corrupted(serde_json::Error),
    Rejected(E),
}

/// Typed access to the documents of a single room.
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn RoomStore>,
    room: String,
}

impl RoomRepository {
    pub fn new(store: Arc<dyn RoomStore>, room: impl Into<String>) -> Self {
        Self {
            store,
            room: room.into(),
        }
    }

    /// Room identifier.
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Path prefix shared by every document of the room.
    pub fn prefix(&self) -> String {
        format!("rooms/{}/", self.room)
    }

    fn path(&self, leaf: &str) -> String {
        format!("rooms/{}/{}", self.room, leaf)
    }

    fn player_path(&self, player_id: &str) -> String {
        format!("rooms/{}/{}/{}", self.room, PLAYERS, player_id)
    }

    async fn read<T: DeserializeOwned>(&self, path: String) -> StorageResult<Option<T>> {
        match self.store.get(path.clone()).await? {
            Some(value) => decode(&path, value).map(Some),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(&self, path: String, value: Option<&T>) -> StorageResult<()> {
        let value = value.map(|value| encode(&path, value)).transpose()?;
        self.store.set(path, value).await
    }

    /// Run a typed transaction on `path`.
    ///
    /// `apply` returns `Ok(Some(_))` to write, `Ok(None)` to delete and `Err(_)`
    /// to abort; the error is handed back to the caller untouched.
    async fn transact_typed<T, E, F>(
        &self,
        path: String,
        mut apply: F,
    ) -> StorageResult<Result<Option<T>, E>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Send + 'static,
        F: FnMut(Option<T>) -> Result<Option<T>, E> + Send + 'static,
    {
        let rejection: Arc<Mutex<Option<Rejection<E>>>> = Arc::new(Mutex::new(None));
        let slot = rejection.clone();
        let doc_path = path.clone();

        let outcome = self
            .store
            .transact(
                path.clone(),
                Box::new(move |current: Option<&Value>| {
                    let reject = |reason: Rejection<E>| {
                        if let Ok(mut guard) = slot.lock() {
                            *guard = Some(reason);
                        }
                        Transaction::Abort
                    };

                    let typed = match current.cloned().map(serde_json::from_value::<T>) {
                        None => None,
                        Some(Ok(typed)) => Some(typed),
                        Some(Err(err)) => return reject(Rejection::Corrupted(err)),
                    };

                    match apply(typed) {
                        Ok(None) => Transaction::Commit(None),
                        Ok(Some(next)) => match serde_json::to_value(&next) {
                            Ok(value) => Transaction::Commit(Some(value)),
                            Err(err) => reject(Rejection::Corrupted(err)),
                        },
                        Err(rejected) => reject(Rejection::Rejected(rejected)),
                    }
                }),
            )
            .await?;

        if !outcome.committed {
            let reason = rejection.lock().ok().and_then(|mut guard| guard.take());
            return match reason {
                Some(Rejection::Corrupted(source)) => Err(StorageError::corrupted(doc_path, source)),
                Some(Rejection::Rejected(rejected)) => Ok(Err(rejected)),
                None => Err(StorageError::Contention {
                    path: doc_path,
                    attempts: 1,
                }),
            };
        }

        let written = outcome
            .snapshot
            .map(|value| decode(&path, value))
            .transpose()?;
        Ok(Ok(written))
    }

    /// Round currently built for the room.
    pub async fn round(&self) -> StorageResult<Option<RoundEntity>> {
        self.read(self.path(ROUND)).await
    }

    /// Replace the room's round.
    pub async fn save_round(&self, round: &RoundEntity) -> StorageResult<()> {
        self.write(self.path(ROUND), Some(round)).await
    }

    /// Current room state, idle when the room was never used.
    pub async fn state(&self) -> StorageResult<RoomStateEntity> {
        Ok(self
            .read::<RoomStateEntity>(self.path(STATE))
            .await?
            .unwrap_or_default())
    }

    /// Atomically derive the next room state from the current one.
    ///
    /// An `Err` from `apply` leaves the state untouched and is returned as the inner result.
    pub async fn transact_state<E, F>(
        &self,
        mut apply: F,
    ) -> StorageResult<Result<RoomStateEntity, E>>
    where
        E: Send + 'static,
        F: FnMut(RoomStateEntity) -> Result<RoomStateEntity, E> + Send + 'static,
    {
        let outcome = self
            .transact_typed(self.path(STATE), move |current: Option<RoomStateEntity>| {
                apply(current.unwrap_or_default()).map(Some)
            })
            .await?;
        Ok(outcome.map(Option::unwrap_or_default))
    }

    /// Current buzz slot content, whatever question it belongs to.
    pub async fn buzz(&self) -> StorageResult<Option<BuzzEntity>> {
        self.read(self.path(BUZZ)).await
    }

    /// First-writer-wins claim of the buzz slot for `candidate.question_seq`.
    ///
    /// A slot left over from an earlier question counts as empty.
    pub async fn claim_buzz(&self, candidate: BuzzEntity) -> StorageResult<ClaimResult> {
        let question_seq = candidate.question_seq;
        let written = candidate.clone();
        let outcome = self
            .transact_typed(self.path(BUZZ), move |current: Option<BuzzEntity>| {
                match current {
                    Some(existing) if existing.question_seq == question_seq => Err(existing),
                    _ => Ok(Some(written.clone())),
                }
            })
            .await?;

        Ok(match outcome {
            Ok(_) => ClaimResult::Won(candidate),
            Err(owner) => ClaimResult::Lost(owner),
        })
    }

    /// Empty the buzz slot if it still holds `claim`; `false` when it holds something else.
    pub async fn release_buzz(&self, claim: &BuzzEntity) -> StorageResult<bool> {
        self.release(self.path(BUZZ), claim.clone()).await
    }

    /// Store the answer for its question unless one was already recorded.
    pub async fn record_answer(&self, answer: AnswerEntity) -> StorageResult<bool> {
        let question_seq = answer.question_seq;
        let outcome = self
            .transact_typed(self.path(ANSWER), move |current: Option<AnswerEntity>| {
                match current {
                    Some(existing) if existing.question_seq == question_seq => Err(()),
                    _ => Ok(Some(answer.clone())),
                }
            })
            .await?;
        Ok(outcome.is_ok())
    }

    /// Empty the answer slot if it still holds `answer`.
    pub async fn release_answer(&self, answer: &AnswerEntity) -> StorageResult<bool> {
        self.release(self.path(ANSWER), answer.clone()).await
    }

    async fn release<T>(&self, path: String, expected: T) -> StorageResult<bool>
    where
        T: Serialize + DeserializeOwned + PartialEq + Send + 'static,
    {
        let outcome = self
            .transact_typed(path, move |current: Option<T>| match current {
                Some(held) if held == expected => Ok(None),
                _ => Err(()),
            })
            .await?;
        Ok(outcome.is_ok())
    }

    /// Empty the buzz and answer slots.
    pub async fn clear_slots(&self) -> StorageResult<()> {
        self.write::<BuzzEntity>(self.path(BUZZ), None).await?;
        self.write::<AnswerEntity>(self.path(ANSWER), None).await
    }

    /// Empty the buzz and answer slots unless they belong to `question_seq`.
    ///
    /// A claim that lands right after a question starts is kept.
    pub async fn clear_stale_slots(&self, question_seq: u64) -> StorageResult<()> {
        let _kept = self
            .transact_typed(self.path(BUZZ), move |current: Option<BuzzEntity>| {
                match current {
                    Some(buzz) if buzz.question_seq != question_seq => Ok(None),
                    _ => Err(()),
                }
            })
            .await?;
        let _kept = self
            .transact_typed(self.path(ANSWER), move |current: Option<AnswerEntity>| {
                match current {
                    Some(answer) if answer.question_seq != question_seq => Ok(None),
                    _ => Err(()),
                }
            })
            .await?;
        Ok(())
    }

    /// Every player of the room, ordered by id.
    pub async fn players(&self) -> StorageResult<Vec<PlayerEntity>> {
        let prefix = format!("{}{}/", self.prefix(), PLAYERS);
        self.store
            .list(prefix)
            .await?
            .into_iter()
            .map(|(path, value)| decode(&path, value))
            .collect()
    }

    pub async fn player(&self, player_id: &str) -> StorageResult<Option<PlayerEntity>> {
        self.read(self.player_path(player_id)).await
    }

    /// Register or refresh a player, keeping an existing score and join time.
    pub async fn upsert_player(
        &self,
        player_id: &str,
        name: &str,
        now_ms: i64,
    ) -> StorageResult<PlayerEntity> {
        let id = player_id.to_string();
        let name = name.to_string();
        let outcome = self
            .transact_typed(
                self.player_path(player_id),
                move |current: Option<PlayerEntity>| -> Result<_, ()> {
                    let player = match current {
                        Some(existing) => PlayerEntity {
                            name: name.clone(),
                            last_seen_ms: now_ms,
                            online: true,
                            ..existing
                        },
                        None => PlayerEntity {
                            id: id.clone(),
                            name: name.clone(),
                            score: 0,
                            joined_at_ms: now_ms,
                            last_seen_ms: now_ms,
                            online: true,
                            scored: None,
                        },
                    };
                    Ok(Some(player))
                },
            )
            .await?;
        self.expect_written(player_id, outcome)
    }

    /// Update presence of an existing player; `None` when the player is unknown.
    pub async fn touch_player(
        &self,
        player_id: &str,
        online: bool,
        now_ms: i64,
    ) -> StorageResult<Option<PlayerEntity>> {
        let path = self.player_path(player_id);
        let mut fields = Map::new();
        fields.insert("last_seen_ms".into(), json!(now_ms));
        fields.insert("online".into(), json!(online));
        match self.store.update(path.clone(), fields).await? {
            Some(value) => decode(&path, value).map(Some),
            None => Ok(None),
        }
    }

    /// Set the points `question_seq` contributes to a player's score.
    ///
    /// Repeating the call for the same question replaces the earlier
    /// contribution instead of adding to it, so a retried evaluation never
    /// counts twice. The player is created when missing.
    pub async fn record_question_score(
        &self,
        player_id: &str,
        name: &str,
        question_seq: u64,
        points: i32,
        now_ms: i64,
    ) -> StorageResult<PlayerEntity> {
        let id = player_id.to_string();
        let name = name.to_string();
        let scored = Some(QuestionScore {
            question_seq,
            points,
        });
        let outcome = self
            .transact_typed(
                self.player_path(player_id),
                move |current: Option<PlayerEntity>| -> Result<_, ()> {
                    let player = match current {
                        Some(existing) => {
                            let counted = existing
                                .scored
                                .filter(|score| score.question_seq == question_seq)
                                .map_or(0, |score| score.points);
                            PlayerEntity {
                                score: existing.score.saturating_sub(counted).saturating_add(points),
                                scored,
                                ..existing
                            }
                        }
                        None => PlayerEntity {
                            id: id.clone(),
                            name: name.clone(),
                            score: points,
                            joined_at_ms: now_ms,
                            last_seen_ms: now_ms,
                            online: true,
                            scored,
                        },
                    };
                    Ok(Some(player))
                },
            )
            .await?;
        self.expect_written(player_id, outcome)
    }

    fn expect_written(
        &self,
        player_id: &str,
        outcome: Result<Option<PlayerEntity>, ()>,
    ) -> StorageResult<PlayerEntity> {
        match outcome {
            Ok(Some(player)) => Ok(player),
            _ => Err(StorageError::Contention {
                path: self.player_path(player_id),
                attempts: 1,
            }),
        }
    }

    pub async fn last_result(&self) -> StorageResult<Option<LastResultEntity>> {
        self.read(self.path(LAST_RESULT)).await
    }

    /// Replace the last evaluation record.
    pub async fn publish_last_result(&self, result: &LastResultEntity) -> StorageResult<()> {
        self.write(self.path(LAST_RESULT), Some(result)).await
    }

    pub async fn clear_last_result(&self) -> StorageResult<()> {
        self.write::<LastResultEntity>(self.path(LAST_RESULT), None)
            .await
    }

    /// Changes to any document of the room.
    pub fn subscribe(&self) -> BoxStream<'static, StoreChange> {
        self.store.subscribe(self.prefix())
    }
}
