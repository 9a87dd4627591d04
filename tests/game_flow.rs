use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use artist_buzz_back::{
    config::{AppConfig, RevealPolicy},
    dao::{
        room_store::{RoomStore, StoreChange, TransactFn, TransactOutcome, memory::MemoryRoomStore},
        storage::{StorageError, StorageResult},
    },
    dto::{
        room::{BuildRoundRequest, RoomSnapshot},
        tracklist::{PutTrackListRequest, TrackDto},
    },
    error::ServiceError,
    services::{
        buzz_service,
        playback::{LoggingPlayback, Playback, PlaybackError},
        player_service, room_service, tracklist_service,
    },
    state::{
        AppState, SharedState,
        clock::ManualClock,
        state_machine::{PhaseToken, RoomPhase},
        timers::TimerKind,
    },
};
use futures::{
    future::{self, BoxFuture},
    stream::BoxStream,
};
use serde_json::Value;
use tokio::sync::Notify;

const ROOM: &str = "lobby";

fn track(id: &str, artist: &str) -> TrackDto {
    TrackDto {
        id: id.into(),
        uri: format!("spotify:track:{id}"),
        name: format!("Song {id}"),
        artist_names: vec![artist.into()],
        duration_ms: 180_000,
    }
}

/// Memory store that can fail player writes or hold the next buzz claim.
struct FaultyStore {
    inner: MemoryRoomStore,
    fail_players: AtomicBool,
    buzz_hold: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl FaultyStore {
    fn new() -> Self {
        Self {
            inner: MemoryRoomStore::new(),
            fail_players: AtomicBool::new(false),
            buzz_hold: Mutex::new(None),
        }
    }

    fn fail_player_writes(&self, fail: bool) {
        self.fail_players.store(fail, Ordering::SeqCst);
    }

    /// Park the next buzz transaction. Returns a notifier fired once it is
    /// parked and the one that lets it proceed.
    fn hold_next_buzz(&self) -> (Arc<Notify>, Arc<Notify>) {
        let parked = Arc::new(Notify::new());
        let resume = Arc::new(Notify::new());
        *self.buzz_hold.lock().unwrap() = Some((parked.clone(), resume.clone()));
        (parked, resume)
    }
}

impl RoomStore for FaultyStore {
    fn backend(&self) -> &'static str {
        "faulty"
    }

    fn get(&self, path: String) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        self.inner.get(path)
    }

    fn set(&self, path: String, value: Option<Value>) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.set(path, value)
    }

    fn list(&self, prefix: String) -> BoxFuture<'static, StorageResult<Vec<(String, Value)>>> {
        self.inner.list(prefix)
    }

    fn transact(
        &self,
        path: String,
        apply: TransactFn,
    ) -> BoxFuture<'static, StorageResult<TransactOutcome>> {
        if path.contains("/players/") && self.fail_players.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(StorageError::unavailable(
                format!("cannot write {path}"),
                io::Error::other("player documents offline"),
            ))));
        }
        let hold = if path.ends_with("/buzz") {
            self.buzz_hold.lock().unwrap().take()
        } else {
            None
        };
        let inner = self.inner.clone();
        Box::pin(async move {
            if let Some((parked, resume)) = hold {
                parked.notify_one();
                resume.notified().await;
            }
            inner.transact(path, apply).await
        })
    }

    fn subscribe(&self, prefix: String) -> BoxStream<'static, StoreChange> {
        self.inner.subscribe(prefix)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

/// Playback whose commands never complete.
struct StuckPlayback;

impl Playback for StuckPlayback {
    fn play(&self, _: &str, _: &str, _: u64) -> BoxFuture<'static, Result<(), PlaybackError>> {
        Box::pin(future::pending())
    }

    fn pause(&self, _: &str) -> BoxFuture<'static, Result<(), PlaybackError>> {
        Box::pin(future::pending())
    }

    fn transfer_to(&self, _: &str, _: &str) -> BoxFuture<'static, Result<(), PlaybackError>> {
        Box::pin(future::pending())
    }
}

async fn setup(policy: RevealPolicy) -> (SharedState, Arc<ManualClock>) {
    setup_with(
        policy,
        Arc::new(MemoryRoomStore::new()),
        Arc::new(LoggingPlayback),
    )
    .await
}

async fn setup_with(
    policy: RevealPolicy,
    store: Arc<dyn RoomStore>,
    playback: Arc<dyn Playback>,
) -> (SharedState, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let config = AppConfig {
        reveal_policy: policy,
        ..AppConfig::default()
    };
    let state = AppState::with_parts(config, clock.clone(), playback);
    state.install_room_store(store).await;

    tracklist_service::put(
        &state,
        "mix",
        PutTrackListRequest {
            name: "Mix".into(),
            tracks: vec![
                track("1", "Queen"),
                track("2", "ABBA"),
                track("3", "Daft Punk"),
                track("4", "Queen"),
            ],
        },
    )
    .await
    .unwrap();

    room_service::build_round(
        &state,
        ROOM,
        BuildRoundRequest {
            list_ids: vec!["mix".into()],
            question_count: Some(3),
        },
    )
    .await
    .unwrap();

    (state, clock)
}

async fn accepted_artist(state: &SharedState, index: usize) -> String {
    let round = room_service::get_round(state, ROOM).await.unwrap();
    round.questions[index].track.artist_names[0].clone()
}

async fn snapshot(state: &SharedState) -> RoomSnapshot {
    room_service::snapshot(state, ROOM).await.unwrap()
}

async fn current_token(state: &SharedState) -> PhaseToken {
    let repo = state.room(ROOM).await.unwrap();
    PhaseToken::of(&repo.state().await.unwrap())
}

async fn wait_for_phase(state: &SharedState, phase: RoomPhase) -> RoomSnapshot {
    for _ in 0..100 {
        let current = snapshot(state).await;
        if current.state.phase == phase {
            return current;
        }
        tokio::task::yield_now().await;
    }
    panic!("room never reached {phase:?}");
}

#[tokio::test]
async fn round_has_one_question_per_artist() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;
    let round = room_service::get_round(&state, ROOM).await.unwrap();

    assert_eq!(round.questions.len(), 3);
    assert_eq!(round.total_candidates, 4);
    let mut artists: Vec<_> = round
        .questions
        .iter()
        .map(|question| question.track.artist_names[0].clone())
        .collect();
    artists.sort();
    assert_eq!(artists, ["ABBA", "Daft Punk", "Queen"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_buzzes_have_exactly_one_winner() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            buzz_service::claim(&state, ROOM, &format!("player-{i}"), None).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    let winners: Vec<_> = outcomes.iter().filter(|outcome| outcome.accepted).collect();
    assert_eq!(winners.len(), 1);
    let winner = &winners[0].owner.player_id;
    assert!(outcomes
        .iter()
        .all(|outcome| &outcome.owner.player_id == winner));

    let room = snapshot(&state).await;
    assert_eq!(room.state.phase, RoomPhase::Buzzed);
    assert_eq!(room.buzz.unwrap().player_id, *winner);
}

#[tokio::test]
async fn early_wrong_answer_costs_four_and_only_lasts_one_question() {
    let (state, clock) = setup(RevealPolicy::AwaitHost).await;
    player_service::join(&state, ROOM, "ana", "Ana").await.unwrap();
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();

    clock.advance(10_000);
    let claim = buzz_service::claim(&state, ROOM, "ana", None).await.unwrap();
    assert!(claim.accepted);
    assert_eq!(claim.owner.window, 4);
    assert_eq!(claim.owner.name, "Ana");

    let result = room_service::submit_answer(&state, ROOM, "ana", "certainly not them".into())
        .await
        .unwrap();
    assert!(!result.correct);
    assert_eq!(result.points, -4);
    assert_eq!(result.window, 4);

    let room = snapshot(&state).await;
    assert_eq!(room.state.phase, RoomPhase::Reveal);
    assert!(room.state.wrong_at_any);
    assert_eq!(room.players[0].score, -4);
    assert!(room.question.is_some());

    room_service::advance_to_next(&state, ROOM).await.unwrap();
    let room = snapshot(&state).await;
    assert_eq!(room.state.phase, RoomPhase::Playing);
    assert_eq!(room.state.question_index, 1);
    assert!(!room.state.wrong_at_any);
    assert_eq!(room.current_window, Some(4));
    assert!(room.buzz.is_none());
}

#[tokio::test]
async fn frozen_window_survives_decay() {
    let (state, clock) = setup(RevealPolicy::AwaitHost).await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();

    clock.advance(5_000);
    let claim = buzz_service::claim(&state, ROOM, "bob", Some("Bob".into()))
        .await
        .unwrap();
    assert_eq!(claim.owner.window, 4);

    clock.advance(30_000);
    let artist = accepted_artist(&state, 0).await;
    let result = room_service::submit_answer(&state, ROOM, "bob", artist.to_lowercase())
        .await
        .unwrap();
    assert!(result.correct);
    assert_eq!(result.points, 4);
}

#[tokio::test]
async fn window_reflects_elapsed_time_while_playing() {
    let (state, clock) = setup(RevealPolicy::AwaitHost).await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();

    assert_eq!(snapshot(&state).await.current_window, Some(4));
    clock.advance(25_000);
    assert_eq!(snapshot(&state).await.current_window, Some(2));
    clock.advance(20_000);
    assert_eq!(snapshot(&state).await.current_window, Some(1));

    let claim = buzz_service::claim(&state, ROOM, "late", None).await.unwrap();
    assert_eq!(claim.owner.window, 1);
    assert_eq!(snapshot(&state).await.current_window, None);
}

#[tokio::test]
async fn stale_auto_skip_does_nothing() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();
    let playing = current_token(&state).await;

    buzz_service::claim(&state, ROOM, "ana", None).await.unwrap();
    room_service::run_timer(&state, ROOM, TimerKind::AutoSkip, playing)
        .await
        .unwrap();

    let room = snapshot(&state).await;
    assert_eq!(room.state.phase, RoomPhase::Buzzed);
    assert!(room.last_result.is_none());
}

#[tokio::test]
async fn current_auto_skip_reveals_without_scoring() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;
    player_service::join(&state, ROOM, "ana", "Ana").await.unwrap();
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();
    let playing = current_token(&state).await;

    room_service::run_timer(&state, ROOM, TimerKind::AutoSkip, playing)
        .await
        .unwrap();

    let room = snapshot(&state).await;
    assert_eq!(room.state.phase, RoomPhase::Reveal);
    assert!(room.last_result.is_none());
    assert_eq!(room.players[0].score, 0);
}

#[tokio::test(start_paused = true)]
async fn silent_claimant_gets_an_incorrect_answer() {
    let (state, clock) = setup(RevealPolicy::AwaitHost).await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();
    clock.advance(3_000);
    buzz_service::claim(&state, ROOM, "ana", Some("Ana".into()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(16)).await;
    let room = wait_for_phase(&state, RoomPhase::Reveal).await;

    let result = room.last_result.unwrap();
    assert!(!result.correct);
    assert_eq!(result.text, "");
    assert_eq!(result.points, -4);
    assert_eq!(room.players[0].score, -4);

    assert!(matches!(
        room_service::submit_answer(&state, ROOM, "ana", "too late".into()).await,
        Err(ServiceError::InvalidState(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn reveal_advances_on_its_own_with_auto_advance() {
    let (state, _) = setup(RevealPolicy::AutoAdvance).await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();

    let revealed = room_service::reveal_now(&state, ROOM, true).await.unwrap();
    assert_eq!(revealed.phase, RoomPhase::Reveal);
    assert!(revealed.reveal_until.is_some());

    tokio::time::sleep(Duration::from_secs(4)).await;
    let room = wait_for_phase(&state, RoomPhase::Playing).await;
    assert_eq!(room.state.question_index, 1);
}

#[tokio::test]
async fn only_the_claimant_may_answer() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();
    buzz_service::claim(&state, ROOM, "ana", None).await.unwrap();

    let artist = accepted_artist(&state, 0).await;
    assert!(matches!(
        room_service::submit_answer(&state, ROOM, "bob", artist.clone()).await,
        Err(ServiceError::InvalidState(_))
    ));

    let result = room_service::submit_answer(&state, ROOM, "ana", artist.clone())
        .await
        .unwrap();
    assert!(result.correct);
    assert!(matches!(
        room_service::submit_answer(&state, ROOM, "ana", artist).await,
        Err(ServiceError::InvalidState(_))
    ));
}

#[tokio::test]
async fn illegal_transitions_are_rejected() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;

    assert!(matches!(
        buzz_service::claim(&state, ROOM, "ana", None).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert!(matches!(
        room_service::reveal_now(&state, ROOM, false).await,
        Err(ServiceError::InvalidState(_))
    ));

    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();
    assert!(matches!(
        room_service::advance_to_next(&state, ROOM).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert!(matches!(
        room_service::start_question(&state, ROOM, Some(1)).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert!(matches!(
        room_service::build_round(
            &state,
            ROOM,
            BuildRoundRequest {
                list_ids: vec!["mix".into()],
                question_count: None,
            },
        )
        .await,
        Err(ServiceError::InvalidState(_))
    ));

    assert_eq!(snapshot(&state).await.state.phase, RoomPhase::Playing);
}

#[tokio::test]
async fn round_runs_to_the_end_and_resets() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();

    for expected in 1..3 {
        room_service::reveal_now(&state, ROOM, true).await.unwrap();
        let next = room_service::advance_to_next(&state, ROOM).await.unwrap();
        assert_eq!(next.phase, RoomPhase::Playing);
        assert_eq!(next.question_index, expected);
    }

    let revealed = room_service::reveal_now(&state, ROOM, true).await.unwrap();
    assert_eq!(revealed.reveal_until, None);
    let ended = room_service::advance_to_next(&state, ROOM).await.unwrap();
    assert_eq!(ended.phase, RoomPhase::Ended);

    let reset = room_service::reset_to_first(&state, ROOM).await.unwrap();
    assert_eq!(reset.phase, RoomPhase::Idle);
    assert_eq!(reset.question_index, 0);
    assert_eq!(reset.question_count, 3);
}

#[tokio::test]
async fn rejoining_player_keeps_score() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;
    player_service::join(&state, ROOM, "ana", "Ana").await.unwrap();
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();
    buzz_service::claim(&state, ROOM, "ana", None).await.unwrap();
    let artist = accepted_artist(&state, 0).await;
    room_service::submit_answer(&state, ROOM, "ana", artist)
        .await
        .unwrap();

    player_service::leave(&state, ROOM, "ana").await.unwrap();
    let back = player_service::join(&state, ROOM, "ana", "Ana").await.unwrap();
    assert_eq!(back.score, 4);
    assert!(back.online);
}

#[tokio::test]
async fn failed_rebuild_keeps_the_previous_round() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;
    let before = room_service::get_round(&state, ROOM).await.unwrap();

    tracklist_service::put(
        &state,
        "empty",
        PutTrackListRequest {
            name: "Empty".into(),
            tracks: Vec::new(),
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        room_service::build_round(
            &state,
            ROOM,
            BuildRoundRequest {
                list_ids: vec!["empty".into()],
                question_count: Some(5),
            },
        )
        .await,
        Err(ServiceError::InvalidInput(_))
    ));
    assert!(matches!(
        room_service::build_round(
            &state,
            ROOM,
            BuildRoundRequest {
                list_ids: vec!["missing".into()],
                question_count: Some(5),
            },
        )
        .await,
        Err(ServiceError::NotFound(_))
    ));

    let after = room_service::get_round(&state, ROOM).await.unwrap();
    assert_eq!(after.id, before.id);
}

#[tokio::test]
async fn failed_score_write_leaves_the_claimant_buzzed() {
    let store = Arc::new(FaultyStore::new());
    let (state, _) = setup_with(
        RevealPolicy::AwaitHost,
        store.clone(),
        Arc::new(LoggingPlayback),
    )
    .await;
    player_service::join(&state, ROOM, "ana", "Ana").await.unwrap();
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();
    buzz_service::claim(&state, ROOM, "ana", None).await.unwrap();
    let artist = accepted_artist(&state, 0).await;

    store.fail_player_writes(true);
    assert!(matches!(
        room_service::submit_answer(&state, ROOM, "ana", artist.clone()).await,
        Err(ServiceError::Unavailable(_))
    ));

    let room = snapshot(&state).await;
    assert_eq!(room.state.phase, RoomPhase::Buzzed);
    assert_eq!(room.buzz.unwrap().player_id, "ana");
    assert!(room.last_result.is_none());
    assert_eq!(room.players[0].score, 0);

    store.fail_player_writes(false);
    let result = room_service::submit_answer(&state, ROOM, "ana", artist)
        .await
        .unwrap();
    assert!(result.correct);
    assert_eq!(result.points, 4);

    let room = snapshot(&state).await;
    assert_eq!(room.state.phase, RoomPhase::Reveal);
    assert_eq!(room.players[0].score, 4);
}

#[tokio::test]
async fn buzz_landing_after_a_skip_is_withdrawn() {
    let store = Arc::new(FaultyStore::new());
    let (state, _) = setup_with(
        RevealPolicy::AwaitHost,
        store.clone(),
        Arc::new(LoggingPlayback),
    )
    .await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();

    let (parked, resume) = store.hold_next_buzz();
    let claiming = {
        let state = state.clone();
        tokio::spawn(async move { buzz_service::claim(&state, ROOM, "ana", None).await })
    };
    parked.notified().await;

    room_service::reveal_now(&state, ROOM, true).await.unwrap();
    resume.notify_one();

    assert!(matches!(
        claiming.await.unwrap(),
        Err(ServiceError::InvalidState(_))
    ));
    let room = snapshot(&state).await;
    assert_eq!(room.state.phase, RoomPhase::Reveal);
    assert!(room.buzz.is_none());
}

#[tokio::test(start_paused = true)]
async fn stuck_playback_does_not_hold_up_the_question() {
    let (state, _) = setup_with(
        RevealPolicy::AwaitHost,
        Arc::new(MemoryRoomStore::new()),
        Arc::new(StuckPlayback),
    )
    .await;

    let started = room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();
    assert_eq!(started.phase, RoomPhase::Playing);

    tokio::time::sleep(Duration::from_secs(91)).await;
    let room = wait_for_phase(&state, RoomPhase::Reveal).await;
    assert!(room.last_result.is_none());
}

#[tokio::test]
async fn manual_reveal_drops_the_previous_result() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();
    buzz_service::claim(&state, ROOM, "ana", None).await.unwrap();
    let artist = accepted_artist(&state, 0).await;
    room_service::submit_answer(&state, ROOM, "ana", artist)
        .await
        .unwrap();
    assert!(snapshot(&state).await.last_result.is_some());

    room_service::advance_to_next(&state, ROOM).await.unwrap();
    room_service::reveal_now(&state, ROOM, false).await.unwrap();

    let room = snapshot(&state).await;
    assert_eq!(room.state.phase, RoomPhase::Reveal);
    assert_eq!(room.state.question_index, 1);
    assert!(room.last_result.is_none());
}

#[tokio::test]
async fn rebuilding_after_a_reveal_rewinds_the_room() {
    let (state, _) = setup(RevealPolicy::AwaitHost).await;
    room_service::start_question(&state, ROOM, None)
        .await
        .unwrap();
    room_service::reveal_now(&state, ROOM, true).await.unwrap();
    room_service::advance_to_next(&state, ROOM).await.unwrap();
    room_service::reveal_now(&state, ROOM, true).await.unwrap();
    let before = current_token(&state).await;

    room_service::build_round(
        &state,
        ROOM,
        BuildRoundRequest {
            list_ids: vec!["mix".into()],
            question_count: Some(2),
        },
    )
    .await
    .unwrap();

    let room = snapshot(&state).await;
    assert_eq!(room.state.phase, RoomPhase::Idle);
    assert_eq!(room.state.question_index, 0);
    assert_eq!(room.state.question_count, 2);
    assert!(current_token(&state).await.generation > before.generation);
}
