//! Room lifecycle: rounds, question flow, answer evaluation and the timers driving them.
//!
//! Every phase change goes through a single state transaction. Side effects
//! (timers, playback, slot cleanup) only run once that transaction committed.

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::RevealPolicy,
    dao::{
        models::{AnswerEntity, BuzzEntity, LastResultEntity, RoomStateEntity, RoundEntity},
        room::RoomRepository,
    },
    dto::{
        player::PlayerSummary,
        room::{
            BuildRoundRequest, BuzzSummary, LastResultSummary, QuestionSummary, RoomSnapshot,
            RoomStateSummary, RoundSummary,
        },
        validation::ensure_identifier,
    },
    error::ServiceError,
    logic::{round_builder, scoring},
    services::playback,
    state::{
        SharedState,
        state_machine::{InvalidTransition, PhaseToken, RoomEvent, RoomPhase, next_phase},
        timers::TimerKind,
    },
};

/// Why a state transaction did not commit.
enum Refusal {
    /// The room already left the state the caller was acting on.
    Stale,
    Rejected(ServiceError),
}

impl From<ServiceError> for Refusal {
    fn from(err: ServiceError) -> Self {
        Refusal::Rejected(err)
    }
}

impl From<InvalidTransition> for Refusal {
    fn from(err: InvalidTransition) -> Self {
        Refusal::Rejected(err.into())
    }
}

/// Repository of `room` after checking the identifier.
pub(crate) async fn open_room(
    state: &SharedState,
    room: &str,
) -> Result<RoomRepository, ServiceError> {
    ensure_identifier("room", room)?;
    state.room(room).await
}

/// Build a new round for `room` from stored track lists and rewind the room.
pub async fn build_round(
    state: &SharedState,
    room: &str,
    request: BuildRoundRequest,
) -> Result<RoundSummary, ServiceError> {
    let repo = open_room(state, room).await?;
    ensure_not_in_play(&state.bounded(repo.state()).await?)?;

    let tracklists = state.tracklists().await?;
    let mut candidates = Vec::new();
    for id in &request.list_ids {
        let Some(list) = state.bounded(tracklists.find(id)).await? else {
            return Err(ServiceError::NotFound(format!("track list `{id}` not found")));
        };
        candidates.extend(list.tracks);
    }

    let question_count = request
        .question_count
        .unwrap_or(state.config().default_question_count);
    let built = round_builder::build(candidates, question_count)?;
    if built.questions.len() < question_count {
        info!(
            room,
            requested = question_count,
            built = built.questions.len(),
            "not enough distinct artists; round is shorter than requested"
        );
    }

    let round = RoundEntity {
        id: Uuid::new_v4(),
        created_at_ms: state.now_ms(),
        room: room.to_string(),
        source_lists: request.list_ids,
        total_candidates: built.total_candidates,
        questions: built.questions,
    };

    let rewound = transition(state, &repo, |current| {
        ensure_not_in_play(&current)?;
        let phase = next_phase(current.phase, RoomEvent::Reset)?;
        Ok(RoomStateEntity {
            phase,
            question_seq: current.question_seq,
            generation: current.generation + 1,
            ..RoomStateEntity::default()
        })
    })
    .await?
    .ok_or_else(moved_on)?;

    state.timers().cancel_superseded(room, rewound.generation);
    state.bounded(repo.save_round(&round)).await?;
    state.bounded(repo.clear_slots()).await?;
    state.bounded(repo.clear_last_result()).await?;

    info!(
        room,
        round_id = %round.id,
        questions = round.questions.len(),
        candidates = round.total_candidates,
        "round built"
    );
    Ok(round.into())
}

/// Round currently built for `room`.
pub async fn get_round(state: &SharedState, room: &str) -> Result<RoundSummary, ServiceError> {
    let repo = open_room(state, room).await?;
    Ok(load_round(state, &repo).await?.into())
}

/// Start question `index`, or the current one when omitted.
///
/// Allowed from idle and from a reveal; from a reveal the default is the next question.
pub async fn start_question(
    state: &SharedState,
    room: &str,
    index: Option<usize>,
) -> Result<RoomStateSummary, ServiceError> {
    let repo = open_room(state, room).await?;
    let round = load_round(state, &repo).await?;
    let question_count = round.questions.len();
    let now_ms = state.now_ms();

    let next = transition(state, &repo, move |current| {
        let idx = match (index, current.phase) {
            (Some(idx), _) => idx,
            (None, RoomPhase::Reveal) => current.idx + 1,
            (None, _) => current.idx,
        };
        begin_question(&current, idx, question_count, now_ms)
    })
    .await?
    .ok_or_else(moved_on)?;

    on_question_started(state, &repo, &next, &round).await?;
    Ok(RoomStateSummary::new(&next, question_count, state.now_ms()))
}

/// Close the current question without waiting for an answer.
pub async fn reveal_now(
    state: &SharedState,
    room: &str,
    skipped: bool,
) -> Result<RoomStateSummary, ServiceError> {
    let repo = open_room(state, room).await?;
    let next = enter_reveal(state, &repo, None, skipped)
        .await?
        .ok_or_else(moved_on)?;
    summarize(state, &repo, &next).await
}

/// Leave a reveal: start the next question, or end the round after the last one.
pub async fn advance_to_next(
    state: &SharedState,
    room: &str,
) -> Result<RoomStateSummary, ServiceError> {
    let repo = open_room(state, room).await?;
    let round = load_round(state, &repo).await?;
    let next = advance(state, &repo, &round, None)
        .await?
        .ok_or_else(moved_on)?;
    Ok(RoomStateSummary::new(
        &next,
        round.questions.len(),
        state.now_ms(),
    ))
}

/// Rewind the room to the first question and clear the slots.
pub async fn reset_to_first(
    state: &SharedState,
    room: &str,
) -> Result<RoomStateSummary, ServiceError> {
    let repo = open_room(state, room).await?;
    let next = transition(state, &repo, |current| {
        let phase = next_phase(current.phase, RoomEvent::Reset)?;
        Ok(RoomStateEntity {
            phase,
            question_seq: current.question_seq,
            generation: current.generation + 1,
            ..RoomStateEntity::default()
        })
    })
    .await?
    .ok_or_else(moved_on)?;

    state.timers().cancel_superseded(room, next.generation);
    state.bounded(repo.clear_slots()).await?;
    state.bounded(repo.clear_last_result()).await?;
    playback::pause(state, room).await;

    info!(room, "room reset to the first question");
    summarize(state, &repo, &next).await
}

/// Route the room's audio to `device_id`.
pub async fn transfer_playback(
    state: &SharedState,
    room: &str,
    device_id: &str,
) -> Result<(), ServiceError> {
    ensure_identifier("room", room)?;
    playback::transfer(state, room, device_id).await?;
    info!(room, device_id, "playback transferred");
    Ok(())
}

/// Record and evaluate the answer of the buzz claimant.
pub async fn submit_answer(
    state: &SharedState,
    room: &str,
    player_id: &str,
    text: String,
) -> Result<LastResultSummary, ServiceError> {
    let repo = open_room(state, room).await?;
    ensure_identifier("player", player_id)?;

    let current = state.bounded(repo.state()).await?;
    if current.phase != RoomPhase::Buzzed {
        return Err(ServiceError::InvalidState(format!(
            "answers are only accepted after a buzz (room is {:?})",
            current.phase
        )));
    }

    let buzz = state
        .bounded(repo.buzz())
        .await?
        .filter(|buzz| buzz.question_seq == current.question_seq)
        .ok_or_else(|| ServiceError::InvalidState("no buzz for the current question".into()))?;
    if buzz.player_id != player_id {
        return Err(ServiceError::InvalidState(format!(
            "player `{player_id}` does not hold the buzz"
        )));
    }

    let answer = AnswerEntity {
        player_id: player_id.to_string(),
        text,
        at_ms: state.now_ms(),
        question_seq: current.question_seq,
    };
    if !state.bounded(repo.record_answer(answer.clone())).await? {
        return Err(ServiceError::InvalidState(
            "an answer was already submitted for this question".into(),
        ));
    }

    let result = settle_answer(state, &repo, current, buzz, answer)
        .await?
        .ok_or_else(moved_on)?;
    Ok(result.into())
}

/// Everything a client needs to render `room`.
pub async fn snapshot(state: &SharedState, room: &str) -> Result<RoomSnapshot, ServiceError> {
    let repo = open_room(state, room).await?;
    let current = state.bounded(repo.state()).await?;
    let round = state.bounded(repo.round()).await?;
    let buzz = state
        .bounded(repo.buzz())
        .await?
        .filter(|buzz| buzz.question_seq == current.question_seq);
    let last_result = state.bounded(repo.last_result()).await?;

    let mut players: Vec<PlayerSummary> = state
        .bounded(repo.players())
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    players.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));

    let now_ms = state.now_ms();
    let current_window = (current.phase == RoomPhase::Playing).then(|| {
        let elapsed = scoring::elapsed_secs(current.started_at_ms, now_ms);
        scoring::window_for(elapsed, current.wrong_at_any).into()
    });

    let question_count = round.as_ref().map_or(0, |round| round.questions.len());
    let question = match current.phase {
        RoomPhase::Reveal | RoomPhase::Ended => round
            .and_then(|round| round.questions.into_iter().nth(current.idx))
            .map(|track| QuestionSummary {
                index: current.idx,
                track: track.into(),
            }),
        _ => None,
    };

    Ok(RoomSnapshot {
        room: room.to_string(),
        state: RoomStateSummary::new(&current, question_count, now_ms),
        current_window,
        buzz: buzz.map(BuzzSummary::from),
        players,
        last_result: last_result.map(Into::into),
        question,
    })
}

/// Move a room whose buzz slot was just claimed into the buzzed phase.
///
/// Repeating it for the same question is a no-op. Fails when the room moved
/// on to another question or phase between the claim and this call.
pub(crate) async fn enter_buzzed(
    state: &SharedState,
    repo: &RoomRepository,
    buzz: &BuzzEntity,
) -> Result<(), ServiceError> {
    let question_seq = buzz.question_seq;
    let next = transition(state, repo, move |current| {
        if current.question_seq != question_seq {
            return Err(ServiceError::InvalidState(
                "the question ended before the buzz was registered".into(),
            )
            .into());
        }
        if current.phase == RoomPhase::Buzzed {
            return Err(Refusal::Stale);
        }
        let phase = next_phase(current.phase, RoomEvent::Buzz)?;
        Ok(RoomStateEntity {
            phase,
            generation: current.generation + 1,
            ..current
        })
    })
    .await?;

    let Some(next) = next else {
        debug!(room = repo.room(), question_seq, "room already buzzed");
        return Ok(());
    };

    let room = repo.room();
    state.timers().cancel_superseded(room, next.generation);
    arm(
        state,
        room,
        TimerKind::AnswerTimeout,
        &next,
        state.config().timings.answer,
    );
    playback::pause(state, room).await;
    info!(room, player_id = %buzz.player_id, window = buzz.frozen_window.points(), "buzz accepted");
    Ok(())
}

/// Run the job of a fired timer. Acts only if the room still matches `token`.
pub async fn run_timer(
    state: &SharedState,
    room: &str,
    kind: TimerKind,
    token: PhaseToken,
) -> Result<(), ServiceError> {
    let repo = state.room(room).await?;
    let acted = match kind {
        TimerKind::AutoSkip => enter_reveal(state, &repo, Some(token), true)
            .await?
            .is_some(),
        TimerKind::AnswerTimeout => answer_timed_out(state, &repo, token).await?,
        TimerKind::RevealDelay => {
            let round = load_round(state, &repo).await?;
            advance(state, &repo, &round, Some(token)).await?.is_some()
        }
    };
    if !acted {
        debug!(room, ?kind, ?token, "stale timer ignored");
    }
    Ok(())
}

fn fire_timer(
    state: SharedState,
    room: String,
    kind: TimerKind,
    token: PhaseToken,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(err) = run_timer(&state, &room, kind, token).await {
            warn!(room = %room, ?kind, error = %err, "timer job failed");
        }
    })
}

fn arm(
    state: &SharedState,
    room: &str,
    kind: TimerKind,
    armed_for: &RoomStateEntity,
    delay: Duration,
) {
    let token = PhaseToken::of(armed_for);
    let job = fire_timer(state.clone(), room.to_string(), kind, token);
    state.timers().schedule(room, kind, token, delay, job);
}

async fn answer_timed_out(
    state: &SharedState,
    repo: &RoomRepository,
    token: PhaseToken,
) -> Result<bool, ServiceError> {
    let current = state.bounded(repo.state()).await?;
    if !token.matches(&current) {
        return Ok(false);
    }
    let Some(buzz) = state
        .bounded(repo.buzz())
        .await?
        .filter(|buzz| buzz.question_seq == current.question_seq)
    else {
        return Ok(false);
    };

    let answer = AnswerEntity {
        player_id: buzz.player_id.clone(),
        text: String::new(),
        at_ms: state.now_ms(),
        question_seq: current.question_seq,
    };
    if !state.bounded(repo.record_answer(answer.clone())).await? {
        return Ok(false);
    }

    info!(room = repo.room(), player_id = %buzz.player_id, "answer time elapsed");
    Ok(settle_answer(state, repo, current, buzz, answer)
        .await?
        .is_some())
}

/// Evaluate a freshly recorded answer, releasing its slot when evaluation fails
/// so the claimant can answer again.
async fn settle_answer(
    state: &SharedState,
    repo: &RoomRepository,
    buzzed: RoomStateEntity,
    buzz: BuzzEntity,
    answer: AnswerEntity,
) -> Result<Option<LastResultEntity>, ServiceError> {
    let outcome = evaluate_answer(state, repo, &buzzed, buzz, answer.clone()).await;
    if outcome.is_err() {
        if let Err(err) = state.bounded(repo.release_answer(&answer)).await {
            warn!(room = repo.room(), error = %err, "answer slot could not be released");
        }
    }
    outcome
}

/// Score `answer` against the current question and reveal it.
///
/// `None` when the room left the `buzzed` state before the evaluation
/// committed; nothing is scored in that case. When the score or the result
/// cannot be written the room is put back into `buzzed`.
async fn evaluate_answer(
    state: &SharedState,
    repo: &RoomRepository,
    buzzed: &RoomStateEntity,
    buzz: BuzzEntity,
    answer: AnswerEntity,
) -> Result<Option<LastResultEntity>, ServiceError> {
    let token = PhaseToken::of(buzzed);
    let round = load_round(state, repo).await?;
    let accepted = round
        .questions
        .get(token.question_index)
        .map(|track| track.artist_names.clone())
        .unwrap_or_default();
    let correct =
        !answer.text.trim().is_empty() && state.matcher().is_match(&answer.text, &accepted);
    let window = buzz.frozen_window;
    let question_seq = buzz.question_seq;
    let reveal_until_ms = reveal_deadline(state);

    let next = transition(state, repo, move |current| {
        if !token.matches(&current) || current.question_seq != question_seq {
            return Err(Refusal::Stale);
        }
        let phase = next_phase(current.phase, RoomEvent::Reveal)?;
        let wrong_at_any = current.wrong_at_any
            || scoring::demotes_window(window, correct, current.wrong_at_any);
        Ok(RoomStateEntity {
            phase,
            wrong_at_any,
            reveal_until_ms,
            generation: current.generation + 1,
            ..current
        })
    })
    .await?;
    let Some(next) = next else {
        warn!(room = repo.room(), player_id = %buzz.player_id, "answer arrived after the question moved on");
        return Ok(None);
    };

    let points = scoring::delta_for(window, correct);
    let now_ms = state.now_ms();
    if let Err(err) = state
        .bounded(repo.record_question_score(
            &buzz.player_id,
            &buzz.name,
            question_seq,
            points,
            now_ms,
        ))
        .await
    {
        undo_reveal(state, repo, buzzed, &next).await;
        return Err(err);
    }

    let result = LastResultEntity {
        player_id: buzz.player_id,
        name: buzz.name,
        correct,
        points,
        window,
        text: answer.text,
        accepted,
        question_index: next.idx,
        at_ms: now_ms,
    };
    if let Err(err) = state.bounded(repo.publish_last_result(&result)).await {
        if let Err(revert_err) = state
            .bounded(repo.record_question_score(
                &result.player_id,
                &result.name,
                question_seq,
                0,
                now_ms,
            ))
            .await
        {
            warn!(room = repo.room(), error = %revert_err, "score of an unpublished result kept");
        }
        undo_reveal(state, repo, buzzed, &next).await;
        return Err(err);
    }

    on_revealed(state, repo, &next).await;
    info!(
        room = repo.room(),
        player_id = %result.player_id,
        correct,
        points,
        "answer evaluated"
    );
    Ok(Some(result))
}

/// Return a room revealed by a failed evaluation to the `buzzed` state it left.
async fn undo_reveal(
    state: &SharedState,
    repo: &RoomRepository,
    buzzed: &RoomStateEntity,
    revealed: &RoomStateEntity,
) {
    let room = repo.room();
    let revealed_generation = revealed.generation;
    let previous = buzzed.clone();
    let restored = transition(state, repo, move |current| {
        if current.generation != revealed_generation {
            return Err(Refusal::Stale);
        }
        Ok(RoomStateEntity {
            generation: current.generation + 1,
            ..previous.clone()
        })
    })
    .await;

    match restored {
        Ok(Some(restored)) => {
            state.timers().cancel_superseded(room, restored.generation);
            arm(
                state,
                room,
                TimerKind::AnswerTimeout,
                &restored,
                state.config().timings.answer,
            );
            warn!(room, question = restored.idx, "evaluation failed; room back to buzzed");
        }
        Ok(None) => debug!(room, "room moved on before a failed evaluation was undone"),
        Err(err) => warn!(room, error = %err, "failed evaluation left the room revealed"),
    }
}

async fn enter_reveal(
    state: &SharedState,
    repo: &RoomRepository,
    guard: Option<PhaseToken>,
    skipped: bool,
) -> Result<Option<RoomStateEntity>, ServiceError> {
    let reveal_until_ms = reveal_deadline(state);
    let next = transition(state, repo, move |current| {
        if guard.is_some_and(|token| !token.matches(&current)) {
            return Err(Refusal::Stale);
        }
        let phase = next_phase(current.phase, RoomEvent::Reveal)?;
        Ok(RoomStateEntity {
            phase,
            reveal_until_ms,
            generation: current.generation + 1,
            ..current
        })
    })
    .await?;
    let Some(next) = next else {
        return Ok(None);
    };

    // Nobody was evaluated for this question.
    state.bounded(repo.clear_last_result()).await?;
    on_revealed(state, repo, &next).await;
    info!(room = repo.room(), question = next.idx, skipped, "question revealed");
    Ok(Some(next))
}

async fn on_revealed(state: &SharedState, repo: &RoomRepository, next: &RoomStateEntity) {
    let room = repo.room();
    state.timers().cancel_superseded(room, next.generation);
    if state.config().reveal_policy == RevealPolicy::AutoAdvance {
        arm(
            state,
            room,
            TimerKind::RevealDelay,
            next,
            state.config().timings.reveal,
        );
    }
    playback::pause(state, room).await;
}

async fn advance(
    state: &SharedState,
    repo: &RoomRepository,
    round: &RoundEntity,
    guard: Option<PhaseToken>,
) -> Result<Option<RoomStateEntity>, ServiceError> {
    let question_count = round.questions.len();
    let now_ms = state.now_ms();
    let next = transition(state, repo, move |current| {
        if guard.is_some_and(|token| !token.matches(&current)) {
            return Err(Refusal::Stale);
        }
        if current.phase != RoomPhase::Reveal {
            return Err(ServiceError::InvalidState(format!(
                "the next question is only available after a reveal (room is {:?})",
                current.phase
            ))
            .into());
        }

        let idx = current.idx + 1;
        if idx >= question_count {
            let phase = next_phase(current.phase, RoomEvent::Finish)?;
            return Ok(RoomStateEntity {
                phase,
                reveal_until_ms: None,
                generation: current.generation + 1,
                ..current
            });
        }
        begin_question(&current, idx, question_count, now_ms)
    })
    .await?;
    let Some(next) = next else {
        return Ok(None);
    };

    if next.phase == RoomPhase::Ended {
        state.timers().cancel_superseded(repo.room(), next.generation);
        info!(room = repo.room(), questions = question_count, "round ended");
    } else {
        on_question_started(state, repo, &next, round).await?;
    }
    Ok(Some(next))
}

fn begin_question(
    current: &RoomStateEntity,
    idx: usize,
    question_count: usize,
    now_ms: i64,
) -> Result<RoomStateEntity, Refusal> {
    let phase = next_phase(current.phase, RoomEvent::StartQuestion)?;
    if idx >= question_count {
        return Err(ServiceError::InvalidInput(format!(
            "question {idx} does not exist (round has {question_count})"
        ))
        .into());
    }
    Ok(RoomStateEntity {
        idx,
        phase,
        started_at_ms: Some(now_ms),
        wrong_at_any: false,
        reveal_until_ms: None,
        question_seq: current.question_seq + 1,
        generation: current.generation + 1,
    })
}

async fn on_question_started(
    state: &SharedState,
    repo: &RoomRepository,
    next: &RoomStateEntity,
    round: &RoundEntity,
) -> Result<(), ServiceError> {
    let room = repo.room();
    state.timers().cancel_superseded(room, next.generation);
    state
        .bounded(repo.clear_stale_slots(next.question_seq))
        .await?;
    arm(
        state,
        room,
        TimerKind::AutoSkip,
        next,
        state.config().timings.auto_skip,
    );
    if let Some(track) = round.questions.get(next.idx) {
        playback::play(state, room, &track.uri).await;
    }
    info!(
        room,
        question = next.idx,
        question_seq = next.question_seq,
        "question started"
    );
    Ok(())
}

async fn transition<F>(
    state: &SharedState,
    repo: &RoomRepository,
    apply: F,
) -> Result<Option<RoomStateEntity>, ServiceError>
where
    F: FnMut(RoomStateEntity) -> Result<RoomStateEntity, Refusal> + Send + 'static,
{
    match state.bounded(repo.transact_state(apply)).await? {
        Ok(next) => Ok(Some(next)),
        Err(Refusal::Stale) => Ok(None),
        Err(Refusal::Rejected(err)) => Err(err),
    }
}

async fn load_round(
    state: &SharedState,
    repo: &RoomRepository,
) -> Result<RoundEntity, ServiceError> {
    state.bounded(repo.round()).await?.ok_or_else(|| {
        ServiceError::NotFound(format!("no round built for room `{}`", repo.room()))
    })
}

async fn summarize(
    state: &SharedState,
    repo: &RoomRepository,
    next: &RoomStateEntity,
) -> Result<RoomStateSummary, ServiceError> {
    let question_count = state
        .bounded(repo.round())
        .await?
        .map_or(0, |round| round.questions.len());
    Ok(RoomStateSummary::new(next, question_count, state.now_ms()))
}

fn reveal_deadline(state: &SharedState) -> Option<i64> {
    match state.config().reveal_policy {
        RevealPolicy::AutoAdvance => {
            let delay = i64::try_from(state.config().timings.reveal.as_millis()).unwrap_or(i64::MAX);
            Some(state.now_ms().saturating_add(delay))
        }
        RevealPolicy::AwaitHost => None,
    }
}

fn ensure_not_in_play(current: &RoomStateEntity) -> Result<(), ServiceError> {
    if matches!(current.phase, RoomPhase::Playing | RoomPhase::Buzzed) {
        return Err(ServiceError::InvalidState(
            "a round cannot be rebuilt while a question is in play".into(),
        ));
    }
    Ok(())
}

fn moved_on() -> ServiceError {
    ServiceError::InvalidState("room state changed while the request was processed".into())
}
