use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    logic::{round_builder::Track, scoring::ScoreWindow},
    state::state_machine::RoomPhase,
};

/// Question deck built for a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    /// Identifier of this build.
    pub id: Uuid,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at_ms: i64,
    /// Room the round belongs to.
    pub room: String,
    /// Track lists the candidates were drawn from.
    pub source_lists: Vec<String>,
    /// Size of the deduplicated candidate pool.
    pub total_candidates: usize,
    /// Questions in play order.
    pub questions: Vec<Track>,
}

/// Authoritative phase record of a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RoomStateEntity {
    /// Index of the current question in the round.
    pub idx: usize,
    /// Current phase.
    pub phase: RoomPhase,
    /// When the current question started playing.
    #[serde(default)]
    pub started_at_ms: Option<i64>,
    /// Whether a wrong answer already consumed the full window of this question.
    #[serde(default)]
    pub wrong_at_any: bool,
    /// When the reveal screen is due to end.
    #[serde(default)]
    pub reveal_until_ms: Option<i64>,
    /// Incremented every time a question starts; ties buzzes and answers to one question.
    #[serde(default)]
    pub question_seq: u64,
    /// Incremented on every phase transition; scheduled timers compare against it.
    #[serde(default)]
    pub generation: u64,
}

/// First successful buzz of a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuzzEntity {
    /// Claimant identifier.
    pub player_id: String,
    /// Claimant display name.
    pub name: String,
    /// Claim time, milliseconds since the Unix epoch.
    pub at_ms: i64,
    /// Window locked in at claim time.
    pub frozen_window: ScoreWindow,
    /// Question the claim belongs to.
    pub question_seq: u64,
}

/// Answer submitted by the buzz claimant (or synthesized on timeout).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Claimant identifier.
    pub player_id: String,
    /// Free-text guess.
    pub text: String,
    /// Submission time, milliseconds since the Unix epoch.
    pub at_ms: i64,
    /// Question the answer belongs to.
    pub question_seq: u64,
}

/// Player registered in a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Opaque identifier supplied by the identity collaborator.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Cumulative score, only ever changed by additive transactions.
    #[serde(default)]
    pub score: i32,
    /// First join time.
    pub joined_at_ms: i64,
    /// Last presence signal.
    pub last_seen_ms: i64,
    /// Whether the player is currently connected.
    #[serde(default)]
    pub online: bool,
    /// Points already counted for the most recently scored question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scored: Option<QuestionScore>,
}

/// Contribution of one question to a player's score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionScore {
    pub question_seq: u64,
    pub points: i32,
}

/// Outcome of the most recent answer evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastResultEntity {
    /// Claimant identifier.
    pub player_id: String,
    /// Claimant display name.
    pub name: String,
    /// Whether the guess matched.
    pub correct: bool,
    /// Signed score change.
    pub points: i32,
    /// Window the delta was computed from.
    pub window: ScoreWindow,
    /// Submitted text (empty when the answer timed out).
    pub text: String,
    /// Accepted artist names of the question.
    pub accepted: Vec<String>,
    /// Evaluated question index.
    pub question_index: usize,
    /// Evaluation time.
    pub at_ms: i64,
}

/// Named candidate pool the host builds rounds from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackListEntity {
    /// Identifier chosen by the uploader.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Candidate tracks.
    pub tracks: Vec<Track>,
}
