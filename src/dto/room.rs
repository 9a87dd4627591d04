use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::{BuzzEntity, LastResultEntity, RoomStateEntity, RoundEntity},
    dto::{
        format_epoch_ms, player::PlayerSummary, tracklist::TrackDto,
        validation::validate_identifier,
    },
    state::state_machine::RoomPhase,
};

/// Largest deck a host may ask for.
pub const MAX_QUESTION_COUNT: usize = 200;
const MAX_SOURCE_LISTS: usize = 20;

/// Payload asking for a new round built from stored track lists.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BuildRoundRequest {
    /// Track lists to draw candidates from.
    pub list_ids: Vec<String>,
    /// Number of questions; the configured default when omitted.
    #[serde(default)]
    pub question_count: Option<usize>,
}

impl Validate for BuildRoundRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.list_ids.is_empty() || self.list_ids.len() > MAX_SOURCE_LISTS {
            let mut err = ValidationError::new("list_ids_length");
            err.message =
                Some(format!("Between 1 and {MAX_SOURCE_LISTS} track lists are required").into());
            errors.add("list_ids", err);
        }
        for id in &self.list_ids {
            if let Err(err) = validate_identifier(id) {
                errors.add("list_ids", err);
            }
        }

        if let Some(count) = self.question_count {
            if !(1..=MAX_QUESTION_COUNT).contains(&count) {
                let mut err = ValidationError::new("question_count_range");
                err.message =
                    Some(format!("Question count must be 1 to {MAX_QUESTION_COUNT}").into());
                errors.add("question_count", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Query of the start endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StartQuery {
    /// Question to start; the current one when omitted.
    pub index: Option<usize>,
}

/// Query of the reveal endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RevealQuery {
    /// Whether the host skipped the question rather than closing it.
    #[serde(default)]
    pub skipped: bool,
}

/// Payload routing a room's audio to another device.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TransferDeviceRequest {
    #[validate(length(min = 1, max = 128))]
    pub device_id: String,
}

/// Buzz attempt of a player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct BuzzRequest {
    #[validate(custom(function = "validate_identifier"))]
    pub player_id: String,
    /// Display name; the registered name is used when omitted.
    #[validate(length(min = 1, max = 40))]
    pub name: Option<String>,
}

/// Answer of the buzz claimant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AnswerRequest {
    #[validate(custom(function = "validate_identifier"))]
    pub player_id: String,
    #[validate(length(max = 200))]
    pub text: String,
}

/// Result of a buzz attempt. Losing a race is not an error.
#[derive(Debug, Serialize, ToSchema)]
pub struct BuzzResponse {
    /// Whether this attempt claimed the buzz.
    pub accepted: bool,
    /// Holder of the buzz after the attempt.
    pub owner: BuzzSummary,
}

/// Buzz slot content.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BuzzSummary {
    pub player_id: String,
    pub name: String,
    /// RFC 3339 claim time.
    pub at: String,
    /// Points at stake for the claimant (4, 2 or 1).
    pub window: u8,
    pub question_seq: u64,
}

impl From<BuzzEntity> for BuzzSummary {
    fn from(buzz: BuzzEntity) -> Self {
        Self {
            player_id: buzz.player_id,
            name: buzz.name,
            at: format_epoch_ms(buzz.at_ms),
            window: buzz.frozen_window.into(),
            question_seq: buzz.question_seq,
        }
    }
}

/// Outcome of the latest evaluated answer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LastResultSummary {
    pub player_id: String,
    pub name: String,
    pub correct: bool,
    /// Signed score change.
    pub points: i32,
    pub window: u8,
    /// Submitted text, empty when the claimant ran out of time.
    pub text: String,
    pub accepted: Vec<String>,
    pub question_index: usize,
    pub at: String,
}

impl From<LastResultEntity> for LastResultSummary {
    fn from(result: LastResultEntity) -> Self {
        Self {
            player_id: result.player_id,
            name: result.name,
            correct: result.correct,
            points: result.points,
            window: result.window.into(),
            text: result.text,
            accepted: result.accepted,
            question_index: result.question_index,
            at: format_epoch_ms(result.at_ms),
        }
    }
}

/// Question of a round with its position.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionSummary {
    pub index: usize,
    pub track: TrackDto,
}

/// Round as seen by the host.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundSummary {
    pub id: Uuid,
    pub room: String,
    pub created_at: String,
    pub source_lists: Vec<String>,
    /// Candidates left after deduplication.
    pub total_candidates: usize,
    pub questions: Vec<QuestionSummary>,
}

impl From<RoundEntity> for RoundSummary {
    fn from(round: RoundEntity) -> Self {
        Self {
            id: round.id,
            room: round.room,
            created_at: format_epoch_ms(round.created_at_ms),
            source_lists: round.source_lists,
            total_candidates: round.total_candidates,
            questions: round
                .questions
                .into_iter()
                .enumerate()
                .map(|(index, track)| QuestionSummary {
                    index,
                    track: track.into(),
                })
                .collect(),
        }
    }
}

/// Phase record of a room as returned by host actions.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomStateSummary {
    pub phase: RoomPhase,
    pub question_index: usize,
    /// Number of questions in the current round.
    pub question_count: usize,
    /// RFC 3339 start of the current question.
    pub started_at: Option<String>,
    /// Milliseconds since the current question started.
    pub elapsed_ms: Option<i64>,
    /// Whether a wrong answer already removed the full window.
    pub wrong_at_any: bool,
    pub reveal_until: Option<String>,
    pub question_seq: u64,
}

impl RoomStateSummary {
    /// Describe `state` for a round of `question_count` questions at `now_ms`.
    pub fn new(state: &RoomStateEntity, question_count: usize, now_ms: i64) -> Self {
        Self {
            phase: state.phase,
            question_index: state.idx,
            question_count,
            started_at: state.started_at_ms.map(format_epoch_ms),
            elapsed_ms: state
                .started_at_ms
                .map(|started| now_ms.saturating_sub(started).max(0)),
            wrong_at_any: state.wrong_at_any,
            reveal_until: state.reveal_until_ms.map(format_epoch_ms),
            question_seq: state.question_seq,
        }
    }
}

/// Everything a client needs to render a room.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomSnapshot {
    pub room: String,
    pub state: RoomStateSummary,
    /// Points a buzz would lock in right now; only while a question plays.
    pub current_window: Option<u8>,
    /// Buzz of the current question.
    pub buzz: Option<BuzzSummary>,
    pub players: Vec<PlayerSummary>,
    pub last_result: Option<LastResultSummary>,
    /// Current question, disclosed once it has been revealed.
    pub question: Option<QuestionSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::scoring::ScoreWindow;

    fn request(list_ids: &[&str], question_count: Option<usize>) -> BuildRoundRequest {
        BuildRoundRequest {
            list_ids: list_ids.iter().map(|id| id.to_string()).collect(),
            question_count,
        }
    }

    #[test]
    fn build_request_requires_valid_list_ids() {
        assert!(request(&["rock", "pop"], Some(10)).validate().is_ok());
        assert!(request(&[], None).validate().is_err());
        assert!(request(&["rock/../pop"], None).validate().is_err());
    }

    #[test]
    fn build_request_bounds_question_count() {
        assert!(request(&["rock"], None).validate().is_ok());
        assert!(request(&["rock"], Some(0)).validate().is_err());
        assert!(request(&["rock"], Some(MAX_QUESTION_COUNT + 1)).validate().is_err());
    }

    #[test]
    fn state_summary_reports_elapsed_time() {
        let state = RoomStateEntity {
            phase: RoomPhase::Playing,
            started_at_ms: Some(1_000),
            question_seq: 3,
            ..Default::default()
        };
        let summary = RoomStateSummary::new(&state, 5, 11_500);
        assert_eq!(summary.elapsed_ms, Some(10_500));
        assert_eq!(summary.question_count, 5);

        let idle = RoomStateSummary::new(&RoomStateEntity::default(), 0, 11_500);
        let json = serde_json::to_value(&idle).unwrap();
        assert!(json.get("started_at").is_none());
        assert!(json.get("elapsed_ms").is_none());
    }

    #[test]
    fn buzz_summary_exposes_numeric_window() {
        let summary = BuzzSummary::from(BuzzEntity {
            player_id: "ana".into(),
            name: "Ana".into(),
            at_ms: 0,
            frozen_window: ScoreWindow::Two,
            question_seq: 1,
        });
        assert_eq!(summary.window, 2);
        assert_eq!(summary.at, "1970-01-01T00:00:00Z");
    }
}
