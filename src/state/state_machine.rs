use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::dao::models::RoomStateEntity;

/// Phases a room goes through while a round is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    /// No question is running; the host can build a round and start.
    #[default]
    Idle,
    /// The current question is playing and buzzers are open.
    Playing,
    /// A player holds the buzz and is expected to answer.
    Buzzed,
    /// The answer is shown before the next question.
    Reveal,
    /// Every question of the round has been played.
    Ended,
}

/// Events that can be applied to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Start (or advance to) a question.
    StartQuestion,
    /// A player won the buzz.
    Buzz,
    /// Show the answer, after an evaluation, a skip or a timeout.
    Reveal,
    /// Advance past the last question.
    Finish,
    /// Back to the first question with empty slots.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the room was in when the invalid event was received.
    pub from: RoomPhase,
    /// The event that cannot be applied from this phase.
    pub event: RoomEvent,
}

/// Compute the phase reached by applying `event` in `from`.
pub fn next_phase(from: RoomPhase, event: RoomEvent) -> Result<RoomPhase, InvalidTransition> {
    let next = match (from, event) {
        (_, RoomEvent::Reset) => RoomPhase::Idle,
        (RoomPhase::Idle | RoomPhase::Reveal, RoomEvent::StartQuestion) => RoomPhase::Playing,
        (RoomPhase::Playing, RoomEvent::Buzz) => RoomPhase::Buzzed,
        (RoomPhase::Playing | RoomPhase::Buzzed, RoomEvent::Reveal) => RoomPhase::Reveal,
        (RoomPhase::Reveal, RoomEvent::Finish) => RoomPhase::Ended,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

/// Identity of the room state a scheduled timer was armed for.
///
/// A timer only acts when the room still carries the same token; any
/// transition in between bumps the generation and turns it into a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseToken {
    /// Question index at arming time.
    pub question_index: usize,
    /// Phase at arming time.
    pub phase: RoomPhase,
    /// Transition counter at arming time.
    pub generation: u64,
}

impl PhaseToken {
    /// Token describing `state`.
    pub fn of(state: &RoomStateEntity) -> Self {
        Self {
            question_index: state.idx,
            phase: state.phase,
            generation: state.generation,
        }
    }

    /// Whether `state` is still the state this token was taken from.
    pub fn matches(&self, state: &RoomStateEntity) -> bool {
        *self == Self::of(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(phase: RoomPhase, event: RoomEvent) -> RoomPhase {
        next_phase(phase, event).unwrap()
    }

    #[test]
    fn initial_state_is_idle() {
        assert_eq!(RoomPhase::default(), RoomPhase::Idle);
        assert_eq!(RoomStateEntity::default().phase, RoomPhase::Idle);
    }

    #[test]
    fn full_happy_path_through_round() {
        let mut phase = RoomPhase::Idle;

        phase = apply(phase, RoomEvent::StartQuestion);
        assert_eq!(phase, RoomPhase::Playing);
        phase = apply(phase, RoomEvent::Buzz);
        assert_eq!(phase, RoomPhase::Buzzed);
        phase = apply(phase, RoomEvent::Reveal);
        assert_eq!(phase, RoomPhase::Reveal);
        phase = apply(phase, RoomEvent::StartQuestion);
        assert_eq!(phase, RoomPhase::Playing);
        phase = apply(phase, RoomEvent::Reveal);
        assert_eq!(phase, RoomPhase::Reveal);
        phase = apply(phase, RoomEvent::Finish);
        assert_eq!(phase, RoomPhase::Ended);
        assert_eq!(apply(phase, RoomEvent::Reset), RoomPhase::Idle);
    }

    #[test]
    fn reset_is_accepted_from_every_phase() {
        for phase in [
            RoomPhase::Idle,
            RoomPhase::Playing,
            RoomPhase::Buzzed,
            RoomPhase::Reveal,
            RoomPhase::Ended,
        ] {
            assert_eq!(apply(phase, RoomEvent::Reset), RoomPhase::Idle);
        }
    }

    #[test]
    fn questions_cannot_be_skipped_without_reveal() {
        for phase in [RoomPhase::Playing, RoomPhase::Buzzed, RoomPhase::Ended] {
            let err = next_phase(phase, RoomEvent::StartQuestion).unwrap_err();
            assert_eq!(err.from, phase);
            assert_eq!(err.event, RoomEvent::StartQuestion);
        }
    }

    #[test]
    fn invalid_transition_returns_error() {
        let cases = [
            (RoomPhase::Idle, RoomEvent::Buzz),
            (RoomPhase::Idle, RoomEvent::Reveal),
            (RoomPhase::Buzzed, RoomEvent::Buzz),
            (RoomPhase::Reveal, RoomEvent::Reveal),
            (RoomPhase::Playing, RoomEvent::Finish),
            (RoomPhase::Ended, RoomEvent::Buzz),
        ];
        for (from, event) in cases {
            assert_eq!(
                next_phase(from, event),
                Err(InvalidTransition { from, event }),
                "{from:?} + {event:?}"
            );
        }
    }

    #[test]
    fn token_detects_any_transition() {
        let mut state = RoomStateEntity {
            idx: 2,
            phase: RoomPhase::Playing,
            generation: 7,
            ..RoomStateEntity::default()
        };
        let token = PhaseToken::of(&state);
        assert!(token.matches(&state));

        state.generation += 1;
        assert!(!token.matches(&state));

        state.generation -= 1;
        state.phase = RoomPhase::Buzzed;
        assert!(!token.matches(&state));
    }

    #[test]
    fn phase_serializes_in_snake_case() {
        assert_eq!(serde_json::to_string(&RoomPhase::Buzzed).unwrap(), "\"buzzed\"");
        let parsed: RoomPhase = serde_json::from_str("\"reveal\"").unwrap();
        assert_eq!(parsed, RoomPhase::Reveal);
    }
}
