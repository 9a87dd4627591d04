//! First-writer-wins buzz arbitration.

use tracing::{debug, warn};

use crate::{
    dao::{
        models::BuzzEntity,
        room::{ClaimResult, RoomRepository},
    },
    dto::{room::BuzzResponse, validation::ensure_identifier},
    error::ServiceError,
    logic::scoring,
    services::room_service::{enter_buzzed, open_room},
    state::{SharedState, state_machine::RoomPhase},
};

/// Try to claim the buzz of the current question for `player_id`.
///
/// Losing the race is a normal outcome reported with `accepted = false` and
/// the current owner. The window is locked in at claim time.
pub async fn claim(
    state: &SharedState,
    room: &str,
    player_id: &str,
    name: Option<String>,
) -> Result<BuzzResponse, ServiceError> {
    let repo = open_room(state, room).await?;
    ensure_identifier("player", player_id)?;

    let current = state.bounded(repo.state()).await?;
    if current.phase == RoomPhase::Buzzed {
        // The race is already decided; report the holder like a lost claim.
        if let Some(owner) = state
            .bounded(repo.buzz())
            .await?
            .filter(|buzz| buzz.question_seq == current.question_seq)
        {
            return Ok(lost(room, player_id, owner));
        }
    }
    if current.phase != RoomPhase::Playing {
        return Err(ServiceError::InvalidState(format!(
            "buzzing is only possible while a question plays (room is {:?})",
            current.phase
        )));
    }

    let now_ms = state.now_ms();
    let elapsed = scoring::elapsed_secs(current.started_at_ms, now_ms);
    let frozen_window = scoring::window_for(elapsed, current.wrong_at_any);

    let name = match name {
        Some(name) => name,
        None => state
            .bounded(repo.player(player_id))
            .await?
            .map(|player| player.name)
            .unwrap_or_else(|| player_id.to_string()),
    };

    let candidate = BuzzEntity {
        player_id: player_id.to_string(),
        name,
        at_ms: now_ms,
        frozen_window,
        question_seq: current.question_seq,
    };

    match state.bounded(repo.claim_buzz(candidate)).await? {
        ClaimResult::Won(owner) => {
            if let Err(err) = enter_buzzed(state, &repo, &owner).await {
                // The question closed between the phase check and the claim.
                if matches!(err, ServiceError::InvalidState(_)) {
                    release(state, &repo, &owner).await;
                }
                return Err(err);
            }
            Ok(BuzzResponse {
                accepted: true,
                owner: owner.into(),
            })
        }
        ClaimResult::Lost(owner) => Ok(lost(room, player_id, owner)),
    }
}

async fn release(state: &SharedState, repo: &RoomRepository, claim: &BuzzEntity) {
    let room = repo.room();
    match state.bounded(repo.release_buzz(claim)).await {
        Ok(true) => debug!(room, player_id = %claim.player_id, "late buzz withdrawn"),
        Ok(false) => {}
        Err(err) => warn!(room, player_id = %claim.player_id, error = %err, "late buzz could not be withdrawn"),
    }
}

fn lost(room: &str, player_id: &str, owner: BuzzEntity) -> BuzzResponse {
    debug!(room, player_id, owner = %owner.player_id, "buzz lost");
    BuzzResponse {
        accepted: false,
        owner: owner.into(),
    }
}
