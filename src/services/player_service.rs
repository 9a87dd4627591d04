//! Player presence. Scores are never written here.

use tracing::info;

use crate::{
    dto::{player::PlayerSummary, validation::ensure_identifier},
    error::ServiceError,
    services::room_service::open_room,
    state::SharedState,
};

/// Register `player_id` in `room`, keeping the score of a returning player.
pub async fn join(
    state: &SharedState,
    room: &str,
    player_id: &str,
    name: &str,
) -> Result<PlayerSummary, ServiceError> {
    let repo = open_room(state, room).await?;
    ensure_identifier("player", player_id)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput(
            "player name must not be empty".into(),
        ));
    }

    let player = state
        .bounded(repo.upsert_player(player_id, name, state.now_ms()))
        .await?;
    info!(room, player_id, score = player.score, "player joined");
    Ok(player.into())
}

/// Refresh the presence of a registered player.
pub async fn heartbeat(
    state: &SharedState,
    room: &str,
    player_id: &str,
) -> Result<PlayerSummary, ServiceError> {
    touch(state, room, player_id, true).await
}

/// Mark a player offline; the score is kept for a later join.
pub async fn leave(
    state: &SharedState,
    room: &str,
    player_id: &str,
) -> Result<PlayerSummary, ServiceError> {
    let player = touch(state, room, player_id, false).await?;
    info!(room, player_id, "player left");
    Ok(player)
}

async fn touch(
    state: &SharedState,
    room: &str,
    player_id: &str,
    online: bool,
) -> Result<PlayerSummary, ServiceError> {
    let repo = open_room(state, room).await?;
    ensure_identifier("player", player_id)?;
    state
        .bounded(repo.touch_player(player_id, online, state.now_ms()))
        .await?
        .map(Into::into)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("player `{player_id}` is not in room `{room}`"))
        })
}
