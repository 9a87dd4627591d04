use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::PlayerEntity,
    dto::{format_epoch_ms, validation::validate_identifier},
};

/// Request sent by a device joining a room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRoomRequest {
    /// Opaque identifier supplied by the identity provider.
    #[validate(custom(function = "validate_identifier"))]
    pub player_id: String,
    #[validate(length(min = 1, max = 40))]
    pub name: String,
}

/// Public view of a player.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerSummary {
    pub id: String,
    pub name: String,
    pub score: i32,
    /// RFC 3339 timestamp of the first join.
    pub joined_at: String,
    /// RFC 3339 timestamp of the last presence signal.
    pub last_seen: String,
    pub online: bool,
}

impl From<PlayerEntity> for PlayerSummary {
    fn from(player: PlayerEntity) -> Self {
        Self {
            id: player.id,
            name: player.name,
            score: player.score,
            joined_at: format_epoch_ms(player.joined_at_ms),
            last_seen: format_epoch_ms(player.last_seen_ms),
            online: player.online,
        }
    }
}
