use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{dao::models::TrackListEntity, logic::round_builder::Track};

/// Candidate track as exchanged over the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct TrackDto {
    /// Provider identifier.
    #[validate(length(min = 1, max = 128))]
    pub id: String,
    /// Reference handed to the playback device.
    #[validate(length(min = 1, max = 512))]
    pub uri: String,
    #[validate(length(max = 512))]
    pub name: String,
    /// Credited artists in provider order.
    pub artist_names: Vec<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl From<Track> for TrackDto {
    fn from(track: Track) -> Self {
        Self {
            id: track.id,
            uri: track.uri,
            name: track.name,
            artist_names: track.artist_names,
            duration_ms: track.duration_ms,
        }
    }
}

impl From<TrackDto> for Track {
    fn from(dto: TrackDto) -> Self {
        Self {
            id: dto.id,
            uri: dto.uri,
            name: dto.name,
            artist_names: dto.artist_names,
            duration_ms: dto.duration_ms,
        }
    }
}

/// Payload storing a candidate track list.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PutTrackListRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(nested)]
    pub tracks: Vec<TrackDto>,
}

/// Track list without its tracks, for listings.
#[derive(Debug, Serialize, ToSchema)]
pub struct TrackListSummary {
    pub id: String,
    pub name: String,
    pub track_count: usize,
}

impl From<TrackListEntity> for TrackListSummary {
    fn from(entity: TrackListEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            track_count: entity.tracks.len(),
        }
    }
}
