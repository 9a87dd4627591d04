use tracing::info;

use crate::{
    dao::models::TrackListEntity,
    dto::{
        tracklist::{PutTrackListRequest, TrackListSummary},
        validation::ensure_identifier,
    },
    error::ServiceError,
    logic::round_builder::dedup_by_id,
    state::SharedState,
};

/// Create or replace the track list `id`. Duplicate track ids keep their first occurrence.
pub async fn put(
    state: &SharedState,
    id: &str,
    request: PutTrackListRequest,
) -> Result<TrackListSummary, ServiceError> {
    ensure_identifier("track list", id)?;
    if request.tracks.iter().any(|track| track.artist_names.is_empty()) {
        return Err(ServiceError::InvalidInput(
            "every track needs at least one artist".into(),
        ));
    }

    let list = TrackListEntity {
        id: id.to_string(),
        name: request.name,
        tracks: dedup_by_id(request.tracks.into_iter().map(Into::into).collect()),
    };
    let repository = state.tracklists().await?;
    state.bounded(repository.save(&list)).await?;

    info!(id, tracks = list.tracks.len(), "track list stored");
    Ok(list.into())
}

/// Every stored track list.
pub async fn list(state: &SharedState) -> Result<Vec<TrackListSummary>, ServiceError> {
    let repository = state.tracklists().await?;
    Ok(state
        .bounded(repository.list())
        .await?
        .into_iter()
        .map(Into::into)
        .collect())
}
