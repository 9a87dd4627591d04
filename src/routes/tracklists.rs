use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use axum_valid::Valid;

use crate::{
    dto::tracklist::{PutTrackListRequest, TrackListSummary},
    error::AppError,
    services::tracklist_service,
    state::SharedState,
};

#[utoipa::path(
    put,
    path = "/tracklists/{id}",
    tag = "tracklists",
    params(("id" = String, Path, description = "Track list identifier")),
    request_body = PutTrackListRequest,
    responses(
        (status = 200, description = "Track list stored", body = TrackListSummary),
        (status = 400, description = "Invalid track list")
    )
)]
/// Store a candidate track list, replacing any list with the same id.
pub async fn put_tracklist(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(request)): Valid<Json<PutTrackListRequest>>,
) -> Result<Json<TrackListSummary>, AppError> {
    let summary = tracklist_service::put(&state, &id, request).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/tracklists",
    tag = "tracklists",
    responses((status = 200, description = "Stored track lists", body = [TrackListSummary]))
)]
/// List the stored track lists.
pub async fn list_tracklists(
    State(state): State<SharedState>,
) -> Result<Json<Vec<TrackListSummary>>, AppError> {
    let lists = tracklist_service::list(&state).await?;
    Ok(Json(lists))
}

/// Configure the track list routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/tracklists", get(list_tracklists))
        .route("/tracklists/{id}", put(put_tracklist))
}
