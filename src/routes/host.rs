use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::room::{
        BuildRoundRequest, RevealQuery, RoomSnapshot, RoomStateSummary, RoundSummary, StartQuery,
        TransferDeviceRequest,
    },
    error::AppError,
    services::room_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/rooms/{room}/round",
    tag = "host",
    params(("room" = String, Path, description = "Room identifier")),
    request_body = BuildRoundRequest,
    responses(
        (status = 200, description = "Round built and room rewound", body = RoundSummary),
        (status = 400, description = "Invalid request or no candidates"),
        (status = 404, description = "Unknown track list"),
        (status = 409, description = "A question is in play"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Build a round from stored track lists, one question per artist at most.
pub async fn build_round(
    State(state): State<SharedState>,
    Path(room): Path<String>,
    Valid(Json(request)): Valid<Json<BuildRoundRequest>>,
) -> Result<Json<RoundSummary>, AppError> {
    let round = room_service::build_round(&state, &room, request).await?;
    Ok(Json(round))
}

#[utoipa::path(
    get,
    path = "/rooms/{room}/round",
    tag = "host",
    params(("room" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Current round", body = RoundSummary),
        (status = 404, description = "No round built yet")
    )
)]
/// Return the round of the room, answers included.
pub async fn get_round(
    State(state): State<SharedState>,
    Path(room): Path<String>,
) -> Result<Json<RoundSummary>, AppError> {
    let round = room_service::get_round(&state, &room).await?;
    Ok(Json(round))
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/start",
    tag = "host",
    params(("room" = String, Path, description = "Room identifier"), StartQuery),
    responses(
        (status = 200, description = "Question started", body = RoomStateSummary),
        (status = 400, description = "Index out of range"),
        (status = 409, description = "Room is not idle or revealing")
    )
)]
/// Start a question and arm the auto-skip timer.
pub async fn start_question(
    State(state): State<SharedState>,
    Path(room): Path<String>,
    Query(query): Query<StartQuery>,
) -> Result<Json<RoomStateSummary>, AppError> {
    let summary = room_service::start_question(&state, &room, query.index).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/reveal",
    tag = "host",
    params(("room" = String, Path, description = "Room identifier"), RevealQuery),
    responses(
        (status = 200, description = "Question revealed", body = RoomStateSummary),
        (status = 409, description = "No question in play")
    )
)]
/// Reveal the current question.
pub async fn reveal(
    State(state): State<SharedState>,
    Path(room): Path<String>,
    Query(query): Query<RevealQuery>,
) -> Result<Json<RoomStateSummary>, AppError> {
    let summary = room_service::reveal_now(&state, &room, query.skipped).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/next",
    tag = "host",
    params(("room" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Next question started or round ended", body = RoomStateSummary),
        (status = 409, description = "Current question not revealed yet")
    )
)]
/// Move on from a reveal.
pub async fn next_question(
    State(state): State<SharedState>,
    Path(room): Path<String>,
) -> Result<Json<RoomStateSummary>, AppError> {
    let summary = room_service::advance_to_next(&state, &room).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/reset",
    tag = "host",
    params(("room" = String, Path, description = "Room identifier")),
    responses((status = 200, description = "Room rewound to the first question", body = RoomStateSummary))
)]
/// Rewind the room to the first question. Scores are kept.
pub async fn reset(
    State(state): State<SharedState>,
    Path(room): Path<String>,
) -> Result<Json<RoomStateSummary>, AppError> {
    let summary = room_service::reset_to_first(&state, &room).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/playback/device",
    tag = "host",
    params(("room" = String, Path, description = "Room identifier")),
    request_body = TransferDeviceRequest,
    responses(
        (status = 204, description = "Playback transferred"),
        (status = 503, description = "Playback device refused the transfer")
    )
)]
/// Route the room's audio to another device.
pub async fn transfer_device(
    State(state): State<SharedState>,
    Path(room): Path<String>,
    Valid(Json(request)): Valid<Json<TransferDeviceRequest>>,
) -> Result<StatusCode, AppError> {
    room_service::transfer_playback(&state, &room, &request.device_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/rooms/{room}",
    tag = "rooms",
    params(("room" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSnapshot),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Return everything needed to render the room.
pub async fn room_snapshot(
    State(state): State<SharedState>,
    Path(room): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let snapshot = room_service::snapshot(&state, &room).await?;
    Ok(Json(snapshot))
}

/// Configure the host and room read routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/rooms/{room}", get(room_snapshot))
        .route("/rooms/{room}/round", post(build_round).get(get_round))
        .route("/rooms/{room}/start", post(start_question))
        .route("/rooms/{room}/reveal", post(reveal))
        .route("/rooms/{room}/next", post(next_question))
        .route("/rooms/{room}/reset", post(reset))
        .route("/rooms/{room}/playback/device", post(transfer_device))
}
