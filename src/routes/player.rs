use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, post},
};
use axum_valid::Valid;

use crate::{
    dto::{
        player::{JoinRoomRequest, PlayerSummary},
        room::{AnswerRequest, BuzzRequest, BuzzResponse, LastResultSummary},
    },
    error::AppError,
    services::{buzz_service, player_service, room_service},
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/rooms/{room}/players",
    tag = "players",
    params(("room" = String, Path, description = "Room identifier")),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Player registered or refreshed", body = PlayerSummary),
        (status = 400, description = "Invalid identifier or name")
    )
)]
/// Join a room. A returning player keeps their score.
pub async fn join(
    State(state): State<SharedState>,
    Path(room): Path<String>,
    Valid(Json(request)): Valid<Json<JoinRoomRequest>>,
) -> Result<Json<PlayerSummary>, AppError> {
    let player = player_service::join(&state, &room, &request.player_id, &request.name).await?;
    Ok(Json(player))
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/players/{player_id}/heartbeat",
    tag = "players",
    params(
        ("room" = String, Path, description = "Room identifier"),
        ("player_id" = String, Path, description = "Player identifier")
    ),
    responses(
        (status = 200, description = "Presence refreshed", body = PlayerSummary),
        (status = 404, description = "Player never joined")
    )
)]
/// Keep a player marked as online.
pub async fn heartbeat(
    State(state): State<SharedState>,
    Path((room, player_id)): Path<(String, String)>,
) -> Result<Json<PlayerSummary>, AppError> {
    let player = player_service::heartbeat(&state, &room, &player_id).await?;
    Ok(Json(player))
}

#[utoipa::path(
    delete,
    path = "/rooms/{room}/players/{player_id}",
    tag = "players",
    params(
        ("room" = String, Path, description = "Room identifier"),
        ("player_id" = String, Path, description = "Player identifier")
    ),
    responses(
        (status = 200, description = "Player marked offline", body = PlayerSummary),
        (status = 404, description = "Player never joined")
    )
)]
/// Leave a room.
pub async fn leave(
    State(state): State<SharedState>,
    Path((room, player_id)): Path<(String, String)>,
) -> Result<Json<PlayerSummary>, AppError> {
    let player = player_service::leave(&state, &room, &player_id).await?;
    Ok(Json(player))
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/buzz",
    tag = "players",
    params(("room" = String, Path, description = "Room identifier")),
    request_body = BuzzRequest,
    responses(
        (status = 200, description = "Buzz arbitrated; `accepted` tells whether it won", body = BuzzResponse),
        (status = 409, description = "No question is playing")
    )
)]
/// Try to claim the buzz of the current question.
pub async fn buzz(
    State(state): State<SharedState>,
    Path(room): Path<String>,
    Valid(Json(request)): Valid<Json<BuzzRequest>>,
) -> Result<Json<BuzzResponse>, AppError> {
    let outcome = buzz_service::claim(&state, &room, &request.player_id, request.name).await?;
    Ok(Json(outcome))
}

#[utoipa::path(
    post,
    path = "/rooms/{room}/answer",
    tag = "players",
    params(("room" = String, Path, description = "Room identifier")),
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Answer evaluated", body = LastResultSummary),
        (status = 409, description = "Caller does not hold the buzz or already answered")
    )
)]
/// Answer after winning the buzz.
pub async fn answer(
    State(state): State<SharedState>,
    Path(room): Path<String>,
    Valid(Json(request)): Valid<Json<AnswerRequest>>,
) -> Result<Json<LastResultSummary>, AppError> {
    let result =
        room_service::submit_answer(&state, &room, &request.player_id, request.text).await?;
    Ok(Json(result))
}

/// Configure the player-facing routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/rooms/{room}/players", post(join))
        .route(
            "/rooms/{room}/players/{player_id}/heartbeat",
            post(heartbeat),
        )
        .route("/rooms/{room}/players/{player_id}", delete(leave))
        .route("/rooms/{room}/buzz", post(buzz))
        .route("/rooms/{room}/answer", post(answer))
}
