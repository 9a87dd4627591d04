use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/rooms/{room}/events",
    tag = "sse",
    params(("room" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room SSE stream: a `snapshot` event, then `state`, `buzz`, `answer`, `players`, `last_result`, `round` and `banner` events", content_type = "text/event-stream", body = String),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Stream the realtime events of a room.
pub async fn room_stream(
    State(state): State<SharedState>,
    Path(room): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = sse_service::subscribe_room(&state, &room).await?;
    info!(room = %room, "new room SSE connection");
    Ok(sse_service::to_sse_stream(subscription))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{room}/events", get(room_stream))
}
