use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt, stream::BoxStream};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dao::room_store::StoreChange,
    dto::sse::ServerEvent,
    error::ServiceError,
    services::{room_service, sse_events},
    state::{RoomScopedEvent, SharedState},
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Sources feeding one client of a room.
pub struct RoomSubscription {
    room: String,
    prefix: String,
    initial: Option<ServerEvent>,
    changes: BoxStream<'static, StoreChange>,
    banners: broadcast::Receiver<RoomScopedEvent>,
}

/// Subscribe to the document changes and banners of `room`.
///
/// The subscription is opened before the snapshot is read so no change made
/// in between is missed.
pub async fn subscribe_room(
    state: &SharedState,
    room: &str,
) -> Result<RoomSubscription, ServiceError> {
    let repo = room_service::open_room(state, room).await?;
    let changes = repo.subscribe();
    let banners = state.banners().subscribe();
    let snapshot = room_service::snapshot(state, room).await?;

    Ok(RoomSubscription {
        room: room.to_string(),
        prefix: repo.prefix(),
        initial: sse_events::snapshot_event(&snapshot),
        changes,
        banners,
    })
}

/// Convert a room subscription into an SSE response, forwarding events until
/// the client disconnects.
pub fn to_sse_stream(
    subscription: RoomSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let RoomSubscription {
        room,
        prefix,
        initial,
        mut changes,
        mut banners,
    } = subscription;

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(16);

    tokio::spawn(async move {
        if let Some(initial) = initial {
            if tx.send(Ok(into_event(initial))).await.is_err() {
                return;
            }
        }

        loop {
            let next = tokio::select! {
                _ = tx.closed() => break,
                change = changes.next() => match change {
                    Some(change) => sse_events::document_event(&prefix, change),
                    None => break,
                },
                banner = banners.recv() => match banner {
                    Ok(scoped) if scoped.room == room => Some(scoped.event),
                    Ok(_) => None,
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(room = %room, skipped, "SSE client lagging behind banners");
                        None
                    }
                },
            };

            if let Some(event) = next {
                if tx.send(Ok(into_event(event))).await.is_err() {
                    break;
                }
            }
        }

        info!(room = %room, "room SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

fn into_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}
