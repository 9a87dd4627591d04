use serde::Serialize;
use tracing::warn;

use crate::{
    dao::room_store::StoreChange,
    dto::{
        format_epoch_ms,
        room::RoomSnapshot,
        sse::{BannerEvent, DocumentChangedEvent, ServerEvent},
    },
    state::SharedState,
};

const EVENT_BANNER: &str = "banner";
const EVENT_SNAPSHOT: &str = "snapshot";
const DOCUMENT_KINDS: [&str; 6] = ["state", "buzz", "answer", "players", "last_result", "round"];

/// Broadcast a transient notice to every client of `room`.
pub fn broadcast_banner(state: &SharedState, room: &str, message: &str) {
    let payload = BannerEvent {
        room: room.to_string(),
        message: message.to_string(),
        at: format_epoch_ms(state.now_ms()),
    };
    match ServerEvent::json(Some(EVENT_BANNER.to_string()), &payload) {
        Ok(event) => state.banners().broadcast(room, event),
        Err(err) => warn!(room, error = %err, "failed to serialise banner"),
    }
}

/// Event sent to a client right after it subscribes.
pub fn snapshot_event(snapshot: &RoomSnapshot) -> Option<ServerEvent> {
    encode(EVENT_SNAPSHOT, snapshot)
}

/// SSE event for a store change under `room_prefix`, or `None` for unknown documents.
pub fn document_event(room_prefix: &str, change: StoreChange) -> Option<ServerEvent> {
    let kind = document_kind(room_prefix, &change.path)?;
    encode(
        kind,
        &DocumentChangedEvent {
            path: change.path,
            value: change.value,
        },
    )
}

/// Document kind of `path`, which is also the SSE event name.
///
/// `rooms/lobby/players/ana` is a `players` document.
pub fn document_kind(room_prefix: &str, path: &str) -> Option<&'static str> {
    let leaf = path.strip_prefix(room_prefix)?;
    let head = leaf.split('/').next()?;
    DOCUMENT_KINDS.into_iter().find(|kind| *kind == head)
}

fn encode<T: Serialize>(name: &str, payload: &T) -> Option<ServerEvent> {
    match ServerEvent::json(Some(name.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialise SSE payload");
            None
        }
    }
}
