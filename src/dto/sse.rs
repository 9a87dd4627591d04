use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already serialised payload.
    pub fn new<E>(event: E, data: String) -> Self
    where
        E: Into<Option<String>>,
    {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self::new(event, serde_json::to_string(payload)?))
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Transient notice shown to every client of a room, such as a playback failure.
pub struct BannerEvent {
    pub room: String,
    pub message: String,
    /// RFC 3339 emission time.
    pub at: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever a document of the room is written or removed.
///
/// The SSE event name is the document kind (`state`, `buzz`, `answer`,
/// `players`, `last_result` or `round`).
pub struct DocumentChangedEvent {
    /// Store path of the document.
    pub path: String,
    /// New content, `null` when the document was removed.
    #[schema(value_type = Option<Object>)]
    pub value: Option<Value>,
}
