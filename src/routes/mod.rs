use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod host;
pub mod player;
pub mod sse;
pub mod tracklists;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(tracklists::router())
        .merge(host::router())
        .merge(player::router())
        .merge(sse::router())
        .merge(docs::router())
        .with_state(state)
}
