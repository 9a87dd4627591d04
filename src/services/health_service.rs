use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the room store is reachable, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store = match state.require_store().await {
        Ok(store) => store,
        Err(_) => {
            warn!("room store unavailable (degraded mode)");
            return HealthResponse::degraded();
        }
    };

    match state.bounded(store.health_check()).await {
        Ok(()) => HealthResponse::ok(store.backend()),
        Err(err) => {
            warn!(error = %err, backend = store.backend(), "room store health check failed");
            HealthResponse::degraded()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::room_store::memory::MemoryRoomStore, state::AppState};

    #[tokio::test]
    async fn reports_degraded_without_store() {
        let state = AppState::new(AppConfig::default());
        let status = health_status(&state).await;
        assert_eq!(status.status, "degraded");
        assert_eq!(status.store, None);
    }

    #[tokio::test]
    async fn reports_backend_when_healthy() {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        let status = health_status(&state).await;
        assert_eq!(status.status, "ok");
        assert_eq!(status.store.as_deref(), Some("memory"));
    }
}
