//! Keeps the room store connected and drives degraded mode.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{room_store::RoomStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the room store, then poll its health forever.
///
/// A failing health check puts the application in degraded mode while the
/// store tries to reconnect in place; when that is exhausted the store is
/// dropped and `connect` is called again with exponential backoff.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RoomStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                info!(backend = store.backend(), "room store connected; leaving degraded mode");
                state.install_room_store(store.clone()).await;
                delay = INITIAL_DELAY;

                watch(&state, store.as_ref()).await;

                warn!("room store lost; reconnecting from scratch");
                state.clear_room_store().await;
            }
            Err(err) => {
                warn!(error = %err, "room store connection attempt failed");
            }
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll `store` until it stays unreachable after every reconnect attempt.
async fn watch(state: &SharedState, store: &dyn RoomStore) {
    loop {
        sleep(HEALTH_POLL_INTERVAL).await;

        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("room store healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "room store health check failed; entering degraded mode");
                state.update_degraded(true).await;

                if !reconnect(store).await {
                    warn!("exhausted room store reconnect attempts");
                    return;
                }
                info!("room store reconnected after health check failure");
                state.update_degraded(false).await;
            }
        }
    }
}

async fn reconnect(store: &dyn RoomStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "room store reconnect attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}
