pub mod clock;
mod sse;
pub mod state_machine;
pub mod timers;

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::{RwLock, watch};
use tokio::time::timeout;

use crate::{
    config::AppConfig,
    dao::{room::RoomRepository, room_store::RoomStore, tracklists::TrackListRepository},
    error::ServiceError,
    logic::matcher::AnswerMatcher,
    services::playback::{LoggingPlayback, Playback},
};

pub use self::sse::{RoomScopedEvent, SseHub};
use self::{
    clock::{Clock, SystemClock},
    timers::RoomTimers,
};

pub type SharedState = Arc<AppState>;
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
const BANNER_CAPACITY: usize = 32;

/// Central application state: store handle, collaborators, timers and broadcast hubs.
pub struct AppState {
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    config: AppConfig,
    matcher: AnswerMatcher,
    clock: Arc<dyn Clock>,
    playback: Arc<dyn Playback>,
    timers: RoomTimers,
    banners: SseHub,
    degraded: watch::Sender<bool>,
    store_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_parts(config, Arc::new(SystemClock), Arc::new(LoggingPlayback))
    }

    /// Same as [`AppState::new`] with explicit clock and playback collaborators.
    pub fn with_parts(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        playback: Arc<dyn Playback>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let matcher = config.matcher();
        Arc::new(Self {
            room_store: RwLock::new(None),
            config,
            matcher,
            clock,
            playback,
            timers: RoomTimers::new(),
            banners: SseHub::new(BANNER_CAPACITY),
            degraded: degraded_tx,
            store_timeout: Some(DEFAULT_STORE_TIMEOUT),
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Store handle, or [`ServiceError::Degraded`] when running without one.
    pub async fn require_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Typed repository for `room`.
    pub async fn room(&self, room: &str) -> Result<RoomRepository, ServiceError> {
        Ok(RoomRepository::new(self.require_store().await?, room))
    }

    pub async fn tracklists(&self) -> Result<TrackListRepository, ServiceError> {
        Ok(TrackListRepository::new(self.require_store().await?))
    }

    /// Await a store round-trip, failing with [`ServiceError::Timeout`] when it hangs.
    pub async fn bounded<T, E, Fut>(&self, work: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Into<ServiceError>,
    {
        match self.store_timeout {
            Some(limit) => match timeout(limit, work).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(ServiceError::Timeout),
            },
            None => work.await.map_err(Into::into),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Matcher built from the configured aliases and threshold.
    pub fn matcher(&self) -> &AnswerMatcher {
        &self.matcher
    }

    /// Current time in milliseconds since the Unix epoch.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn playback(&self) -> &Arc<dyn Playback> {
        &self.playback
    }

    /// Scheduled timers of every room.
    pub fn timers(&self) -> &RoomTimers {
        &self.timers
    }

    /// Hub for events that are not store changes.
    pub fn banners(&self) -> &SseHub {
        &self.banners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::room_store::memory::MemoryRoomStore;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.room("lobby").await,
            Err(ServiceError::Degraded)
        ));

        let mut watcher = state.degraded_watcher();
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        assert!(!state.is_degraded().await);
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.room("lobby").await.is_ok());

        state.clear_room_store().await;
        assert!(state.is_degraded().await);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_store_calls_time_out() {
        let state = AppState::new(AppConfig::default());
        let outcome: Result<(), ServiceError> = state
            .bounded(std::future::pending::<Result<(), ServiceError>>())
            .await;
        assert!(matches!(outcome, Err(ServiceError::Timeout)));
    }
}
