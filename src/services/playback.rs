//! Audio playback collaborator.
//!
//! The engine only issues fire-and-forget commands; a failing command is
//! logged and surfaced to clients as a banner but never blocks a transition.

use std::time::Duration;

use futures::future::{self, BoxFuture};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{services::sse_events, state::SharedState};

/// Longest a single command may take before it counts as failed.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure reported by a playback implementation.
#[derive(Debug, Clone, Error)]
#[error("playback command failed: {0}")]
pub struct PlaybackError(pub String);

/// Commands sent to whatever plays the music for a room.
pub trait Playback: Send + Sync {
    /// Start `track_ref` at `position_ms`.
    fn play(
        &self,
        room: &str,
        track_ref: &str,
        position_ms: u64,
    ) -> BoxFuture<'static, Result<(), PlaybackError>>;
    fn pause(&self, room: &str) -> BoxFuture<'static, Result<(), PlaybackError>>;
    /// Route the room's audio to another device.
    fn transfer_to(
        &self,
        room: &str,
        device_id: &str,
    ) -> BoxFuture<'static, Result<(), PlaybackError>>;
}

/// Playback that only records the commands in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPlayback;

impl Playback for LoggingPlayback {
    fn play(
        &self,
        room: &str,
        track_ref: &str,
        position_ms: u64,
    ) -> BoxFuture<'static, Result<(), PlaybackError>> {
        info!(room, track_ref, position_ms, "playback: play");
        Box::pin(future::ready(Ok(())))
    }

    fn pause(&self, room: &str) -> BoxFuture<'static, Result<(), PlaybackError>> {
        info!(room, "playback: pause");
        Box::pin(future::ready(Ok(())))
    }

    fn transfer_to(
        &self,
        room: &str,
        device_id: &str,
    ) -> BoxFuture<'static, Result<(), PlaybackError>> {
        info!(room, device_id, "playback: transfer");
        Box::pin(future::ready(Ok(())))
    }
}

/// Start a track, reporting failures as a banner.
pub async fn play(state: &SharedState, room: &str, track_ref: &str) {
    let outcome = bounded("play", state.playback().play(room, track_ref, 0)).await;
    report(state, room, "play", outcome);
}

/// Pause playback, reporting failures as a banner.
pub async fn pause(state: &SharedState, room: &str) {
    let outcome = bounded("pause", state.playback().pause(room)).await;
    report(state, room, "pause", outcome);
}

/// Transfer playback, returning the failure to the caller as well.
pub async fn transfer(
    state: &SharedState,
    room: &str,
    device_id: &str,
) -> Result<(), PlaybackError> {
    let outcome = bounded("transfer", state.playback().transfer_to(room, device_id)).await;
    report(state, room, "transfer", outcome.clone());
    outcome
}

async fn bounded(
    command: &str,
    pending: BoxFuture<'static, Result<(), PlaybackError>>,
) -> Result<(), PlaybackError> {
    match timeout(COMMAND_TIMEOUT, pending).await {
        Ok(outcome) => outcome,
        Err(_) => Err(PlaybackError(format!(
            "{command} did not complete within {}s",
            COMMAND_TIMEOUT.as_secs()
        ))),
    }
}

fn report(state: &SharedState, room: &str, command: &str, outcome: Result<(), PlaybackError>) {
    if let Err(err) = outcome {
        warn!(room, command, error = %err, "playback command failed");
        sse_events::broadcast_banner(state, room, &err.to_string());
    }
}
