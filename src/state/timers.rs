//! Per-room scheduled tasks.
//!
//! A timer sleeps and then spawns its job as a separate task, so cancelling a
//! room's timers never interrupts a job that already started running. Jobs
//! re-check their [`PhaseToken`] inside the state transaction before acting.

use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::{task::JoinHandle, time::sleep};
use tracing::debug;

use super::state_machine::PhaseToken;

/// What a scheduled timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Reveal a question nobody answered.
    AutoSkip,
    /// Evaluate an empty answer for a silent claimant.
    AnswerTimeout,
    /// Leave the reveal screen.
    RevealDelay,
}

struct ScheduledTimer {
    kind: TimerKind,
    token: PhaseToken,
    handle: JoinHandle<()>,
}

/// Timers of every room, keyed by room id.
#[derive(Default)]
pub struct RoomTimers {
    rooms: DashMap<String, Vec<ScheduledTimer>>,
}

impl RoomTimers {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` after `delay` unless the room's timers are cancelled first.
    pub fn schedule(
        &self,
        room: &str,
        kind: TimerKind,
        token: PhaseToken,
        delay: Duration,
        job: BoxFuture<'static, ()>,
    ) {
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            tokio::spawn(job);
        });

        debug!(room, ?kind, ?token, delay_ms = delay.as_millis() as u64, "timer armed");
        let mut timers = self.rooms.entry(room.to_string()).or_default();
        timers.retain(|timer| !timer.handle.is_finished());
        timers.push(ScheduledTimer {
            kind,
            token,
            handle,
        });
    }

    /// Abort the timers of `room` armed before `generation`.
    ///
    /// Timers armed for `generation` or a later state are kept.
    pub fn cancel_superseded(&self, room: &str, generation: u64) -> usize {
        let Some(mut timers) = self.rooms.get_mut(room) else {
            return 0;
        };

        let mut cancelled = 0;
        timers.retain(|timer| {
            if timer.handle.is_finished() {
                return false;
            }
            if timer.token.generation < generation {
                debug!(room, kind = ?timer.kind, armed_for = timer.token.generation, "timer superseded");
                timer.handle.abort();
                cancelled += 1;
                return false;
            }
            true
        });
        if cancelled > 0 {
            debug!(room, cancelled, generation, "superseded timers cancelled");
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::state::state_machine::RoomPhase;

    fn token() -> PhaseToken {
        token_at(1)
    }

    fn token_at(generation: u64) -> PhaseToken {
        PhaseToken {
            question_index: 0,
            phase: RoomPhase::Playing,
            generation,
        }
    }

    fn pending(timers: &RoomTimers, room: &str) -> Vec<(TimerKind, PhaseToken)> {
        timers
            .rooms
            .get(room)
            .map(|armed| {
                armed
                    .iter()
                    .filter(|timer| !timer.handle.is_finished())
                    .map(|timer| (timer.kind, timer.token))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn counting_job(counter: &Arc<AtomicUsize>) -> BoxFuture<'static, ()> {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_delay() {
        let timers = RoomTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        timers.schedule(
            "room",
            TimerKind::AutoSkip,
            token(),
            Duration::from_secs(90),
            counting_job(&fired),
        );
        assert_eq!(pending(&timers, "room"), vec![(TimerKind::AutoSkip, token())]);

        tokio::time::sleep(Duration::from_secs(89)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(pending(&timers, "room").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timers_never_fire() {
        let timers = RoomTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        timers.schedule(
            "room",
            TimerKind::AnswerTimeout,
            token(),
            Duration::from_secs(15),
            counting_job(&fired),
        );
        timers.schedule(
            "other",
            TimerKind::AnswerTimeout,
            token(),
            Duration::from_secs(15),
            counting_job(&fired),
        );

        assert_eq!(timers.cancel_superseded("room", 2), 1);
        assert_eq!(timers.cancel_superseded("room", 2), 0);

        tokio::time::sleep(Duration::from_secs(20)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn only_older_generations_are_superseded() {
        let timers = RoomTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for generation in [1, 2, 3] {
            timers.schedule(
                "room",
                TimerKind::RevealDelay,
                token_at(generation),
                Duration::from_secs(3),
                counting_job(&fired),
            );
        }

        assert_eq!(timers.cancel_superseded("room", 3), 2);
        assert_eq!(
            pending(&timers, "room"),
            vec![(TimerKind::RevealDelay, token_at(3))]
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
