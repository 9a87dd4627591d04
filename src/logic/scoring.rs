//! Time-decayed score windows.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Elapsed seconds below which the full window is available.
pub const FULL_WINDOW_SECS: f64 = 20.0;
/// Elapsed seconds below which the half window is available.
pub const HALF_WINDOW_SECS: f64 = 40.0;

/// Point value in effect for a buzz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ScoreWindow {
    /// Early buzz, no wrong answer seen yet.
    Four,
    /// Mid-question buzz, or any buzz after the first wrong answer.
    Two,
    /// Late buzz.
    One,
}

impl ScoreWindow {
    /// Number of points at stake.
    pub fn points(self) -> i32 {
        match self {
            ScoreWindow::Four => 4,
            ScoreWindow::Two => 2,
            ScoreWindow::One => 1,
        }
    }
}

impl From<ScoreWindow> for u8 {
    fn from(value: ScoreWindow) -> Self {
        value.points() as u8
    }
}

/// Raised when a persisted window is not one of the three tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid score window {0}: expected 4, 2 or 1")]
pub struct InvalidScoreWindow(pub u8);

impl TryFrom<u8> for ScoreWindow {
    type Error = InvalidScoreWindow;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(ScoreWindow::Four),
            2 => Ok(ScoreWindow::Two),
            1 => Ok(ScoreWindow::One),
            other => Err(InvalidScoreWindow(other)),
        }
    }
}

/// Window for a buzz `elapsed_secs` into the question.
///
/// Once `first_wrong_seen` is set the full window is gone for the rest of the
/// question and the remaining tiers are evaluated from the elapsed time alone.
/// Negative or NaN inputs count as zero.
pub fn window_for(elapsed_secs: f64, first_wrong_seen: bool) -> ScoreWindow {
    let elapsed = if elapsed_secs.is_nan() {
        0.0
    } else {
        elapsed_secs.max(0.0)
    };

    if elapsed < FULL_WINDOW_SECS && !first_wrong_seen {
        ScoreWindow::Four
    } else if elapsed < HALF_WINDOW_SECS {
        ScoreWindow::Two
    } else {
        ScoreWindow::One
    }
}

/// Signed score change for an evaluated answer.
pub fn delta_for(window: ScoreWindow, correct: bool) -> i32 {
    if correct {
        window.points()
    } else {
        -window.points()
    }
}

/// Whether an evaluation must raise the room's first-wrong flag.
pub fn demotes_window(window: ScoreWindow, correct: bool, first_wrong_seen: bool) -> bool {
    !correct && !first_wrong_seen && window == ScoreWindow::Four
}

/// Seconds between `started_at_ms` and `now_ms`, clamped at zero.
pub fn elapsed_secs(started_at_ms: Option<i64>, now_ms: i64) -> f64 {
    match started_at_ms {
        Some(started) => (now_ms.saturating_sub(started)).max(0) as f64 / 1000.0,
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_buzz_gets_full_window() {
        for t in [0.0, 5.0, 10.0, 19.0, 19.999] {
            assert_eq!(window_for(t, false), ScoreWindow::Four, "t = {t}");
        }
    }

    #[test]
    fn window_halves_then_drops_to_one() {
        for t in [20.0, 25.0, 39.999] {
            assert_eq!(window_for(t, false), ScoreWindow::Two, "t = {t}");
        }
        for t in [40.0, 60.0, 1_000.0, f64::INFINITY] {
            assert_eq!(window_for(t, false), ScoreWindow::One, "t = {t}");
        }
    }

    #[test]
    fn first_wrong_answer_removes_full_window() {
        for t in [0.0, 10.0, 19.9, 20.0, 39.0, 40.0, 500.0] {
            assert_ne!(window_for(t, true), ScoreWindow::Four, "t = {t}");
        }
        assert_eq!(window_for(3.0, true), ScoreWindow::Two);
        assert_eq!(window_for(45.0, true), ScoreWindow::One);
    }

    #[test]
    fn negative_and_nan_elapsed_clamp_to_zero() {
        assert_eq!(window_for(-5.0, false), ScoreWindow::Four);
        assert_eq!(window_for(f64::NAN, false), ScoreWindow::Four);
        assert_eq!(window_for(f64::NEG_INFINITY, false), ScoreWindow::Four);
    }

    #[test]
    fn delta_sign_follows_correctness() {
        for window in [ScoreWindow::Four, ScoreWindow::Two, ScoreWindow::One] {
            assert_eq!(delta_for(window, true), window.points());
            assert_eq!(delta_for(window, false), -window.points());
        }
    }

    #[test]
    fn only_wrong_full_window_answers_demote() {
        assert!(demotes_window(ScoreWindow::Four, false, false));
        assert!(!demotes_window(ScoreWindow::Four, true, false));
        assert!(!demotes_window(ScoreWindow::Four, false, true));
        assert!(!demotes_window(ScoreWindow::Two, false, false));
    }

    #[test]
    fn elapsed_time_is_clamped() {
        assert_eq!(elapsed_secs(None, 10_000), 0.0);
        assert_eq!(elapsed_secs(Some(10_000), 5_000), 0.0);
        assert_eq!(elapsed_secs(Some(1_000), 11_500), 10.5);
        assert_eq!(elapsed_secs(Some(i64::MIN), i64::MAX), i64::MAX as f64 / 1000.0);
    }

    #[test]
    fn window_serializes_as_points() {
        assert_eq!(serde_json::to_string(&ScoreWindow::Four).unwrap(), "4");
        let parsed: ScoreWindow = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, ScoreWindow::Two);
        assert!(serde_json::from_str::<ScoreWindow>("3").is_err());
    }
}
