//! Question deck construction with at most one question per artist.

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::matcher::normalize_artist;

/// Candidate track, and once selected, a question of the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Provider identifier, used for deduplication.
    pub id: String,
    /// Reference handed to the playback collaborator.
    pub uri: String,
    /// Display title.
    pub name: String,
    /// Credited artists, in provider order.
    pub artist_names: Vec<String>,
    /// Track length in milliseconds.
    pub duration_ms: u64,
}

impl Track {
    /// Normalized artist names used for the uniqueness check.
    pub fn artist_tokens(&self) -> HashSet<String> {
        self.artist_names
            .iter()
            .map(|name| normalize_artist(name))
            .filter(|token| !token.is_empty())
            .collect()
    }
}

/// Errors raised when no deck can be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundBuildError {
    /// The candidate pool is empty after deduplication.
    #[error("no candidate tracks available to build a round")]
    InsufficientCandidates,
    /// A round needs at least one question.
    #[error("question count must be at least 1")]
    ZeroQuestions,
}

/// Output of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltRound {
    /// Selected questions in play order.
    pub questions: Vec<Track>,
    /// Size of the deduplicated candidate pool.
    pub total_candidates: usize,
}

/// Build a deck using the thread-local RNG.
pub fn build(candidates: Vec<Track>, question_count: usize) -> Result<BuiltRound, RoundBuildError> {
    build_with_rng(candidates, question_count, &mut rand::rng())
}

/// Build a deck with a caller-provided RNG so shuffles can be reproduced.
///
/// Tracks whose artist list normalizes to nothing are never selected; a pool
/// that is non-empty but yields fewer questions than requested returns the
/// shorter deck.
pub fn build_with_rng<R: Rng + ?Sized>(
    candidates: Vec<Track>,
    question_count: usize,
    rng: &mut R,
) -> Result<BuiltRound, RoundBuildError> {
    if question_count == 0 {
        return Err(RoundBuildError::ZeroQuestions);
    }

    let mut pool = dedup_by_id(candidates);
    if pool.is_empty() {
        return Err(RoundBuildError::InsufficientCandidates);
    }
    let total_candidates = pool.len();

    pool.shuffle(rng);

    let mut used_artists = HashSet::new();
    let mut questions = Vec::with_capacity(question_count.min(pool.len()));
    for track in pool {
        let tokens = track.artist_tokens();
        if tokens.is_empty() || tokens.iter().any(|token| used_artists.contains(token)) {
            continue;
        }
        used_artists.extend(tokens);
        questions.push(track);
        if questions.len() >= question_count {
            break;
        }
    }

    Ok(BuiltRound {
        questions,
        total_candidates,
    })
}

/// Keep the first occurrence of every track id, preserving order.
pub fn dedup_by_id(candidates: Vec<Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|track| seen.insert(track.id.clone()))
        .collect()
}
