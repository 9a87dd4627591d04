//! Application-level configuration loading: timers, reveal policy and answer matching.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::logic::matcher::{AliasTable, AnswerMatcher, DEFAULT_MATCH_THRESHOLD};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ARTIST_BUZZ_CONFIG_PATH";

const DEFAULT_AUTO_SKIP_SECS: u64 = 90;
const DEFAULT_ANSWER_SECS: u64 = 15;
const DEFAULT_REVEAL_SECS: u64 = 3;
const DEFAULT_QUESTION_COUNT: usize = 20;

/// What happens once the reveal delay has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealPolicy {
    /// Start the next question (or end the round) automatically.
    #[default]
    AutoAdvance,
    /// Stay on the reveal until the host asks for the next question.
    AwaitHost,
}

/// Durations of the per-phase timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Time a question may play without a buzz.
    pub auto_skip: Duration,
    /// Time the buzz claimant has to answer.
    pub answer: Duration,
    /// Time the reveal stays on screen.
    pub reveal: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            auto_skip: Duration::from_secs(DEFAULT_AUTO_SKIP_SECS),
            answer: Duration::from_secs(DEFAULT_ANSWER_SECS),
            reveal: Duration::from_secs(DEFAULT_REVEAL_SECS),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Timer durations.
    pub timings: Timings,
    /// Behaviour at the end of the reveal delay.
    pub reveal_policy: RevealPolicy,
    /// Similarity ratio required for a fuzzy answer match.
    pub match_threshold: f64,
    /// Questions per round when the host does not ask for a count.
    pub default_question_count: usize,
    /// Extra aliases on top of the built-in table.
    pub aliases: IndexMap<String, String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        reveal_policy = ?app_config.reveal_policy,
                        aliases = app_config.aliases.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document; absent fields keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Answer matcher built from the built-in aliases plus the configured ones.
    pub fn matcher(&self) -> AnswerMatcher {
        let mut aliases = AliasTable::builtin();
        aliases.extend(self.aliases.clone());
        AnswerMatcher::new(aliases, self.match_threshold)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            reveal_policy: RevealPolicy::default(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            default_question_count: DEFAULT_QUESTION_COUNT,
            aliases: IndexMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    timings: RawTimings,
    reveal_policy: RevealPolicy,
    match_threshold: Option<f64>,
    default_question_count: Option<usize>,
    aliases: IndexMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTimings {
    auto_skip_secs: Option<u64>,
    answer_secs: Option<u64>,
    reveal_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let match_threshold = match value.match_threshold {
            Some(threshold) if (0.0..=1.0).contains(&threshold) => threshold,
            Some(threshold) => {
                warn!(threshold, "match threshold outside [0, 1]; using default");
                DEFAULT_MATCH_THRESHOLD
            }
            None => DEFAULT_MATCH_THRESHOLD,
        };
        let default_question_count = value
            .default_question_count
            .filter(|count| *count > 0)
            .unwrap_or(DEFAULT_QUESTION_COUNT);

        Self {
            timings: Timings {
                auto_skip: Duration::from_secs(
                    value.timings.auto_skip_secs.unwrap_or(DEFAULT_AUTO_SKIP_SECS),
                ),
                answer: Duration::from_secs(value.timings.answer_secs.unwrap_or(DEFAULT_ANSWER_SECS)),
                reveal: Duration::from_secs(value.timings.reveal_secs.unwrap_or(DEFAULT_REVEAL_SECS)),
            },
            reveal_policy: value.reveal_policy,
            match_threshold,
            default_question_count,
            aliases: value.aliases,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
