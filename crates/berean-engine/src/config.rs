//! Room configuration and validation.

use std::time::Duration;

use berean_protocol::RoomOptions;
use tracing::warn;

use crate::{QuizSelection, ScoringPolicy};

/// Full configuration of a room, combining the client-supplied options
/// with server-side timing and scoring knobs.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Player cap. Clamped to [`Self::MIN_MAX_PLAYERS`]..=[`Self::MAX_MAX_PLAYERS`].
    pub max_players: usize,

    /// Spectator cap; 0 means unlimited (when allowed at all).
    pub max_spectators: usize,

    /// Whether spectators may join.
    pub spectator_allowed: bool,

    /// Questions per session. Clamped to 1..=[`Self::MAX_QUESTIONS`].
    pub question_count: usize,

    /// Default answer window per question; individual questions may
    /// override it.
    pub time_limit: Duration,

    /// Content selection forwarded to the question bank.
    pub theme_ids: Vec<u32>,
    pub language: String,

    /// Whether starting requires every connected player to be ready.
    pub require_ready: bool,

    /// Countdown between the start command and the first question.
    pub countdown: Duration,

    /// Pause between a question closing and the next one opening.
    pub reveal_duration: Duration,

    /// How long a room with zero connected players survives mid-session
    /// before aborting.
    pub abandon_grace: Duration,

    /// How long a room may go without any state transition before the
    /// registry reclaims it.
    pub idle_ttl: Duration,

    /// How long a completed room stays readable before archiving.
    pub archive_grace: Duration,

    /// Points policy.
    pub scoring: ScoringPolicy,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            max_spectators: 0,
            spectator_allowed: true,
            question_count: 10,
            time_limit: Duration::from_secs(30),
            theme_ids: Vec::new(),
            language: "en".to_string(),
            require_ready: false,
            countdown: Duration::from_secs(3),
            reveal_duration: Duration::from_secs(3),
            abandon_grace: Duration::from_secs(60),
            idle_ttl: Duration::from_secs(30 * 60),
            archive_grace: Duration::from_secs(5 * 60),
            scoring: ScoringPolicy::default(),
        }
    }
}

impl RoomConfig {
    pub const MIN_MAX_PLAYERS: usize = 2;
    pub const MAX_MAX_PLAYERS: usize = 10;
    pub const MAX_QUESTIONS: usize = 100;
    pub const MIN_TIME_LIMIT: Duration = Duration::from_secs(1);
    pub const MAX_TIME_LIMIT: Duration = Duration::from_secs(600);

    /// Builds a config from client-supplied options on top of server
    /// defaults, then validates.
    pub fn from_options(options: &RoomOptions) -> Self {
        Self {
            max_players: options.max_players,
            spectator_allowed: options.spectator_allowed,
            question_count: options.question_count,
            time_limit: Duration::from_secs(options.time_limit_secs),
            theme_ids: options.theme_ids.clone(),
            language: options.language.clone(),
            require_ready: options.require_ready,
            ..Self::default()
        }
        .validated()
    }

    /// Clamps out-of-range values so the config is safe to run with.
    /// Clients ask; the server decides.
    pub fn validated(mut self) -> Self {
        if self.max_players < Self::MIN_MAX_PLAYERS
            || self.max_players > Self::MAX_MAX_PLAYERS
        {
            warn!(
                max_players = self.max_players,
                "max_players out of range — clamping"
            );
            self.max_players = self
                .max_players
                .clamp(Self::MIN_MAX_PLAYERS, Self::MAX_MAX_PLAYERS);
        }
        if self.question_count == 0 || self.question_count > Self::MAX_QUESTIONS
        {
            warn!(
                question_count = self.question_count,
                "question_count out of range — clamping"
            );
            self.question_count = self.question_count.clamp(1, Self::MAX_QUESTIONS);
        }
        if self.time_limit < Self::MIN_TIME_LIMIT
            || self.time_limit > Self::MAX_TIME_LIMIT
        {
            warn!(
                time_limit = ?self.time_limit,
                "time_limit out of range — clamping"
            );
            self.time_limit = self
                .time_limit
                .clamp(Self::MIN_TIME_LIMIT, Self::MAX_TIME_LIMIT);
        }
        self
    }

    /// The bank selection this room asks for.
    pub fn selection(&self) -> QuizSelection {
        QuizSelection {
            question_count: self.question_count,
            theme_ids: self.theme_ids.clone(),
            language: self.language.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_already_valid() {
        let config = RoomConfig::default();
        let validated = config.clone().validated();
        assert_eq!(config.max_players, validated.max_players);
        assert_eq!(config.question_count, validated.question_count);
        assert_eq!(config.time_limit, validated.time_limit);
    }

    #[test]
    fn test_validated_clamps_max_players() {
        let config = RoomConfig {
            max_players: 1,
            ..RoomConfig::default()
        }
        .validated();
        assert_eq!(config.max_players, RoomConfig::MIN_MAX_PLAYERS);

        let config = RoomConfig {
            max_players: 50,
            ..RoomConfig::default()
        }
        .validated();
        assert_eq!(config.max_players, RoomConfig::MAX_MAX_PLAYERS);
    }

    #[test]
    fn test_validated_clamps_question_count() {
        let config = RoomConfig {
            question_count: 0,
            ..RoomConfig::default()
        }
        .validated();
        assert_eq!(config.question_count, 1);
    }

    #[test]
    fn test_validated_clamps_time_limit() {
        let config = RoomConfig {
            time_limit: Duration::ZERO,
            ..RoomConfig::default()
        }
        .validated();
        assert_eq!(config.time_limit, RoomConfig::MIN_TIME_LIMIT);
    }

    #[test]
    fn test_from_options_carries_client_fields() {
        let options = RoomOptions {
            max_players: 4,
            question_count: 3,
            time_limit_secs: 30,
            theme_ids: vec![7],
            language: "pt".into(),
            spectator_allowed: false,
            require_ready: true,
        };
        let config = RoomConfig::from_options(&options);

        assert_eq!(config.max_players, 4);
        assert_eq!(config.question_count, 3);
        assert_eq!(config.time_limit, Duration::from_secs(30));
        assert_eq!(config.theme_ids, vec![7]);
        assert_eq!(config.language, "pt");
        assert!(!config.spectator_allowed);
        assert!(config.require_ready);
    }

    #[test]
    fn test_selection_mirrors_config() {
        let config = RoomConfig {
            question_count: 5,
            theme_ids: vec![1, 2],
            language: "es".into(),
            ..RoomConfig::default()
        };
        let selection = config.selection();
        assert_eq!(selection.question_count, 5);
        assert_eq!(selection.theme_ids, vec![1, 2]);
        assert_eq!(selection.language, "es");
    }
}
