//! Type definitions for match-arena

use crate::error::{MatchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event names used on the matchmaking transport
pub mod events {
    /// Client asks to enter the matchmaking queue
    pub const JOIN_MATCH: &str = "join_match";
    /// Server paired us with an opponent
    pub const MATCH_FOUND: &str = "match_found";
    /// Client gave up waiting for a pairing
    pub const NOT_FOUND: &str = "not_found";
    /// Client confirms entry into the paired room
    pub const REGISTER: &str = "register";
    /// Server acknowledged the registration
    pub const REGISTER_SUCCESS: &str = "register_success";
    /// Client reports its own final score
    pub const GAME_OVER: &str = "game_over";
    /// Server broadcasts the authoritative two-player result
    pub const GAME_OVER_RESPONSE: &str = "game_over_response";
}

/// Text shown when the search countdown runs out
pub const TIMEOUT_NOTICE: &str = "Time's up!";

/// Matchmaking configuration
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Local user id, sent with every queue/registration message
    pub user_id: String,
    /// Local display name, used for score submission
    pub user_name: String,
    /// Search countdown length in time-units (default: 20)
    pub search_timeout: u32,
    /// Auto-play countdown length in time-units (default: 5)
    pub auto_play_delay: u32,
    /// Length of one time-unit in ms (default: 1000)
    pub tick_interval: u64,
    /// Base URL of the REST API (scores, users)
    pub api_base_url: Option<String>,
    /// Score submission path (default: /api/scores)
    pub score_path: String,
    /// User roster path (default: /api/users)
    pub users_path: String,
    /// Extra attempts after a failed score submission (default: 3)
    pub score_retries: u32,
    /// Base delay between score submission attempts in ms (default: 500)
    pub retry_backoff: u64,
    /// Capacity of the application event channel (default: 100)
    pub event_channel_capacity: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            user_name: String::new(),
            search_timeout: 20,
            auto_play_delay: 5,
            tick_interval: 1000,
            api_base_url: None,
            score_path: "/api/scores".to_string(),
            users_path: "/api/users".to_string(),
            score_retries: 3,
            retry_backoff: 500,
            event_channel_capacity: 100,
        }
    }
}

impl MatchConfig {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            ..Default::default()
        }
    }

    /// Build a config from `MATCH_*` environment variables on top of the defaults.
    pub fn from_env(user_id: impl Into<String>, user_name: impl Into<String>) -> Result<Self> {
        let mut config = Self::new(user_id, user_name);

        if let Ok(url) = std::env::var("MATCH_API_URL") {
            config.api_base_url = Some(url);
        }
        if let Some(n) = env_number("MATCH_SEARCH_TIMEOUT")? {
            config.search_timeout = n;
        }
        if let Some(n) = env_number("MATCH_AUTO_PLAY_DELAY")? {
            config.auto_play_delay = n;
        }
        if let Some(n) = env_number("MATCH_TICK_MS")? {
            config.tick_interval = n;
        }
        if let Some(n) = env_number("MATCH_SCORE_RETRIES")? {
            config.score_retries = n;
        }

        Ok(config)
    }

    pub fn search_timeout(mut self, units: u32) -> Self {
        self.search_timeout = units;
        self
    }

    pub fn auto_play_delay(mut self, units: u32) -> Self {
        self.auto_play_delay = units;
        self
    }

    pub fn tick_interval(mut self, ms: u64) -> Self {
        self.tick_interval = ms;
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn score_path(mut self, path: impl Into<String>) -> Self {
        self.score_path = path.into();
        self
    }

    pub fn users_path(mut self, path: impl Into<String>) -> Self {
        self.users_path = path.into();
        self
    }

    pub fn score_retries(mut self, n: u32) -> Self {
        self.score_retries = n;
        self
    }

    pub fn retry_backoff(mut self, ms: u64) -> Self {
        self.retry_backoff = ms;
        self
    }

    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }
}

fn env_number<N: std::str::FromStr>(key: &str) -> Result<Option<N>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| MatchError::InvalidConfig(format!("{key}={raw}"))),
        Err(_) => Ok(None),
    }
}

// Data model

/// A user's request to be paired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub user_id: String,
    pub game_id: String,
    pub entry_fee: u64,
}

/// Pairing delivered by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    #[serde(rename = "opponent")]
    pub opponent_id: String,
    pub room_id: String,
}

/// Display identity of a known user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentProfile {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "username")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl OpponentProfile {
    /// Display name used when the roster has no entry for a user
    pub const PLACEHOLDER_NAME: &'static str = "Opponent";

    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: Self::PLACEHOLDER_NAME.to_string(),
            avatar: None,
        }
    }

    /// Single uppercase letter for avatar-less rendering
    pub fn initial(&self) -> char {
        self.display_name
            .chars()
            .find(|c| c.is_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?')
    }
}

/// Server acknowledgement of a registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationAck {
    pub room_id: String,
}

/// Registration into a paired room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub user_id: String,
    pub game_id: String,
    pub room_id: String,
    pub entry_fee: u64,
}

/// Local player's final score sent over the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverSubmission {
    pub score: i64,
    pub user_id: String,
    pub room_id: String,
}

/// Score posted to the HTTP scoring endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEvent {
    pub user_id: String,
    pub user_name: String,
    pub score: i64,
    pub room_id: String,
    pub game_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    pub user_id: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    pub player1: PlayerScore,
    pub player2: PlayerScore,
}

/// Authoritative result of a two-player game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverResult {
    #[serde(default, rename = "winner", alias = "winnerId")]
    pub winner_id: Option<String>,
    pub players: Players,
    pub room_id: String,
    pub game_id: String,
}

impl GameOverResult {
    /// Slot belonging to `user_id`, if any
    pub fn player(&self, user_id: &str) -> Option<&PlayerScore> {
        [&self.players.player1, &self.players.player2]
            .into_iter()
            .find(|p| p.user_id == user_id)
    }

    /// The other slot, when `user_id` occupies one of them
    pub fn opponent_of(&self, user_id: &str) -> Option<&PlayerScore> {
        if self.players.player1.user_id == user_id {
            Some(&self.players.player2)
        } else if self.players.player2.user_id == user_id {
            Some(&self.players.player1)
        } else {
            None
        }
    }

    pub fn is_winner(&self, user_id: &str) -> bool {
        self.winner_id.as_deref() == Some(user_id)
    }
}

// Wire messages

/// Messages emitted by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinMatch(MatchRequest),
    NotFound(MatchRequest),
    Register(Registration),
    GameOver(GameOverSubmission),
}

impl ClientMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::JoinMatch(_) => events::JOIN_MATCH,
            ClientMessage::NotFound(_) => events::NOT_FOUND,
            ClientMessage::Register(_) => events::REGISTER,
            ClientMessage::GameOver(_) => events::GAME_OVER,
        }
    }
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    MatchFound(MatchResult),
    RegisterSuccess(RegistrationAck),
    GameOverResponse(GameOverResult),
}

impl ServerMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::MatchFound(_) => events::MATCH_FOUND,
            ServerMessage::RegisterSuccess(_) => events::REGISTER_SUCCESS,
            ServerMessage::GameOverResponse(_) => events::GAME_OVER_RESPONSE,
        }
    }
}

/// Navigation target for the game host: `/gameOn2/:gameId/:roomId`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameRoute {
    pub game_id: String,
    pub room_id: String,
}

impl GameRoute {
    const PREFIX: &'static str = "/gameOn2/";

    pub fn new(game_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            room_id: room_id.into(),
        }
    }

    pub fn parse(path: &str) -> Result<Self> {
        let rest = path
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| MatchError::InvalidRoute(path.to_string()))?;
        let mut parts = rest.trim_end_matches('/').split('/');

        match (parts.next(), parts.next(), parts.next()) {
            (Some(game_id), Some(room_id), None) if !game_id.is_empty() && !room_id.is_empty() => {
                Ok(Self::new(game_id, room_id))
            }
            _ => Err(MatchError::InvalidRoute(path.to_string())),
        }
    }
}

impl fmt::Display for GameRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", Self::PREFIX, self.game_id, self.room_id)
    }
}
