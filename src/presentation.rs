//! What the user sees for each matchmaking state

use crate::game_host::ScoreSummary;
use crate::machine::{MatchState, Pairing};
use crate::types::{GameOverResult, TIMEOUT_NOTICE};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinnerLabel {
    You,
    Opponent(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultView {
    Idle,
    Searching { remaining: u32, progress: f32 },
    TimedOut,
    OpponentFound { name: String, initial: char, auto_play_remaining: u32 },
    Joining { room_id: String },
    Playing { route: String },
    OpponentPending { score: i64 },
    Scoreboard {
        your_score: Option<i64>,
        opponent_score: Option<i64>,
        winner: WinnerLabel,
    },
    Summary(ScoreSummary),
}

impl From<ScoreSummary> for ResultView {
    fn from(summary: ScoreSummary) -> Self {
        ResultView::Summary(summary)
    }
}

/// View for `state` as seen by `local_user_id`
pub fn present(state: &MatchState, local_user_id: &str) -> ResultView {
    match state {
        MatchState::Idle => ResultView::Idle,
        MatchState::Searching { remaining, progress, .. } => ResultView::Searching {
            remaining: *remaining,
            progress: *progress,
        },
        MatchState::TimedOut { .. } => ResultView::TimedOut,
        MatchState::Found { pairing, auto_play_remaining } => ResultView::OpponentFound {
            name: pairing.opponent.display_name.clone(),
            initial: pairing.opponent.initial(),
            auto_play_remaining: *auto_play_remaining,
        },
        MatchState::Registered { pairing } => ResultView::Joining {
            room_id: pairing.room_id().to_string(),
        },
        MatchState::GameActive { route, .. } => ResultView::Playing { route: route.to_string() },
        MatchState::Waiting { score, .. } => ResultView::OpponentPending { score: *score },
        MatchState::Complete { pairing, outcome } => scoreboard(outcome, local_user_id, pairing),
    }
}

/// Side-by-side scores for a finished game; slots are matched by user id.
/// Any winner other than the local user is labelled with the opponent's name.
pub fn scoreboard(outcome: &GameOverResult, local_user_id: &str, pairing: &Pairing) -> ResultView {
    let winner = if outcome.is_winner(local_user_id) {
        WinnerLabel::You
    } else {
        WinnerLabel::Opponent(pairing.opponent.display_name.clone())
    };

    ResultView::Scoreboard {
        your_score: outcome.player(local_user_id).map(|p| p.score),
        opponent_score: outcome.opponent_of(local_user_id).map(|p| p.score),
        winner,
    }
}

impl fmt::Display for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultView::Idle => write!(f, "Find Match"),
            ResultView::Searching { remaining, progress } => {
                write!(f, "Searching for opponent... {}s ({:.0}%)", remaining, progress * 100.0)
            }
            ResultView::TimedOut => write!(f, "{TIMEOUT_NOTICE}"),
            ResultView::OpponentFound {
                name,
                initial,
                auto_play_remaining,
            } => write!(f, "[{initial}] {name} found! Starting in {auto_play_remaining}s"),
            ResultView::Joining { room_id } => write!(f, "Joining room {room_id}..."),
            ResultView::Playing { route } => write!(f, "Playing at {route}"),
            ResultView::OpponentPending { score } => {
                write!(f, "Your Score: {score}\nWaiting for opponent to finish...")
            }
            ResultView::Scoreboard {
                your_score,
                opponent_score,
                winner,
            } => {
                writeln!(f, "Your Score: {}", score_text(*your_score))?;
                writeln!(f, "Opponent's Score: {}", score_text(*opponent_score))?;
                match winner {
                    WinnerLabel::You => write!(f, "Winner: You"),
                    WinnerLabel::Opponent(name) => write!(f, "Winner: {name}"),
                }
            }
            ResultView::Summary(summary) => {
                write!(f, "{}\nYour Score: {}", summary.game_name, summary.score)
            }
        }
    }
}

fn score_text(score: Option<i64>) -> String {
    score.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
}
