//! Matchmaking state machine
//!
//! [`MatchMachine`] is pure: it takes one [`Input`] at a time and answers
//! with the [`Effect`]s the driver must carry out (messages to send, timers
//! to start or cancel, events for the application). It never touches the
//! transport, the clock or the roster itself, which keeps every transition
//! testable without a runtime.

use crate::timer::{TimerEvent, TimerKind};
use crate::types::*;
use tracing::{debug, info, warn};

/// The paired match a session is working through
#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub request: MatchRequest,
    pub result: MatchResult,
    pub opponent: OpponentProfile,
}

impl Pairing {
    pub fn room_id(&self) -> &str {
        &self.result.room_id
    }

    pub fn route(&self) -> GameRoute {
        GameRoute::new(&self.request.game_id, &self.result.room_id)
    }
}

/// Where the session currently is
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MatchState {
    #[default]
    Idle,
    Searching {
        request: MatchRequest,
        remaining: u32,
        progress: f32,
    },
    TimedOut {
        request: MatchRequest,
    },
    Found {
        pairing: Pairing,
        auto_play_remaining: u32,
    },
    Registered {
        pairing: Pairing,
    },
    GameActive {
        pairing: Pairing,
        route: GameRoute,
    },
    Waiting {
        pairing: Pairing,
        score: i64,
    },
    Complete {
        pairing: Pairing,
        outcome: GameOverResult,
    },
}

impl MatchState {
    pub fn name(&self) -> &'static str {
        match self {
            MatchState::Idle => "idle",
            MatchState::Searching { .. } => "searching",
            MatchState::TimedOut { .. } => "timed_out",
            MatchState::Found { .. } => "found",
            MatchState::Registered { .. } => "registered",
            MatchState::GameActive { .. } => "game_active",
            MatchState::Waiting { .. } => "waiting",
            MatchState::Complete { .. } => "complete",
        }
    }

    pub fn pairing(&self) -> Option<&Pairing> {
        match self {
            MatchState::Found { pairing, .. }
            | MatchState::Registered { pairing }
            | MatchState::GameActive { pairing, .. }
            | MatchState::Waiting { pairing, .. }
            | MatchState::Complete { pairing, .. } => Some(pairing),
            _ => None,
        }
    }

    /// Whether the session is holding server-side resources
    pub fn is_in_flight(&self) -> bool {
        !matches!(
            self,
            MatchState::Idle | MatchState::TimedOut { .. } | MatchState::Complete { .. }
        )
    }

    /// Committed to a room; a new search would abandon it
    fn is_committed(&self) -> bool {
        matches!(
            self,
            MatchState::Registered { .. }
                | MatchState::GameActive { .. }
                | MatchState::Waiting { .. }
        )
    }
}

/// Everything the machine reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    FindMatch { game_id: String, entry_fee: u64 },
    ConfirmPlay,
    GameCompleted { score: i64 },
    Reset,
    MatchFound { result: MatchResult, opponent: OpponentProfile },
    RegisterSuccess(RegistrationAck),
    GameOverResponse(GameOverResult),
    Disconnected { reason: String },
    Timer { kind: TimerKind, event: TimerEvent },
}

/// Events surfaced to the application
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    SearchStarted(MatchRequest),
    SearchProgress { remaining: u32, progress: f32 },
    TimedOut { notice: String },
    OpponentFound { opponent: OpponentProfile, room_id: String },
    AutoPlayTick(u32),
    Registered { room_id: String },
    Navigate(GameRoute),
    WaitingForOpponent,
    Complete(GameOverResult),
    ConnectionLost { reason: String },
    Rejected(String),
}

/// Work for the driver
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(ClientMessage),
    StartTimer { kind: TimerKind, units: u32 },
    CancelTimer(TimerKind),
    Notify(MatchEvent),
}

pub struct MatchMachine {
    user_id: String,
    search_timeout: u32,
    auto_play_delay: u32,
    state: MatchState,
}

impl MatchMachine {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            user_id: config.user_id.clone(),
            search_timeout: config.search_timeout,
            auto_play_delay: config.auto_play_delay,
            state: MatchState::Idle,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let from = self.state.name();
        let effects = match input {
            Input::FindMatch { game_id, entry_fee } => self.find_match(game_id, entry_fee),
            Input::ConfirmPlay => self.register("confirm"),
            Input::GameCompleted { score } => self.game_completed(score),
            Input::Reset => self.reset(),
            Input::MatchFound { result, opponent } => self.match_found(result, opponent),
            Input::RegisterSuccess(ack) => self.register_success(ack),
            Input::GameOverResponse(outcome) => self.game_over_response(outcome),
            Input::Disconnected { reason } => self.disconnected(reason),
            Input::Timer { kind: TimerKind::Countdown, event } => self.countdown(event),
            Input::Timer { kind: TimerKind::AutoPlay, event: TimerEvent::Expired } => {
                self.register("auto-play")
            }
            Input::Timer {
                kind: TimerKind::AutoPlay,
                event: TimerEvent::Tick { remaining, .. },
            } => self.auto_play_tick(remaining),
        };

        if from != self.state.name() {
            debug!(from, to = self.state.name(), "transition");
        }
        effects
    }

    fn find_match(&mut self, game_id: String, entry_fee: u64) -> Vec<Effect> {
        if self.state.is_committed() {
            return vec![Effect::Notify(MatchEvent::Rejected(format!(
                "match already in progress ({})",
                self.state.name()
            )))];
        }

        let request = MatchRequest {
            user_id: self.user_id.clone(),
            game_id,
            entry_fee,
        };
        info!(game = %request.game_id, entry_fee, "searching for opponent");

        self.state = MatchState::Searching {
            request: request.clone(),
            remaining: self.search_timeout,
            progress: 1.0,
        };

        vec![
            Effect::CancelTimer(TimerKind::AutoPlay),
            Effect::CancelTimer(TimerKind::Countdown),
            Effect::Send(ClientMessage::JoinMatch(request.clone())),
            Effect::StartTimer {
                kind: TimerKind::Countdown,
                units: self.search_timeout,
            },
            Effect::Notify(MatchEvent::SearchStarted(request)),
        ]
    }

    fn countdown(&mut self, event: TimerEvent) -> Vec<Effect> {
        let MatchState::Searching { request, remaining, progress } = &mut self.state else {
            debug!(state = self.state.name(), "countdown signal outside search ignored");
            return vec![];
        };

        match event {
            TimerEvent::Tick { remaining: left, progress: p } => {
                *remaining = left;
                *progress = p;
                vec![Effect::Notify(MatchEvent::SearchProgress {
                    remaining: left,
                    progress: p,
                })]
            }
            TimerEvent::Expired => {
                let request = request.clone();
                info!(game = %request.game_id, "no opponent found in time");
                self.state = MatchState::TimedOut { request: request.clone() };
                vec![
                    Effect::Send(ClientMessage::NotFound(request)),
                    Effect::Notify(MatchEvent::TimedOut {
                        notice: TIMEOUT_NOTICE.to_string(),
                    }),
                ]
            }
        }
    }

    fn match_found(&mut self, result: MatchResult, opponent: OpponentProfile) -> Vec<Effect> {
        let MatchState::Searching { request, .. } = &self.state else {
            debug!(
                state = self.state.name(),
                room = %result.room_id,
                "duplicate or late match_found ignored"
            );
            return vec![];
        };

        info!(opponent = %opponent.display_name, room = %result.room_id, "opponent found");
        let room_id = result.room_id.clone();
        self.state = MatchState::Found {
            pairing: Pairing {
                request: request.clone(),
                result,
                opponent: opponent.clone(),
            },
            auto_play_remaining: self.auto_play_delay,
        };

        vec![
            Effect::CancelTimer(TimerKind::Countdown),
            Effect::StartTimer {
                kind: TimerKind::AutoPlay,
                units: self.auto_play_delay,
            },
            Effect::Notify(MatchEvent::OpponentFound { opponent, room_id }),
            Effect::Notify(MatchEvent::AutoPlayTick(self.auto_play_delay)),
        ]
    }

    fn auto_play_tick(&mut self, left: u32) -> Vec<Effect> {
        match &mut self.state {
            MatchState::Found { auto_play_remaining, .. } => {
                *auto_play_remaining = left;
                vec![Effect::Notify(MatchEvent::AutoPlayTick(left))]
            }
            _ => vec![],
        }
    }

    /// Found -> Registered, by user confirmation or auto-play expiry.
    fn register(&mut self, trigger: &'static str) -> Vec<Effect> {
        let MatchState::Found { pairing, .. } = &self.state else {
            debug!(state = self.state.name(), trigger, "registration outside found ignored");
            return vec![];
        };

        let pairing = pairing.clone();
        let registration = Registration {
            user_id: self.user_id.clone(),
            game_id: pairing.request.game_id.clone(),
            room_id: pairing.result.room_id.clone(),
            entry_fee: pairing.request.entry_fee,
        };
        info!(room = %registration.room_id, trigger, "registering");

        let room_id = registration.room_id.clone();
        self.state = MatchState::Registered { pairing };

        vec![
            Effect::CancelTimer(TimerKind::AutoPlay),
            Effect::Send(ClientMessage::Register(registration)),
            Effect::Notify(MatchEvent::Registered { room_id }),
        ]
    }

    fn register_success(&mut self, ack: RegistrationAck) -> Vec<Effect> {
        let MatchState::Registered { pairing } = &self.state else {
            debug!(
                state = self.state.name(),
                room = %ack.room_id,
                "register_success outside registered ignored"
            );
            return vec![];
        };
        if pairing.room_id() != ack.room_id {
            warn!(
                expected = %pairing.room_id(),
                got = %ack.room_id,
                "register_success for unknown room ignored"
            );
            return vec![];
        }

        let pairing = pairing.clone();
        let route = pairing.route();
        info!(%route, "registration acknowledged");
        self.state = MatchState::GameActive {
            pairing,
            route: route.clone(),
        };

        vec![Effect::Notify(MatchEvent::Navigate(route))]
    }

    fn game_completed(&mut self, score: i64) -> Vec<Effect> {
        let MatchState::GameActive { pairing, .. } = &self.state else {
            debug!(state = self.state.name(), score, "game completion outside active game ignored");
            return vec![];
        };

        let pairing = pairing.clone();
        let submission = GameOverSubmission {
            score,
            user_id: self.user_id.clone(),
            room_id: pairing.result.room_id.clone(),
        };
        info!(room = %submission.room_id, score, "submitting score, waiting for opponent");
        self.state = MatchState::Waiting { pairing, score };

        vec![
            Effect::Send(ClientMessage::GameOver(submission)),
            Effect::Notify(MatchEvent::WaitingForOpponent),
        ]
    }

    fn game_over_response(&mut self, outcome: GameOverResult) -> Vec<Effect> {
        let pairing = match &self.state {
            MatchState::GameActive { pairing, .. } | MatchState::Waiting { pairing, .. } => pairing,
            _ => {
                debug!(
                    state = self.state.name(),
                    room = %outcome.room_id,
                    "game_over_response outside game ignored"
                );
                return vec![];
            }
        };
        if pairing.room_id() != outcome.room_id {
            warn!(
                expected = %pairing.room_id(),
                got = %outcome.room_id,
                "game_over_response for unknown room ignored"
            );
            return vec![];
        }

        info!(room = %outcome.room_id, winner = ?outcome.winner_id, "game over");
        self.state = MatchState::Complete {
            pairing: pairing.clone(),
            outcome: outcome.clone(),
        };

        vec![Effect::Notify(MatchEvent::Complete(outcome))]
    }

    fn disconnected(&mut self, reason: String) -> Vec<Effect> {
        if !self.state.is_in_flight() {
            debug!(state = self.state.name(), %reason, "transport lost while idle");
            return vec![];
        }

        warn!(state = self.state.name(), %reason, "transport lost, abandoning match");
        self.state = MatchState::Idle;
        vec![
            Effect::CancelTimer(TimerKind::Countdown),
            Effect::CancelTimer(TimerKind::AutoPlay),
            Effect::Notify(MatchEvent::ConnectionLost { reason }),
        ]
    }

    fn reset(&mut self) -> Vec<Effect> {
        self.state = MatchState::Idle;
        vec![
            Effect::CancelTimer(TimerKind::Countdown),
            Effect::CancelTimer(TimerKind::AutoPlay),
        ]
    }
}
