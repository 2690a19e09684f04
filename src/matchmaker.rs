//! Matchmaker - drives a matchmaking session over a transport

use crate::error::{MatchError, Result};
use crate::game_host::{GameCompletion, HostContext, ScoreReporter};
use crate::machine::{Effect, Input, MatchEvent, MatchMachine, MatchState};
use crate::roster::SharedRoster;
use crate::rt::{self, Duration};
use crate::timer::{Timer, TimerKind, TimerSignal};
use crate::transport::{Subscription, Transport, TransportEvent};
use crate::types::*;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

enum Command {
    FindMatch { game_id: String, entry_fee: u64 },
    ConfirmPlay,
    SubmitScore {
        score: i64,
        reply: oneshot::Sender<Result<()>>,
    },
    Reset,
    Shutdown,
}

/// Everything the session loop consumes, in arrival order
enum Signal {
    Command(Command),
    Transport(TransportEvent),
    Timer(TimerSignal),
}

/// Matchmaker - one client's matchmaking session
///
/// All state lives in a single background task fed through one inbox, so
/// user commands, server messages and timer ticks are handled strictly one
/// at a time. Dropping the handle stops the task.
pub struct Matchmaker {
    config: MatchConfig,
    inbox: mpsc::UnboundedSender<Signal>,
    state: Arc<RwLock<MatchState>>,
    event_rx: Arc<RwLock<mpsc::Receiver<MatchEvent>>>,
}

impl Matchmaker {
    /// Subscribe to `transport` and start the session loop
    pub fn start(
        config: MatchConfig,
        transport: Arc<dyn Transport>,
        roster: SharedRoster,
    ) -> Result<Self> {
        let subscription = transport.subscribe()?;
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let state = Arc::new(RwLock::new(MatchState::Idle));

        let tick = Duration::from_millis(config.tick_interval);
        let session = Session {
            machine: MatchMachine::new(&config),
            countdown: Timer::new(TimerKind::Countdown, tick),
            auto_play: Timer::new(TimerKind::AutoPlay, tick),
            subscription_id: subscription.id,
            transport,
            roster,
            inbox: inbox.clone(),
            state: state.clone(),
            event_tx,
        };

        forward_transport(subscription, inbox.clone());
        rt::spawn("matchmaker", session.run(inbox_rx));

        info!("Matchmaker started for {}", config.user_id);
        Ok(Self {
            config,
            inbox,
            state,
            event_rx: Arc::new(RwLock::new(event_rx)),
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Current state snapshot
    pub async fn state(&self) -> MatchState {
        self.state.read().await.clone()
    }

    /// Receive next event (non-blocking)
    pub async fn try_recv(&self) -> Option<MatchEvent> {
        self.event_rx.write().await.try_recv().ok()
    }

    /// Receive next event (blocking)
    pub async fn recv(&self) -> Option<MatchEvent> {
        self.event_rx.write().await.recv().await
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Join the queue for `game_id`, abandoning any unregistered attempt
    pub fn find_match(&self, game_id: impl Into<String>, entry_fee: u64) -> Result<()> {
        self.command(Command::FindMatch {
            game_id: game_id.into(),
            entry_fee,
        })
    }

    /// Enter the paired room now instead of waiting for auto-play
    pub fn confirm_play(&self) -> Result<()> {
        self.command(Command::ConfirmPlay)
    }

    /// Report the local player's final score
    ///
    /// Resolves once the session has handled it: `Rejected` when no game is
    /// active, or the transport error when `game_over` could not be emitted.
    pub async fn submit_score(&self, score: i64) -> Result<()> {
        let (reply, answer) = oneshot::channel();
        self.command(Command::SubmitScore { score, reply })?;
        answer.await.map_err(|_| MatchError::SessionClosed)?
    }

    /// Drop the current attempt and return to idle
    pub fn reset(&self) -> Result<()> {
        self.command(Command::Reset)
    }

    /// Stop the session loop and release the transport subscription
    pub fn shutdown(&self) {
        let _ = self.inbox.send(Signal::Command(Command::Shutdown));
    }

    fn command(&self, command: Command) -> Result<()> {
        self.inbox
            .send(Signal::Command(command))
            .map_err(|_| MatchError::SessionClosed)
    }
}

impl Drop for Matchmaker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ScoreReporter for Matchmaker {
    fn report(
        &self,
        completion: GameCompletion,
        _context: &HostContext,
    ) -> impl Future<Output = Result<()>> {
        self.submit_score(completion.score)
    }
}

fn forward_transport(mut subscription: Subscription, inbox: mpsc::UnboundedSender<Signal>) {
    rt::spawn("transport-forward", async move {
        while let Some(event) = subscription.recv().await {
            if inbox.send(Signal::Transport(event)).is_err() {
                break;
            }
        }
        trace!("transport subscription {} closed", subscription.id);
    });
}

struct Session {
    machine: MatchMachine,
    countdown: Timer,
    auto_play: Timer,
    subscription_id: u64,
    transport: Arc<dyn Transport>,
    roster: SharedRoster,
    inbox: mpsc::UnboundedSender<Signal>,
    state: Arc<RwLock<MatchState>>,
    event_tx: mpsc::Sender<MatchEvent>,
}

impl Session {
    async fn run(mut self, mut inbox_rx: mpsc::UnboundedReceiver<Signal>) {
        while let Some(signal) = inbox_rx.recv().await {
            let input = match signal {
                Signal::Command(Command::Shutdown) => break,
                Signal::Command(Command::SubmitScore { score, reply }) => {
                    let outcome = self.submit(score).await;
                    let _ = reply.send(outcome);
                    continue;
                }
                Signal::Command(command) => command_input(command),
                Signal::Transport(event) => self.transport_input(event).await,
                Signal::Timer(signal) => self.timer_input(signal),
            };

            if let Some(input) = input {
                let _ = self.process(input).await;
            }
        }

        self.countdown.cancel();
        self.auto_play.cancel();
        self.transport.unsubscribe(self.subscription_id);
        info!("Matchmaker stopped");
    }

    async fn submit(&mut self, score: i64) -> Result<()> {
        let sent = self.process(Input::GameCompleted { score }).await?;
        if sent.contains(&events::GAME_OVER) {
            Ok(())
        } else {
            Err(MatchError::Rejected(format!(
                "score {} not accepted while {}",
                score,
                self.machine.state().name()
            )))
        }
    }

    async fn transport_input(&self, event: TransportEvent) -> Option<Input> {
        match event {
            TransportEvent::Message(ServerMessage::MatchFound(result)) => {
                let opponent = self.roster.read().await.resolve(&result.opponent_id);
                Some(Input::MatchFound { result, opponent })
            }
            TransportEvent::Message(ServerMessage::RegisterSuccess(ack)) => {
                Some(Input::RegisterSuccess(ack))
            }
            TransportEvent::Message(ServerMessage::GameOverResponse(outcome)) => {
                Some(Input::GameOverResponse(outcome))
            }
            TransportEvent::Disconnected { reason } => Some(Input::Disconnected { reason }),
        }
    }

    fn timer_input(&mut self, signal: TimerSignal) -> Option<Input> {
        let timer = match signal.kind {
            TimerKind::Countdown => &mut self.countdown,
            TimerKind::AutoPlay => &mut self.auto_play,
        };
        if !timer.accept(&signal) {
            trace!(kind = ?signal.kind, epoch = signal.epoch, "stale timer signal dropped");
            return None;
        }
        Some(Input::Timer {
            kind: signal.kind,
            event: signal.event,
        })
    }

    /// Feed `input` through the machine and carry out its effects. A failed
    /// send is fed back in as a disconnect and returned after the fallout is
    /// handled; otherwise the names of the emitted events are returned.
    async fn process(&mut self, input: Input) -> Result<Vec<&'static str>> {
        let mut pending = VecDeque::from([input]);
        let mut sent = Vec::new();
        let mut failure = None;

        while let Some(input) = pending.pop_front() {
            let effects = self.machine.handle(input);
            *self.state.write().await = self.machine.state().clone();

            for effect in effects {
                match effect {
                    Effect::Send(message) => {
                        let event = message.event_name();
                        match self.transport.send(message) {
                            Ok(()) => sent.push(event),
                            Err(e) => {
                                warn!("Failed to emit {}: {}", event, e);
                                pending.push_back(Input::Disconnected {
                                    reason: e.to_string(),
                                });
                                failure.get_or_insert(e);
                            }
                        }
                    }
                    Effect::StartTimer { kind, units } => self.start_timer(kind, units),
                    Effect::CancelTimer(kind) => self.timer_mut(kind).cancel(),
                    Effect::Notify(event) => self.notify(event),
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }

    fn start_timer(&mut self, kind: TimerKind, units: u32) {
        let inbox = self.inbox.clone();
        let epoch = self.timer_mut(kind).start(units, move |signal| {
            let _ = inbox.send(Signal::Timer(signal));
        });
        debug!(?kind, units, epoch, "timer started");
    }

    fn timer_mut(&mut self, kind: TimerKind) -> &mut Timer {
        match kind {
            TimerKind::Countdown => &mut self.countdown,
            TimerKind::AutoPlay => &mut self.auto_play,
        }
    }

    fn notify(&self, event: MatchEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Dropping match event: {}", e);
        }
    }
}

fn command_input(command: Command) -> Option<Input> {
    match command {
        Command::FindMatch { game_id, entry_fee } => Some(Input::FindMatch { game_id, entry_fee }),
        Command::ConfirmPlay => Some(Input::ConfirmPlay),
        Command::Reset => Some(Input::Reset),
        Command::SubmitScore { .. } | Command::Shutdown => None,
    }
}
