//! Game host - embeds a third-party game and waits for its completion message
//!
//! The embedded game talks to its host through cross-document messages. The
//! host accepts exactly one shape, `{ "type": "GAME_OVER", "score": <number> }`,
//! and ignores everything else. Once a completion arrives the listener is
//! detached, the score is handed to a [`ScoreReporter`] and a
//! [`ScoreSummary`] is returned for presentation.

use crate::error::Result;
use serde_json::Value;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// `type` of the only message the host acts on
pub const GAME_OVER_MESSAGE: &str = "GAME_OVER";

/// Capabilities granted to the embedded game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxPolicy {
    pub allow_scripts: bool,
    pub allow_same_origin: bool,
    pub allow_popups: bool,
    pub allow_top_navigation: bool,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allow_scripts: true,
            allow_same_origin: true,
            allow_popups: true,
            allow_top_navigation: false,
        }
    }
}

impl SandboxPolicy {
    /// Value for the iframe `sandbox` attribute
    pub fn attribute(&self) -> String {
        [
            (self.allow_scripts, "allow-scripts"),
            (self.allow_same_origin, "allow-same-origin"),
            (self.allow_popups, "allow-popups"),
            (self.allow_top_navigation, "allow-top-navigation"),
        ]
        .into_iter()
        .filter_map(|(on, token)| on.then_some(token))
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Who is playing what, attached to every score report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    pub user_id: String,
    pub user_name: String,
    pub room_id: String,
    pub game_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameCompletion {
    pub score: i64,
}

/// What the result view shows once the embedded game finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSummary {
    pub score: i64,
    pub game_name: String,
    pub room_id: String,
    /// False when the reporter gave up; the score is still shown
    pub submitted: bool,
}

/// Destination for a finished game's score
pub trait ScoreReporter {
    fn report(
        &self,
        completion: GameCompletion,
        context: &HostContext,
    ) -> impl Future<Output = Result<()>>;
}

impl<R: ScoreReporter> ScoreReporter for &R {
    fn report(
        &self,
        completion: GameCompletion,
        context: &HostContext,
    ) -> impl Future<Output = Result<()>> {
        (**self).report(completion, context)
    }
}

/// Interpret a cross-document message, `None` unless it is a well-formed completion.
pub fn parse_message(message: &Value) -> Option<GameCompletion> {
    let object = message.as_object()?;
    if object.get("type")?.as_str()? != GAME_OVER_MESSAGE {
        return None;
    }

    let score = object.get("score")?;
    let score = match score.as_i64() {
        Some(n) => n,
        None => {
            let f = score.as_f64()?;
            if !f.is_finite() || f.abs() > i64::MAX as f64 {
                return None;
            }
            f.round() as i64
        }
    };
    Some(GameCompletion { score })
}

/// Embedded-game side of the message channel
#[derive(Clone)]
pub struct FramePort {
    tx: mpsc::UnboundedSender<Value>,
}

impl FramePort {
    /// Post a message to the host. Returns false once the host has detached.
    pub fn post_message(&self, message: Value) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Host side of the message channel; dropping it detaches the listener
pub struct FrameListener {
    rx: mpsc::UnboundedReceiver<Value>,
}

pub fn frame_channel() -> (FramePort, FrameListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FramePort { tx }, FrameListener { rx })
}

pub struct GameHost<R> {
    context: HostContext,
    reporter: R,
    policy: SandboxPolicy,
}

impl<R: ScoreReporter> GameHost<R> {
    pub fn new(context: HostContext, reporter: R) -> Self {
        Self {
            context,
            reporter,
            policy: SandboxPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SandboxPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn context(&self) -> &HostContext {
        &self.context
    }

    /// Iframe element embedding `game_url` under the sandbox policy
    pub fn markup(&self, game_url: &str) -> String {
        format!(
            concat!(
                r#"<iframe src="{src}" title="{title}" sandbox="{sandbox}" "#,
                r#"allow="autoplay; fullscreen" referrerpolicy="no-referrer"></iframe>"#,
            ),
            src = escape_attr(game_url),
            title = escape_attr(&self.context.game_name),
            sandbox = self.policy.attribute(),
        )
    }

    /// Wait for the game's completion message, report it and summarise.
    ///
    /// Returns `None` if the game side hung up without completing. The
    /// listener is consumed, so nothing is delivered after this returns.
    pub async fn run(&self, mut listener: FrameListener) -> Option<ScoreSummary> {
        let completion = loop {
            let message = listener.rx.recv().await?;
            match parse_message(&message) {
                Some(completion) => break completion,
                None => debug!("Ignoring frame message: {}", message),
            }
        };
        drop(listener);

        info!(
            "{} finished {} in room {} with {}",
            self.context.user_name, self.context.game_name, self.context.room_id, completion.score
        );

        let submitted = match self.reporter.report(completion, &self.context).await {
            Ok(()) => true,
            Err(e) => {
                error!("Score for room {} not recorded: {}", self.context.room_id, e);
                false
            }
        };

        Some(ScoreSummary {
            score: completion.score,
            game_name: self.context.game_name.clone(),
            room_id: self.context.room_id.clone(),
            submitted,
        })
    }
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
