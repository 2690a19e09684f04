//! # match-arena
//!
//! Client side of real-time head-to-head matchmaking.
//!
//! ## Features
//!
//! - **Matchmaking**: Queue, pairing, search timeout and auto-play countdown
//! - **Single State**: One tagged state per session, no stale timer transitions
//! - **Transports**: Pluggable transport with WebSocket and in-memory loopback
//! - **Game Host**: Sandboxed embedding and completion message handling
//! - **Scoring**: Socket or HTTP score submission with bounded retry
//!
//! ## Example
//!
//! ```rust,ignore
//! use match_arena::{Matchmaker, MatchConfig, MatchEvent, Roster, WsTransport};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MatchConfig::new("u1", "alice").search_timeout(20);
//!     let transport = Arc::new(WsTransport::connect("wss://play.example.com/ws").await?);
//!     let matchmaker = Matchmaker::start(config, transport, Roster::new().shared())?;
//!
//!     matchmaker.find_match("g1", 10)?;
//!
//!     while let Some(event) = matchmaker.recv().await {
//!         match event {
//!             MatchEvent::OpponentFound { opponent, .. } => {
//!                 println!("Playing against {}", opponent.display_name);
//!             }
//!             MatchEvent::Navigate(route) => {
//!                 println!("Open {}", route);
//!             }
//!             MatchEvent::TimedOut { notice } => {
//!                 println!("{}", notice);
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod error;
pub mod game_host;
pub mod machine;
pub mod matchmaker;
pub mod presentation;
pub mod roster;
pub mod rt;
pub mod timer;
pub mod transport;
pub mod types;
#[cfg(all(feature = "native", not(target_arch = "wasm32")))]
pub mod ws;


pub use api::ApiClient;
pub use error::{MatchError, Result};
pub use game_host::{
    FrameListener, FramePort, GameHost, HostContext, SandboxPolicy, ScoreReporter, ScoreSummary,
    frame_channel,
};
pub use machine::{MatchEvent, MatchMachine, MatchState, Pairing};
pub use matchmaker::Matchmaker;
pub use presentation::{ResultView, WinnerLabel, present};
pub use roster::{Roster, SharedRoster};
pub use timer::{Timer, TimerKind};
pub use transport::{LoopbackServer, LoopbackTransport, Transport, TransportEvent};
pub use types::*;
#[cfg(all(feature = "native", not(target_arch = "wasm32")))]
pub use ws::WsTransport;
