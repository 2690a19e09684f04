//! Walk through one match against a scripted in-memory server

use match_arena::{
    GameHost, HostContext, LoopbackServer, LoopbackTransport, MatchConfig, MatchEvent, Matchmaker,
    OpponentProfile, ResultView, Roster, frame_channel, present,
};
use match_arena::{
    ClientMessage, GameOverResult, MatchResult, PlayerScore, Players, RegistrationAck,
    ServerMessage,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    println!("match-arena lobby demo");
    println!("======================\n");

    let config = MatchConfig::new("u1", "alice").tick_interval(250);
    let roster: Roster = vec![OpponentProfile {
        id: "u2".to_string(),
        display_name: "bianca".to_string(),
        avatar: None,
    }]
    .into_iter()
    .collect();

    let (transport, server) = LoopbackTransport::pair();
    tokio::spawn(scripted_server(server));

    let matchmaker = Matchmaker::start(config.clone(), Arc::new(transport), roster.shared())?;
    matchmaker.find_match("snake", 10)?;

    while let Some(event) = matchmaker.recv().await {
        let view = present(&matchmaker.state().await, &config.user_id);

        match event {
            MatchEvent::SearchProgress { .. } | MatchEvent::AutoPlayTick(_) => {
                println!("  {}", view)
            }
            MatchEvent::Navigate(route) => {
                println!("[Navigate] {}", route);

                let host = GameHost::new(
                    HostContext {
                        user_id: config.user_id.clone(),
                        user_name: config.user_name.clone(),
                        room_id: route.room_id.clone(),
                        game_name: route.game_id.clone(),
                    },
                    &matchmaker,
                );
                println!("{}", host.markup("https://games.example.com/snake/index.html"));

                let (port, listener) = frame_channel();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    port.post_message(serde_json::json!({"type": "LEVEL_UP"}));
                    port.post_message(serde_json::json!({"type": "GAME_OVER", "score": 3}));
                });

                if let Some(summary) = host.run(listener).await {
                    println!("[Game] {}", ResultView::from(summary));
                }
            }
            MatchEvent::WaitingForOpponent => println!("{}", view),
            MatchEvent::Complete(_) | MatchEvent::TimedOut { .. } => {
                println!("\n{}", view);
                break;
            }
            MatchEvent::ConnectionLost { reason } => {
                println!("[Error] connection lost: {}", reason);
                break;
            }
            other => println!("[Event] {:?}", other),
        }
    }

    matchmaker.shutdown();
    Ok(())
}

/// Pairs every join with `u2`, acknowledges registration and answers the score.
async fn scripted_server(mut server: LoopbackServer) {
    while let Some(message) = server.recv().await {
        match message {
            ClientMessage::JoinMatch(request) => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                server.push(ServerMessage::MatchFound(MatchResult {
                    opponent_id: "u2".to_string(),
                    room_id: format!("{}-room", request.game_id),
                }));
            }
            ClientMessage::Register(registration) => {
                server.push(ServerMessage::RegisterSuccess(RegistrationAck {
                    room_id: registration.room_id,
                }));
            }
            ClientMessage::GameOver(submission) => {
                tokio::time::sleep(Duration::from_millis(750)).await;
                server.push(ServerMessage::GameOverResponse(GameOverResult {
                    winner_id: Some("u2".to_string()),
                    players: Players {
                        player1: PlayerScore {
                            user_id: submission.user_id,
                            score: submission.score,
                        },
                        player2: PlayerScore {
                            user_id: "u2".to_string(),
                            score: 5,
                        },
                    },
                    room_id: submission.room_id,
                    game_id: "snake".to_string(),
                }));
            }
            ClientMessage::NotFound(_) => break,
        }
    }
}
