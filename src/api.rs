//! REST client for score submission and the user roster

use crate::error::{MatchError, Result};
use crate::game_host::{GameCompletion, HostContext, ScoreReporter};
use crate::roster::Roster;
use crate::rt::{self, Duration};
use crate::types::{MatchConfig, OpponentProfile, ScoreEvent};
use rand::Rng;
use reqwest::Client;
use std::future::Future;
use tracing::{debug, info, warn};

/// Upper bound for a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    score_path: String,
    users_path: String,
    retries: u32,
    backoff: Duration,
}

impl ApiClient {
    pub fn new(config: &MatchConfig) -> Result<Self> {
        let base_url = config
            .api_base_url
            .as_deref()
            .ok_or(MatchError::MissingApiBase)?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: Client::new(),
            base_url,
            score_path: config.score_path.clone(),
            users_path: config.users_path.clone(),
            retries: config.score_retries,
            backoff: Duration::from_millis(config.retry_backoff),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Fetch every known user into a fresh roster
    pub async fn fetch_roster(&self) -> Result<Roster> {
        let response = self
            .client
            .get(self.url(&self.users_path))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MatchError::Api { status, body });
        }

        let users: Vec<OpponentProfile> = response.json().await?;
        debug!("Fetched {} users", users.len());
        Ok(users.into_iter().collect())
    }

    /// POST a score, retrying network failures and 5xx answers with backoff
    pub async fn submit_score(&self, event: &ScoreEvent) -> Result<()> {
        let attempts = self.retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.post_score(event).await {
                Ok(()) => {
                    info!("Score {} recorded for room {}", event.score, event.room_id);
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = backoff_delay(self.backoff, attempt);
                    warn!(
                        "Score submission attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    rt::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(MatchError::RetriesExhausted {
                        attempts,
                        last: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_score(&self, event: &ScoreEvent) -> Result<()> {
        let response = self
            .client
            .post(self.url(&self.score_path))
            .json(event)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MatchError::Api { status, body });
        }
        Ok(())
    }
}

impl ScoreReporter for ApiClient {
    fn report(
        &self,
        completion: GameCompletion,
        context: &HostContext,
    ) -> impl Future<Output = Result<()>> {
        let event = ScoreEvent {
            user_id: context.user_id.clone(),
            user_name: context.user_name.clone(),
            score: completion.score,
            room_id: context.room_id.clone(),
            game_name: context.game_name.clone(),
        };
        async move { self.submit_score(&event).await }
    }
}

/// Exponential backoff for `attempt` (1-based) with up to 50% random jitter
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
    let capped = exp.min(MAX_BACKOFF);
    let jitter = rand::thread_rng().gen_range(0.0..=0.5);
    capped.mul_f64(1.0 + jitter).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Requests seen by a [`serve`] responder, in arrival order
    type Requests = Arc<Mutex<Vec<String>>>;

    /// Answer one connection per scripted `(status, body)` pair, then stop.
    async fn serve(script: Vec<(u16, &'static str)>) -> (String, Requests) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Requests::default();

        let seen = requests.clone();
        tokio::spawn(async move {
            for (status, body) in script {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                seen.lock().push(request);
                let response = format!(
                    concat!(
                        "HTTP/1.1 {} {}\r\n",
                        "content-type: application/json\r\n",
                        "content-length: {}\r\n",
                        "connection: close\r\n\r\n{}",
                    ),
                    status,
                    if status < 400 { "OK" } else { "Error" },
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        (base, requests)
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn client(base: &str, retries: u32) -> ApiClient {
        let config = MatchConfig::new("u1", "alice")
            .api_base_url(base)
            .score_retries(retries)
            .retry_backoff(1);
        ApiClient {
            client: Client::builder().no_proxy().build().unwrap(),
            ..ApiClient::new(&config).unwrap()
        }
    }

    fn score(score: i64) -> ScoreEvent {
        ScoreEvent {
            user_id: "u1".to_string(),
            user_name: "alice".to_string(),
            score,
            room_id: "r1".to_string(),
            game_name: "snake".to_string(),
        }
    }

    #[test]
    fn test_new_requires_base_url() {
        let config = MatchConfig::new("u1", "alice");
        assert!(matches!(ApiClient::new(&config), Err(MatchError::MissingApiBase)));
    }

    #[test]
    fn test_url_joins_paths() {
        let config = MatchConfig::new("u1", "alice")
            .api_base_url("https://api.example.com/")
            .score_path("/api/scores");
        let api = ApiClient::new(&config).unwrap();
        assert_eq!(api.url(&api.score_path), "https://api.example.com/api/scores");
        assert_eq!(api.url("api/users"), "https://api.example.com/api/users");
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let base = Duration::from_millis(500);
        for _ in 0..50 {
            let first = backoff_delay(base, 1);
            assert!(first >= base && first <= base.mul_f64(1.5));

            let third = backoff_delay(base, 3);
            assert!(third >= Duration::from_millis(2000) && third <= Duration::from_millis(3000));

            assert!(backoff_delay(base, 30) <= MAX_BACKOFF);
        }
    }

    #[test]
    fn test_retry_classification() {
        let server = MatchError::Api { status: 502, body: String::new() };
        let client = MatchError::Api { status: 422, body: String::new() };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!MatchError::MissingApiBase.is_retryable());
    }

    #[tokio::test]
    async fn test_submit_retries_server_errors_then_succeeds() {
        let (base, requests) = serve(vec![(503, ""), (502, ""), (201, "{}")]).await;
        client(&base, 3).submit_score(&score(7)).await.unwrap();

        let requests = requests.lock();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].starts_with("POST /api/scores "));
        assert!(requests[0].contains(r#""score":7"#));
        assert!(requests[0].contains(r#""roomId":"r1""#));
    }

    #[tokio::test]
    async fn test_submit_fails_fast_on_client_error() {
        let (base, requests) = serve(vec![(422, "bad score"), (201, "{}")]).await;
        let err = client(&base, 3).submit_score(&score(7)).await.unwrap_err();

        assert!(matches!(err, MatchError::Api { status: 422, ref body } if body == "bad score"));
        assert_eq!(requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_gives_up_after_configured_retries() {
        let (base, requests) = serve(vec![(503, ""), (503, ""), (503, "")]).await;
        let err = client(&base, 2).submit_score(&score(7)).await.unwrap_err();

        assert!(matches!(err, MatchError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(requests.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_submit_with_unbounded_retry_setting() {
        let (base, requests) = serve(vec![(400, "")]).await;
        let err = client(&base, u32::MAX).submit_score(&score(7)).await.unwrap_err();

        assert!(matches!(err, MatchError::Api { status: 400, .. }));
        assert_eq!(requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_roster() {
        let users = r#"[{"_id":"u2","username":"bianca"},{"id":"u3","displayName":"carl"}]"#;
        let (base, requests) = serve(vec![(200, users)]).await;
        let roster = client(&base, 0).fetch_roster().await.unwrap();

        assert_eq!(roster.len(), 2);
        assert_eq!(roster.resolve("u2").display_name, "bianca");
        assert_eq!(roster.resolve("u3").display_name, "carl");
        assert!(requests.lock()[0].starts_with("GET /api/users "));
    }

    #[tokio::test]
    async fn test_fetch_roster_reports_status() {
        let (base, _requests) = serve(vec![(500, "down")]).await;
        let err = client(&base, 0).fetch_roster().await.unwrap_err();
        assert!(matches!(err, MatchError::Api { status: 500, .. }));
    }
}
