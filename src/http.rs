//! HTTP client for the RunSquad REST API.
//!
//! This module provides:
//! - Bearer-token authentication (skipped for login/register)
//! - Run submission (`POST /runs/track`) and progress reads
//! - Clubs, scheduled runs, challenges and the club activity feed
//! - Session invalidation on 401/422 from protected endpoints
//! - Retry with exponential backoff for idempotent requests on 429 or
//!   transport errors; writes are never retried

use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::{debug, info, warn};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clubs::{
    Activity, Challenge, Club, Leaderboard, MessageResponse, NewChallenge, NewClub,
    NewScheduledRun, ScheduledRun,
};
use crate::config::ApiConfig;
use crate::error::{Result, RunSquadError};
use crate::records::{Progress, RunRecord, RunSink, SavedRun};

const BACKOFF_BASE_MS: u64 = 500;

/// Account details returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// Response of login and register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: User,
    #[serde(default)]
    pub message: Option<String>,
}

/// Claims read from the access token payload. The signature is not checked;
/// the server remains the authority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id as a string
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiry, Unix seconds
    #[serde(default)]
    pub exp: Option<i64>,
}

/// A logged-in session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: Option<User>,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into().trim().to_string(),
            user: None,
        }
    }

    /// Decode the JWT payload, `None` if the token is not a JWT.
    pub fn claims(&self) -> Option<TokenClaims> {
        let payload = self.token.split('.').nth(1)?;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Expired according to the `exp` claim. Tokens without one never expire
    /// client-side.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.claims()
            .and_then(|c| c.exp)
            .is_some_and(|exp| exp <= now.timestamp())
    }

    /// User id from the `sub` claim.
    pub fn user_id(&self) -> Option<i64> {
        self.claims()?.sub?.parse().ok()
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
}

/// Client for the RunSquad API.
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
    session: Mutex<Option<Session>>,
}

impl ApiClient {
    /// Create a client with no session.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RunSquadError::config(format!("Failed to create HTTP client: {}", e)))?;

        info!("[ApiClient] API base URL: {}", config.base_url);

        Ok(Self {
            client,
            config,
            session: Mutex::new(None),
        })
    }

    /// Create a client with the base URL from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(ApiConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn session(&self) -> Option<Session> {
        self.session.lock().ok().and_then(|s| s.clone())
    }

    pub fn set_session(&self, session: Session) {
        if let Ok(mut guard) = self.session.lock() {
            *guard = Some(session);
        }
    }

    pub fn clear_session(&self) {
        if let Ok(mut guard) = self.session.lock() {
            *guard = None;
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    /// Log in and keep the returned session.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = LoginRequest { email, password };
        let auth: AuthResponse = self.send_json(Method::POST, "/auth/login", &body).await?;
        self.store_auth(&auth);
        Ok(auth)
    }

    /// Create an account and keep the returned session.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResponse> {
        let body = RegisterRequest {
            name,
            email,
            password,
        };
        let auth: AuthResponse = self
            .send_json(Method::POST, "/auth/register", &body)
            .await?;
        self.store_auth(&auth);
        Ok(auth)
    }

    /// The logged-in user.
    pub async fn me(&self) -> Result<User> {
        self.get_json("/auth/me").await
    }

    /// Submit a tracked run.
    pub async fn track_run(&self, record: &RunRecord) -> Result<SavedRun> {
        let saved: SavedRun = self.send_json(Method::POST, "/runs/track", record).await?;
        info!(
            "[ApiClient] Run {} stored: {:.2} km at {:.2} km/h",
            saved.id, saved.distance_km, saved.speed_kmh
        );
        Ok(saved)
    }

    /// The runner's history and totals.
    pub async fn my_progress(&self) -> Result<Progress> {
        self.get_json("/runs/my-progress").await
    }

    // ------------------------------------------------------------------
    // Clubs
    // ------------------------------------------------------------------

    /// All clubs, flagged with the runner's membership.
    pub async fn clubs(&self) -> Result<Vec<Club>> {
        self.get_json("/clubs").await
    }

    /// Create a club; the creator becomes its first member.
    pub async fn create_club(&self, club: &NewClub) -> Result<Club> {
        let created: Club = self.send_json(Method::POST, "/clubs", club).await?;
        info!("[ApiClient] Club {} created: {}", created.id, created.name);
        Ok(created)
    }

    pub async fn join_club(&self, club_id: i64) -> Result<String> {
        self.post_empty(&format!("/clubs/{}/join", club_id)).await
    }

    /// Club activity, newest first.
    pub async fn activity_feed(&self, club_id: i64) -> Result<Vec<Activity>> {
        self.get_json(&format!("/users/activity-feed/{}", club_id)).await
    }

    // ------------------------------------------------------------------
    // Scheduled runs
    // ------------------------------------------------------------------

    pub async fn schedule_run(&self, run: &NewScheduledRun) -> Result<ScheduledRun> {
        let scheduled: ScheduledRun = self.send_json(Method::POST, "/runs/schedule", run).await?;
        info!(
            "[ApiClient] Run {} scheduled for club {} at {}",
            scheduled.id, run.club_id, scheduled.scheduled_date
        );
        Ok(scheduled)
    }

    pub async fn scheduled_runs(&self, club_id: i64) -> Result<Vec<ScheduledRun>> {
        self.get_json(&format!("/runs/schedule/{}", club_id)).await
    }

    // ------------------------------------------------------------------
    // Challenges
    // ------------------------------------------------------------------

    pub async fn club_challenges(&self, club_id: i64) -> Result<Vec<Challenge>> {
        self.get_json(&format!("/challenges/club/{}", club_id)).await
    }

    /// Create a challenge; only club admins may.
    pub async fn create_challenge(
        &self,
        club_id: i64,
        challenge: &NewChallenge,
    ) -> Result<Challenge> {
        self.send_json(
            Method::POST,
            &format!("/challenges/club/{}", club_id),
            challenge,
        )
        .await
    }

    pub async fn join_challenge(&self, challenge_id: i64) -> Result<String> {
        self.post_empty(&format!("/challenges/{}/join", challenge_id)).await
    }

    pub async fn leaderboard(&self, challenge_id: i64) -> Result<Leaderboard> {
        self.get_json(&format!("/challenges/{}/leaderboard", challenge_id)).await
    }

    fn store_auth(&self, auth: &AuthResponse) {
        let mut session = Session::new(auth.access_token.as_str());
        session.user = Some(auth.user.clone());
        self.set_session(session);
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        if is_auth_endpoint(path) {
            return builder;
        }
        match self.session() {
            Some(session) => builder.bearer_auth(session.token.trim()),
            None => {
                warn!("[ApiClient] No token available for protected endpoint: {}", path);
                builder
            }
        }
    }

    /// Single attempt; request bodies are not replayed.
    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(|e| RunSquadError::http(format!("Request error: {}", e)))?;
        self.parse(path, response).await
    }

    /// Bodiless POST, returning the server's message.
    async fn post_empty(&self, path: &str) -> Result<String> {
        let response = self
            .request(Method::POST, path)
            .send()
            .await
            .map_err(|e| RunSquadError::http(format!("Request error: {}", e)))?;
        let reply: MessageResponse = self.parse(path, response).await?;
        debug!("[ApiClient] {}: {}", path, reply.message);
        Ok(reply.message)
    }

    /// GET with retry on 429 and transport errors.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut retries = 0;

        loop {
            match self.request(Method::GET, path).send().await {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(RunSquadError::Http {
                            message: "Max retries exceeded (429)".to_string(),
                            status_code: Some(429),
                        });
                    }
                    let backoff = backoff(retries);
                    warn!(
                        "[ApiClient] 429 for {}, retry {} after {:?}",
                        path, retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Ok(resp) => return self.parse(path, resp).await,
                Err(e) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(RunSquadError::http(format!("Request error: {}", e)));
                    }
                    let backoff = backoff(retries);
                    warn!(
                        "[ApiClient] Error for {}: {}, retry {} after {:?}",
                        path, e, retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn parse<T: DeserializeOwned>(&self, path: &str, resp: Response) -> Result<T> {
        let status = resp.status();

        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| RunSquadError::http(format!("Parse error: {}", e)));
        }

        let code = status.as_u16();
        if (code == 401 || code == 422) && !is_auth_endpoint(path) {
            info!("[ApiClient] Token rejected ({}), clearing session", code);
            self.clear_session();
            return Err(RunSquadError::Unauthorized);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| format!("HTTP {}", status));
        debug!("[ApiClient] {} failed: {} {}", path, code, message);

        Err(RunSquadError::Http {
            message,
            status_code: Some(code),
        })
    }
}

impl RunSink for ApiClient {
    fn submit(&self, record: RunRecord) -> BoxFuture<'_, Result<SavedRun>> {
        Box::pin(async move { self.track_run(&record).await })
    }
}

fn is_auth_endpoint(path: &str) -> bool {
    path.contains("/auth/login") || path.contains("/auth/register")
}

/// 1s, 2s, 4s, 8s...
fn backoff(retries: u32) -> Duration {
    Duration::from_millis(BACKOFF_BASE_MS * (1 << retries.min(5)))
}
