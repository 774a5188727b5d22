use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Broadcast from the HTTP layer when the backend rejects our token.
/// The app observes this to reset user state and reopen the login popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSignal {
    SessionExpired,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{detail}")]
    Unauthorized { detail: String },

    #[error("{detail}")]
    InsufficientCredits { detail: String },

    #[error("{detail}")]
    Backend { status: StatusCode, detail: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceCategory {
    Male,
    Female,
    #[serde(other)]
    Other,
}

impl VoiceCategory {
    pub fn label(&self) -> &'static str {
        match self {
            VoiceCategory::Male => "male",
            VoiceCategory::Female => "female",
            VoiceCategory::Other => "other",
        }
    }
}

/// A selectable synthetic speaker profile, read-only in the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub category: VoiceCategory,
    pub preview_url: String,
    #[serde(default)]
    pub transcript: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub task_id: String,
    pub status: String,
    pub cost: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub status: TaskState,
    pub output_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub credits_balance: i64,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    pub balance: i64,
    pub user_id: String,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
}

#[derive(Serialize)]
struct FeedbackRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact: Option<&'a str>,
}

/// Thin wrapper over reqwest that attaches the bearer token to every request
/// and turns a 401 into a cleared token plus a session-expired broadcast.
/// No retries or backoff; a failed request is rejected to the caller.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
    auth_tx: mpsc::UnboundedSender<AuthSignal>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<AuthSignal>) {
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        let client = Self {
            http: Client::new(),
            base_url: base_url.into(),
            token: Arc::new(RwLock::new(token)),
            auth_tx,
        };
        (client, auth_rx)
    }

    pub fn set_token(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
    }

    pub fn clear_token(&self) {
        *self.token.write() = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Resolve a server-relative location (e.g. a task's `output_url`)
    /// against the backend base URL.
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some(token) = self.token.read().as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let response = self.check(response).await?;
        Ok(response.json().await?)
    }

    async fn check(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = error_detail(response).await;
        match status {
            StatusCode::UNAUTHORIZED => {
                self.clear_token();
                let _ = self.auth_tx.send(AuthSignal::SessionExpired);
                Err(ApiError::Unauthorized { detail })
            }
            StatusCode::PAYMENT_REQUIRED => Err(ApiError::InsufficientCredits { detail }),
            _ => Err(ApiError::Backend { status, detail }),
        }
    }

    // ── Endpoints ──

    pub async fn register(&self, email: &str, password: &str) -> Result<UserResponse, ApiError> {
        self.send(
            self.request(Method::POST, "/auth/register")
                .json(&RegisterRequest { email, password }),
        )
        .await
    }

    /// OAuth2 password flow: the form's `username` field carries the email.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        self.send(
            self.request(Method::POST, "/auth/login")
                .form(&[("username", email), ("password", password)]),
        )
        .await
    }

    pub async fn me(&self) -> Result<UserResponse, ApiError> {
        self.send(self.request(Method::GET, "/auth/me")).await
    }

    pub async fn credits_balance(&self) -> Result<BalanceResponse, ApiError> {
        self.send(self.request(Method::GET, "/credits/balance")).await
    }

    pub async fn voices(&self) -> Result<Vec<Voice>, ApiError> {
        self.send(self.request(Method::GET, "/voices/")).await
    }

    pub async fn generate(&self, text: &str, voice_id: &str) -> Result<GenerateResponse, ApiError> {
        self.send(
            self.request(Method::POST, "/tts/generate")
                .json(&GenerateRequest { text, voice_id }),
        )
        .await
    }

    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        self.send(self.request(Method::GET, &format!("/tts/status/{task_id}")))
            .await
    }

    pub async fn send_feedback(&self, message: &str, contact: Option<&str>) -> Result<(), ApiError> {
        let response = self
            .request(Method::POST, "/feedback")
            .json(&FeedbackRequest { message, contact })
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }
}

/// Pull the FastAPI-style `{"detail": "..."}` message out of an error body,
/// falling back to the HTTP status line.
async fn error_detail(response: Response) -> String {
    let status = response.status();
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    };

    match response.text().await {
        Ok(body) => serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("detail").cloned())
            .and_then(|detail| detail.as_str().map(str::to_string))
            .unwrap_or_else(fallback),
        Err(_) => fallback(),
    }
}
