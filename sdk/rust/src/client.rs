use std::fmt;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

/// Error code the backend returns once a session is no longer valid.
pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";

/// Error from a session endpoint call.
#[derive(Debug)]
pub enum ApiError {
    /// The backend answered with an error envelope.
    Api { code: String, message: String },
    /// The request never produced a usable answer.
    Network(reqwest::Error),
    /// The backend answered with something that is not the envelope shape.
    Malformed(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Api { code, message } => write!(f, "API error {}: {}", code, message),
            ApiError::Network(e) => write!(f, "Network error: {}", e),
            ApiError::Malformed(msg) => write!(f, "Malformed response: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl ApiError {
    /// Whether the backend rejected the call because the session is dead.
    ///
    /// Only this failure may force the lifecycle controller into `Expired`.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == SESSION_EXPIRED)
    }
}

/// Success and failure alike arrive wrapped in a `data` envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ApiFailure {
    code: String,
    message: String,
}

/// Payload of a successful refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedSession {
    /// Seconds until the renewed access token expires server-side.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    300
}

/// HTTP client for the session endpoints.
///
/// Credentials travel in an HTTP-only cookie, so the client keeps a cookie
/// store and never handles the raw token.
pub struct SessionClient {
    client: Client,
    base_url: String,
}

impl SessionClient {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Exchange the current credential for a renewed one.
    pub async fn refresh_token(&self) -> Result<RefreshedSession, ApiError> {
        let data = self.post("/api/auth/refresh-token").await?;
        serde_json::from_value(data).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    /// Record user activity server-side. Best-effort side channel.
    pub async fn record_activity(&self) -> Result<(), ApiError> {
        self.post("/api/auth/record-activity").await.map(|_| ())
    }

    /// End the session server-side.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.post("/api/auth/logout").await.map(|_| ())
    }

    async fn post(&self, path: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(ApiError::Network)?;

        let status = response.status();
        let text = response.text().await.map_err(ApiError::Network)?;

        let envelope: Option<Envelope> = serde_json::from_str(&text).ok();
        if status.is_success() {
            return envelope
                .map(|e| e.data)
                .ok_or_else(|| ApiError::Malformed(format!("status {} with non-envelope body", status)));
        }

        match envelope.and_then(|e| serde_json::from_value::<ApiFailure>(e.data).ok()) {
            Some(failure) => Err(ApiError::Api {
                code: failure.code,
                message: failure.message,
            }),
            None => Err(ApiError::Malformed(format!("status {}", status))),
        }
    }
}
