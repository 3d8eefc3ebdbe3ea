use super::gateway::{DeleteFailure, DeleteResult, DeletionGateway, message_signals_quota};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::RwLock;

/// Supplies the bearer token for remote calls.
///
/// `None` means the credential expired and must be refreshed by the caller.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Token with an optional expiry, replaceable after a refresh
pub struct StaticCredential {
    inner: RwLock<(String, Option<DateTime<Utc>>)>,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            inner: RwLock::new((token.into(), expires_at)),
        }
    }

    pub fn replace(&self, token: impl Into<String>, expires_at: Option<DateTime<Utc>>) {
        if let Ok(mut inner) = self.inner.write() {
            *inner = (token.into(), expires_at);
        }
    }
}

impl CredentialSource for StaticCredential {
    fn bearer_token(&self) -> Option<String> {
        let inner = self.inner.read().ok()?;
        let (token, expires_at) = &*inner;
        match expires_at {
            Some(at) if *at <= Utc::now() => None,
            _ => Some(token.clone()),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

/// `DELETE {base}/comments?id=<id>` against the data API
pub struct HttpDeletionGateway<C: CredentialSource> {
    http: Client,
    base_url: String,
    credentials: C,
}

impl<C: CredentialSource> HttpDeletionGateway<C> {
    pub fn new(base_url: impl Into<String>, credentials: C) -> Self {
        Self::with_client(Client::new(), base_url, credentials)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, credentials: C) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }
}

#[async_trait]
impl<C: CredentialSource> DeletionGateway for HttpDeletionGateway<C> {
    async fn delete_one(&self, id: &str) -> DeleteResult {
        let Some(token) = self.credentials.bearer_token() else {
            return Err(DeleteFailure::Unauthorized("credential expired".into()));
        };

        let url = format!("{}/comments", self.base_url);
        let resp = self
            .http
            .delete(url)
            .query(&[("id", id)])
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| DeleteFailure::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(classify_response(status, &text))
    }
}

/// Map a non-success response to a failure
pub fn classify_response(status: StatusCode, body: &str) -> DeleteFailure {
    let message = error_message(body);
    match status {
        StatusCode::NOT_FOUND => DeleteFailure::NotFound,
        StatusCode::UNAUTHORIZED => DeleteFailure::Unauthorized(message),
        StatusCode::FORBIDDEN if message_signals_quota(&message) => DeleteFailure::QuotaExceeded(message),
        StatusCode::FORBIDDEN => DeleteFailure::Forbidden(message),
        _ => DeleteFailure::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull `message` and the `reason` codes out of a JSON error body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let reasons: Vec<&str> = envelope
                .error
                .errors
                .iter()
                .map(|e| e.reason.as_str())
                .filter(|r| !r.is_empty())
                .collect();
            if reasons.is_empty() {
                envelope.error.message
            } else {
                format!("{} ({})", envelope.error.message, reasons.join(", "))
            }
        }
        Err(_) => body.trim().to_string(),
    }
}
