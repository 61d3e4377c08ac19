//! Remote classification service client
//!
//! The service is best-effort: every call may fail, hang or answer with
//! something unexpected, and callers always have the local classifier to fall
//! back on. No retries happen at this layer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use socio_core::types::{Action, Verdict, VerdictSource};

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("service answered with status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("request timed out")]
    Timeout,
    #[error("no remote service configured")]
    Unavailable,
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TextFilterRequest<'a> {
    pub text: &'a str,
    pub url: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageFilterRequest<'a> {
    pub url: &'a str,
}

/// Text verdict. Newer services answer with `action`; older ones only with
/// `filtered` plus an already-starred `modified` text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextFilterResponse {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub processed_text: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub filtered: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub encrypted: Option<String>,
}

impl TextFilterResponse {
    pub fn into_verdict(self) -> Result<Verdict, RemoteError> {
        let mut reasons = self.reasons;
        if reasons.is_empty() {
            reasons.extend(self.reason);
        }

        let action = match (self.action.as_deref(), self.filtered) {
            (Some(name), _) => parse_remote_action(name)?,
            (None, Some(true)) => Action::Mask,
            (None, Some(false)) => Action::Keep,
            (None, None) => return Err(RemoteError::Malformed("missing action".to_string())),
        };

        if action == Action::Keep {
            return Ok(Verdict::keep(VerdictSource::Remote));
        }

        let mut verdict = Verdict::new(action, reasons, VerdictSource::Remote)
            .with_processed_payload(self.processed_text.or(self.modified))
            .with_encrypted_token(self.encrypted);
        if let Some(confidence) = self.confidence {
            verdict = verdict.with_confidence(confidence);
        }
        Ok(verdict)
    }
}

fn parse_remote_action(name: &str) -> Result<Action, RemoteError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "allow" | "keep" => Ok(Action::Keep),
        "remove" | "mask" => Ok(Action::Mask),
        "encrypt" => Ok(Action::Encrypt),
        other => Err(RemoteError::Malformed(format!("unknown action {:?}", other))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageFilterResponse {
    pub filtered: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub encrypted: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl ImageFilterResponse {
    pub fn into_verdict(self, original_url: &str) -> Verdict {
        if !self.filtered {
            return Verdict::keep(VerdictSource::Remote);
        }
        let reasons = vec![self.reason.unwrap_or_else(|| "explicit_image_url".to_string())];
        // Services echo the original URL in `modified` when they have no placeholder
        let placeholder = self.modified.filter(|m| m != original_url);
        let mut verdict = Verdict::new(Action::Mask, reasons, VerdictSource::Remote)
            .with_processed_payload(placeholder)
            .with_encrypted_token(self.encrypted);
        if let Some(confidence) = self.confidence {
            verdict = verdict.with_confidence(confidence);
        }
        verdict
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecryptRequest<'a> {
    pub encrypted: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecryptResponse {
    pub decrypted: String,
}

// =============================================================================
// Client Capability
// =============================================================================

#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    async fn classify_text(&self, text: &str, page_url: &str) -> Result<Verdict, RemoteError>;

    async fn classify_image(&self, url: &str) -> Result<Verdict, RemoteError>;

    async fn ping(&self) -> Result<PingResponse, RemoteError>;

    /// Turn an `encrypted` token from an earlier verdict back into the original.
    async fn decrypt(&self, token: &str) -> Result<String, RemoteError>;
}

/// Client for the HTTP moderation service.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(timeout).build().map_err(RemoteError::Http)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| RemoteError::Malformed(e.to_string()))
    }

    async fn post_json<B: Serialize + Sync, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, RemoteError> {
        let response = self.client.post(self.endpoint(path)).json(body).send().await?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl RemoteClassifier for HttpRemote {
    async fn classify_text(&self, text: &str, page_url: &str) -> Result<Verdict, RemoteError> {
        let response: TextFilterResponse = self
            .post_json("/filter/text", &TextFilterRequest { text, url: page_url })
            .await?;
        response.into_verdict()
    }

    async fn classify_image(&self, url: &str) -> Result<Verdict, RemoteError> {
        let response: ImageFilterResponse = self.post_json("/filter/image", &ImageFilterRequest { url }).await?;
        Ok(response.into_verdict(url))
    }

    async fn ping(&self) -> Result<PingResponse, RemoteError> {
        let response = self.client.get(self.endpoint("/ping")).send().await?;
        Self::read_json(response).await
    }

    async fn decrypt(&self, token: &str) -> Result<String, RemoteError> {
        let response: DecryptResponse = self.post_json("/decrypt", &DecryptRequest { encrypted: token }).await?;
        Ok(response.decrypted)
    }
}

/// Stand-in when no service is configured; every call is `Unavailable`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRemote;

#[async_trait]
impl RemoteClassifier for NullRemote {
    async fn classify_text(&self, _text: &str, _page_url: &str) -> Result<Verdict, RemoteError> {
        Err(RemoteError::Unavailable)
    }

    async fn classify_image(&self, _url: &str) -> Result<Verdict, RemoteError> {
        Err(RemoteError::Unavailable)
    }

    async fn ping(&self) -> Result<PingResponse, RemoteError> {
        Err(RemoteError::Unavailable)
    }

    async fn decrypt(&self, _token: &str) -> Result<String, RemoteError> {
        Err(RemoteError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the service base URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_text_response_actions() {
        let response: TextFilterResponse = serde_json::from_str(
            r#"{"action": "encrypt", "reasons": ["sensitive_info"], "processed_text": "call **********"}"#,
        )
        .unwrap();
        let verdict = response.into_verdict().unwrap();
        assert_eq!(verdict.action, Action::Encrypt);
        assert_eq!(verdict.source, VerdictSource::Remote);
        assert_eq!(verdict.processed_payload.as_deref(), Some("call **********"));

        let response: TextFilterResponse = serde_json::from_str(r#"{"action": "allow", "reasons": []}"#).unwrap();
        assert_eq!(response.into_verdict().unwrap().action, Action::Keep);
    }

    #[test]
    fn test_legacy_text_response() {
        let response: TextFilterResponse = serde_json::from_str(
            r#"{"filtered": true, "reason": "Inappropriate content detected", "modified": "**** off", "encrypted": "gAAAA"}"#,
        )
        .unwrap();
        let verdict = response.into_verdict().unwrap();
        assert_eq!(verdict.action, Action::Mask);
        assert_eq!(verdict.reasons, vec!["Inappropriate content detected".to_string()]);
        assert_eq!(verdict.encrypted_token.as_deref(), Some("gAAAA"));
    }

    #[test]
    fn test_malformed_text_response() {
        let missing: TextFilterResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(missing.into_verdict(), Err(RemoteError::Malformed(_))));

        let unknown: TextFilterResponse = serde_json::from_str(r#"{"action": "explode"}"#).unwrap();
        assert!(matches!(unknown.into_verdict(), Err(RemoteError::Malformed(_))));
    }

    #[test]
    fn test_image_response() {
        let url = "https://cdn.example.com/a.jpg";
        let echo = ImageFilterResponse {
            filtered: true,
            modified: Some(url.to_string()),
            ..Default::default()
        };
        let verdict = echo.into_verdict(url);
        assert_eq!(verdict.action, Action::Mask);
        assert_eq!(verdict.processed_payload, None);

        let placeholder = ImageFilterResponse {
            filtered: true,
            modified: Some("https://backend.example.com/blocked.png".to_string()),
            ..Default::default()
        };
        assert_eq!(
            placeholder.into_verdict(url).processed_payload.as_deref(),
            Some("https://backend.example.com/blocked.png")
        );

        let clean =ImageFilterResponse::default();
        assert_eq!(clean.into_verdict(url).action, Action::Keep);
    }

    #[tokio::test]
    async fn test_http_ping() {
        let base = serve_once("200 OK", r#"{"status": "ok", "message": "pong"}"#).await;
        let remote = HttpRemote::new(&base, Duration::from_secs(5)).unwrap();
        let ping = remote.ping().await.unwrap();
        assert_eq!(ping.status, "ok");
        assert_eq!(ping.message, "pong");
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let base = serve_once("500 Internal Server Error", r#"{"error": "boom"}"#).await;
        let remote = HttpRemote::new(&base, Duration::from_secs(5)).unwrap();
        let err = remote.classify_text("hello there", "https://example.com").await.unwrap_err();
        assert!(matches!(err, RemoteError::Status(500)));
    }

    #[tokio::test]
    async fn test_http_malformed_body() {
        let base = serve_once("200 OK", "not json").await;
        let remote = HttpRemote::new(&base, Duration::from_secs(5)).unwrap();
        let err = remote.classify_image("https://cdn.example.com/a.jpg").await.unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_null_remote() {
        assert!(matches!(NullRemote.ping().await, Err(RemoteError::Unavailable)));
        assert!(matches!(NullRemote.decrypt("x").await, Err(RemoteError::Unavailable)));
    }
}
