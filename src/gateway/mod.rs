//! WhatsApp gateway boundary. No business logic and no retries here: a failed
//! send is returned to the caller, which decides whether to log or surface it.

pub mod recording;
pub mod waha;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub use recording::RecordingGateway;
pub use waha::WahaClient;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("WAHA API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{0}")]
    Rejected(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Http(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub gateway_url: String,
    pub session_name: String,
    pub api_key: Option<String>,
    pub country_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Button {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Working,
    Starting,
    ScanQrCode,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub status: SessionState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
}

#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send_message(&self, phone: &str, text: &str) -> Result<SentMessage, GatewayError>;

    async fn send_message_with_buttons(
        &self,
        phone: &str,
        text: &str,
        buttons: &[Button],
        footer: Option<&str>,
    ) -> Result<SentMessage, GatewayError>;

    async fn session_status(&self) -> Result<SessionInfo, GatewayError>;

    /// Advisory only: errors are logged and reported as not ready.
    async fn is_ready(&self) -> bool {
        match self.session_status().await {
            Ok(session) => session.status == SessionState::Working,
            Err(err) => {
                warn!(error = %err, "whatsapp gateway not ready");
                false
            }
        }
    }

    async fn connection_report(&self) -> ConnectionReport {
        match self.session_status().await {
            Ok(session) if session.status == SessionState::Working => ConnectionReport {
                success: true,
                message: "WAHA is connected and working".to_string(),
                session: Some(session),
            },
            Ok(session) => ConnectionReport {
                success: false,
                message: format!("WAHA session status: {:?}", session.status),
                session: Some(session),
            },
            Err(err) => ConnectionReport {
                success: false,
                message: err.to_string(),
                session: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_uses_gateway_spelling() {
        let info: SessionInfo =
            serde_json::from_str(r#"{"name":"default","status":"SCAN_QR_CODE"}"#).unwrap();
        assert_eq!(info.status, SessionState::ScanQrCode);
    }

    #[tokio::test]
    async fn connection_report_describes_non_working_session() {
        let gateway = RecordingGateway::new();
        gateway.set_session_state(SessionState::Stopped);

        let report = gateway.connection_report().await;
        assert!(!report.success);
        assert!(report.message.contains("Stopped"));
        assert!(!gateway.is_ready().await);
    }
}
