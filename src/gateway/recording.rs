use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::gateway::{
    Button, GatewayError, MessageGateway, SentMessage, SessionInfo, SessionState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    pub phone: String,
    pub text: String,
    pub buttons: Vec<Button>,
}

/// Gateway that records messages instead of delivering them. Used for dry-run
/// deployments without a WAHA server, and in tests.
#[derive(Debug)]
pub struct RecordingGateway {
    sent: Mutex<Vec<RecordedMessage>>,
    failure: Mutex<Option<String>>,
    session_state: Mutex<SessionState>,
    next_id: AtomicU64,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            session_state: Mutex::new(SessionState::Working),
            next_id: AtomicU64::new(1),
        }
    }

    /// Every send fails with `reason` until [`RecordingGateway::recover`].
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn set_session_state(&self, state: SessionState) {
        *self.session_state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn sent(&self) -> Vec<RecordedMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sent_to(&self, phone: &str) -> Vec<RecordedMessage> {
        self.sent()
            .into_iter()
            .filter(|message| message.phone == phone)
            .collect()
    }

    fn record(&self, phone: &str, text: &str, buttons: &[Button]) -> Result<SentMessage, GatewayError> {
        if let Some(reason) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(GatewayError::Rejected(reason));
        }

        info!(phone = %phone, chars = text.len(), "dry-run whatsapp message");

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedMessage {
                phone: phone.to_string(),
                text: text.to_string(),
                buttons: buttons.to_vec(),
            });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(SentMessage {
            id: format!("dry-run-{id}"),
            timestamp: Utc::now().timestamp(),
            ack: None,
        })
    }
}

#[async_trait]
impl MessageGateway for RecordingGateway {
    async fn send_message(&self, phone: &str, text: &str) -> Result<SentMessage, GatewayError> {
        self.record(phone, text, &[])
    }

    async fn send_message_with_buttons(
        &self,
        phone: &str,
        text: &str,
        buttons: &[Button],
        _footer: Option<&str>,
    ) -> Result<SentMessage, GatewayError> {
        self.record(phone, text, buttons)
    }

    async fn session_status(&self) -> Result<SessionInfo, GatewayError> {
        Ok(SessionInfo {
            name: "dry-run".to_string(),
            status: *self
                .session_state
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        })
    }
}
