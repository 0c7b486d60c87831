use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::api::rest::auth::Caller;
use crate::api::rest::body::JsonBody;
use crate::engine::webhook::{self, WebhookAck, WebhookEvent};
use crate::error::AppError;
use crate::gateway::{Button, ConnectionReport};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/whatsapp/webhook", get(verify_webhook).post(receive_webhook))
        .route("/whatsapp/send", post(send_message))
        .route("/whatsapp/status", get(connection_status))
}

/// Parsed from raw bytes so malformed bodies are a 400 like every other
/// webhook validation failure.
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|err| {
        warn!(error = %err, "malformed webhook body");
        AppError::BadRequest("Invalid webhook event".to_string())
    })?;

    let ack = webhook::handle_event(&state.automation, &state.session_name, &event).await?;
    Ok(Json(ack))
}

async fn verify_webhook(Query(params): Query<HashMap<String, String>>) -> Response {
    match params.get("hub.challenge") {
        Some(challenge) => challenge.clone().into_response(),
        None => Json(json!({
            "status": "ok",
            "message": "WhatsApp webhook endpoint is active",
        }))
        .into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub phone: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub buttons: Vec<Button>,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: String,
    pub message_id: String,
    pub timestamp: i64,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    JsonBody(payload): JsonBody<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    caller.require_admin()?;

    let (Some(phone), Some(message)) = (
        payload.phone.filter(|phone| !phone.trim().is_empty()),
        payload.message.filter(|message| !message.trim().is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Missing required fields: phone and message".to_string(),
        ));
    };

    let sent = state
        .automation
        .send_manual(&phone, &message, &payload.buttons, payload.order_id)
        .await?;

    Ok(Json(SendMessageResponse {
        success: true,
        message: "WhatsApp message sent successfully".to_string(),
        message_id: sent.id,
        timestamp: sent.timestamp,
    }))
}

async fn connection_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<ConnectionReport>, AppError> {
    caller.require_admin()?;
    Ok(Json(state.automation.gateway().connection_report().await))
}
