use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::engine::automation::OrderAutomation;
use crate::engine::driver_response::{parse_response, process_driver_response, DriverReply};
use crate::error::AppError;
use crate::models::message::{MessageType, NewMessage};
use crate::models::profile::{Profile, Role};
use crate::phone;
use crate::store::StoreError;

/// Event envelope posted by the WhatsApp gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub body: Option<String>,
}

impl WebhookEvent {
    /// Returns the event type and payload once the envelope is complete and
    /// addressed to our session.
    pub fn validate(&self, session_name: &str) -> Result<(&str, &Value), AppError> {
        let (Some(event), Some(session), Some(payload)) =
            (self.event.as_deref(), self.session.as_deref(), self.payload.as_ref())
        else {
            return Err(AppError::BadRequest(
                "Invalid webhook payload: missing event, session or payload".to_string(),
            ));
        };

        if payload.is_null() {
            return Err(AppError::BadRequest(
                "Invalid webhook payload: missing event, session or payload".to_string(),
            ));
        }

        if session != session_name {
            return Err(AppError::BadRequest(format!(
                "Invalid webhook payload: unexpected session {session}"
            )));
        }

        Ok((event, payload))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<DriverReply>,
}

impl WebhookAck {
    fn done(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            reply: None,
        }
    }
}

pub async fn handle_event(
    automation: &OrderAutomation,
    session_name: &str,
    event: &WebhookEvent,
) -> Result<WebhookAck, AppError> {
    let (kind, payload) = event.validate(session_name).inspect_err(|_| {
        count(automation, "invalid");
    })?;

    if kind != "message" && kind != "message.any" {
        debug!(event = kind, "ignoring non-message webhook event");
        count(automation, "ignored");
        return Ok(WebhookAck::done("Event ignored"));
    }

    let message: MessagePayload = serde_json::from_value(payload.clone()).map_err(|err| {
        count(automation, "invalid");
        AppError::BadRequest(format!("Invalid message payload: {err}"))
    })?;

    // Our own outgoing sends echo back through the webhook.
    if message.from_me {
        count(automation, "outgoing");
        return Ok(WebhookAck::done("Ignored outgoing message"));
    }

    let sender = phone::from_chat_id(&message.from);
    let body = message.body.unwrap_or_default();
    let received_at = message
        .timestamp
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    // Resolved before the dedup key is written: a failed lookup must leave the
    // message unclaimed so a redelivery is processed in full.
    let origin = match identify_sender(automation, &sender, &body).await {
        Ok(origin) => origin,
        Err(err) => {
            error!(phone = %sender, error = %err, "failed to identify webhook sender");
            count(automation, "failed");
            return Ok(WebhookAck {
                success: false,
                message: "Webhook received but could not be processed".to_string(),
                reply: None,
            });
        }
    };

    let incoming = NewMessage::incoming(&sender, body.clone(), message.id.clone(), received_at);
    match automation.messages().append_unique(incoming).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            info!(provider_message_id = ?message.id, "duplicate webhook delivery ignored");
            count(automation, "duplicate");
            return Ok(WebhookAck::done("Duplicate message ignored"));
        }
        Err(err) => {
            error!(phone = %sender, error = %err, "failed to log incoming message");
        }
    }

    match origin {
        Sender::Driver => {
            let reply = process_driver_response(automation, &sender, &body, None).await;

            if let Err(err) = automation
                .deliver(
                    reply.order_id,
                    &sender,
                    MessageType::DriverResponseReply,
                    &reply.message,
                    &[],
                )
                .await
            {
                warn!(phone = %sender, error = %err, "failed to send reply to driver");
            }

            count(automation, "driver_response");
            Ok(WebhookAck {
                success: reply.success,
                message: "Driver response processed".to_string(),
                reply: Some(reply),
            })
        }
        Sender::Customer(customer) => {
            info!(
                customer_id = %customer.id,
                customer = %customer.full_name,
                phone = %sender,
                "message received from customer"
            );
            count(automation, "customer");
            Ok(WebhookAck::done("Webhook received and processed"))
        }
        Sender::Unknown => {
            debug!(phone = %sender, "incoming message from unknown sender logged");
            count(automation, "logged");
            Ok(WebhookAck::done("Webhook received and processed"))
        }
    }
}

enum Sender {
    /// A driver whose body parses as an accept or reject.
    Driver,
    Customer(Profile),
    Unknown,
}

async fn identify_sender(
    automation: &OrderAutomation,
    sender: &str,
    body: &str,
) -> Result<Sender, StoreError> {
    let orders = automation.orders();

    if parse_response(body).is_some()
        && orders
            .find_profile_by_phone_and_role(sender, Role::Driver)
            .await?
            .is_some()
    {
        return Ok(Sender::Driver);
    }

    Ok(orders
        .find_profile_by_phone_and_role(sender, Role::Customer)
        .await?
        .map_or(Sender::Unknown, Sender::Customer))
}

fn count(automation: &OrderAutomation, outcome: &str) {
    automation
        .metrics()
        .webhook_events_total
        .with_label_values(&[outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::engine::driver_response::REJECTED;
    use crate::engine::testing::Harness;
    use crate::models::message::MessageStatus;
    use crate::models::order::{Expected, Order, OrderDetails, OrderPatch, OrderStatus};
    use crate::observability::metrics::Metrics;
    use crate::store::memory::InMemoryStore;
    use crate::store::{MessageLog, OrderQuery, OrderStore};

    /// Fails the next profile lookup once, then delegates.
    struct UnsteadyStore {
        inner: Arc<InMemoryStore>,
        fail_next_lookup: AtomicBool,
    }

    #[async_trait]
    impl OrderStore for UnsteadyStore {
        async fn get_order(&self, id: Uuid) -> Result<Order, StoreError> {
            self.inner.get_order(id).await
        }

        async fn order_details(&self, id: Uuid) -> Result<OrderDetails, StoreError> {
            self.inner.order_details(id).await
        }

        async fn find_orders_by_driver_and_status(
            &self,
            driver_id: Uuid,
            status: OrderStatus,
            limit: usize,
        ) -> Result<Vec<Order>, StoreError> {
            self.inner
                .find_orders_by_driver_and_status(driver_id, status, limit)
                .await
        }

        async fn find_orders(&self, query: OrderQuery) -> Result<Vec<Order>, StoreError> {
            self.inner.find_orders(query).await
        }

        async fn get_profile(&self, id: Uuid) -> Result<Profile, StoreError> {
            self.inner.get_profile(id).await
        }

        async fn find_profile_by_phone_and_role(
            &self,
            phone: &str,
            role: Role,
        ) -> Result<Option<Profile>, StoreError> {
            if self.fail_next_lookup.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.find_profile_by_phone_and_role(phone, role).await
        }

        async fn update_order(
            &self,
            id: Uuid,
            patch: OrderPatch,
            expected: Expected,
        ) -> Result<Order, StoreError> {
            self.inner.update_order(id, patch, expected).await
        }
    }

    fn message_event(from: &str, body: &str, id: &str) -> WebhookEvent {
        serde_json::from_value(json!({
            "event": "message",
            "session": "default",
            "payload": {
                "id": id,
                "timestamp": 1_792_130_400,
                "from": format!("{from}@c.us"),
                "fromMe": false,
                "body": body,
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn incomplete_envelope_is_rejected() {
        let h = Harness::new();
        let event: WebhookEvent =
            serde_json::from_value(json!({"event": "message", "session": "default"})).unwrap();

        let err = handle_event(&h.automation, "default", &event).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn foreign_session_is_rejected() {
        let h = Harness::new();
        let event = message_event("97300000001", "1", "wamid-1");

        let err = handle_event(&h.automation, "production", &event).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("session")));
        assert_eq!(h.store.message_count(), 0);
    }

    #[tokio::test]
    async fn outgoing_echo_is_acknowledged_without_logging() {
        let h = Harness::new();
        let event: WebhookEvent = serde_json::from_value(json!({
            "event": "message.any",
            "session": "default",
            "payload": {"id": "wamid-9", "from": "97300000001@c.us", "fromMe": true, "body": "1"}
        }))
        .unwrap();

        let ack = handle_event(&h.automation, "default", &event).await.unwrap();

        assert!(ack.success);
        assert_eq!(ack.message, "Ignored outgoing message");
        assert_eq!(h.store.message_count(), 0);
        assert!(h.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn driver_accept_is_applied_and_answered() {
        let h = Harness::new();
        let order = h.order_in(OrderStatus::Scheduled, true);

        let ack = handle_event(
            &h.automation,
            "default",
            &message_event("97300000001", "1", "wamid-1"),
        )
        .await
        .unwrap();

        assert!(ack.success);
        assert_eq!(ack.message, "Driver response processed");
        assert_eq!(h.status_of(order.id).await, OrderStatus::Preparing);

        let replies = h.gateway.sent_to("97300000001");
        assert_eq!(replies.len(), 1);
        assert!(replies[0].text.contains("accepted"));

        let log = h.store.list_for_order(order.id).await.unwrap();
        assert!(log.iter().any(|entry| {
            entry.message_type == MessageType::DriverResponseReply
                && entry.status == MessageStatus::Sent
        }));
    }

    #[tokio::test]
    async fn redelivered_message_is_processed_once() {
        let h = Harness::new();
        let first = h.order_in(OrderStatus::Scheduled, true);
        let event = message_event("97300000001", "1", "wamid-1");

        handle_event(&h.automation, "default", &event).await.unwrap();
        let second = h.order_in(OrderStatus::Scheduled, true);
        let ack = handle_event(&h.automation, "default", &event).await.unwrap();

        assert_eq!(ack.message, "Duplicate message ignored");
        assert_eq!(h.status_of(first.id).await, OrderStatus::Preparing);
        assert_eq!(h.status_of(second.id).await, OrderStatus::Scheduled);
        assert_eq!(h.gateway.sent_to("97300000001").len(), 1);
    }

    #[tokio::test]
    async fn unknown_sender_is_only_logged() {
        let h = Harness::new();

        let ack = handle_event(
            &h.automation,
            "default",
            &message_event("97399999999", "1", "wamid-2"),
        )
        .await
        .unwrap();

        assert_eq!(ack.message, "Webhook received and processed");
        assert_eq!(h.store.message_count(), 1);
        assert!(h.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_reply_does_not_fail_webhook() {
        let h = Harness::new();
        h.order_in(OrderStatus::Scheduled, true);
        h.gateway.fail_with("offline");

        let ack = handle_event(
            &h.automation,
            "default",
            &message_event("97300000001", "2", "wamid-3"),
        )
        .await
        .unwrap();

        assert!(ack.success);
        assert_eq!(ack.reply.map(|r| r.message).as_deref(), Some(REJECTED));
    }

    #[tokio::test]
    async fn session_status_events_are_ignored() {
        let h = Harness::new();
        let event: WebhookEvent = serde_json::from_value(json!({
            "event": "session.status",
            "session": "default",
            "payload": {"status": "WORKING"}
        }))
        .unwrap();

        let ack = handle_event(&h.automation, "default", &event).await.unwrap();
        assert_eq!(ack.message, "Event ignored");
        assert_eq!(h.store.message_count(), 0);
    }

    #[tokio::test]
    async fn failed_sender_lookup_leaves_message_for_redelivery() {
        let h = Harness::new();
        let order = h.order_in(OrderStatus::Scheduled, true);
        let orders = Arc::new(UnsteadyStore {
            inner: h.store.clone(),
            fail_next_lookup: AtomicBool::new(true),
        });
        let automation = OrderAutomation::new(
            orders,
            h.store.clone(),
            h.gateway.clone(),
            h.events.clone(),
            Metrics::new(),
        );
        let event = message_event("97300000001", "1", "wamid-7");

        let first = handle_event(&automation, "default", &event).await.unwrap();
        assert!(!first.success);
        assert_eq!(h.status_of(order.id).await, OrderStatus::Scheduled);
        assert_eq!(h.store.message_count(), 0);

        let redelivered = handle_event(&automation, "default", &event).await.unwrap();
        assert!(redelivered.success);
        assert_eq!(redelivered.message, "Driver response processed");
        assert_eq!(h.status_of(order.id).await, OrderStatus::Preparing);
    }

    #[tokio::test]
    async fn customer_message_is_logged_without_reply() {
        let h = Harness::new();
        let order = h.order_in(OrderStatus::Scheduled, true);

        let ack = handle_event(
            &h.automation,
            "default",
            &message_event("97333000001", "1", "wamid-8"),
        )
        .await
        .unwrap();

        assert!(ack.success);
        assert_eq!(ack.message, "Webhook received and processed");
        assert!(ack.reply.is_none());
        assert_eq!(h.store.message_count(), 1);
        assert!(h.gateway.sent().is_empty());
        assert_eq!(h.status_of(order.id).await, OrderStatus::Scheduled);
    }
}
