use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    DriverOrderNotification,
    DriverDeliveryReminder,
    DriverResponseReply,
    CustomerOrderConfirmed,
    CustomerOutForDelivery,
    CustomerDelivered,
    ManualAdmin,
    Incoming,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::DriverOrderNotification => "driver_order_notification",
            MessageType::DriverDeliveryReminder => "driver_delivery_reminder",
            MessageType::DriverResponseReply => "driver_response_reply",
            MessageType::CustomerOrderConfirmed => "customer_order_confirmed",
            MessageType::CustomerOutForDelivery => "customer_out_for_delivery",
            MessageType::CustomerDelivered => "customer_delivered",
            MessageType::ManualAdmin => "manual_admin",
            MessageType::Incoming => "incoming",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Failed,
    Received,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub recipient_phone: String,
    pub message_type: MessageType,
    pub message_content: String,
    pub status: MessageStatus,
    pub error_message: Option<String>,
    pub provider_message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// An entry before the log assigns it an id.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub order_id: Option<Uuid>,
    pub recipient_phone: String,
    pub message_type: MessageType,
    pub message_content: String,
    pub status: MessageStatus,
    pub error_message: Option<String>,
    pub provider_message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn sent(
        order_id: Option<Uuid>,
        recipient_phone: &str,
        message_type: MessageType,
        content: impl Into<String>,
        provider_message_id: Option<String>,
    ) -> Self {
        Self {
            order_id,
            recipient_phone: recipient_phone.to_string(),
            message_type,
            message_content: content.into(),
            status: MessageStatus::Sent,
            error_message: None,
            provider_message_id,
            sent_at: Utc::now(),
        }
    }

    /// Failed sends keep no content, only the error.
    pub fn failed(
        order_id: Option<Uuid>,
        recipient_phone: &str,
        message_type: MessageType,
        error: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            recipient_phone: recipient_phone.to_string(),
            message_type,
            message_content: String::new(),
            status: MessageStatus::Failed,
            error_message: Some(error.into()),
            provider_message_id: None,
            sent_at: Utc::now(),
        }
    }

    pub fn incoming(
        from_phone: &str,
        body: impl Into<String>,
        provider_message_id: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: None,
            recipient_phone: from_phone.to_string(),
            message_type: MessageType::Incoming,
            message_content: body.into(),
            status: MessageStatus::Received,
            error_message: None,
            provider_message_id,
            sent_at: received_at,
        }
    }

    pub fn into_entry(self) -> MessageLogEntry {
        MessageLogEntry {
            id: Uuid::new_v4(),
            order_id: self.order_id,
            recipient_phone: self.recipient_phone,
            message_type: self.message_type,
            message_content: self.message_content,
            status: self.status,
            error_message: self.error_message,
            provider_message_id: self.provider_message_id,
            sent_at: self.sent_at,
        }
    }
}
