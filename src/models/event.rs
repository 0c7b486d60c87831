use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    StatusChanged,
    DriverAssigned,
    DriverNotified,
    DriverRejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub kind: OrderEventKind,
    pub status: OrderStatus,
    pub driver_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}
