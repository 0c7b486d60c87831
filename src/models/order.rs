use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Scheduled,
    Preparing,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Scheduled,
        OrderStatus::Preparing,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Scheduled => "scheduled",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses reachable in one step from `self`. Terminal statuses have none.
    pub fn allowed_targets(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Scheduled => &[OrderStatus::Preparing, OrderStatus::Cancelled],
            OrderStatus::Preparing => &[OrderStatus::OutForDelivery, OrderStatus::Cancelled],
            OrderStatus::OutForDelivery => &[OrderStatus::Delivered, OrderStatus::Cancelled],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_targets().is_empty()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid status value: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub customer_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub status: OrderStatus,
    pub package_type: String,
    pub delivery_address: String,
    pub delivery_date: NaiveDate,
    pub delivery_time_slot: Option<String>,
    pub driver_notified_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A freshly generated order: `scheduled`, no driver, no notifications.
    pub fn scheduled(
        subscription_id: Uuid,
        customer_id: Uuid,
        package_type: impl Into<String>,
        delivery_address: impl Into<String>,
        delivery_date: NaiveDate,
        delivery_time_slot: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            customer_id,
            driver_id: None,
            status: OrderStatus::Scheduled,
            package_type: package_type.into(),
            delivery_address: delivery_address.into(),
            delivery_date,
            delivery_time_slot,
            driver_notified_at: None,
            delivered_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. `None` leaves a field alone, `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub driver_id: Option<Option<Uuid>>,
    pub driver_notified_at: Option<Option<DateTime<Utc>>>,
    pub delivered_at: Option<Option<DateTime<Utc>>>,
    pub notes: Option<Option<String>>,
}

impl OrderPatch {
    pub fn apply(self, order: &mut Order, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(driver_id) = self.driver_id {
            order.driver_id = driver_id;
        }
        if let Some(notified_at) = self.driver_notified_at {
            order.driver_notified_at = notified_at;
        }
        if let Some(delivered_at) = self.delivered_at {
            order.delivered_at = delivered_at;
        }
        if let Some(notes) = self.notes {
            order.notes = notes;
        }
        order.updated_at = now;
    }
}

/// Conditions an update is applied under. Unset fields are not checked.
#[derive(Debug, Clone, Default)]
pub struct Expected {
    pub status: Option<OrderStatus>,
    pub driver_id: Option<Option<Uuid>>,
    pub driver_notified_at: Option<Option<DateTime<Utc>>>,
}

impl Expected {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|status| order.status == status)
            && self
                .driver_id
                .is_none_or(|driver_id| order.driver_id == driver_id)
            && self
                .driver_notified_at
                .is_none_or(|notified_at| order.driver_notified_at == notified_at)
    }
}

/// Order plus the customer and driver contact data the message templates need.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
}
