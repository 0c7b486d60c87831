//! Storage seams. The hosted database sits behind these traits; the service
//! ships [`memory::InMemoryStore`] for standalone runs and tests.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::models::message::{MessageLogEntry, MessageType, NewMessage};
use crate::models::order::{Expected, Order, OrderDetails, OrderPatch, OrderStatus};
use crate::models::profile::{Profile, Role};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// The conditional update did not apply; carries the order as it is now.
    #[error("conditional update rejected for order {}", .0.id)]
    Conflict(Box<Order>),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub customer_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub statuses: Vec<OrderStatus>,
    pub delivery_date: Option<NaiveDate>,
    pub offset: usize,
    pub limit: Option<usize>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_order(&self, id: Uuid) -> Result<Order, StoreError>;

    async fn order_details(&self, id: Uuid) -> Result<OrderDetails, StoreError>;

    /// Most recently created first.
    async fn find_orders_by_driver_and_status(
        &self,
        driver_id: Uuid,
        status: OrderStatus,
        limit: usize,
    ) -> Result<Vec<Order>, StoreError>;

    /// Ordered by delivery date, newest first.
    async fn find_orders(&self, query: OrderQuery) -> Result<Vec<Order>, StoreError>;

    async fn get_profile(&self, id: Uuid) -> Result<Profile, StoreError>;

    async fn find_profile_by_phone_and_role(
        &self,
        phone: &str,
        role: Role,
    ) -> Result<Option<Profile>, StoreError>;

    /// Applies `patch` only if the stored order satisfies `expected`, as one
    /// atomic step. Otherwise returns [`StoreError::Conflict`] with the
    /// current order.
    async fn update_order(
        &self,
        id: Uuid,
        patch: OrderPatch,
        expected: Expected,
    ) -> Result<Order, StoreError>;
}

#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append(&self, message: NewMessage) -> Result<MessageLogEntry, StoreError>;

    /// Appends unless an entry with the same provider message id exists, in
    /// which case `None` is returned and nothing is written.
    async fn append_unique(
        &self,
        message: NewMessage,
    ) -> Result<Option<MessageLogEntry>, StoreError>;

    async fn latest_for_order(
        &self,
        order_id: Uuid,
        message_type: MessageType,
    ) -> Result<Option<MessageLogEntry>, StoreError>;

    /// Newest first.
    async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<MessageLogEntry>, StoreError>;

    async fn has_sent(&self, order_id: Uuid, message_type: MessageType)
    -> Result<bool, StoreError>;
}
