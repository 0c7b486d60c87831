use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::{Button, MessageGateway, SentMessage};
use crate::models::event::{OrderEvent, OrderEventKind};
use crate::models::message::{MessageLogEntry, MessageType, NewMessage};
use crate::models::order::{Expected, Order, OrderDetails, OrderPatch, OrderStatus};
use crate::models::profile::Role;
use crate::observability::metrics::Metrics;
use crate::store::{MessageLog, OrderStore, StoreError};
use crate::templates;

pub const REJECTION_NOTE: &str = "Driver rejected the order";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub order: Order,
    pub notification: NotificationOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStatus {
    pub order_id: Uuid,
    pub has_driver: bool,
    pub notified: bool,
    pub notified_at: Option<chrono::DateTime<Utc>>,
    pub last_message: Option<MessageLogEntry>,
}

/// Order lifecycle transitions and the WhatsApp notifications tied to them.
#[derive(Clone)]
pub struct OrderAutomation {
    orders: Arc<dyn OrderStore>,
    messages: Arc<dyn MessageLog>,
    gateway: Arc<dyn MessageGateway>,
    events: broadcast::Sender<OrderEvent>,
    metrics: Metrics,
}

impl OrderAutomation {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        messages: Arc<dyn MessageLog>,
        gateway: Arc<dyn MessageGateway>,
        events: broadcast::Sender<OrderEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            orders,
            messages,
            gateway,
            events,
            metrics,
        }
    }

    pub fn orders(&self) -> &Arc<dyn OrderStore> {
        &self.orders
    }

    pub fn messages(&self) -> &Arc<dyn MessageLog> {
        &self.messages
    }

    pub fn gateway(&self) -> &Arc<dyn MessageGateway> {
        &self.gateway
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Moves an order along the lifecycle and fires the customer notification
    /// for the new status. The transition stands even if that notification
    /// fails; the failure is logged and reported in the outcome.
    pub async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<TransitionOutcome, AppError> {
        let (order, driver_contact) = self.apply_transition(order_id, target, None).await?;

        let notification = match (target, driver_contact) {
            (OrderStatus::OutForDelivery, Some((name, phone))) => {
                self.notify_customer(order_id, MessageType::CustomerOutForDelivery, move |_| {
                    templates::customer_out_for_delivery(&name, &phone)
                })
                .await
            }
            (OrderStatus::Delivered, _) => {
                self.notify_customer(order_id, MessageType::CustomerDelivered, |_| {
                    templates::customer_delivered()
                })
                .await
            }
            (status, _) => NotificationOutcome::Skipped(format!("no customer notification for {status}")),
        };

        Ok(TransitionOutcome {
            order,
            notification,
        })
    }

    /// Driver accepted: `scheduled -> preparing`, and the customer gets the
    /// order confirmation. The order must still be assigned to `driver_id`
    /// when the write lands, otherwise [`AppError::NoPendingOrder`].
    pub async fn accept_order(
        &self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<TransitionOutcome, AppError> {
        let (order, _) = self
            .apply_transition(order_id, OrderStatus::Preparing, Some(driver_id))
            .await?;

        let notification = self
            .notify_customer(
                order_id,
                MessageType::CustomerOrderConfirmed,
                templates::customer_order_confirmed,
            )
            .await;

        Ok(TransitionOutcome {
            order,
            notification,
        })
    }

    async fn apply_transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        assignee: Option<Uuid>,
    ) -> Result<(Order, Option<(String, String)>), AppError> {
        let order = self.orders.get_order(order_id).await?;
        let from = order.status;

        if assignee.is_some_and(|driver_id| order.driver_id != Some(driver_id)) {
            return Err(AppError::NoPendingOrder);
        }

        if !from.can_transition_to(target) {
            return Err(AppError::InvalidTransition { from, to: target });
        }

        // Checked before the write so a missing driver leaves the status as is.
        let driver_contact = if target == OrderStatus::OutForDelivery {
            let details = self.orders.order_details(order_id).await?;
            Some(require_driver_contact(&details)?)
        } else {
            None
        };

        let patch = OrderPatch {
            status: Some(target),
            delivered_at: (target == OrderStatus::Delivered).then_some(Some(Utc::now())),
            ..OrderPatch::default()
        };

        let expected = Expected {
            status: Some(from),
            driver_id: assignee.map(Some),
            ..Expected::default()
        };

        let updated = match self.orders.update_order(order_id, patch, expected).await {
            Ok(updated) => updated,
            Err(StoreError::Conflict(current))
                if assignee.is_some_and(|driver_id| current.driver_id != Some(driver_id)) =>
            {
                return Err(AppError::NoPendingOrder);
            }
            Err(StoreError::Conflict(current)) => {
                return Err(AppError::InvalidTransition {
                    from: current.status,
                    to: target,
                });
            }
            Err(err) => return Err(err.into()),
        };

        self.metrics
            .order_transitions_total
            .with_label_values(&[from.as_str(), target.as_str()])
            .inc();
        info!(order_id = %order_id, from = %from, to = %target, "order status changed");
        self.publish(&updated, OrderEventKind::StatusChanged);

        Ok((updated, driver_contact))
    }

    /// Sends the one-time assignment message to the order's driver.
    ///
    /// `driver_notified_at` is claimed with a conditional write before the
    /// send, so concurrent callers cannot both notify. A failed send releases
    /// the claim and logs a `failed` entry.
    pub async fn notify_driver_of_order(&self, order_id: Uuid) -> Result<Order, AppError> {
        let order = self.orders.get_order(order_id).await?;
        let driver_id = order.driver_id.ok_or(AppError::NoDriverAssigned(order_id))?;
        if let Some(notified_at) = order.driver_notified_at {
            return Err(AppError::AlreadyNotified(notified_at));
        }

        let details = self.orders.order_details(order_id).await?;
        let driver_phone = details
            .driver_phone
            .clone()
            .ok_or(AppError::DriverPhoneMissing(driver_id))?;

        let claimed_at = Utc::now();
        let claim = OrderPatch {
            driver_notified_at: Some(Some(claimed_at)),
            ..OrderPatch::default()
        };
        let unclaimed = Expected {
            driver_id: Some(Some(driver_id)),
            driver_notified_at: Some(None),
            ..Expected::default()
        };

        let claimed = match self.orders.update_order(order_id, claim, unclaimed).await {
            Ok(order) => order,
            Err(StoreError::Conflict(current)) => {
                return Err(match current.driver_notified_at {
                    Some(notified_at) => AppError::AlreadyNotified(notified_at),
                    None => AppError::Conflict(format!(
                        "driver assignment for order {order_id} changed during notification"
                    )),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let text = templates::driver_order_notification(&details);
        if let Err(err) = self
            .deliver(
                Some(order_id),
                &driver_phone,
                MessageType::DriverOrderNotification,
                &text,
                &[],
            )
            .await
        {
            error!(order_id = %order_id, error = %err, "failed to notify driver");
            self.release_claim(order_id, claimed_at).await;
            return Err(err);
        }

        info!(order_id = %order_id, driver_id = %driver_id, "driver notified");
        self.publish(&claimed, OrderEventKind::DriverNotified);
        Ok(claimed)
    }

    async fn release_claim(&self, order_id: Uuid, claimed_at: chrono::DateTime<Utc>) {
        let release = OrderPatch {
            driver_notified_at: Some(None),
            ..OrderPatch::default()
        };
        let still_ours = Expected {
            driver_notified_at: Some(Some(claimed_at)),
            ..Expected::default()
        };

        if let Err(err) = self.orders.update_order(order_id, release, still_ours).await {
            error!(order_id = %order_id, error = %err, "failed to release driver notification claim");
        }
    }

    /// Notifies the driver unless there is none or it already happened.
    pub async fn auto_notify_driver(&self, order_id: Uuid) -> Result<Option<Order>, AppError> {
        let order = self.orders.get_order(order_id).await?;

        if order.driver_id.is_none() {
            debug!(order_id = %order_id, "no driver assigned, skipping notification");
            return Ok(None);
        }
        if order.driver_notified_at.is_some() {
            debug!(order_id = %order_id, "driver already notified, skipping");
            return Ok(None);
        }

        match self.notify_driver_of_order(order_id).await {
            Ok(order) => Ok(Some(order)),
            Err(AppError::AlreadyNotified(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Assigns a driver to a scheduled order, then notifies them. A failed
    /// notification is logged; the assignment stays.
    pub async fn assign_driver(&self, order_id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
        let driver = self
            .orders
            .get_profile(driver_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => AppError::DriverNotFound,
                other => other.into(),
            })?;
        if driver.role != Role::Driver {
            return Err(AppError::BadRequest(format!("profile {driver_id} is not a driver")));
        }

        let order = self.orders.get_order(order_id).await?;
        if order.status != OrderStatus::Scheduled {
            return Err(AppError::Conflict(format!(
                "order {order_id} is {} and can no longer be reassigned",
                order.status
            )));
        }

        let mut assigned = order.clone();
        if order.driver_id != Some(driver_id) {
            let patch = OrderPatch {
                driver_id: Some(Some(driver_id)),
                driver_notified_at: Some(None),
                ..OrderPatch::default()
            };
            let expected = Expected {
                status: Some(OrderStatus::Scheduled),
                driver_id: Some(order.driver_id),
                ..Expected::default()
            };

            assigned = self
                .orders
                .update_order(order_id, patch, expected)
                .await
                .map_err(|err| match err {
                    StoreError::Conflict(_) => {
                        AppError::Conflict(format!("order {order_id} changed during assignment"))
                    }
                    other => other.into(),
                })?;

            info!(order_id = %order_id, driver_id = %driver_id, "driver assigned");
            self.publish(&assigned, OrderEventKind::DriverAssigned);
        }

        match self.auto_notify_driver(order_id).await {
            Ok(Some(notified)) => Ok(notified),
            Ok(None) => Ok(assigned),
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "driver assigned but notification failed");
                Ok(assigned)
            }
        }
    }

    /// Rolls back the assignment of a driver who declined. The status stays
    /// `scheduled` so the order can be handed to someone else.
    pub async fn reject_assignment(&self, order_id: Uuid, driver_id: Uuid) -> Result<Order, AppError> {
        let order = self.orders.get_order(order_id).await?;

        let notes = match order.notes.as_deref() {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}\n{REJECTION_NOTE}"),
            _ => REJECTION_NOTE.to_string(),
        };
        let patch = OrderPatch {
            driver_id: Some(None),
            driver_notified_at: Some(None),
            notes: Some(Some(notes)),
            ..OrderPatch::default()
        };
        let expected = Expected {
            status: Some(OrderStatus::Scheduled),
            driver_id: Some(Some(driver_id)),
            ..Expected::default()
        };

        let updated = self
            .orders
            .update_order(order_id, patch, expected)
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => AppError::NoPendingOrder,
                other => other.into(),
            })?;

        info!(order_id = %order_id, driver_id = %driver_id, "driver rejected order");
        self.publish(&updated, OrderEventKind::DriverRejected);
        Ok(updated)
    }

    pub async fn notification_status(&self, order_id: Uuid) -> Result<NotificationStatus, AppError> {
        let order = self.orders.get_order(order_id).await?;
        let last_message = self
            .messages
            .latest_for_order(order_id, MessageType::DriverOrderNotification)
            .await?;

        Ok(NotificationStatus {
            order_id,
            has_driver: order.driver_id.is_some(),
            notified: order.driver_notified_at.is_some(),
            notified_at: order.driver_notified_at,
            last_message,
        })
    }

    pub async fn send_delivery_reminder(&self, order_id: Uuid, lead_minutes: i64) -> Result<(), AppError> {
        let details = self.orders.order_details(order_id).await?;
        let (_, driver_phone) = require_driver_contact(&details)?;

        let text = templates::driver_delivery_reminder(&details, lead_minutes);
        self.deliver(
            Some(order_id),
            &driver_phone,
            MessageType::DriverDeliveryReminder,
            &text,
            &[],
        )
        .await?;

        info!(order_id = %order_id, "delivery reminder sent");
        Ok(())
    }

    /// Admin-composed message, optionally with buttons, logged as `manual_admin`.
    pub async fn send_manual(
        &self,
        phone: &str,
        text: &str,
        buttons: &[Button],
        order_id: Option<Uuid>,
    ) -> Result<SentMessage, AppError> {
        self.deliver(order_id, phone, MessageType::ManualAdmin, text, buttons)
            .await
    }

    /// Sends through the gateway and records the attempt either way.
    pub async fn deliver(
        &self,
        order_id: Option<Uuid>,
        phone: &str,
        message_type: MessageType,
        text: &str,
        buttons: &[Button],
    ) -> Result<SentMessage, AppError> {
        let result = if buttons.is_empty() {
            self.gateway.send_message(phone, text).await
        } else {
            self.gateway
                .send_message_with_buttons(phone, text, buttons, None)
                .await
        };

        match result {
            Ok(sent) => {
                self.metrics.notification(message_type.as_str(), "sent");
                self.record(NewMessage::sent(
                    order_id,
                    phone,
                    message_type,
                    text,
                    Some(sent.id.clone()),
                ))
                .await;
                Ok(sent)
            }
            Err(err) => {
                self.metrics.notification(message_type.as_str(), "failed");
                self.record(NewMessage::failed(order_id, phone, message_type, err.to_string()))
                    .await;
                Err(err.into())
            }
        }
    }

    /// Message log writes never fail the caller.
    pub async fn record(&self, message: NewMessage) {
        let message_type = message.message_type;
        if let Err(err) = self.messages.append(message).await {
            error!(message_type = message_type.as_str(), error = %err, "failed to log whatsapp message");
        }
    }

    async fn notify_customer<F>(
        &self,
        order_id: Uuid,
        message_type: MessageType,
        render: F,
    ) -> NotificationOutcome
    where
        F: FnOnce(&OrderDetails) -> String + Send,
    {
        match self.try_notify_customer(order_id, message_type, render).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    order_id = %order_id,
                    message_type = message_type.as_str(),
                    error = %err,
                    "customer notification failed"
                );
                NotificationOutcome::Failed(err.to_string())
            }
        }
    }

    async fn try_notify_customer<F>(
        &self,
        order_id: Uuid,
        message_type: MessageType,
        render: F,
    ) -> Result<NotificationOutcome, AppError>
    where
        F: FnOnce(&OrderDetails) -> String + Send,
    {
        if self.messages.has_sent(order_id, message_type).await? {
            return Ok(NotificationOutcome::Skipped(format!(
                "{} already sent",
                message_type.as_str()
            )));
        }

        let details = self.orders.order_details(order_id).await?;
        let Some(customer_phone) = details.customer_phone.clone() else {
            return Ok(NotificationOutcome::Failed(
                "no customer phone on file".to_string(),
            ));
        };

        let text = render(&details);
        self.deliver(Some(order_id), &customer_phone, message_type, &text, &[])
            .await?;

        info!(order_id = %order_id, message_type = message_type.as_str(), "customer notified");
        Ok(NotificationOutcome::Sent)
    }

    fn publish(&self, order: &Order, kind: OrderEventKind) {
        let _ = self.events.send(OrderEvent {
            order_id: order.id,
            kind,
            status: order.status,
            driver_id: order.driver_id,
            at: order.updated_at,
        });
    }
}

fn require_driver_contact(details: &OrderDetails) -> Result<(String, String), AppError> {
    let driver_id = details
        .order
        .driver_id
        .ok_or(AppError::NoDriverAssigned(details.order.id))?;

    match (&details.driver_name, &details.driver_phone) {
        (Some(name), Some(phone)) => Ok((name.clone(), phone.clone())),
        _ => Err(AppError::DriverPhoneMissing(driver_id)),
    }
}
