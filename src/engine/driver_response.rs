//! Turns a driver's free-text WhatsApp reply into an accept or reject of
//! their pending order. Drivers only ever see the fixed reply strings below.

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::automation::{NotificationOutcome, OrderAutomation};
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::models::profile::{Profile, Role};
use crate::store::StoreError;

pub const INVALID_RESPONSE: &str = "Invalid response. Please reply with 1 to accept or 2 to reject.";
pub const DRIVER_NOT_FOUND: &str = "Driver not found";
pub const NO_PENDING_ORDER: &str = "No pending orders found";
pub const ACCEPTED_AND_NOTIFIED: &str = "✅ Order accepted! Customer has been notified.";
pub const ACCEPTED: &str = "✅ Order accepted!";
pub const REJECTED: &str = "❌ Order rejected. It will be reassigned to another driver.";
pub const NO_LONGER_UPDATABLE: &str = "This order can no longer be updated.";
pub const CONTACT_SUPPORT: &str = "Error processing response. Please contact support.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverIntent {
    Accept,
    Reject,
}

impl DriverIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverIntent::Accept => "accept",
            DriverIntent::Reject => "reject",
        }
    }
}

pub fn parse_response(body: &str) -> Option<DriverIntent> {
    match body.trim().to_lowercase().as_str() {
        "1" | "accept" | "yes" => Some(DriverIntent::Accept),
        "2" | "reject" | "no" => Some(DriverIntent::Reject),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverReply {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
}

impl DriverReply {
    fn success(message: &str, order_id: Uuid) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            order_id: Some(order_id),
        }
    }

    fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            order_id: None,
        }
    }
}

/// Applies a driver reply. Never fails: every error becomes one of the
/// curated reply strings, and unexpected ones are logged.
pub async fn process_driver_response(
    automation: &OrderAutomation,
    driver_phone: &str,
    body: &str,
    order_id: Option<Uuid>,
) -> DriverReply {
    let Some(intent) = parse_response(body) else {
        record(automation, "none", "unparsed");
        return DriverReply::failure(INVALID_RESPONSE);
    };

    match apply_intent(automation, driver_phone, intent, order_id).await {
        Ok(reply) => {
            record(automation, intent.as_str(), "applied");
            reply
        }
        Err(AppError::DriverNotFound) => {
            record(automation, intent.as_str(), "driver_not_found");
            DriverReply::failure(DRIVER_NOT_FOUND)
        }
        Err(AppError::NoPendingOrder) => {
            record(automation, intent.as_str(), "no_pending_order");
            DriverReply::failure(NO_PENDING_ORDER)
        }
        Err(AppError::InvalidTransition { .. }) => {
            record(automation, intent.as_str(), "invalid_transition");
            DriverReply::failure(NO_LONGER_UPDATABLE)
        }
        Err(err) => {
            error!(phone = %driver_phone, intent = intent.as_str(), error = %err, "failed to process driver response");
            record(automation, intent.as_str(), "error");
            DriverReply::failure(CONTACT_SUPPORT)
        }
    }
}

async fn apply_intent(
    automation: &OrderAutomation,
    driver_phone: &str,
    intent: DriverIntent,
    order_id: Option<Uuid>,
) -> Result<DriverReply, AppError> {
    let (driver, order) = resolve_order(automation, driver_phone, order_id).await?;

    match intent {
        DriverIntent::Accept => {
            let outcome = automation.accept_order(order.id, driver.id).await?;
            info!(order_id = %order.id, driver_id = %driver.id, "driver accepted order");

            let message = match outcome.notification {
                NotificationOutcome::Failed(_) => ACCEPTED,
                NotificationOutcome::Sent | NotificationOutcome::Skipped(_) => ACCEPTED_AND_NOTIFIED,
            };
            Ok(DriverReply::success(message, order.id))
        }
        DriverIntent::Reject => {
            automation.reject_assignment(order.id, driver.id).await?;
            Ok(DriverReply::success(REJECTED, order.id))
        }
    }
}

/// The replying driver and the order the reply is about: the explicit one if
/// given (it must be theirs), else their most recent scheduled order.
async fn resolve_order(
    automation: &OrderAutomation,
    driver_phone: &str,
    order_id: Option<Uuid>,
) -> Result<(Profile, Order), AppError> {
    let orders = automation.orders();

    let driver = orders
        .find_profile_by_phone_and_role(driver_phone, Role::Driver)
        .await?
        .ok_or(AppError::DriverNotFound)?;

    let order = match order_id {
        Some(order_id) => {
            let order = orders.get_order(order_id).await.map_err(|err| match err {
                StoreError::NotFound(_) => AppError::NoPendingOrder,
                other => other.into(),
            })?;
            if order.driver_id != Some(driver.id) {
                return Err(AppError::NoPendingOrder);
            }
            order
        }
        None => orders
            .find_orders_by_driver_and_status(driver.id, OrderStatus::Scheduled, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NoPendingOrder)?,
    };

    Ok((driver, order))
}

fn record(automation: &OrderAutomation, intent: &str, outcome: &str) {
    automation
        .metrics()
        .driver_responses_total
        .with_label_values(&[intent, outcome])
        .inc();
}
