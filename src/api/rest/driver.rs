use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::auth::Caller;
use crate::api::rest::body::JsonBody;
use crate::engine::NotificationOutcome;
use crate::error::AppError;
use crate::models::order::{Order, OrderDetails, OrderStatus};
use crate::models::profile::{Profile, Role};
use crate::state::AppState;
use crate::store::{OrderQuery, StoreError};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/driver/orders", get(list_driver_orders).put(update_driver_order))
}

fn require_driver(caller: &Caller) -> Result<&Profile, AppError> {
    let profile = caller.profile();
    match profile.role {
        Role::Driver => Ok(profile),
        _ => Err(AppError::NotFound("Driver profile not found".to_string())),
    }
}

#[derive(Debug, Deserialize)]
pub struct DriverOrdersQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct GroupedOrders {
    pub pending: Vec<OrderDetails>,
    pub in_progress: Vec<OrderDetails>,
    pub completed: Vec<OrderDetails>,
    pub all: Vec<OrderDetails>,
}

#[derive(Debug, Serialize)]
pub struct DriverOrdersSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

#[derive(Debug, Serialize)]
pub struct DriverOrdersResponse {
    pub orders: GroupedOrders,
    pub summary: DriverOrdersSummary,
    pub date: NaiveDate,
}

/// The caller's orders for one delivery date (today by default), grouped by
/// progress.
async fn list_driver_orders(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(params): Query<DriverOrdersQuery>,
) -> Result<Json<DriverOrdersResponse>, AppError> {
    let driver = require_driver(&caller)?;
    let date = params.date.unwrap_or_else(|| Utc::now().date_naive());

    let orders = state
        .orders()
        .find_orders(OrderQuery {
            driver_id: Some(driver.id),
            delivery_date: Some(date),
            ..OrderQuery::default()
        })
        .await?;

    let mut all = Vec::with_capacity(orders.len());
    for order in orders {
        all.push(state.orders().order_details(order.id).await?);
    }
    all.sort_by(|a, b| a.order.delivery_time_slot.cmp(&b.order.delivery_time_slot));

    let by_status = |statuses: &[OrderStatus]| -> Vec<OrderDetails> {
        all.iter()
            .filter(|details| statuses.contains(&details.order.status))
            .cloned()
            .collect()
    };
    let pending = by_status(&[OrderStatus::Scheduled, OrderStatus::Preparing]);
    let in_progress = by_status(&[OrderStatus::OutForDelivery]);
    let completed = by_status(&[OrderStatus::Delivered]);

    Ok(Json(DriverOrdersResponse {
        summary: DriverOrdersSummary {
            total: all.len(),
            pending: pending.len(),
            in_progress: in_progress.len(),
            completed: completed.len(),
        },
        orders: GroupedOrders {
            pending,
            in_progress,
            completed,
            all,
        },
        date,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDriverOrderRequest {
    pub order_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateDriverOrderResponse {
    pub success: bool,
    pub order: Order,
    pub message: String,
    pub notification: NotificationOutcome,
}

async fn update_driver_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    JsonBody(payload): JsonBody<UpdateDriverOrderRequest>,
) -> Result<Json<UpdateDriverOrderResponse>, AppError> {
    let driver = require_driver(&caller)?;

    let (Some(order_id), Some(status)) = (payload.order_id, payload.status) else {
        return Err(AppError::BadRequest(
            "Missing required fields: orderId, status".to_string(),
        ));
    };
    let target = status
        .parse::<OrderStatus>()
        .map_err(|_| AppError::BadRequest("Invalid status value".to_string()))?;

    let not_assigned = || AppError::NotFound("Order not found or not assigned to this driver".to_string());
    let order = state
        .orders()
        .get_order(order_id)
        .await
        .map_err(|err| match err {
            StoreError::NotFound(_) => not_assigned(),
            other => other.into(),
        })?;
    if order.driver_id != Some(driver.id) {
        return Err(not_assigned());
    }

    let outcome = state.automation.transition(order_id, target).await?;

    Ok(Json(UpdateDriverOrderResponse {
        success: true,
        order: outcome.order,
        message: format!("Order status updated to {target}"),
        notification: outcome.notification,
    }))
}
