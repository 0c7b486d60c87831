use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::auth::Caller;
use crate::api::rest::body::JsonBody;
use crate::engine::{NotificationStatus, TransitionOutcome};
use crate::error::AppError;
use crate::models::message::MessageLogEntry;
use crate::models::order::{Order, OrderDetails, OrderStatus};
use crate::models::profile::Role;
use crate::state::AppState;
use crate::store::OrderQuery;

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders))
        .route(
            "/orders/notify-driver",
            get(notification_status).post(notify_driver),
        )
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/messages", get(order_messages))
        .route("/orders/:id/status", patch(update_status))
        .route("/orders/:id/driver", patch(assign_driver))
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
}

/// Admins see every order, customers their own, drivers the ones assigned
/// to them.
async fn list_orders(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(params): Query<ListOrdersQuery>,
) -> Result<Json<OrderList>, AppError> {
    let statuses = match params.status.as_deref() {
        None | Some("all") | Some("") => Vec::new(),
        Some(raw) => vec![raw.parse::<OrderStatus>().map_err(AppError::BadRequest)?],
    };

    let profile = caller.profile();
    let mut query = OrderQuery {
        statuses,
        offset: params.offset.unwrap_or(0),
        limit: Some(params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)),
        ..OrderQuery::default()
    };
    match profile.role {
        Role::Admin => {}
        Role::Customer => query.customer_id = Some(profile.id),
        Role::Driver => query.driver_id = Some(profile.id),
    }

    let orders = state.orders().find_orders(query).await?;
    Ok(Json(OrderList { orders }))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetails>, AppError> {
    caller.require_admin()?;
    let details = state.orders().order_details(id).await?;
    Ok(Json(details))
}

async fn order_messages(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MessageLogEntry>>, AppError> {
    caller.require_admin()?;
    state.orders().get_order(id).await?;
    let entries = state.automation.messages().list_for_order(id).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyDriverRequest {
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyDriverResponse {
    pub success: bool,
    pub message: String,
    pub order_id: Uuid,
}

async fn notify_driver(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    JsonBody(payload): JsonBody<NotifyDriverRequest>,
) -> Result<Json<NotifyDriverResponse>, AppError> {
    caller.require_admin()?;
    let order_id = payload
        .order_id
        .ok_or_else(|| AppError::BadRequest("Missing required field: orderId".to_string()))?;

    state.automation.notify_driver_of_order(order_id).await?;

    Ok(Json(NotifyDriverResponse {
        success: true,
        message: "Driver notified successfully".to_string(),
        order_id,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStatusQuery {
    pub order_id: Option<Uuid>,
}

async fn notification_status(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Query(params): Query<NotificationStatusQuery>,
) -> Result<Json<NotificationStatus>, AppError> {
    let order_id = params
        .order_id
        .ok_or_else(|| AppError::BadRequest("Missing query parameter: orderId".to_string()))?;

    let status = state.automation.notification_status(order_id).await?;
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<UpdateStatusRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    caller.require_admin()?;
    let target = payload
        .status
        .parse::<OrderStatus>()
        .map_err(AppError::BadRequest)?;

    let outcome = state.automation.transition(id, target).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<AssignDriverRequest>,
) -> Result<Json<Order>, AppError> {
    caller.require_admin()?;
    let order = state.automation.assign_driver(id, payload.driver_id).await?;
    Ok(Json(order))
}
