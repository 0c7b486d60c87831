use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::gateway::GatewayError;
use crate::models::order::OrderStatus;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("driver has already been notified at {0}")]
    AlreadyNotified(DateTime<Utc>),

    #[error("no driver assigned to order {0}")]
    NoDriverAssigned(Uuid),

    #[error("driver {0} has no phone number on file")]
    DriverPhoneMissing(Uuid),

    #[error("driver not found")]
    DriverNotFound,

    #[error("no pending orders found")]
    NoPendingOrder,

    #[error("whatsapp gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Conflict(order) => {
                AppError::Conflict(format!("order {} was modified concurrently", order.id))
            }
            StoreError::Unavailable(msg) => AppError::Storage(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) | AppError::DriverNotFound | AppError::NoPendingOrder => {
                StatusCode::NOT_FOUND
            }
            AppError::BadRequest(_)
            | AppError::AlreadyNotified(_)
            | AppError::NoDriverAssigned(_)
            | AppError::DriverPhoneMissing(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg) => json!({ "error": msg }),
            AppError::AlreadyNotified(notified_at) => json!({
                "error": "Driver has already been notified",
                "notifiedAt": notified_at,
            }),
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
