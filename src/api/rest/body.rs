use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::AppError;

/// JSON request body. Unlike `axum::Json` it ignores the content type and
/// reports every unreadable or malformed body as a 400 [`AppError`].
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|err| AppError::BadRequest(format!("Unreadable request body: {err}")))?;

        serde_json::from_slice(&bytes).map(JsonBody).map_err(|err| {
            debug!(error = %err, "rejected request body");
            AppError::BadRequest(format!("Invalid JSON body: {err}"))
        })
    }
}
