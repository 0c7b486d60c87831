use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::profile::{Profile, Role};
use crate::state::AppState;
use crate::store::StoreError;

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The profile behind the request.
#[derive(Debug, Clone)]
pub struct Caller(pub Profile);

impl Caller {
    pub fn profile(&self) -> &Profile {
        &self.0
    }

    pub fn require_admin(&self) -> Result<&Profile, AppError> {
        match self.0.role {
            Role::Admin => Ok(&self.0),
            _ => Err(AppError::Forbidden("Admin access required".to_string())),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .ok_or(AppError::Unauthorized)?;

        let profile = state
            .orders()
            .get_profile(user_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => AppError::Unauthorized,
                other => other.into(),
            })?;

        Ok(Caller(profile))
    }
}
