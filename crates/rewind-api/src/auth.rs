//! Bearer-token authentication.
//!
//! Tokens are configured statically (`API_TOKENS`) and map to a user id.
//! Every history and document endpoint acts on behalf of that user.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Extractor that rejects requests without a known bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequireUser {
    pub user_id: Uuid,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("You must be logged in.".to_string()))?;

        match state.user_for_token(token) {
            Some(user_id) => Ok(RequireUser { user_id }),
            None => Err(ApiError::Unauthorized("Invalid token".to_string())),
        }
    }
}
