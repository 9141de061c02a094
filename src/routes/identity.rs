//! Account identity supplied by the fronting web application.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::model::AccountId;

pub const ACCOUNT_HEADER: &str = "x-account-id";

impl<S> FromRequestParts<S> for AccountId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(AccountId)
            .ok_or_else(|| AppError::Unauthorized("missing or invalid X-Account-Id header".to_string()))
    }
}
