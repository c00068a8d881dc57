use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

pub const ACTOR_HEADER: &str = "x-user-id";

/// The acting user, taken from the `X-User-Id` header. Authentication happens
/// upstream; the header is trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AppError::MissingActor)?;
        Ok(Actor(user_id.to_string()))
    }
}
