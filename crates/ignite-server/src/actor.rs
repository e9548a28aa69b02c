use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use ignite_core::types::Actor;

use crate::error::AppError;

pub const USER_HEADER: &str = "x-ignite-user";
pub const SUPERUSER_HEADER: &str = "x-ignite-superuser";

/// The acting user, taken from the `X-Ignite-User` header. A truthy
/// `X-Ignite-Superuser` header grants reviewer rights. Identity is trusted
/// as given.
#[derive(Debug, Clone, Copy)]
pub struct CurrentActor(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = header(parts, USER_HEADER)
            .ok_or_else(|| AppError::unauthorized("missing X-Ignite-User header"))?;
        let user = raw
            .trim()
            .parse()
            .map_err(|_| AppError::bad_request(format!("invalid user id '{raw}'")))?;
        let is_superuser = header(parts, SUPERUSER_HEADER)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Ok(Self(Actor { user, is_superuser }))
    }
}
