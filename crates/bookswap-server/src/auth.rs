// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identity extractors.
//!
//! The access token is read from the `access_token` cookie, falling back to an
//! `Authorization: Bearer` header. Admin routes use [`AdminUser`], which turns
//! every failure (no token, bad token, wrong role) into a plain 404.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use bookswap_core::{AuthError, Identity};
use tower_cookies::Cookies;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Cookie the web client stores the token in.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

fn strip_bearer(value: &str) -> &str {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim()
}

async fn token_from_parts(parts: &mut Parts, state: &AppState) -> Option<String> {
    if let Ok(cookies) = Cookies::from_request_parts(parts, state).await
        && let Some(cookie) = cookies.get(ACCESS_TOKEN_COOKIE)
    {
        let token = strip_bearer(cookie.value());
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(strip_bearer)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

async fn identity_from_parts(parts: &mut Parts, state: &AppState) -> Result<Identity, AuthError> {
    let token = token_from_parts(parts, state)
        .await
        .ok_or(AuthError::Missing)?;
    state.identity.decode(&token)
}

/// Any authenticated user.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Identity);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(identity_from_parts(parts, state).await?))
    }
}

/// The caller's identity if a valid token was sent.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<Identity>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(identity_from_parts(parts, state).await.ok()))
    }
}

/// An authenticated admin; anything else is answered with 404.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Identity);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match identity_from_parts(parts, state).await {
            Ok(identity) if identity.is_admin() => Ok(Self(identity)),
            Ok(identity) => {
                debug!(user_id = identity.user_id, "Non-admin on admin route");
                Err(ApiError::hidden())
            }
            Err(e) => {
                debug!(error = %e, "Unauthenticated request on admin route");
                Err(ApiError::hidden())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc"), "abc");
        assert_eq!(strip_bearer("bearer abc"), "abc");
        assert_eq!(strip_bearer("abc"), "abc");
        assert_eq!(strip_bearer("Bearer "), "");
    }
}
