use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use std::convert::Infallible;

use crate::app::AppState;
use crate::auth::jwt::Claims;
use crate::error::{AppError, UnauthorizedReason};

const MAX_USER_AGENT_CHARS: usize = 512;
const MAX_IP_ADDRESS_CHARS: usize = 64;

/// Audit metadata stored alongside each refresh token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl ClientContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let user_agent = header_value(headers, header::USER_AGENT.as_str())
            .map(|ua| truncate_chars(ua, MAX_USER_AGENT_CHARS));

        // Premier hop de X-Forwarded-For, sinon X-Real-IP
        let ip_address = header_value(headers, "x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or_else(|| header_value(headers, "x-real-ip"))
            .map(|ip| truncate_chars(ip, MAX_IP_ADDRESS_CHARS));

        Self {
            user_agent,
            ip_address,
        }
    }
}

impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Claims of a valid `Authorization: Bearer <JWT>` access token.
#[derive(Debug, Clone)]
pub struct AuthClaims(pub Claims);

impl FromRequestParts<AppState> for AuthClaims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        const BEARER: &str = "Bearer ";

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|value| value.strip_prefix(BEARER))
            .ok_or(AppError::unauthorized(UnauthorizedReason::InvalidAccessToken))?;

        let claims = state.issuer.verify_token(token.trim())?;
        Ok(AuthClaims(claims))
    }
}
