use axum::http::{HeaderMap, HeaderValue, header};
use chrono::{DateTime, Utc};

use crate::config::CookieSettings;
use crate::error::AppError;

pub const REFRESH_COOKIE: &str = "refresh_token";

/// `Set-Cookie` value carrying a fresh refresh secret until `expires_at`.
pub fn refresh_cookie(
    settings: &CookieSettings,
    secret: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<HeaderValue, AppError> {
    let max_age = (expires_at - now).num_seconds().max(0);
    HeaderValue::from_str(&build(settings, secret, max_age))
        .map_err(|_| AppError::internal("Failed to set cookie"))
}

/// `Set-Cookie` value that makes the browser drop the refresh cookie.
pub fn cleared_cookie(settings: &CookieSettings) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&build(settings, "", 0))
        .map_err(|_| AppError::internal("Failed to clear cookie"))
}

fn build(settings: &CookieSettings, value: &str, max_age: i64) -> String {
    let mut cookie = format!(
        "{REFRESH_COOKIE}={value}; HttpOnly; SameSite=Strict; Path={}; Max-Age={max_age}",
        settings.path
    );
    if let Some(domain) = &settings.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if settings.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Reads the refresh secret from the `Cookie` header, if present and non-empty.
pub fn read_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|kv| {
            let mut it = kv.trim().splitn(2, '=');
            match (it.next(), it.next()) {
                (Some(REFRESH_COOKIE), Some(v)) => Some(v.trim().to_string()),
                _ => None,
            }
        })
        .find(|v| !v.is_empty())
}
