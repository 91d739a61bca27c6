// src/handlers/auth.rs

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
};
use session_guard_api::{
    LoginRequest, LogoutResponse, RefreshTokenRequest, SessionClaimsResponse, TokenPairResponse,
};

use crate::app::AppState;
use crate::auth::extractors::{AuthClaims, ClientContext};
use crate::auth::rotation::TokenPair;
use crate::clock::Clock;
use crate::error::{AppError, UnauthorizedReason};
use crate::handlers::cookies::{cleared_cookie, read_refresh_cookie, refresh_cookie};

/// POST /auth/login
/// Connexion d'un utilisateur, ouvre une nouvelle famille de refresh tokens
pub async fn login(
    State(state): State<AppState>,
    client: ClientContext,
    Json(payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<TokenPairResponse>), AppError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::invalid_input("email and password are required"));
    }

    let engine = state.engine.clone();
    let pair = tokio::task::spawn_blocking(move || {
        engine.login(&email, &payload.password, &client)
    })
    .await??;

    token_pair_response(&state, pair)
}

/// POST /auth/refresh
/// Rotation: the presented refresh token is consumed and replaced
pub async fn refresh(
    State(state): State<AppState>,
    client: ClientContext,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(HeaderMap, Json<TokenPairResponse>), AppError> {
    let raw = match read_refresh_cookie(&headers) {
        Some(raw) => raw,
        None => refresh_token_from_body(&body)?
            .ok_or(AppError::unauthorized(UnauthorizedReason::InvalidRefreshToken))?,
    };

    // Detached from the request future: once the conditional update ran, the
    // commit must happen even if the client goes away.
    let engine = state.engine.clone();
    let pair = tokio::task::spawn_blocking(move || engine.rotate(&raw, &client)).await??;

    token_pair_response(&state, pair)
}

/// POST /auth/logout
/// Always succeeds and clears the cookie, whatever the token state
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(HeaderMap, Json<LogoutResponse>), AppError> {
    let raw = read_refresh_cookie(&headers).or_else(|| {
        refresh_token_from_body(&body).unwrap_or_else(|e| {
            tracing::debug!("Ignoring unreadable logout body: {e}");
            None
        })
    });

    let terminator = state.terminator.clone();
    match tokio::task::spawn_blocking(move || terminator.logout(raw.as_deref())).await {
        Ok(count) => tracing::debug!(revoked = count, "Logout processed"),
        Err(e) => tracing::warn!("Logout task failed: {e}"),
    }

    let mut out_headers = HeaderMap::new();
    out_headers.insert(header::SET_COOKIE, cleared_cookie(&state.cookies)?);

    Ok((
        out_headers,
        Json(LogoutResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}

/// GET /auth/session
/// Claims of the bearer access token
pub async fn session(AuthClaims(claims): AuthClaims) -> Json<SessionClaimsResponse> {
    let expires_at = claims.expires_at();
    Json(SessionClaimsResponse {
        user_id: claims.sub,
        email: claims.email,
        org_id: claims.org_id,
        name: claims.name,
        roles: claims.roles,
        claims: claims.custom,
        expires_at,
    })
}

fn refresh_token_from_body(body: &Bytes) -> Result<Option<String>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let request: RefreshTokenRequest = serde_json::from_slice(body)?;
    Ok(request
        .refresh_token
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty()))
}

fn token_pair_response(
    state: &AppState,
    pair: TokenPair,
) -> Result<(HeaderMap, Json<TokenPairResponse>), AppError> {
    let mut out_headers = HeaderMap::new();
    out_headers.insert(
        header::SET_COOKIE,
        refresh_cookie(
            &state.cookies,
            &pair.refresh_token,
            pair.refresh_expires_at,
            state.clock.now(),
        )?,
    );

    Ok((
        out_headers,
        Json(TokenPairResponse {
            access_token: pair.access_token,
            token_type: "Bearer".to_string(),
            access_expires_at: pair.access_expires_at,
            refresh_token: pair.refresh_token,
            refresh_expires_at: pair.refresh_expires_at,
        }),
    ))
}
