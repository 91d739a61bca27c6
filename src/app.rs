// src/app.rs

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::jwt::AccessTokenIssuer;
use crate::auth::logout::SessionTerminator;
use crate::auth::rotation::TokenRotationEngine;
use crate::clock::Clock;
use crate::config::CookieSettings;
use crate::handlers::auth::{login, logout, refresh, session};
use crate::handlers::health::health;

/// Everything the handlers need, built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TokenRotationEngine>,
    pub terminator: Arc<SessionTerminator>,
    /// Validates bearer tokens for `AuthClaims`.
    pub issuer: AccessTokenIssuer,
    pub cookies: CookieSettings,
    pub clock: Arc<dyn Clock>,
}

/// Configure les routes d'authentification
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/session", get(session))
        .with_state(state)
}

/// Construit l'application complète
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth_routes(state))
        // Middleware global de tracing
        .layer(TraceLayer::new_for_http())
}
