// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use session_guard_api::ErrorResponse;

/// Why an authentication attempt was refused.
///
/// Only ever logged: every reason produces the same client-visible 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    InvalidRefreshToken,
    ReuseDetected,
    ExpiredOrRevoked,
    TokenAlreadyUsed,
    InvalidCredentials,
    InvalidAccessToken,
}

impl UnauthorizedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRefreshToken => "invalid refresh token",
            Self::ReuseDetected => "reuse detected, re-authenticate",
            Self::ExpiredOrRevoked => "expired or revoked",
            Self::TokenAlreadyUsed => "token already used",
            Self::InvalidCredentials => "invalid credentials",
            Self::InvalidAccessToken => "invalid access token",
        }
    }
}

impl std::fmt::Display for UnauthorizedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    // === Startup ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    // === Authentication ===
    #[error("Unauthorized: {0}")]
    Unauthorized(UnauthorizedReason),

    // === Persistence ===
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    // === Cryptography ===
    #[error("Token generation failed: {0}")]
    TokenGenerationFailed(String),

    // === Input ===
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === Internal ===
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, internal_detail) = self.get_error_info();

        if let Some(ref detail) = internal_detail {
            tracing::error!(error_code, %status, detail, "Request failed");
        }

        let body = Json(ErrorResponse::new(error_code, message));

        (status, body).into_response()
    }
}

impl AppError {
    /// Status, public code, public message, and the detail that is only logged.
    fn get_error_info(&self) -> (StatusCode, &'static str, String, Option<String>) {
        match self {
            // 401: one shape for every reason
            AppError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
                None,
            ),

            // 400
            AppError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone(), None)
            }

            // 503
            AppError::StoreUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "The service is temporarily unavailable".to_string(),
                Some(msg.clone()),
            ),

            // 500
            AppError::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR",
                "An internal server error occurred".to_string(),
                Some(msg.clone()),
            ),
            AppError::TokenGenerationFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TOKEN_ERROR",
                "An error occurred while generating token".to_string(),
                Some(msg.clone()),
            ),
            AppError::InternalServerError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
                Some(msg.clone()),
            ),
        }
    }

    // === Constructeurs helpers ===
    pub fn unauthorized(reason: UnauthorizedReason) -> Self {
        AppError::Unauthorized(reason)
    }

    pub fn store(msg: impl Into<String>) -> Self {
        AppError::StoreUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::InternalServerError(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn token_generation_failed(msg: impl Into<String>) -> Self {
        AppError::TokenGenerationFailed(msg.into())
    }

    /// The specific sub-case, when this is an authentication refusal.
    pub fn unauthorized_reason(&self) -> Option<UnauthorizedReason> {
        match self {
            AppError::Unauthorized(reason) => Some(*reason),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn status_code(&self) -> StatusCode {
        self.get_error_info().0
    }
}

// === Conversions ===

impl From<crate::db::error::RepositoryError> for AppError {
    fn from(err: crate::db::error::RepositoryError) -> Self {
        AppError::store(err.to_string())
    }
}

impl From<crate::auth::jwt::JwtError> for AppError {
    fn from(err: crate::auth::jwt::JwtError) -> Self {
        match err {
            crate::auth::jwt::JwtError::GenerationFailed(e) => {
                AppError::token_generation_failed(e.to_string())
            }
            crate::auth::jwt::JwtError::VerificationFailed(_) => {
                AppError::unauthorized(UnauthorizedReason::InvalidAccessToken)
            }
            e @ crate::auth::jwt::JwtError::LifetimeOverflow(_) => {
                AppError::Configuration(e.to_string())
            }
        }
    }
}

impl From<crate::auth::keys::KeyError> for AppError {
    fn from(err: crate::auth::keys::KeyError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::invalid_input(format!("JSON error: {err}"))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::internal(format!("worker task failed: {err}"))
    }
}
