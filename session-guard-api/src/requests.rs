use serde::{Deserialize, Serialize};

// -------- REQUEST DTOs --------
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String, // Plain text
}

/// Body form of the refresh secret, for clients that do not keep cookies.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}
