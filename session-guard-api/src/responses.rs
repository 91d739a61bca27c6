use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Issued on login and on every successful rotation.
///
/// The refresh secret is also set as the `refresh_token` cookie; clients
/// without a cookie jar send it back in the request body instead.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub token_type: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogoutResponse {
    pub message: String,
}

/// Claims of the bearer token presented to `GET /auth/session`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionClaimsResponse {
    pub user_id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub claims: BTreeMap<String, String>,
    pub expires_at: DateTime<Utc>,
}
