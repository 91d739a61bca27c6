use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::UnauthorizedReason;

/// Structured audit sink. Every event goes to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLog;

impl AuditLog {
    pub fn session_issued(self, user_id: Uuid, family_id: Uuid, ip_address: Option<&str>) {
        info!(target: "audit", event = "session_issued", %user_id, %family_id, ip_address = ip_address.unwrap_or(""));
    }

    pub fn token_rotated(self, user_id: Uuid, family_id: Uuid, previous_id: Uuid) {
        info!(target: "audit", event = "token_rotated", %user_id, %family_id, %previous_id);
    }

    pub fn reuse_detected(self, user_id: Uuid, family_id: Uuid, revoked: usize) {
        warn!(target: "audit", event = "reuse_detected", %user_id, %family_id, revoked);
    }

    pub fn family_revoked(self, user_id: Uuid, family_id: Uuid, count: usize, cause: &str) {
        info!(target: "audit", event = "family_revoked", %user_id, %family_id, count, cause);
    }

    pub fn rotation_rejected(self, reason: UnauthorizedReason, family_id: Option<Uuid>) {
        let family_id = family_id.map(|id| id.to_string()).unwrap_or_default();
        warn!(target: "audit", event = "rotation_rejected", reason = reason.as_str(), family_id = %family_id);
    }

    pub fn login_failed(self, locked_out: bool) {
        warn!(target: "audit", event = "login_failed", locked_out);
    }

    pub fn store_failure(self, operation: &str, error_msg: &str) {
        error!(target: "audit", event = "store_failure", operation, error = error_msg);
    }
}
