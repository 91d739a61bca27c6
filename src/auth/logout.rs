use std::sync::Arc;

use crate::auth::audit::AuditLog;
use crate::auth::tokens::hash_refresh_token;
use crate::clock::Clock;
use crate::db::store::{RefreshTokenStore, StoreProvider};
use crate::error::AppError;

/// Ends the session a refresh token belongs to by revoking its whole family.
pub struct SessionTerminator {
    store: Arc<dyn StoreProvider>,
    clock: Arc<dyn Clock>,
    audit: AuditLog,
}

impl SessionTerminator {
    pub fn new(store: Arc<dyn StoreProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            audit: AuditLog,
        }
    }

    /// Best effort and idempotent: never fails, returns how many rows were revoked.
    pub fn logout(&self, raw_refresh_token: Option<&str>) -> usize {
        let Some(raw) = raw_refresh_token.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return 0;
        };

        match self.revoke(raw) {
            Ok(count) => count,
            Err(e) => {
                self.audit.store_failure("logout", &e.to_string());
                0
            }
        }
    }

    fn revoke(&self, raw: &str) -> Result<usize, AppError> {
        let mut session = self.store.open()?;
        let Some(stored) = session.find_by_hash(&hash_refresh_token(raw))? else {
            tracing::debug!("Logout with unknown refresh token");
            return Ok(0);
        };

        let family_id = stored.token.family_id;
        let count = session.mark_family_revoked(family_id, self.clock.now())?;
        self.audit
            .family_revoked(stored.principal.id, family_id, count, "logout");
        Ok(count)
    }
}
