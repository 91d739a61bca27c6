//! Persistence seam for refresh tokens.
//!
//! The rotation engine never reads a row and writes it back: every state
//! change goes through a single conditional or set-based statement
//! (`mark_replaced`, `mark_family_revoked`) evaluated by the store itself.

use crate::auth::principal::Principal;
use crate::db::error::RepositoryError;
use crate::db::models::refresh_token::{NewRefreshToken, RefreshToken};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A refresh-token row together with the principal that owns it.
#[derive(Debug, Clone)]
pub struct StoredRefreshToken {
    pub token: RefreshToken,
    pub principal: Principal,
}

pub trait RefreshTokenStore {
    /// Stages a new row; visible to others once the surrounding transaction commits.
    fn insert(&mut self, token: &NewRefreshToken) -> Result<(), RepositoryError>;

    fn find_by_hash(&mut self, hash: &str) -> Result<Option<StoredRefreshToken>, RepositoryError>;

    /// Most recently created non-revoked row of the family.
    fn find_latest_active_by_family(
        &mut self,
        family_id: Uuid,
    ) -> Result<Option<RefreshToken>, RepositoryError>;

    /// Sets `revoked_at = now` on every unrevoked row of the family. Returns the affected count.
    fn mark_family_revoked(
        &mut self,
        family_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError>;

    /// Sets `revoked_at = now, replaced_by_hash = new_hash` only while both are still NULL.
    /// Returns 1 when this caller won, 0 when someone else rotated or revoked the row first.
    fn mark_replaced(
        &mut self,
        token_id: Uuid,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError>;

    /// Hard-deletes rows whose own expiry is older than `cutoff`.
    fn purge_expired_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError>;
}

/// Unit-of-work boundary around the store mutations of one request.
pub trait TransactionCoordinator {
    fn begin(&mut self) -> Result<(), RepositoryError>;
    fn commit(&mut self) -> Result<(), RepositoryError>;
    fn rollback(&mut self) -> Result<(), RepositoryError>;
}

/// One connection's worth of store access: queries plus transaction control.
pub trait StoreSession: RefreshTokenStore + TransactionCoordinator + Send {}

impl<T> StoreSession for T where T: RefreshTokenStore + TransactionCoordinator + Send {}

/// Hands out independent sessions; shared by every request worker.
pub trait StoreProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn StoreSession>, RepositoryError>;
}
