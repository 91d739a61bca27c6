use crate::db::error::RepositoryError;
use crate::db::models::refresh_token::{NewRefreshToken, RefreshToken};
use crate::db::models::user::User;
use crate::db::repositories::user_repository::UserRepository;
use crate::db::schema::{refresh_tokens, users};
use crate::db::store::{
    RefreshTokenStore, StoreProvider, StoreSession, StoredRefreshToken, TransactionCoordinator,
};
use crate::db::{DbConnection, DbPool};
use chrono::{DateTime, Utc};
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use uuid::Uuid;

/// Upper bound on family revocation passes. Each extra pass only finds rows
/// committed by a rotation that was in flight during the previous one.
const MAX_REVOCATION_PASSES: usize = 8;

/// Hands out one pooled connection per session.
#[derive(Clone)]
pub struct PgStoreProvider {
    pool: DbPool,
}

impl PgStoreProvider {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl StoreProvider for PgStoreProvider {
    fn open(&self) -> Result<Box<dyn StoreSession>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(Box::new(RefreshTokenRepository::new(conn)))
    }
}

/// Refresh-token queries over a single pooled connection.
///
/// The conditional updates rely on Postgres row locks: a second
/// `mark_replaced` on the same row blocks until the first transaction
/// finishes, then re-evaluates its `WHERE` clause and matches nothing.
pub struct RefreshTokenRepository {
    conn: DbConnection,
    in_transaction: bool,
}

impl RefreshTokenRepository {
    pub fn new(conn: DbConnection) -> Self {
        Self {
            conn,
            in_transaction: false,
        }
    }
}

impl RefreshTokenStore for RefreshTokenRepository {
    fn insert(&mut self, token: &NewRefreshToken) -> Result<(), RepositoryError> {
        diesel::insert_into(refresh_tokens::table)
            .values(token)
            .execute(&mut self.conn)?;

        Ok(())
    }

    fn find_by_hash(&mut self, hash: &str) -> Result<Option<StoredRefreshToken>, RepositoryError> {
        let row = refresh_tokens::table
            .inner_join(users::table)
            .filter(refresh_tokens::token_hash.eq(hash))
            .select((RefreshToken::as_select(), User::as_select()))
            .first::<(RefreshToken, User)>(&mut self.conn)
            .optional()?;

        let Some((token, user)) = row else {
            return Ok(None);
        };

        let principal = UserRepository::load_principal(&mut self.conn, user)?;
        Ok(Some(StoredRefreshToken { token, principal }))
    }

    fn find_latest_active_by_family(
        &mut self,
        family_id: Uuid,
    ) -> Result<Option<RefreshToken>, RepositoryError> {
        refresh_tokens::table
            .filter(refresh_tokens::family_id.eq(family_id))
            .filter(refresh_tokens::revoked_at.is_null())
            .order_by(refresh_tokens::created_at.desc())
            .select(RefreshToken::as_select())
            .first::<RefreshToken>(&mut self.conn)
            .optional()
            .map_err(Into::into)
    }

    fn mark_family_revoked(
        &mut self,
        family_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        // A pass that waited on a rotation's row lock cannot see the successor
        // that rotation committed; repeat until a pass finds nothing.
        let mut revoked = 0;
        for _ in 0..MAX_REVOCATION_PASSES {
            let affected = diesel::update(
                refresh_tokens::table
                    .filter(refresh_tokens::family_id.eq(family_id))
                    .filter(refresh_tokens::revoked_at.is_null()),
            )
            .set(refresh_tokens::revoked_at.eq(Some(now)))
            .execute(&mut self.conn)?;

            if affected == 0 {
                return Ok(revoked);
            }
            revoked += affected;
        }

        tracing::warn!(
            %family_id,
            revoked,
            "Family revocation still finding rows after {MAX_REVOCATION_PASSES} passes"
        );
        Ok(revoked)
    }

    fn mark_replaced(
        &mut self,
        token_id: Uuid,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::id.eq(token_id))
                .filter(refresh_tokens::revoked_at.is_null())
                .filter(refresh_tokens::replaced_by_hash.is_null()),
        )
        .set((
            refresh_tokens::revoked_at.eq(Some(now)),
            refresh_tokens::replaced_by_hash.eq(Some(new_hash)),
        ))
        .execute(&mut self.conn)
        .map_err(Into::into)
    }

    fn purge_expired_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        diesel::delete(refresh_tokens::table.filter(refresh_tokens::expires_at.lt(cutoff)))
            .execute(&mut self.conn)
            .map_err(Into::into)
    }
}

impl TransactionCoordinator for RefreshTokenRepository {
    fn begin(&mut self) -> Result<(), RepositoryError> {
        AnsiTransactionManager::begin_transaction(&mut *self.conn)?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), RepositoryError> {
        self.in_transaction = false;
        AnsiTransactionManager::commit_transaction(&mut *self.conn).map_err(Into::into)
    }

    fn rollback(&mut self) -> Result<(), RepositoryError> {
        self.in_transaction = false;
        AnsiTransactionManager::rollback_transaction(&mut *self.conn).map_err(Into::into)
    }
}

impl Drop for RefreshTokenRepository {
    fn drop(&mut self) {
        // Never hand a connection with an open transaction back to the pool
        if self.in_transaction
            && let Err(e) = AnsiTransactionManager::rollback_transaction(&mut *self.conn)
        {
            tracing::error!("Failed to roll back abandoned refresh token transaction: {e}");
        }
    }
}
