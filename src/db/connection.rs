use super::DbPool;
use crate::db::error::RepositoryError;
use diesel::PgConnection;
use diesel::r2d2::ConnectionManager;

/// Builds the shared connection pool. Connections are opened lazily, so this
/// succeeds even while the database is still starting.
pub fn create_pool(database_url: &str, max_size: u32) -> Result<DbPool, RepositoryError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);

    diesel::r2d2::Pool::builder()
        .max_size(max_size)
        .min_idle(Some(0))
        .build(manager)
        .map_err(|e| RepositoryError::PoolError(format!("Failed to create pool: {e}")))
}
