pub mod connection;
pub mod error;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod store;
use diesel::PgConnection;
use diesel::r2d2::{self, ConnectionManager};

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type DbConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;
