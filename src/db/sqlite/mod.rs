//! SQLite implementation of the database traits.
//!
//! This module provides a SQLite-backed implementation of the repository
//! traits defined in the parent module.

mod connection;
mod play;
mod routine;
mod schema;
mod user;

#[cfg(test)]
mod routine_test;

pub use connection::SqliteDatabase;
pub use play::SqlitePlayRepository;
pub use routine::SqliteRoutineRepository;
pub use schema::SchemaGuard;
pub use user::SqliteUserRepository;

use crate::db::DbError;

pub(crate) fn db_err(e: sqlx::Error) -> DbError {
    DbError::Database {
        message: e.to_string(),
    }
}
