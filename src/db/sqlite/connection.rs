//! SQLite database connection, snapshot reads, and backups.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use super::play::{SqlitePlayRepository, play_from_row};
use super::routine::{ROUTINE_COLUMNS, SqliteRoutineRepository, routine_from_row};
use super::schema::SchemaGuard;
use super::user::{SqliteUserRepository, USER_COLUMNS, user_from_row};
use super::db_err;
use crate::db::{Database, DbError, DbResult, Metrics, SchemaReport, StoreSnapshot};

/// SQLite database implementation.
///
/// Repositories share the pool; `SqlitePool` is reference counted so each
/// repository holds its own handle.
pub struct SqliteDatabase {
    pool: SqlitePool,
    users: SqliteUserRepository,
    routines: SqliteRoutineRepository,
    plays: SqlitePlayRepository,
}

impl SqliteDatabase {
    /// Open (or create) a database file at the given path.
    pub async fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;

        Ok(Self::from_pool(pool))
    }

    /// Create an in-memory database (useful for testing).
    ///
    /// Every connection to `sqlite::memory:` is a separate database, so the
    /// pool is pinned to a single connection that never expires.
    pub async fn in_memory() -> DbResult<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;

        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            users: SqliteUserRepository { pool: pool.clone() },
            routines: SqliteRoutineRepository { pool: pool.clone() },
            plays: SqlitePlayRepository { pool: pool.clone() },
            pool,
        }
    }

    /// Direct access to the pool, for tests and ad-hoc queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl Database for SqliteDatabase {
    type Users = SqliteUserRepository;
    type Routines = SqliteRoutineRepository;
    type Plays = SqlitePlayRepository;

    async fn migrate(&self) -> SchemaReport {
        SchemaGuard::new(&self.pool).ensure().await
    }

    fn users(&self) -> &Self::Users {
        &self.users
    }

    fn routines(&self) -> &Self::Routines {
        &self.routines
    }

    fn plays(&self) -> &Self::Plays {
        &self.plays
    }

    async fn snapshot(&self) -> DbResult<StoreSnapshot> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let users = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?
            .iter()
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        let routines = sqlx::query(&format!(
            "SELECT {ROUTINE_COLUMNS} FROM routines ORDER BY id ASC"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?
        .iter()
        .map(routine_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;

        let plays = sqlx::query("SELECT id, user_id, routine_id, played_at FROM plays ORDER BY id ASC")
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?
            .iter()
            .map(play_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(StoreSnapshot {
            users,
            routines,
            plays,
        })
    }

    async fn backup_to(&self, dest: &Path) -> DbResult<()> {
        // VACUUM INTO refuses to overwrite
        match tokio::fs::remove_file(dest).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DbError::Database {
                    message: format!("Failed to remove previous backup: {}", e),
                });
            }
        }

        sqlx::query("VACUUM INTO ?")
            .bind(dest.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        // An in-memory store reports success without writing anything.
        if !tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Err(DbError::Database {
                message: format!("Backup was not written to {}", dest.display()),
            });
        }

        Ok(())
    }

    async fn metrics(&self) -> DbResult<Metrics> {
        let (total_users, total_visits, reminders_set): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(1), COALESCE(SUM(visits), 0), \
             COALESCE(SUM(CASE WHEN reminders_set = 1 THEN 1 ELSE 0 END), 0) FROM users",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let (total_videos, total_plays): (i64, i64) =
            sqlx::query_as("SELECT COUNT(1), COALESCE(SUM(views), 0) FROM routines")
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(Metrics {
            total_users,
            total_visits,
            total_videos,
            total_plays,
            reminders_set,
        })
    }
}
