//! SQLite PlayRepository implementation.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::db_err;
use crate::db::utils::current_timestamp;
use crate::db::{DbError, DbResult, Play, PlayRepository};

pub(crate) fn play_from_row(row: &SqliteRow) -> Result<Play, sqlx::Error> {
    Ok(Play {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        routine_id: row.try_get("routine_id")?,
        played_at: row.try_get("played_at")?,
    })
}

/// SQLx-backed play repository.
pub struct SqlitePlayRepository {
    pub(crate) pool: SqlitePool,
}

impl PlayRepository for SqlitePlayRepository {
    async fn record(&self, user_id: i64, routine_id: i64) -> DbResult<Play> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let bumped = sqlx::query("UPDATE routines SET views = COALESCE(views, 0) + 1 WHERE id = ?")
            .bind(routine_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        if bumped.rows_affected() == 0 {
            return Err(DbError::not_found("Routine", routine_id));
        }

        let result =
            sqlx::query("INSERT INTO plays (user_id, routine_id, played_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(routine_id)
                .bind(current_timestamp())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;

        let row = sqlx::query("SELECT id, user_id, routine_id, played_at FROM plays WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let play = play_from_row(&row).map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(play)
    }

    async fn list(&self) -> DbResult<Vec<Play>> {
        let rows = sqlx::query("SELECT id, user_id, routine_id, played_at FROM plays ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(play_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)
    }
}
