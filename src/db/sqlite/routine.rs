//! SQLite RoutineRepository implementation.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::db_err;
use crate::db::utils::current_timestamp;
use crate::db::{DbError, DbResult, MediaReplacement, NewRoutine, Routine, RoutineRepository};

pub(crate) const ROUTINE_COLUMNS: &str = "id, title, category, difficulty, duration, video_url, \
    thumbnail_url, description, uploaded_by, uploaded_at, COALESCE(views, 0) AS views";

pub(crate) fn routine_from_row(row: &SqliteRow) -> Result<Routine, sqlx::Error> {
    Ok(Routine {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        category: row.try_get("category")?,
        difficulty: row.try_get("difficulty")?,
        duration: row.try_get("duration")?,
        video_url: row.try_get("video_url")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        description: row.try_get("description")?,
        uploaded_by: row.try_get("uploaded_by")?,
        uploaded_at: row.try_get("uploaded_at")?,
        views: row.try_get("views")?,
    })
}

/// SQLx-backed routine repository.
pub struct SqliteRoutineRepository {
    pub(crate) pool: SqlitePool,
}

impl RoutineRepository for SqliteRoutineRepository {
    async fn create(&self, routine: &NewRoutine) -> DbResult<Routine> {
        if routine.video_url.trim().is_empty() {
            return Err(DbError::Validation {
                message: "video_url required".to_string(),
            });
        }

        let result = sqlx::query(
            "INSERT INTO routines (title, category, difficulty, duration, video_url, \
             thumbnail_url, description, uploaded_by, uploaded_at, views) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(&routine.title)
        .bind(&routine.category)
        .bind(&routine.difficulty)
        .bind(routine.duration)
        .bind(&routine.video_url)
        .bind(&routine.thumbnail_url)
        .bind(&routine.description)
        .bind(routine.uploaded_by)
        .bind(current_timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get(result.last_insert_rowid()).await
    }

    async fn get(&self, id: i64) -> DbResult<Routine> {
        let row = sqlx::query(&format!("SELECT {ROUTINE_COLUMNS} FROM routines WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| DbError::not_found("Routine", id))?;

        routine_from_row(&row).map_err(db_err)
    }

    async fn list(&self) -> DbResult<Vec<Routine>> {
        let rows = sqlx::query(&format!(
            "SELECT {ROUTINE_COLUMNS} FROM routines ORDER BY uploaded_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(routine_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    async fn replace_media(&self, id: i64, replacement: &MediaReplacement) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE routines SET title = ?, video_url = ?, thumbnail_url = ?, description = ? \
             WHERE id = ?",
        )
        .bind(&replacement.title)
        .bind(&replacement.video_url)
        .bind(&replacement.thumbnail_url)
        .bind(&replacement.description)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Routine", id));
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM routines WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Routine", id));
        }
        Ok(())
    }
}
