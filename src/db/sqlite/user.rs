//! SQLite UserRepository implementation.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::db_err;
use crate::db::utils::current_timestamp;
use crate::db::{
    ADMIN_COUNTRY, DbError, DbResult, RegisterOutcome, Registration, User, UserRepository,
};

/// Column list in declared order. Counters are coalesced because rows written
/// before the columns existed carry NULLs.
pub(crate) const USER_COLUMNS: &str = "id, username, age, country, occupation, \
    COALESCE(admin, 0) AS admin, api_key, COALESCE(visits, 0) AS visits, \
    COALESCE(reminders_set, 0) AS reminders_set, last_seen, created_at, password_hash";

pub(crate) fn user_from_row(row: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        age: row.try_get("age")?,
        country: row.try_get("country")?,
        occupation: row.try_get("occupation")?,
        admin: row.try_get::<i64, _>("admin")? != 0,
        api_key: row.try_get("api_key")?,
        visits: row.try_get("visits")?,
        reminders_set: row.try_get::<i64, _>("reminders_set")? != 0,
        last_seen: row.try_get("last_seen")?,
        created_at: row.try_get("created_at")?,
        password_hash: row.try_get("password_hash")?,
    })
}

fn validate_identity(username: &str, country: &str) -> DbResult<()> {
    if username.trim().is_empty() || country.trim().is_empty() {
        return Err(DbError::Validation {
            message: "username and country required".to_string(),
        });
    }
    Ok(())
}

/// SQLx-backed user repository.
pub struct SqliteUserRepository {
    pub(crate) pool: SqlitePool,
}

impl SqliteUserRepository {
    async fn fetch_optional(&self, sql: &str, binds: &[&str]) -> DbResult<Option<User>> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let row = query.fetch_optional(&self.pool).await.map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose().map_err(db_err)
    }
}

impl UserRepository for SqliteUserRepository {
    async fn register(&self, registration: &Registration) -> DbResult<RegisterOutcome> {
        validate_identity(&registration.username, &registration.country)?;

        let now = current_timestamp();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE username = ? AND country = ?")
                .bind(&registration.username)
                .bind(&registration.country)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

        let (id, created) = match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE users SET age = ?, occupation = ?, last_seen = ?, \
                     visits = COALESCE(visits, 0) + 1 WHERE id = ?",
                )
                .bind(registration.age)
                .bind(&registration.occupation)
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                (id, false)
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO users (username, age, country, occupation, admin, api_key, \
                     visits, last_seen, created_at) VALUES (?, ?, ?, ?, 0, NULL, 1, ?, ?)",
                )
                .bind(&registration.username)
                .bind(registration.age)
                .bind(&registration.country)
                .bind(&registration.occupation)
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                (result.last_insert_rowid(), true)
            }
        };

        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let user = user_from_row(&row).map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(RegisterOutcome { user, created })
    }

    async fn record_visit(&self, username: &str, country: &str) -> DbResult<bool> {
        validate_identity(username, country)?;

        let result = sqlx::query(
            "UPDATE users SET visits = COALESCE(visits, 0) + 1, last_seen = ? \
             WHERE username = ? AND country = ?",
        )
        .bind(current_timestamp())
        .bind(username)
        .bind(country)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_reminder(&self, username: &str, country: &str, enabled: bool) -> DbResult<bool> {
        validate_identity(username, country)?;

        let result =
            sqlx::query("UPDATE users SET reminders_set = ? WHERE username = ? AND country = ?")
                .bind(i64::from(enabled))
                .bind(username)
                .bind(country)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_identity(&self, username: &str, country: &str) -> DbResult<Option<User>> {
        self.fetch_optional(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ? AND country = ?"),
            &[username, country],
        )
        .await
    }

    async fn get(&self, id: i64) -> DbResult<User> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| DbError::not_found("User", id))?;

        user_from_row(&row).map_err(db_err)
    }

    async fn list(&self) -> DbResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    async fn admin_exists(&self) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE admin = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count > 0)
    }

    async fn find_admin_by_key(&self, api_key: &str) -> DbResult<Option<User>> {
        if api_key.is_empty() {
            return Ok(None);
        }
        self.fetch_optional(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE api_key = ? AND admin = 1"),
            &[api_key],
        )
        .await
    }

    async fn find_admin_by_username(&self, username: &str) -> DbResult<Option<User>> {
        self.fetch_optional(
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE username = ? AND admin = 1 \
                 ORDER BY country = '{ADMIN_COUNTRY}' DESC, id ASC LIMIT 1"
            ),
            &[username],
        )
        .await
    }

    async fn create_admin(&self, username: &str, password_hash: &str, api_key: &str) -> DbResult<User> {
        validate_identity(username, ADMIN_COUNTRY)?;

        let now = current_timestamp();
        let result = sqlx::query(
            "INSERT INTO users (username, age, country, occupation, admin, api_key, \
             password_hash, visits, last_seen, created_at) VALUES (?, 0, ?, '', 1, ?, ?, 0, ?, ?)",
        )
        .bind(username)
        .bind(ADMIN_COUNTRY)
        .bind(api_key)
        .bind(password_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e
                && db.is_unique_violation()
            {
                return DbError::AlreadyExists {
                    entity_type: "Admin".to_string(),
                    id: username.to_string(),
                };
            }
            db_err(e)
        })?;

        self.get(result.last_insert_rowid()).await
    }

    async fn promote(&self, id: i64, api_key: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE users SET admin = 1, api_key = ? WHERE id = ?")
            .bind(api_key)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        Ok(())
    }
}
