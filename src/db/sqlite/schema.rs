//! Startup schema guard.
//!
//! Brings a long-lived store up to the current shape without a migration
//! history table: base tables are created if absent, columns added by later
//! versions are added only when `pragma_table_info` says they are missing,
//! and accounts duplicated under the old, looser uniqueness rule are merged.
//! Every step checks current state before writing, so running the guard on an
//! up-to-date store performs no writes at all.

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::SchemaReport;

const CREATE_USERS: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    age INTEGER,
    country TEXT NOT NULL,
    occupation TEXT,
    admin INTEGER DEFAULT 0,
    api_key TEXT,
    visits INTEGER DEFAULT 0,
    reminders_set INTEGER DEFAULT 0,
    last_seen TIMESTAMP,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    password_hash TEXT,
    UNIQUE(username, country)
)";

const CREATE_ROUTINES: &str = "CREATE TABLE IF NOT EXISTS routines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    category TEXT,
    difficulty TEXT,
    duration INTEGER,
    video_url TEXT,
    thumbnail_url TEXT,
    description TEXT,
    uploaded_by INTEGER,
    uploaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    views INTEGER DEFAULT 0
)";

const CREATE_PLAYS: &str = "CREATE TABLE IF NOT EXISTS plays (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER,
    routine_id INTEGER,
    played_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

const BASE_TABLES: &[(&str, &str)] = &[
    ("users", CREATE_USERS),
    ("routines", CREATE_ROUTINES),
    ("plays", CREATE_PLAYS),
];

const UNIQUE_IDENTITY: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_identity ON users(username, country)";

/// Columns a table is expected to have, each with the DDL that adds it.
pub struct MigrationDescriptor {
    pub table: &'static str,
    pub columns: &'static [(&'static str, &'static str)],
}

/// Columns introduced after the first release. SQLite cannot add a column
/// with a non-constant default, so timestamp columns are added bare.
pub const MIGRATIONS: &[MigrationDescriptor] = &[
    MigrationDescriptor {
        table: "users",
        columns: &[
            ("age", "ALTER TABLE users ADD COLUMN age INTEGER"),
            ("occupation", "ALTER TABLE users ADD COLUMN occupation TEXT"),
            ("admin", "ALTER TABLE users ADD COLUMN admin INTEGER DEFAULT 0"),
            ("api_key", "ALTER TABLE users ADD COLUMN api_key TEXT"),
            ("visits", "ALTER TABLE users ADD COLUMN visits INTEGER DEFAULT 0"),
            (
                "reminders_set",
                "ALTER TABLE users ADD COLUMN reminders_set INTEGER DEFAULT 0",
            ),
            ("last_seen", "ALTER TABLE users ADD COLUMN last_seen TIMESTAMP"),
            ("created_at", "ALTER TABLE users ADD COLUMN created_at TIMESTAMP"),
            ("password_hash", "ALTER TABLE users ADD COLUMN password_hash TEXT"),
        ],
    },
    MigrationDescriptor {
        table: "routines",
        columns: &[
            ("category", "ALTER TABLE routines ADD COLUMN category TEXT"),
            ("difficulty", "ALTER TABLE routines ADD COLUMN difficulty TEXT"),
            ("duration", "ALTER TABLE routines ADD COLUMN duration INTEGER"),
            ("video_url", "ALTER TABLE routines ADD COLUMN video_url TEXT"),
            (
                "thumbnail_url",
                "ALTER TABLE routines ADD COLUMN thumbnail_url TEXT",
            ),
            ("description", "ALTER TABLE routines ADD COLUMN description TEXT"),
            ("uploaded_by", "ALTER TABLE routines ADD COLUMN uploaded_by INTEGER"),
            ("uploaded_at", "ALTER TABLE routines ADD COLUMN uploaded_at TIMESTAMP"),
            ("views", "ALTER TABLE routines ADD COLUMN views INTEGER DEFAULT 0"),
        ],
    },
    MigrationDescriptor {
        table: "plays",
        columns: &[
            ("user_id", "ALTER TABLE plays ADD COLUMN user_id INTEGER"),
            ("routine_id", "ALTER TABLE plays ADD COLUMN routine_id INTEGER"),
            ("played_at", "ALTER TABLE plays ADD COLUMN played_at TIMESTAMP"),
        ],
    },
];

/// One account row as seen by the dedup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AccountRow {
    pub id: i64,
    pub visits: Option<i64>,
    pub reminders_set: Option<i64>,
    pub created_at: Option<String>,
}

/// The surviving row of a duplicate group and the rows to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MergedAccount {
    pub keep_id: i64,
    pub visits: i64,
    pub reminders_set: bool,
    pub created_at: Option<String>,
    pub delete_ids: Vec<i64>,
}

/// Merge a duplicate group: visits are summed, reminder flags OR-ed, and the
/// earliest known creation time kept. The survivor is the earliest-created
/// row (rows without a timestamp sort last, ties broken by id).
pub(crate) fn merge_group(rows: &[AccountRow]) -> Option<MergedAccount> {
    if rows.len() < 2 {
        return None;
    }

    let mut ordered: Vec<&AccountRow> = rows.iter().collect();
    ordered.sort_by(|a, b| {
        (a.created_at.is_none(), &a.created_at, a.id).cmp(&(
            b.created_at.is_none(),
            &b.created_at,
            b.id,
        ))
    });

    let keep = ordered[0];
    Some(MergedAccount {
        keep_id: keep.id,
        visits: rows.iter().map(|r| r.visits.unwrap_or(0)).sum(),
        reminders_set: rows.iter().any(|r| r.reminders_set.unwrap_or(0) != 0),
        created_at: keep.created_at.clone(),
        delete_ids: ordered[1..].iter().map(|r| r.id).collect(),
    })
}

/// Idempotent schema evolution and account deduplication.
pub struct SchemaGuard<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SchemaGuard<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Run every step. Failures are logged and counted, never returned.
    pub async fn ensure(&self) -> SchemaReport {
        let mut report = SchemaReport::default();

        for (table, ddl) in BASE_TABLES {
            self.create_if_missing(table, ddl, &mut report).await;
        }

        for descriptor in MIGRATIONS {
            self.add_missing_columns(descriptor, &mut report).await;
        }

        match self.deduplicate_users().await {
            Ok((groups, deleted)) => {
                report.groups_merged = groups;
                report.rows_deleted = deleted;
            }
            Err(e) => {
                warn!(error = %e, "Account deduplication failed, will retry on next start");
                report.failures += 1;
            }
        }

        // Only possible once duplicates are gone; older stores never had the constraint.
        if let Err(e) = sqlx::query(UNIQUE_IDENTITY).execute(self.pool).await {
            warn!(error = %e, "Could not enforce unique (username, country)");
            report.failures += 1;
        }

        if report.is_noop() {
            debug!("Schema already current");
        } else {
            info!(
                tables_created = report.tables_created,
                columns_added = report.columns_added,
                groups_merged = report.groups_merged,
                rows_deleted = report.rows_deleted,
                "Schema updated"
            );
        }

        report
    }

    async fn create_if_missing(&self, table: &str, ddl: &str, report: &mut SchemaReport) {
        let exists: Result<Option<i64>, _> =
            sqlx::query_scalar("SELECT 1 FROM sqlite_master WHERE name = ?")
                .bind(table)
                .fetch_optional(self.pool)
                .await;

        match exists {
            Ok(Some(_)) => {}
            Ok(None) => match sqlx::query(ddl).execute(self.pool).await {
                Ok(_) => {
                    info!(table, "Created table");
                    report.tables_created += 1;
                }
                Err(e) => {
                    warn!(table, error = %e, "Could not create table");
                    report.failures += 1;
                }
            },
            Err(e) => {
                warn!(table, error = %e, "Could not inspect tables");
                report.failures += 1;
            }
        }
    }

    async fn add_missing_columns(&self, descriptor: &MigrationDescriptor, report: &mut SchemaReport) {
        let existing: Vec<String> = match sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
            .bind(descriptor.table)
            .fetch_all(self.pool)
            .await
        {
            Ok(columns) => columns,
            Err(e) => {
                warn!(table = descriptor.table, error = %e, "Could not inspect columns");
                report.failures += 1;
                return;
            }
        };

        if existing.is_empty() {
            warn!(table = descriptor.table, "Table missing, skipping column checks");
            return;
        }

        for (column, ddl) in descriptor.columns {
            if existing.iter().any(|c| c == column) {
                continue;
            }
            match sqlx::query(ddl).execute(self.pool).await {
                Ok(_) => {
                    info!(table = descriptor.table, column, "Added missing column");
                    report.columns_added += 1;
                }
                Err(e) => {
                    warn!(table = descriptor.table, column, error = %e, "Could not add column");
                    report.failures += 1;
                }
            }
        }
    }

    /// Returns (groups merged, rows deleted).
    async fn deduplicate_users(&self) -> Result<(usize, usize), sqlx::Error> {
        let groups: Vec<(String, String)> = sqlx::query_as(
            "SELECT username, country FROM users GROUP BY username, country HAVING COUNT(1) > 1",
        )
        .fetch_all(self.pool)
        .await?;

        if groups.is_empty() {
            return Ok((0, 0));
        }

        let mut tx = self.pool.begin().await?;
        let mut merged_groups = 0;
        let mut deleted = 0;

        for (username, country) in &groups {
            let rows: Vec<(i64, Option<i64>, Option<i64>, Option<String>)> = sqlx::query_as(
                "SELECT id, visits, reminders_set, created_at FROM users \
                 WHERE username = ? AND country = ?",
            )
            .bind(username)
            .bind(country)
            .fetch_all(&mut *tx)
            .await?;

            let rows: Vec<AccountRow> = rows
                .into_iter()
                .map(|(id, visits, reminders_set, created_at)| AccountRow {
                    id,
                    visits,
                    reminders_set,
                    created_at,
                })
                .collect();

            let Some(merged) = merge_group(&rows) else {
                continue;
            };

            sqlx::query("UPDATE users SET visits = ?, reminders_set = ?, created_at = ? WHERE id = ?")
                .bind(merged.visits)
                .bind(i64::from(merged.reminders_set))
                .bind(&merged.created_at)
                .bind(merged.keep_id)
                .execute(&mut *tx)
                .await?;

            for id in &merged.delete_ids {
                sqlx::query("DELETE FROM users WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }

            info!(
                username = %username,
                country = %country,
                kept = merged.keep_id,
                removed = merged.delete_ids.len(),
                "Merged duplicate accounts"
            );
            merged_groups += 1;
            deleted += merged.delete_ids.len();
        }

        tx.commit().await?;
        Ok((merged_groups, deleted))
    }
}
