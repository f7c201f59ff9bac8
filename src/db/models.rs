//! Domain models for the routines database.
//!
//! These models are storage-agnostic. Field order is the column order of the
//! underlying tables and is also the key order of the exported snapshot
//! documents, so do not reorder fields casually.

use serde::{Deserialize, Serialize};

/// Country marker used for accounts created through admin registration.
pub const ADMIN_COUNTRY: &str = "__admin__";

/// An account, unique on (username, country).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub age: Option<i64>,
    pub country: String,
    pub occupation: Option<String>,
    pub admin: bool,
    pub api_key: Option<String>,
    pub visits: i64,
    pub reminders_set: bool,
    pub last_seen: Option<String>,
    pub created_at: Option<String>,
    /// Opaque hash, never plaintext.
    pub password_hash: Option<String>,
}

/// A workout routine (content item) with its media references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    pub id: i64,
    pub title: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub duration: Option<i64>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
    pub uploaded_by: Option<i64>,
    pub uploaded_at: Option<String>,
    pub views: i64,
}

/// A single play of a routine by a user (engagement event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Play {
    pub id: i64,
    pub user_id: Option<i64>,
    pub routine_id: Option<i64>,
    pub played_at: Option<String>,
}

/// Input for the register-or-revisit flow.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub country: String,
    pub age: i64,
    pub occupation: String,
}

/// Result of [`UserRepository::register`](crate::db::UserRepository::register).
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub user: User,
    /// True when a new account row was inserted, false when an existing one was updated.
    pub created: bool,
}

/// Input for creating a routine.
#[derive(Debug, Clone, Default)]
pub struct NewRoutine {
    pub title: String,
    pub category: String,
    pub difficulty: String,
    pub duration: i64,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub description: String,
    pub uploaded_by: Option<i64>,
}

/// New media for an existing routine.
#[derive(Debug, Clone)]
pub struct MediaReplacement {
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
}

/// Aggregate numbers shown on the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_users: i64,
    pub total_visits: i64,
    pub total_videos: i64,
    pub total_plays: i64,
    pub reminders_set: i64,
}

/// All exported collections, read within one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub users: Vec<User>,
    pub routines: Vec<Routine>,
    pub plays: Vec<Play>,
}

/// What a schema pass changed. All zeros means the store was already current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub tables_created: usize,
    pub columns_added: usize,
    pub groups_merged: usize,
    pub rows_deleted: usize,
    pub failures: usize,
}

impl SchemaReport {
    /// True when the pass wrote nothing.
    pub fn is_noop(&self) -> bool {
        self.tables_created == 0
            && self.columns_added == 0
            && self.groups_merged == 0
            && self.rows_deleted == 0
    }
}
