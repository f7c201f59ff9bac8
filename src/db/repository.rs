//! Repository traits for data access abstraction.
//!
//! These traits define the contract for data access, allowing different
//! storage backends to be swapped without changing business logic.
//! Futures are declared `Send` so generic axum handlers and the sync worker
//! can await them on a multi-threaded runtime.

use std::future::Future;
use std::path::Path;

use crate::db::{
    DbResult,
    models::{
        MediaReplacement, Metrics, NewRoutine, Play, RegisterOutcome, Registration, Routine,
        SchemaReport, StoreSnapshot, User,
    },
};

/// Repository for account operations.
pub trait UserRepository {
    /// Insert a new account, or bump visits and refresh details of an existing one.
    fn register(
        &self,
        registration: &Registration,
    ) -> impl Future<Output = DbResult<RegisterOutcome>> + Send;

    /// Increment visits for an account. Returns false if no account matched.
    fn record_visit(
        &self,
        username: &str,
        country: &str,
    ) -> impl Future<Output = DbResult<bool>> + Send;

    /// Set the reminder flag. Returns false if no account matched.
    fn set_reminder(
        &self,
        username: &str,
        country: &str,
        enabled: bool,
    ) -> impl Future<Output = DbResult<bool>> + Send;

    /// Look an account up by its natural key.
    fn find_by_identity(
        &self,
        username: &str,
        country: &str,
    ) -> impl Future<Output = DbResult<Option<User>>> + Send;

    /// Get an account by id.
    fn get(&self, id: i64) -> impl Future<Output = DbResult<User>> + Send;

    /// Get all accounts, newest first.
    fn list(&self) -> impl Future<Output = DbResult<Vec<User>>> + Send;

    /// Whether any admin account exists.
    fn admin_exists(&self) -> impl Future<Output = DbResult<bool>> + Send;

    /// Find an admin by API key.
    fn find_admin_by_key(&self, api_key: &str)
    -> impl Future<Output = DbResult<Option<User>>> + Send;

    /// Find an admin by username.
    fn find_admin_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = DbResult<Option<User>>> + Send;

    /// Create the first admin account.
    fn create_admin(
        &self,
        username: &str,
        password_hash: &str,
        api_key: &str,
    ) -> impl Future<Output = DbResult<User>> + Send;

    /// Grant admin rights and a new API key to an account.
    fn promote(&self, id: i64, api_key: &str) -> impl Future<Output = DbResult<()>> + Send;
}

/// Repository for routine operations.
pub trait RoutineRepository {
    /// Create a routine.
    fn create(&self, routine: &NewRoutine) -> impl Future<Output = DbResult<Routine>> + Send;

    /// Get a routine by id.
    fn get(&self, id: i64) -> impl Future<Output = DbResult<Routine>> + Send;

    /// Get all routines, newest upload first.
    fn list(&self) -> impl Future<Output = DbResult<Vec<Routine>>> + Send;

    /// Point a routine at new media.
    fn replace_media(
        &self,
        id: i64,
        replacement: &MediaReplacement,
    ) -> impl Future<Output = DbResult<()>> + Send;

    /// Delete a routine by id.
    fn delete(&self, id: i64) -> impl Future<Output = DbResult<()>> + Send;
}

/// Repository for play events.
pub trait PlayRepository {
    /// Record a play and bump the routine's view counter atomically.
    fn record(&self, user_id: i64, routine_id: i64)
    -> impl Future<Output = DbResult<Play>> + Send;

    /// Get all plays in insertion order.
    fn list(&self) -> impl Future<Output = DbResult<Vec<Play>>> + Send;
}

/// Combined database interface.
pub trait Database: Send + Sync {
    type Users: UserRepository + Send + Sync;
    type Routines: RoutineRepository + Send + Sync;
    type Plays: PlayRepository + Send + Sync;

    /// Bring the store to the current schema. Never fails; problems are logged.
    fn migrate(&self) -> impl Future<Output = SchemaReport> + Send;

    /// Get the user repository.
    fn users(&self) -> &Self::Users;

    /// Get the routine repository.
    fn routines(&self) -> &Self::Routines;

    /// Get the play repository.
    fn plays(&self) -> &Self::Plays;

    /// Read every exported collection, ordered by id, in one read transaction.
    fn snapshot(&self) -> impl Future<Output = DbResult<StoreSnapshot>> + Send;

    /// Write a consistent copy of the whole store to `dest`.
    fn backup_to(&self, dest: &Path) -> impl Future<Output = DbResult<()>> + Send;

    /// Dashboard aggregates.
    fn metrics(&self) -> impl Future<Output = DbResult<Metrics>> + Send;
}
