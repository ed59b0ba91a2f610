//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::posting::Posting;
use crate::storage::{CoverageRecord, RunRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt row for posting {site_id}: {message}")]
    CorruptRow { site_id: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Runs are bracketed by `create_run` and `complete_run`/`fail_run`; the
/// batches delivered in between are upserted by site id.
pub trait Storage: Send {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `search_url` - The listing URL this run crawls
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, search_url: &str, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as completed with a finish timestamp and its row count
    fn complete_run(&mut self, run_id: i64, rows_read: u64) -> StorageResult<()>;

    /// Marks a run as failed with a finish timestamp and the rows read so far
    fn fail_run(&mut self, run_id: i64, rows_read: u64) -> StorageResult<()>;

    // ===== Posting Management =====

    /// Inserts or updates a batch of postings in one transaction
    ///
    /// Detail fields already stored are kept when the incoming posting
    /// has none, so a run that failed to enrich a posting does not erase
    /// what an earlier run found.
    ///
    /// # Arguments
    ///
    /// * `run_id` - The run delivering the batch
    /// * `postings` - The batch, in listing order
    ///
    /// # Returns
    ///
    /// The number of postings written
    fn upsert_postings(&mut self, run_id: i64, postings: &[Posting]) -> StorageResult<usize>;

    /// Gets one posting by its site id
    fn get_posting(&self, site_id: &str) -> StorageResult<Option<Posting>>;

    /// Returns every stored posting, ordered by site id
    fn export_postings(&self) -> StorageResult<Vec<Posting>>;

    // ===== Statistics =====

    /// Counts recorded runs
    fn count_runs(&self) -> StorageResult<u64>;

    /// Counts stored postings
    fn count_postings(&self) -> StorageResult<u64>;

    /// Counts how many postings carry each detail field
    fn get_coverage(&self) -> StorageResult<CoverageRecord>;

    /// Returns the cities with the most postings, most frequent first
    fn get_top_cities(&self, limit: usize) -> StorageResult<Vec<(String, u64)>>;
}
