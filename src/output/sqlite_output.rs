//! SQLite-based batch sink
//!
//! This module provides a sink that upserts each batch into the storage
//! backend under the current run.

use crate::output::traits::{BatchSink, OutputError, OutputResult};
use crate::posting::Posting;
use crate::storage::{RunStatus, Storage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// SQLite-based batch sink
///
/// Writes run on the blocking pool so a slow disk does not stall the
/// crawler's event loop.
pub struct SqliteSink {
    storage: Arc<Mutex<dyn Storage>>,
    run_id: i64,
    stored: AtomicU64,
}

impl SqliteSink {
    /// Creates a new SQLite sink
    ///
    /// # Arguments
    ///
    /// * `storage` - The storage backend to use
    /// * `run_id` - The current run ID
    ///
    /// # Returns
    ///
    /// A new SqliteSink instance
    pub fn new(storage: Arc<Mutex<dyn Storage>>, run_id: i64) -> Self {
        Self {
            storage,
            run_id,
            stored: AtomicU64::new(0),
        }
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Number of postings written by this sink so far
    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    /// Closes the run record with its final status and row count
    ///
    /// # Arguments
    ///
    /// * `status` - `Completed` or `Failed`
    /// * `rows_read` - Listing rows read by the crawl
    pub fn finalize(&self, status: RunStatus, rows_read: u64) -> OutputResult<()> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|e| OutputError::Storage(format!("Failed to lock storage: {}", e)))?;

        match status {
            RunStatus::Failed => storage.fail_run(self.run_id, rows_read),
            _ => storage.complete_run(self.run_id, rows_read),
        }
        .map_err(|e| OutputError::Storage(e.to_string()))
    }
}

#[async_trait]
impl BatchSink for SqliteSink {
    async fn accept(&self, batch: Vec<Posting>) -> OutputResult<()> {
        let storage = Arc::clone(&self.storage);
        let run_id = self.run_id;

        let written = tokio::task::spawn_blocking(move || {
            let mut storage = storage
                .lock()
                .map_err(|e| OutputError::Storage(format!("Failed to lock storage: {}", e)))?;

            storage
                .upsert_postings(run_id, &batch)
                .map_err(|e| OutputError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| OutputError::Write(format!("Storage task failed: {}", e)))??;

        self.stored.fetch_add(written as u64, Ordering::Relaxed);
        tracing::debug!("Stored {} postings for run {}", written, run_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
