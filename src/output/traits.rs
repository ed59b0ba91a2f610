//! Output sink traits and error types
//!
//! This module defines the trait interface batches are delivered through
//! and the associated error types.

use crate::posting::Posting;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receiver of enriched batches
///
/// The crawler calls `accept` once per closed batch, in listing order, and
/// never asks for batch N+1 before the call for batch N has returned.
/// Implementations must be safe to move onto a spawned task.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Persists one batch
    ///
    /// # Arguments
    ///
    /// * `batch` - Postings of one listing page, enriched where possible
    async fn accept(&self, batch: Vec<Posting>) -> OutputResult<()>;

    /// Short name used in log lines
    fn name(&self) -> &str;
}
