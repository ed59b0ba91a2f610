//! Flow-control utilities
//!
//! Bounded retry with exponential backoff and a condition poller with a
//! deadline. Both are generic over the operation they drive so the session,
//! pagination and enrichment layers can share them.

mod retry;
mod wait;

pub use retry::{backoff_delay, retry_with_backoff, RetryError, RetryPolicy};
pub use wait::wait_for;

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the flow-control utilities
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("condition not met within {0:?}")]
    Timeout(Duration),
}
