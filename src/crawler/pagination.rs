//! Pagination driver
//!
//! Loads the next listing page by clicking the "load more" control and
//! waiting for the next expected row to appear.

use crate::crawler::listing::ListingLayout;
use crate::flow::{retry_with_backoff, wait_for, FlowError, RetryPolicy};
use crate::session::{Session, SessionError};
use std::time::Duration;
use thiserror::Error;

/// Retry and wait bounds for loading one more page
#[derive(Debug, Clone, Copy)]
pub struct PaginationPolicy {
    pub retry: RetryPolicy,
    /// How long to wait for the next row after each click
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for PaginationPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(5, Duration::from_secs(5)),
            wait_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Error)]
enum PageLoadError {
    #[error("load-more control unusable: {0}")]
    Click(SessionError),

    #[error("next row did not appear: {0}")]
    NoNewRows(FlowError),
}

/// Loads the next page of the listing
///
/// # Arguments
///
/// * `session` - The primary session showing the listing
/// * `layout` - Where the load-more control and rows live
/// * `expected_index` - Index of the first row the next page should bring
/// * `policy` - Attempts, backoff and per-attempt wait
///
/// # Returns
///
/// `true` once row `expected_index` exists. `false` when every attempt
/// failed, which covers both the end of the listing and a stuck page; the
/// two cannot be told apart from the page.
pub async fn load_next_page(
    session: &Session,
    layout: &ListingLayout,
    expected_index: usize,
    policy: &PaginationPolicy,
) -> bool {
    let next_row = layout.row(expected_index);
    let next_row = &next_row;

    let outcome = retry_with_backoff(policy.retry, |attempt| async move {
        tracing::trace!("Loading more rows (attempt {})", attempt);
        session
            .click_button(&layout.load_more)
            .await
            .map_err(PageLoadError::Click)?;

        wait_for(
            || async move { session.has_element(next_row).await.unwrap_or(false) },
            policy.wait_timeout,
            policy.poll_interval,
        )
        .await
        .map_err(PageLoadError::NoNewRows)
    })
    .await;

    match outcome {
        Ok(()) => {
            tracing::debug!("Loaded next page starting at row {}", expected_index);
            true
        }
        Err(e) => {
            tracing::info!(
                "Pagination stopped before row {} after {} attempts ({}); end of listing or stuck page",
                expected_index,
                e.attempts,
                e.last
            );
            false
        }
    }
}
