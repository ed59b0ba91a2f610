//! Crawler module for listing traversal and enrichment
//!
//! This module contains the core crawling logic, including:
//! - Reading postings from index-addressed listing rows
//! - Driving "load more" pagination
//! - Enriching batches from detail pages with a pool of sessions
//! - Overall crawl coordination and batch hand-off

mod coordinator;
mod enrichment;
mod listing;
mod pagination;

pub use coordinator::{crawl, CoordinatorSettings, CrawlOutcome, Coordinator};
pub use enrichment::{distribute, DetailLayout, EnrichmentPolicy, EnrichmentPool, EnrichmentReport};
pub use listing::{read_row, ListingLayout, INDEX_PLACEHOLDER};
pub use pagination::{load_next_page, PaginationPolicy};

use crate::config::{BrowserConfig, EngineKind};
use crate::engine::{ChromeLauncher, DocumentSource, EngineResult, Launcher, StaticLauncher};
use crate::output::OutputError;
use crate::session::SessionError;
use crate::UrlError;
use std::sync::Arc;
use thiserror::Error;

/// Errors that end or interrupt a crawl step
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Listing row {index} has no usable detail link")]
    MissingSiteId { index: usize },

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Batch hand-off task failed: {0}")]
    Join(String),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),
}

/// Builds the launcher for the configured rendering engine
///
/// # Arguments
///
/// * `browser` - The `[browser]` configuration section
///
/// # Returns
///
/// * `Ok(Arc<dyn Launcher>)` - A launcher shared by every session
/// * `Err(EngineError)` - The HTTP client for the static engine could not be built
pub fn build_launcher(browser: &BrowserConfig) -> EngineResult<Arc<dyn Launcher>> {
    match browser.engine {
        EngineKind::Chrome => Ok(Arc::new(ChromeLauncher::new(browser.chrome_options()))),
        EngineKind::Static => {
            let source = DocumentSource::http(&browser.user_agent, browser.navigation_timeout())?;
            Ok(Arc::new(StaticLauncher::new(source)))
        }
    }
}
