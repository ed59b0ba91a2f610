//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Opening the primary session and the enrichment pool
//! - Reading listing rows into batches
//! - Enriching each closed batch and handing it to the sink
//! - Paginating until the listing is exhausted
//! - Recording the run in storage

use crate::config::Config;
use crate::crawler::enrichment::EnrichmentPool;
use crate::crawler::listing::{read_row, ListingLayout};
use crate::crawler::pagination::{load_next_page, PaginationPolicy};
use crate::crawler::CrawlError;
use crate::engine::Launcher;
use crate::output::{BatchSink, JsonLinesSink, OutputResult, SinkSet, SqliteSink};
use crate::posting::Posting;
use crate::session::{NavigationStrategy, Session};
use crate::storage::{open_storage, RunStatus, Storage};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Orchestration knobs that are not owned by a sub-component
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    /// Attempts for opening the search URL on the primary session
    pub primary_retries: u32,
    /// Clean up every session after this many rows have been read
    pub cleanup_every: usize,
    /// Idle time before sessions are closed
    pub close_grace: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            primary_retries: 5,
            cleanup_every: 50,
            close_grace: Duration::from_secs(2),
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    primary: Session,
    pool: EnrichmentPool,
    listing: ListingLayout,
    pagination: PaginationPolicy,
    settings: CoordinatorSettings,
    rows_read: usize,
}

impl Coordinator {
    /// Creates a coordinator from already opened sessions
    pub fn new(
        primary: Session,
        pool: EnrichmentPool,
        listing: ListingLayout,
        pagination: PaginationPolicy,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            primary,
            pool,
            listing,
            pagination,
            settings,
            rows_read: 0,
        }
    }

    /// Opens the primary session and the enrichment pool for a configuration
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `launcher` - Launcher shared by every session
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Every session launched
    /// * `Err(CrawlError)` - A session could not be launched or the detail
    ///   template is invalid
    pub async fn open(config: &Config, launcher: Arc<dyn Launcher>) -> Result<Self, CrawlError> {
        let session_settings = config.session_settings();
        let template = config.detail_template()?;

        let mut primary = Session::open("primary", Arc::clone(&launcher), session_settings).await?;

        let pool = match EnrichmentPool::open(
            config.crawl.parallel_company_crawlers,
            launcher,
            session_settings,
            config.detail_layout(),
            config.enrichment_policy(),
            template,
        )
        .await
        {
            Ok(pool) => pool,
            Err(e) => {
                primary.close().await;
                return Err(e);
            }
        };

        Ok(Self::new(
            primary,
            pool,
            config.listing_layout(),
            config.pagination_policy(),
            config.coordinator_settings(),
        ))
    }

    /// Rows successfully read so far
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// Runs the main crawl loop
    ///
    /// Reads listing rows until the loaded ones are exhausted or a row cannot
    /// be read, closes the batch, enriches it and hands it to `sink`, then
    /// loads the next page. An unreadable row is skipped; when the rows after
    /// it are already loaded, reading resumes without paginating.
    /// Hand-offs run one at a time on a spawned task while the next page is
    /// read; the sink never sees a batch before the previous `accept` has
    /// returned.
    ///
    /// # Arguments
    ///
    /// * `search_url` - The listing to crawl
    /// * `sink` - Receiver of enriched batches
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Total rows read
    /// * `Err(CrawlError)` - The listing could not be opened or the sink failed
    pub async fn run(&mut self, search_url: &str, sink: Arc<dyn BatchSink>) -> Result<usize, CrawlError> {
        tracing::info!("Opening listing {}", search_url);
        self.primary
            .navigate(search_url, NavigationStrategy::FullLoad, self.settings.primary_retries)
            .await?;
        self.pool.warm_up().await?;

        let start_time = std::time::Instant::now();
        let mut index = 0usize;
        let mut batch: Vec<Posting> = Vec::new();
        let mut batches = 0usize;
        let mut pending: Option<JoinHandle<OutputResult<()>>> = None;

        loop {
            let row_failed = match read_row(&self.primary, &self.listing, index).await {
                Ok(Some(posting)) => {
                    batch.push(posting);
                    index += 1;
                    self.rows_read += 1;

                    if self.rows_read % 10 == 0 {
                        let rate = self.rows_read as f64 / start_time.elapsed().as_secs_f64();
                        tracing::info!(
                            "Progress: {} rows read, {} batches handed off, {:.2} rows/sec",
                            self.rows_read,
                            batches,
                            rate
                        );
                    }

                    if self.settings.cleanup_every > 0 && self.rows_read % self.settings.cleanup_every == 0 {
                        tracing::debug!("Cleaning up sessions after {} rows", self.rows_read);
                        self.primary.cleanup_memory().await;
                        self.pool.cleanup_memory().await;
                    }
                    continue;
                }
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!("Listing row {} unreadable, closing batch: {}", index, e);
                    index += 1;
                    true
                }
            };

            if !batch.is_empty() {
                let mut closed = std::mem::take(&mut batch);
                for posting in closed.iter_mut() {
                    posting.tag_search_url(search_url);
                }

                self.pool.enrich(&mut closed).await;

                if let Some(previous) = pending.take() {
                    finish_handoff(previous).await?;
                }

                batches += 1;
                tracing::debug!("Handing off batch {} ({} postings)", batches, closed.len());
                let sink = Arc::clone(&sink);
                pending = Some(tokio::spawn(async move { sink.accept(closed).await }));
            }

            // Rows after a failed one may already be loaded
            if row_failed
                && self
                    .primary
                    .has_element(&self.listing.row(index))
                    .await
                    .unwrap_or(false)
            {
                continue;
            }

            if !load_next_page(&self.primary, &self.listing, index, &self.pagination).await {
                break;
            }
        }

        if let Some(previous) = pending.take() {
            finish_handoff(previous).await?;
        }

        tracing::info!(
            "Crawl completed: {} rows in {} batches in {:?}",
            self.rows_read,
            batches,
            start_time.elapsed()
        );

        Ok(self.rows_read)
    }

    /// Idles for the grace period, then closes every session
    pub async fn close(&mut self) {
        tokio::time::sleep(self.settings.close_grace).await;
        self.primary.close().await;
        self.pool.close().await;
        tracing::debug!("Closed all sessions");
    }
}

async fn finish_handoff(handle: JoinHandle<OutputResult<()>>) -> Result<(), CrawlError> {
    handle
        .await
        .map_err(|e| CrawlError::Join(e.to_string()))??;
    Ok(())
}

/// What a finished crawl produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub run_id: i64,
    pub rows_read: usize,
    pub stored: u64,
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the storage layer and record a new run
/// 2. Assemble the configured sinks
/// 3. Open the primary session and the enrichment pool
/// 4. Crawl the listing
/// 5. Close the sessions and finish the run record
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration, stored with the run
/// * `launcher` - Launcher for the configured engine
///
/// # Returns
///
/// * `Ok(CrawlOutcome)` - Crawl completed successfully
/// * `Err(StellwerkError)` - Crawl failed; the run is recorded as failed
pub async fn crawl(
    config: &Config,
    config_hash: &str,
    launcher: Arc<dyn Launcher>,
) -> crate::Result<CrawlOutcome> {
    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    let run_id = storage.create_run(&config.crawl.search_url, config_hash)?;
    tracing::info!("Starting crawl run {}", run_id);

    let storage: Arc<Mutex<dyn Storage>> = Arc::new(Mutex::new(storage));
    let sqlite = Arc::new(SqliteSink::new(storage, run_id));
    let mut sinks = SinkSet::new().with(sqlite.clone());

    if let Some(path) = &config.output.jsonl_path {
        match JsonLinesSink::append(Path::new(path)).await {
            Ok(jsonl) => sinks = sinks.with(Arc::new(jsonl)),
            Err(e) => {
                sqlite.finalize(RunStatus::Failed, 0)?;
                return Err(e.into());
            }
        }
    }

    let mut coordinator = match Coordinator::open(config, launcher).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            tracing::error!("Could not start crawl run {}: {}", run_id, e);
            sqlite.finalize(RunStatus::Failed, 0)?;
            return Err(e.into());
        }
    };

    let result = coordinator
        .run(&config.crawl.search_url, Arc::new(sinks))
        .await;
    coordinator.close().await;

    let rows_read = coordinator.rows_read();
    match result {
        Ok(_) => {
            sqlite.finalize(RunStatus::Completed, rows_read as u64)?;
            tracing::info!(
                "Run {} completed: {} rows read, {} postings stored",
                run_id,
                rows_read,
                sqlite.stored()
            );
            Ok(CrawlOutcome {
                run_id,
                rows_read,
                stored: sqlite.stored(),
            })
        }
        Err(e) => {
            tracing::error!("Run {} failed after {} rows: {}", run_id, rows_read, e);
            sqlite.finalize(RunStatus::Failed, rows_read as u64)?;
            Err(e.into())
        }
    }
}
