//! Statistics generation from the postings database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{CoverageRecord, RunRecord, Storage, StorageResult};

/// Number of cities listed in the statistics report
pub const TOP_CITIES: usize = 10;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Number of recorded runs
    pub total_runs: u64,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Detail-field coverage over all stored postings
    pub coverage: CoverageRecord,

    /// Cities with the most postings
    pub top_cities: Vec<(String, u64)>,
}

impl CrawlStatistics {
    /// Share of postings with at least one detail field, as a percentage
    pub fn enrichment_rate(&self) -> f64 {
        percentage(self.coverage.enriched, self.coverage.total)
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64) * 100.0
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<CrawlStatistics> {
    Ok(CrawlStatistics {
        total_runs: storage.count_runs()?,
        latest_run: storage.get_latest_run()?,
        coverage: storage.get_coverage()?,
        top_cities: storage.get_top_cities(TOP_CITIES)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Runs recorded: {}", stats.total_runs);
    println!("  Postings stored: {}", stats.coverage.total);
    println!();

    if let Some(run) = &stats.latest_run {
        println!("Latest Run (#{}):", run.id);
        println!("  Search URL: {}", run.search_url);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Rows read: {}", run.rows_read);
        println!();
    }

    let coverage = &stats.coverage;
    println!("Enrichment Coverage:");
    for (field, count) in [
        ("postal code", coverage.postal_code),
        ("street", coverage.street),
        ("email", coverage.email),
        ("phone", coverage.phone),
        ("website", coverage.website),
        ("company size", coverage.company_size),
    ] {
        println!(
            "  {}: {} ({:.1}%)",
            field,
            count,
            percentage(count, coverage.total)
        );
    }
    println!();

    if !stats.top_cities.is_empty() {
        println!("Top Cities ({}):", stats.top_cities.len());
        for (city, count) in &stats.top_cities {
            println!("  - {}: {}", city, count);
        }
        println!();
    }

    println!(
        "Enrichment Rate: {:.1}% ({} / {} postings enriched)",
        stats.enrichment_rate(),
        coverage.enriched,
        coverage.total
    );
}
