//! Stellwerk main entry point
//!
//! This is the command-line interface for the Stellwerk listing crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use stellwerk::config::{load_config_with_hash, Config, EngineKind, RuntimeInput};
use stellwerk::crawler::{build_launcher, crawl};
use stellwerk::output::{BatchSink, JsonLinesSink};
use stellwerk::storage::{Storage, SqliteStorage};
use tracing_subscriber::EnvFilter;

/// Stellwerk: a resilient crawler for paginated job listings
///
/// Stellwerk pages through a "load more" listing, enriches every posting
/// from its detail page with a pool of browser sessions, and stores the
/// results in SQLite and optionally as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "stellwerk")]
#[command(version)]
#[command(about = "A resilient crawler for paginated job listings", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// JSON runtime input overriding parallelCompanyCrawlers and searchUrl
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Write every stored posting to FILE as JSON lines and exit
    #[arg(long, value_name = "FILE", conflicts_with_all = ["dry_run", "stats"])]
    export: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let input = match &cli.input {
        Some(path) => {
            tracing::info!("Loading runtime input from: {}", path.display());
            Some(
                RuntimeInput::load(path)
                    .with_context(|| format!("Failed to load runtime input {}", path.display()))?,
            )
        }
        None => None,
    };

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config, input.as_ref()) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(path) = &cli.export {
        handle_export(&config, path).await
    } else {
        handle_crawl(&config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("stellwerk=info,warn"),
            1 => EnvFilter::new("stellwerk=debug,info"),
            2 => EnvFilter::new("stellwerk=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Stellwerk Dry Run ===\n");

    println!("Crawl:");
    println!("  Search URL: {}", config.crawl.search_url);
    println!("  Detail URL template: {}", config.crawl.detail_url_template);
    println!(
        "  Enrichment sessions: {}",
        config.crawl.parallel_company_crawlers
    );
    println!(
        "  Cleanup every: {} rows / {} detail pages",
        config.crawl.cleanup_every_rows, config.crawl.detail_cleanup_every
    );

    println!("\nEngine:");
    match config.browser.engine {
        EngineKind::Chrome => {
            println!("  Chrome (headless: {})", config.browser.headless);
            if let Some(executable) = &config.browser.executable {
                println!("  Executable: {}", executable.display());
            }
            println!("  Extensions: {}", config.browser.extensions.len());
        }
        EngineKind::Static => println!("  Static HTML (user agent: {})", config.browser.user_agent),
    }
    println!(
        "  Viewport: {}x{}",
        config.browser.viewport_width, config.browser.viewport_height
    );
    println!(
        "  Navigation timeout: {}ms",
        config.browser.navigation_timeout_ms
    );

    println!("\nListing Layout:");
    for (key, template) in config.layout.listing_templates() {
        println!("  {}: {}", key, template);
    }
    println!("\nSelectors:");
    for (key, selector) in config.layout.selectors() {
        println!("  {}: {}", key, selector);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(path) = &config.output.jsonl_path {
        println!("  JSON lines: {}", path);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would crawl {} with {} enrichment sessions",
        config.crawl.search_url, config.crawl.parallel_company_crawlers
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use stellwerk::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes stored postings as JSON lines
async fn handle_export(config: &Config, path: &Path) -> anyhow::Result<()> {
    println!("=== Exporting Postings ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", path.display());
    println!();

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let postings = storage.export_postings()?;
    let count = postings.len();

    let sink = JsonLinesSink::create(path).await?;
    sink.accept(postings).await?;

    println!("✓ Exported {} postings to: {}", count, path.display());

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling {} with {} enrichment sessions ({:?} engine)",
        config.crawl.search_url,
        config.crawl.parallel_company_crawlers,
        config.browser.engine
    );

    let launcher = build_launcher(&config.browser).context("Failed to set up rendering engine")?;

    match crawl(config, config_hash, launcher).await {
        Ok(outcome) => {
            tracing::info!(
                "Crawl completed successfully: run {}, {} rows read, {} postings stored",
                outcome.run_id,
                outcome.rows_read,
                outcome.stored
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
