//! Configuration module for Stellwerk
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and applying runtime input overrides on top of them.
//!
//! # Example
//!
//! ```no_run
//! use stellwerk::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("stellwerk.toml")).unwrap();
//! println!("Enrichment sessions: {}", config.crawl.parallel_company_crawlers);
//! ```

mod input;
mod parser;
mod types;
mod validation;

// Re-export types
pub use input::RuntimeInput;
pub use types::{
    BrowserConfig, Config, CrawlConfig, EngineKind, LayoutConfig, OutputConfig, RetryConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, load_config_with_input};
pub use validation::validate;
