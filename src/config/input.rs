//! Runtime input supplied by a hosting environment
//!
//! A JSON object with camelCase keys whose fields override the matching
//! entries of the TOML configuration.

use crate::config::types::Config;
use crate::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Overrides read from the runtime input file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInput {
    pub parallel_company_crawlers: Option<usize>,
    pub search_url: Option<String>,
}

impl RuntimeInput {
    /// Reads a runtime input file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the JSON input
    ///
    /// # Returns
    ///
    /// * `Ok(RuntimeInput)` - The parsed overrides
    /// * `Err(ConfigError)` - The file is missing or not a valid input object
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes every present override into `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(workers) = self.parallel_company_crawlers {
            config.crawl.parallel_company_crawlers = workers;
        }
        if let Some(url) = &self.search_url {
            config.crawl.search_url = url.clone();
        }
    }
}
