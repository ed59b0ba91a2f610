use crate::config::types::{BrowserConfig, Config, CrawlConfig, LayoutConfig, OutputConfig, RetryConfig};
use crate::crawler::INDEX_PLACEHOLDER;
use crate::url::{parse_http_url, DetailUrlTemplate};
use crate::ConfigError;
use scraper::Selector;

/// Largest enrichment pool accepted
pub const MAX_PARALLEL_COMPANY_CRAWLERS: usize = 32;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_browser_config(&config.browser)?;
    validate_retry_config(&config.retry)?;
    validate_layout_config(&config.layout)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawl configuration
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.search_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "search-url must be set in [crawl] or supplied as searchUrl input".to_string(),
        ));
    }

    parse_http_url(&config.search_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid search-url: {}", e)))?;

    if config.parallel_company_crawlers < 1
        || config.parallel_company_crawlers > MAX_PARALLEL_COMPANY_CRAWLERS
    {
        return Err(ConfigError::Validation(format!(
            "parallel-company-crawlers must be between 1 and {}, got {}",
            MAX_PARALLEL_COMPANY_CRAWLERS, config.parallel_company_crawlers
        )));
    }

    DetailUrlTemplate::new(&config.detail_url_template)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid detail-url-template: {}", e)))?;

    Ok(())
}

/// Validates rendering engine configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.viewport_width == 0 || config.viewport_height == 0 {
        return Err(ConfigError::Validation(format!(
            "viewport must be non-zero, got {}x{}",
            config.viewport_width, config.viewport_height
        )));
    }

    if config.navigation_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "navigation-timeout-ms must be > 0".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry budgets
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    for (key, count) in [
        ("primary-navigation-retries", config.primary_navigation_retries),
        ("warm-up-retries", config.warm_up_retries),
        ("in-app-retries", config.in_app_retries),
        ("full-load-retries", config.full_load_retries),
        ("detail-attempts", config.detail_attempts),
        ("pagination-attempts", config.pagination_attempts),
    ] {
        if count < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                key, count
            )));
        }
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll-interval-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates listing templates and detail selectors
fn validate_layout_config(config: &LayoutConfig) -> Result<(), ConfigError> {
    for (key, template) in config.listing_templates() {
        if !template.contains(INDEX_PLACEHOLDER) {
            return Err(ConfigError::Validation(format!(
                "layout {} '{}' must contain {}",
                key, template, INDEX_PLACEHOLDER
            )));
        }
    }

    for (key, selector) in config.selectors() {
        validate_selector(key, selector)?;
    }

    Ok(())
}

fn validate_selector(key: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector).map_err(|e| {
        ConfigError::InvalidSelector(format!("layout {} '{}': {:?}", key, selector, e))
    })?;
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if let Some(path) = &config.jsonl_path {
        if path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "jsonl-path cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        toml::from_str(
            r#"
[crawl]
search-url = "https://jobs.example/search?q=rust"
detail-url-template = "https://jobs.example/company/{id}"

[output]
database-path = "./postings.db"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&config()).is_ok());
    }

    #[test]
    fn test_pool_size_bounds() {
        let mut config = config();
        config.crawl.parallel_company_crawlers = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));

        config.crawl.parallel_company_crawlers = MAX_PARALLEL_COMPANY_CRAWLERS;
        assert!(validate(&config).is_ok());

        config.crawl.parallel_company_crawlers = MAX_PARALLEL_COMPANY_CRAWLERS + 1;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_search_url_must_be_http() {
        let mut config = config();
        config.crawl.search_url = "ftp://jobs.example/".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_detail_template_needs_placeholder() {
        let mut config = config();
        config.crawl.detail_url_template = "https://jobs.example/company/".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_listing_template_needs_index() {
        let mut config = config();
        config.layout.post_date = "post-date".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_selector() {
        let mut config = config();
        config.layout.address = "div[".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_retry_counts_must_be_positive() {
        let mut config = config();
        config.retry.detail_attempts = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_viewport_must_be_non_zero() {
        let mut config = config();
        config.browser.viewport_height = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_database_path_required() {
        let mut config = config();
        config.output.database_path = " ".to_string();
        assert!(validate(&config).is_err());
    }
}
