use crate::config::input::RuntimeInput;
use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use stellwerk::config::load_config;
///
/// let config = load_config(Path::new("stellwerk.toml")).unwrap();
/// println!("Listing: {}", config.crawl.search_url);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_input(path, None)
}

/// Loads a configuration, applies runtime input overrides, then validates
///
/// Validation runs after the overrides so an input may supply a search URL
/// the file leaves out.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
/// * `input` - Overrides from the hosting environment, if any
///
/// # Returns
///
/// * `Ok(Config)` - The merged, validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config_with_input(
    path: &Path,
    input: Option<&RuntimeInput>,
) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    if let Some(input) = input {
        input.apply(&mut config);
    }

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is stored with each run so results can be traced back to the
/// configuration that produced them.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
/// * `input` - Overrides from the hosting environment, if any
///
/// # Returns
///
/// * `Ok((Config, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load or parse the configuration
pub fn load_config_with_hash(
    path: &Path,
    input: Option<&RuntimeInput>,
) -> Result<(Config, String), ConfigError> {
    let config = load_config_with_input(path, input)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[crawl]
search-url = "https://jobs.example/search?q=rust"
detail-url-template = "https://jobs.example/company/{id}"

[output]
database-path = "./postings.db"
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let file = create_temp_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawl.parallel_company_crawlers, 3);
        assert_eq!(config.crawl.cleanup_every_rows, 50);
        assert_eq!(config.browser.engine, EngineKind::Chrome);
        assert_eq!(config.browser.viewport_width, 1366);
        assert_eq!(config.retry.pagination_attempts, 5);
        assert_eq!(config.layout.company_name, "company-name-{index}");
        assert_eq!(config.layout.load_more, "#load-more");
        assert!(config.output.jsonl_path.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let config_content = r##"
[crawl]
search-url = "https://jobs.example/search?q=rust"
parallel-company-crawlers = 6
detail-url-template = "https://jobs.example/company/{id}"
cleanup-every-rows = 25
close-grace-ms = 0

[browser]
engine = "static"
headless = false
extensions = ["/opt/ext/consent"]
viewport-width = 1920
viewport-height = 1080
user-agent = "test-agent"

[retry]
pagination-attempts = 3
detail-backoff-ms = 100

[layout]
company-name = "name-{index}"
row-container-depth = 3
address = "#address"

[output]
database-path = "./test.db"
jsonl-path = "./test.jsonl"
"##;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawl.parallel_company_crawlers, 6);
        assert_eq!(config.browser.engine, EngineKind::Static);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.extensions.len(), 1);
        assert_eq!(config.retry.pagination_attempts, 3);
        assert_eq!(config.retry.in_app_retries, 2);
        assert_eq!(config.layout.row_container_depth, 3);
        assert_eq!(config.layout.job_title, "job-title-{index}");
        assert_eq!(config.output.jsonl_path.as_deref(), Some("./test.jsonl"));

        assert_eq!(config.pagination_policy().retry.attempts, 3);
        assert_eq!(config.listing_layout().row(4).as_css(), "[id=\"name-4\"]");
        assert_eq!(config.coordinator_settings().cleanup_every, 25);
    }

    #[test]
    fn test_input_overrides_file() {
        let file = create_temp_config(MINIMAL);
        let input = RuntimeInput {
            parallel_company_crawlers: Some(8),
            search_url: Some("https://jobs.example/search?q=go".to_string()),
        };

        let config = load_config_with_input(file.path(), Some(&input)).unwrap();
        assert_eq!(config.crawl.parallel_company_crawlers, 8);
        assert_eq!(config.crawl.search_url, "https://jobs.example/search?q=go");
    }

    #[test]
    fn test_input_can_supply_missing_search_url() {
        let file = create_temp_config(
            r#"
[crawl]
detail-url-template = "https://jobs.example/company/{id}"

[output]
database-path = "./postings.db"
"#,
        );

        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Validation(_))
        ));

        let input = RuntimeInput {
            search_url: Some("https://jobs.example/search".to_string()),
            ..RuntimeInput::default()
        };
        assert!(load_config_with_input(file.path(), Some(&input)).is_ok());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/stellwerk.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_engine_is_a_parse_error() {
        let file = create_temp_config(&format!("{}\n[browser]\nengine = \"gecko\"\n", MINIMAL));
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }
}
