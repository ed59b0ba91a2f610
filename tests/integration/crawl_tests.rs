//! Integration tests for the crawler
//!
//! These tests use wiremock to serve listing and detail pages to the static
//! engine and run the full crawl cycle end-to-end against a temporary
//! database.

use std::io::Write;
use std::path::Path;
use stellwerk::config::{load_config_with_hash, Config};
use stellwerk::crawler::{build_launcher, crawl};
use stellwerk::storage::{RunStatus, SqliteStorage, Storage};
use stellwerk::Posting;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn row(i: usize) -> String {
    format!(
        r#"<li class="posting"><div class="posting-body">
            <span id="company-name-{i}">Firma {i} GmbH</span>
            <a id="detail-link-{i}" href="/company/firma-{i}">Details</a>
            <span id="job-title-{i}" title="Rust Entwickler (m/w/d) #{i}">Rust Entwickler</span>
            <span id="location-{i}">Berlin</span>
            <span id="start-date-{i}">ab sofort</span>
            <span id="post-date-{i}">0{d}.04.2024</span>
        </div></li>"#,
        i = i,
        d = 1 + i % 9
    )
}

fn listing_page(rows: std::ops::Range<usize>, next: Option<&str>) -> String {
    let rows: String = rows.map(row).collect();
    let more = next
        .map(|href| format!(r#"<button id="load-more" data-href="{}">Mehr laden</button>"#, href))
        .unwrap_or_default();
    format!(
        "<html><head><title>Jobs</title></head><body><ul>{}</ul>{}</body></html>",
        rows, more
    )
}

fn detail_page(i: usize) -> String {
    format!(
        r#"<html><body>
        <div class="company-address">Hauptstraße {i}, 1011{i} Berlin</div>
        <div class="company-description">Bewerbungen an Jobs{i}@Firma.example oder +49 30 55500{i}</div>
        <a class="company-website" href="https://firma{i}.example/">Website</a>
        <div class="company-size">1.2{i}0 Mitarbeitende</div>
        </body></html>"#,
        i = i
    )
}

async fn mount_html(server: &MockServer, route: &str, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

/// Serves a listing of two pages (4 + 3 rows) with detail pages for all rows
/// except those in `broken`, which answer with a server error
async fn serve_site(server: &MockServer, broken: &[usize]) {
    mount_html(server, "/", 200, "<html><body>Start</body></html>".to_string()).await;
    mount_html(server, "/listing", 200, listing_page(0..4, Some("/listing/2"))).await;
    mount_html(server, "/listing/2", 200, listing_page(4..7, None)).await;

    for i in 0..7 {
        let route = format!("/company/firma-{}", i);
        if broken.contains(&i) {
            mount_html(server, &route, 500, "<html><body>Fehler</body></html>".to_string()).await;
        } else {
            mount_html(server, &route, 200, detail_page(i)).await;
        }
    }
}

fn write_config(base_url: &str, dir: &TempDir, extra_output: &str) -> NamedTempFile {
    let db_path = dir.path().join("postings.db");
    let content = format!(
        r#"
[crawl]
search-url = "{base}/listing"
parallel-company-crawlers = 3
detail-url-template = "{base}/company/{{id}}"
close-grace-ms = 0

[browser]
engine = "static"
navigation-timeout-ms = 5000
network-idle-timeout-ms = 100
user-agent = "stellwerk-tests"

[retry]
navigation-backoff-ms = 1
primary-navigation-retries = 2
warm-up-retries = 1
in-app-retries = 1
full-load-retries = 1
detail-attempts = 1
detail-backoff-ms = 1
pagination-attempts = 2
pagination-backoff-ms = 1
pagination-wait-ms = 50
poll-interval-ms = 5

[output]
database-path = "{db}"
{extra}
"#,
        base = base_url,
        db = db_path.display(),
        extra = extra_output
    );

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn load(file: &NamedTempFile) -> (Config, String) {
    load_config_with_hash(file.path(), None).expect("valid test config")
}

fn open_db(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.output.database_path)).unwrap()
}

#[tokio::test]
async fn test_full_crawl_stores_enriched_postings() {
    let server = MockServer::start().await;
    serve_site(&server, &[]).await;

    let dir = TempDir::new().unwrap();
    let file = write_config(&server.uri(), &dir, "");
    let (config, hash) = load(&file);

    let launcher = build_launcher(&config.browser).unwrap();
    let outcome = crawl(&config, &hash, launcher).await.unwrap();

    assert_eq!(outcome.rows_read, 7);
    assert_eq!(outcome.stored, 7);

    let storage = open_db(&config);
    assert_eq!(storage.count_postings().unwrap(), 7);

    let run = storage.get_run(outcome.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.rows_read, 7);
    assert_eq!(run.config_hash, hash);

    let posting = storage.get_posting("firma-3").unwrap().unwrap();
    assert_eq!(posting.company_name, "Firma 3 GmbH");
    assert_eq!(posting.job_title.as_deref(), Some("Rust Entwickler (m/w/d) #3"));
    assert_eq!(posting.city.as_deref(), Some("Berlin"));
    assert_eq!(posting.start_date.as_deref(), Some("ab sofort"));
    assert_eq!(
        posting.post_date.map(|d| d.format("%Y-%m-%d").to_string()).as_deref(),
        Some("2024-04-04")
    );
    assert_eq!(posting.postal_code, Some(10113));
    assert_eq!(posting.street.as_deref(), Some("Hauptstraße 3"));
    assert_eq!(posting.email.as_deref(), Some("jobs3@firma.example"));
    assert_eq!(posting.phone.as_deref(), Some("030 555003"));
    assert_eq!(posting.website.as_deref(), Some("https://firma3.example/"));
    assert_eq!(posting.company_size, Some(1230));
    assert_eq!(
        posting.search_url.as_deref(),
        Some(format!("{}/listing", server.uri()).as_str())
    );
}

#[tokio::test]
async fn test_unreachable_detail_page_leaves_fields_empty() {
    let server = MockServer::start().await;
    serve_site(&server, &[5]).await;

    let dir = TempDir::new().unwrap();
    let file = write_config(&server.uri(), &dir, "");
    let (config, hash) = load(&file);

    let outcome = crawl(&config, &hash, build_launcher(&config.browser).unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.rows_read, 7);

    let storage = open_db(&config);
    let skipped = storage.get_posting("firma-5").unwrap().unwrap();
    assert!(!skipped.is_enriched());
    assert_eq!(skipped.company_name, "Firma 5 GmbH");

    let coverage = storage.get_coverage().unwrap();
    assert_eq!(coverage.total, 7);
    assert_eq!(coverage.enriched, 6);
}

#[tokio::test]
async fn test_jsonl_output_preserves_listing_order() {
    let server = MockServer::start().await;
    serve_site(&server, &[]).await;

    let dir = TempDir::new().unwrap();
    let jsonl = dir.path().join("postings.jsonl");
    let file = write_config(
        &server.uri(),
        &dir,
        &format!("jsonl-path = \"{}\"", jsonl.display()),
    );
    let (config, hash) = load(&file);

    crawl(&config, &hash, build_launcher(&config.browser).unwrap())
        .await
        .unwrap();

    let content = std::fs::read_to_string(&jsonl).unwrap();
    let ids: Vec<String> = content
        .lines()
        .map(|line| serde_json::from_str::<Posting>(line).unwrap().id)
        .collect();
    let expected: Vec<String> = (0..7).map(|i| format!("firma-{}", i)).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_second_run_upserts_instead_of_duplicating() {
    let server = MockServer::start().await;
    serve_site(&server, &[]).await;

    let dir = TempDir::new().unwrap();
    let file = write_config(&server.uri(), &dir, "");
    let (config, hash) = load(&file);

    crawl(&config, &hash, build_launcher(&config.browser).unwrap())
        .await
        .unwrap();
    let second = crawl(&config, &hash, build_launcher(&config.browser).unwrap())
        .await
        .unwrap();

    let storage = open_db(&config);
    assert_eq!(storage.count_runs().unwrap(), 2);
    assert_eq!(storage.count_postings().unwrap(), 7);
    assert_eq!(storage.get_latest_run().unwrap().unwrap().id, second.run_id);
}

#[tokio::test]
async fn test_unreachable_listing_fails_the_run() {
    let server = MockServer::start().await;
    mount_html(&server, "/listing", 503, "<html><body>Wartung</body></html>".to_string()).await;

    let dir = TempDir::new().unwrap();
    let file = write_config(&server.uri(), &dir, "");
    let (config, hash) = load(&file);

    let result = crawl(&config, &hash, build_launcher(&config.browser).unwrap()).await;
    assert!(result.is_err());

    let storage = open_db(&config);
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.rows_read, 0);
    assert_eq!(storage.count_postings().unwrap(), 0);
}
