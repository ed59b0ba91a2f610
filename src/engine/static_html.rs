//! Static HTML engine
//!
//! Fetches documents over HTTP (or from an in-memory page set) and answers
//! element queries by parsing the current document with `scraper`. No
//! scripts run, so the engine suits server-rendered sites, offline replay
//! of captured pages, and tests.
//!
//! "Load more" controls are emulated: clicking an element with a
//! `data-href` attribute fetches that URL, removes the control and appends
//! the fetched body to the current document. Clicking an `<a href>`
//! navigates.

use super::{CrashSignal, EngineError, EngineResult, Launcher, Locator, PageDriver, RouteMethod};
use crate::extract::normalize_whitespace;
use crate::url::resolve_link;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

const BLANK_URL: &str = "about:blank";

/// Pages served by the in-memory document source, keyed by URL
#[derive(Debug, Clone, Default)]
pub struct MemoryPages {
    pages: HashMap<String, (u16, String)>,
}

impl MemoryPages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a page answered with status 200
    pub fn page(self, url: &str, html: &str) -> Self {
        self.page_with_status(url, 200, html)
    }

    pub fn page_with_status(mut self, url: &str, status: u16, html: &str) -> Self {
        self.pages.insert(page_key(url), (status, html.to_string()));
        self
    }

    /// Unknown URLs are answered with an empty 404 page
    fn get(&self, url: &str) -> (u16, String) {
        self.pages
            .get(&page_key(url))
            .cloned()
            .unwrap_or_else(|| (404, "<html><body></body></html>".to_string()))
    }
}

fn page_key(url: &str) -> String {
    Url::parse(url.trim())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.trim().to_string())
}

/// Where the static engine gets its documents from
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Http(Client),
    Memory(Arc<MemoryPages>),
}

/// A fetched document
struct Fetched {
    url: String,
    status: u16,
    body: String,
}

impl DocumentSource {
    /// Builds an HTTP source with the given user agent and request timeout
    ///
    /// # Arguments
    ///
    /// * `user_agent` - Value of the `User-Agent` header
    /// * `timeout` - Whole-request timeout
    ///
    /// # Returns
    ///
    /// * `Ok(DocumentSource)` - Source backed by a configured client
    /// * `Err(EngineError::Launch)` - The client could not be built
    pub fn http(user_agent: &str, timeout: Duration) -> EngineResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| EngineError::Launch(e.to_string()))?;

        Ok(Self::Http(client))
    }

    async fn fetch(&self, url: &str) -> EngineResult<Fetched> {
        match self {
            Self::Http(client) => {
                let response = client.get(url).send().await.map_err(|e| {
                    let message = if e.is_timeout() {
                        "request timeout".to_string()
                    } else {
                        e.to_string()
                    };
                    EngineError::Navigation {
                        url: url.to_string(),
                        message,
                    }
                })?;

                let status = response.status().as_u16();
                let final_url = response.url().to_string();
                let body = response.text().await.map_err(|e| EngineError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

                Ok(Fetched {
                    url: final_url,
                    status,
                    body,
                })
            }
            Self::Memory(pages) => {
                let (status, body) = pages.get(url);
                Ok(Fetched {
                    url: page_key(url),
                    status,
                    body,
                })
            }
        }
    }
}

/// Launches static pages over a shared document source
pub struct StaticLauncher {
    source: DocumentSource,
}

impl StaticLauncher {
    pub fn new(source: DocumentSource) -> Self {
        Self { source }
    }

    pub fn memory(pages: MemoryPages) -> Self {
        Self::new(DocumentSource::Memory(Arc::new(pages)))
    }
}

#[async_trait]
impl Launcher for StaticLauncher {
    async fn launch(&self) -> EngineResult<Box<dyn PageDriver>> {
        Ok(Box::new(StaticPage::new(self.source.clone())))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

struct Document {
    url: String,
    html: String,
}

/// One static page: the current URL and its (possibly modified) markup
pub struct StaticPage {
    source: DocumentSource,
    document: Mutex<Document>,
    closed: AtomicBool,
}

impl StaticPage {
    pub fn new(source: DocumentSource) -> Self {
        Self {
            source,
            document: Mutex::new(Document {
                url: BLANK_URL.to_string(),
                html: "<html><head></head><body></body></html>".to_string(),
            }),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn snapshot(&self) -> EngineResult<(String, String)> {
        self.ensure_open()?;
        let document = self
            .document
            .lock()
            .map_err(|_| EngineError::Unhealthy("document lock poisoned".to_string()))?;
        Ok((document.url.clone(), document.html.clone()))
    }

    fn replace(&self, url: Option<String>, html: String) -> EngineResult<()> {
        let mut document = self
            .document
            .lock()
            .map_err(|_| EngineError::Unhealthy("document lock poisoned".to_string()))?;
        if let Some(url) = url {
            document.url = url;
        }
        document.html = html;
        Ok(())
    }

    /// Runs a query against a freshly parsed copy of the current document
    fn query<R>(&self, f: impl FnOnce(&Html, &str) -> R) -> EngineResult<R> {
        let (url, source) = self.snapshot()?;
        let html = Html::parse_document(&source);
        Ok(f(&html, &url))
    }

    async fn load(&self, url: &str) -> EngineResult<u16> {
        self.ensure_open()?;
        let fetched = self.source.fetch(url).await?;
        debug!(url = %fetched.url, status = fetched.status, "Loaded static document");
        self.replace(Some(fetched.url), fetched.body)?;
        Ok(fetched.status)
    }

    /// Fetches `href` and appends its body to the current document after
    /// removing the control that was clicked
    async fn expand(&self, control: &Locator, href: &str) -> EngineResult<()> {
        let fetched = self.source.fetch(href).await?;
        if !(200..300).contains(&fetched.status) {
            return Err(EngineError::Navigation {
                url: href.to_string(),
                message: format!("status {}", fetched.status),
            });
        }

        let fragment = body_inner_html(&fetched.body);
        let (_, current) = self.snapshot()?;
        let selector = parse_selector(control)?;
        let without_control = detach_ancestor(&current, &selector, 0).unwrap_or(current);
        trace!(href, bytes = fragment.len(), "Appending fetched fragment");
        self.replace(None, append_to_body(&without_control, &fragment))
    }
}

fn parse_selector(locator: &Locator) -> EngineResult<Selector> {
    Selector::parse(locator.as_css())
        .map_err(|e| EngineError::Selector(format!("{}: {:?}", locator, e)))
}

fn body_inner_html(source: &str) -> String {
    let html = Html::parse_document(source);
    match Selector::parse("body") {
        Ok(body) => html
            .select(&body)
            .next()
            .map(|b| b.inner_html())
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

fn append_to_body(document: &str, fragment: &str) -> String {
    match document.rfind("</body>") {
        Some(pos) => format!("{}{}{}", &document[..pos], fragment, &document[pos..]),
        None => format!("{}{}", document, fragment),
    }
}

/// Removes the node `depth` levels above the first match and reserializes
fn detach_ancestor(source: &str, selector: &Selector, depth: usize) -> Option<String> {
    let mut html = Html::parse_document(source);

    let node_id = {
        let element = html.select(selector).next()?;
        let mut node = *element;
        for _ in 0..depth {
            node = node.parent()?;
        }
        if !node.value().is_element() {
            return None;
        }
        node.id()
    };

    html.tree.get_mut(node_id)?.detach();
    Some(html.html())
}

fn visible_text_of(html: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for node in html.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value().as_element().map_or(false, |e| {
                matches!(e.name(), "head" | "script" | "style" | "noscript" | "template")
            })
        });
        if !hidden {
            parts.push(&**text);
        }
    }

    normalize_whitespace(&parts.join(" "))
}

/// Builds the GET URL a form submission of `value` would produce
fn submission_url(html: &Html, selector: &Selector, value: &str, base: &str) -> Option<String> {
    let input = html.select(selector).next()?;
    let name = input.value().attr("name").unwrap_or("q").to_string();

    let action = input
        .ancestors()
        .filter_map(|a| a.value().as_element())
        .find(|e| e.name() == "form")
        .and_then(|form| form.attr("action"))
        .map(|action| resolve_link(action, Some(base)))
        .unwrap_or_else(|| base.to_string());

    let mut url = Url::parse(&action).ok()?;
    url.query_pairs_mut().clear().append_pair(&name, value);
    Some(url.to_string())
}

enum ClickTarget {
    Missing,
    Inert,
    Expand(String),
    Follow(String),
}

#[async_trait]
impl PageDriver for StaticPage {
    async fn goto(&self, url: &str) -> EngineResult<Option<u16>> {
        self.load(url).await.map(Some)
    }

    async fn route_in_app(&self, url: &str) -> EngineResult<RouteMethod> {
        // Without a client router the fetch is the navigation, so its status counts
        let status = self.load(url).await?;
        if !(200..300).contains(&status) {
            return Err(EngineError::Navigation {
                url: url.to_string(),
                message: format!("status {}", status),
            });
        }
        Ok(RouteMethod::LocationChange)
    }

    async fn current_url(&self) -> EngineResult<String> {
        self.snapshot().map(|(url, _)| url)
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> EngineResult<()> {
        self.ensure_open()
    }

    async fn probe(&self) -> EngineResult<()> {
        self.ensure_open()
    }

    async fn text(&self, locator: &Locator) -> EngineResult<Option<String>> {
        let selector = parse_selector(locator)?;
        self.query(|html, _| {
            html.select(&selector)
                .next()
                .map(|e| normalize_whitespace(&e.text().collect::<String>()))
        })
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> EngineResult<Option<String>> {
        let selector = parse_selector(locator)?;
        self.query(|html, _| {
            html.select(&selector)
                .next()
                .and_then(|e| e.value().attr(name))
                .map(|v| v.to_string())
        })
    }

    async fn exists(&self, locator: &Locator) -> EngineResult<bool> {
        let selector = parse_selector(locator)?;
        self.query(|html, _| html.select(&selector).next().is_some())
    }

    async fn click(&self, locator: &Locator) -> EngineResult<bool> {
        // Selectors are parsed per call and not held across awaits
        let target = {
            let selector = parse_selector(locator)?;
            self.query(|html, base| match html.select(&selector).next() {
                None => ClickTarget::Missing,
                Some(e) => {
                    if let Some(href) = e.value().attr("data-href") {
                        ClickTarget::Expand(resolve_link(href, Some(base)))
                    } else if e.value().name() == "a" {
                        match e.value().attr("href") {
                            Some(href) => ClickTarget::Follow(resolve_link(href, Some(base))),
                            None => ClickTarget::Inert,
                        }
                    } else {
                        ClickTarget::Inert
                    }
                }
            })?
        };

        match target {
            ClickTarget::Missing => Ok(false),
            ClickTarget::Inert => Ok(true),
            ClickTarget::Expand(href) => self.expand(locator, &href).await.map(|_| true),
            ClickTarget::Follow(href) => self.load(&href).await.map(|_| true),
        }
    }

    async fn fill_and_submit(&self, locator: &Locator, value: &str) -> EngineResult<bool> {
        let target = {
            let selector = parse_selector(locator)?;
            self.query(|html, base| submission_url(html, &selector, value, base))?
        };

        match target {
            Some(url) => self.load(&url).await.map(|_| true),
            None => Ok(false),
        }
    }

    async fn remove_ancestor(&self, locator: &Locator, depth: usize) -> EngineResult<bool> {
        let selector = parse_selector(locator)?;
        let (_, source) = self.snapshot()?;

        match detach_ancestor(&source, &selector, depth) {
            Some(updated) => {
                self.replace(None, updated)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn visible_text(&self) -> EngineResult<String> {
        self.query(|html, _| visible_text_of(html))
    }

    async fn clear_state(&self) -> EngineResult<()> {
        // No cookie store and no timers to drop
        self.ensure_open()
    }

    fn crash_signal(&self) -> CrashSignal {
        CrashSignal::never()
    }

    async fn close(&self) -> EngineResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body>
        <ul id="rows">
          <li class="row"><div class="cell"><span id="company-name-0">ACME GmbH</span></div></li>
          <li class="row"><div class="cell"><span id="company-name-1">Beta AG</span></div></li>
        </ul>
        <button id="load-more" data-href="/search?page=2">More</button>
        <form action="/search"><input id="query" name="q"></form>
        <script>var hidden = "not visible";</script>
        </body></html>"#;

    const PAGE_TWO: &str = r#"<html><body>
        <ul><li class="row"><div class="cell"><span id="company-name-2">Gamma KG</span></div></li></ul>
        </body></html>"#;

    fn launcher() -> StaticLauncher {
        StaticLauncher::memory(
            MemoryPages::new()
                .page("https://jobs.example/search", LISTING)
                .page("https://jobs.example/search?page=2", PAGE_TWO)
                .page("https://jobs.example/search?q=rust", "<html><body>results</body></html>"),
        )
    }

    #[tokio::test]
    async fn test_goto_and_read() {
        let page = launcher().launch().await.unwrap();
        let status = page.goto("https://jobs.example/search").await.unwrap();
        assert_eq!(status, Some(200));

        let name = page.text(&Locator::id("company-name-1")).await.unwrap();
        assert_eq!(name.as_deref(), Some("Beta AG"));
        assert!(page.text(&Locator::id("company-name-9")).await.unwrap().is_none());
        assert_eq!(
            page.current_url().await.unwrap(),
            "https://jobs.example/search"
        );
    }

    #[tokio::test]
    async fn test_unknown_page_is_404() {
        let page = launcher().launch().await.unwrap();
        assert_eq!(page.goto("https://jobs.example/nope").await.unwrap(), Some(404));
        assert!(page.route_in_app("https://jobs.example/nope").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_ancestor() {
        let page = launcher().launch().await.unwrap();
        page.goto("https://jobs.example/search").await.unwrap();

        let first = Locator::id("company-name-0");
        assert!(page.remove_ancestor(&first, 2).await.unwrap());
        assert!(!page.exists(&first).await.unwrap());
        assert!(page.exists(&Locator::id("company-name-1")).await.unwrap());
        assert!(page.exists(&Locator::class("row")).await.unwrap());

        assert!(!page.remove_ancestor(&first, 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_load_more_appends_next_page() {
        let page = launcher().launch().await.unwrap();
        page.goto("https://jobs.example/search").await.unwrap();

        assert!(page.click(&Locator::css("#load-more")).await.unwrap());
        assert!(page.exists(&Locator::id("company-name-2")).await.unwrap());
        assert!(page.exists(&Locator::id("company-name-0")).await.unwrap());
        // The control is consumed; page two brings none
        assert!(!page.exists(&Locator::css("#load-more")).await.unwrap());
        assert!(!page.click(&Locator::css("#load-more")).await.unwrap());
    }

    #[tokio::test]
    async fn test_fill_and_submit() {
        let page = launcher().launch().await.unwrap();
        page.goto("https://jobs.example/search").await.unwrap();

        assert!(page
            .fill_and_submit(&Locator::css("#query"), "rust")
            .await
            .unwrap());
        assert_eq!(
            page.current_url().await.unwrap(),
            "https://jobs.example/search?q=rust"
        );
        assert_eq!(page.visible_text().await.unwrap(), "results");
    }

    #[tokio::test]
    async fn test_visible_text_skips_scripts() {
        let page = launcher().launch().await.unwrap();
        page.goto("https://jobs.example/search").await.unwrap();

        let text = page.visible_text().await.unwrap();
        assert!(text.contains("ACME GmbH"));
        assert!(!text.contains("not visible"));
    }

    #[tokio::test]
    async fn test_closed_page_fails_probe() {
        let page = launcher().launch().await.unwrap();
        page.probe().await.unwrap();
        page.close().await.unwrap();

        assert_eq!(page.probe().await, Err(EngineError::Closed));
        assert!(page.text(&Locator::id("x")).await.is_err());
    }
}
