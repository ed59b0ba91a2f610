//! Rendering-engine capability contract
//!
//! The crawler never talks to a browser directly. It talks to a
//! [`PageDriver`]: one page inside one browser process, created by a
//! [`Launcher`]. Two engines ship in-tree:
//!
//! - [`chrome`]: headless Chromium over the DevTools protocol
//! - [`static_html`]: HTTP fetch plus HTML parsing, without scripts
//!
//! All driver methods take `&self` so that independent reads on the same
//! page can be awaited concurrently.

pub mod chrome;
pub mod static_html;
#[cfg(test)]
pub(crate) mod recording;

pub use chrome::ChromeLauncher;
pub use static_html::{DocumentSource, StaticLauncher};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Errors raised by a rendering engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Page crashed")]
    Crashed,

    #[error("Page is closed")]
    Closed,

    #[error("Page is unhealthy: {0}")]
    Unhealthy(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Invalid selector: {0}")]
    Selector(String),
}

impl EngineError {
    /// Returns true if the page cannot be used any more and must be replaced
    pub fn requires_recreation(&self) -> bool {
        matches!(self, Self::Crashed | Self::Closed | Self::Unhealthy(_))
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// CSS selector addressing an element on the page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    /// Element with the given `id` attribute
    ///
    /// Uses the attribute form so ids starting with a digit or containing
    /// punctuation need no escaping.
    ///
    /// # Examples
    ///
    /// ```
    /// use stellwerk::engine::Locator;
    ///
    /// assert_eq!(Locator::id("company-name-3").as_css(), r#"[id="company-name-3"]"#);
    /// ```
    pub fn id(id: &str) -> Self {
        Self(format!("[id=\"{}\"]", escape_attribute(id)))
    }

    /// Elements carrying the given class
    pub fn class(class: &str) -> Self {
        Self(format!("[class~=\"{}\"]", escape_attribute(class)))
    }

    /// Any CSS selector, used as-is
    pub fn css(selector: &str) -> Self {
        Self(selector.trim().to_string())
    }

    pub fn as_css(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_attribute(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// How an in-app navigation was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    /// The site's client-side router accepted the path
    RouterHook,
    /// A link to the target was found on the page and clicked
    LinkClick,
    /// The page location was changed
    LocationChange,
}

/// Receiving end of a page's crash notification
#[derive(Debug, Clone)]
pub struct CrashSignal {
    rx: watch::Receiver<bool>,
}

/// Sending end of a page's crash notification
#[derive(Debug, Clone)]
pub struct CrashNotifier {
    tx: Arc<watch::Sender<bool>>,
}

impl CrashSignal {
    /// Creates a connected notifier/signal pair
    pub fn channel() -> (CrashNotifier, CrashSignal) {
        let (tx, rx) = watch::channel(false);
        (CrashNotifier { tx: Arc::new(tx) }, CrashSignal { rx })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (_, signal) = Self::channel();
        signal
    }

    /// Returns true if the page has already crashed
    pub fn is_crashed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when the page crashes
    ///
    /// Pends forever if the notifier is dropped without firing.
    pub async fn crashed(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl CrashNotifier {
    pub fn notify(&self) {
        self.tx.send_replace(true);
    }
}

/// Creates pages. One launch is one browser process with one page.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> EngineResult<Box<dyn PageDriver>>;

    /// Short engine name for logs
    fn name(&self) -> &'static str;
}

/// Capabilities the crawler needs from one rendered page
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Loads `url` as a full navigation
    ///
    /// # Returns
    ///
    /// * `Ok(Some(status))` - HTTP status of the main document
    /// * `Ok(None)` - The engine could not determine a status
    async fn goto(&self, url: &str) -> EngineResult<Option<u16>>;

    /// Navigates without a full document load, where the site allows it
    async fn route_in_app(&self, url: &str) -> EngineResult<RouteMethod>;

    async fn current_url(&self) -> EngineResult<String>;

    /// Waits until the page stops loading resources, up to `timeout`
    async fn wait_for_network_idle(&self, timeout: Duration) -> EngineResult<()>;

    /// Cheap round trip proving the page still responds
    async fn probe(&self) -> EngineResult<()>;

    /// Trimmed text content of the first match, `None` if absent
    async fn text(&self, locator: &Locator) -> EngineResult<Option<String>>;

    /// Attribute of the first match, `None` if the element or attribute is absent
    async fn attribute(&self, locator: &Locator, name: &str) -> EngineResult<Option<String>>;

    async fn exists(&self, locator: &Locator) -> EngineResult<bool>;

    /// Focuses and clicks the first match; `false` if absent
    async fn click(&self, locator: &Locator) -> EngineResult<bool>;

    /// Types `value` into the first match and submits it; `false` if absent
    async fn fill_and_submit(&self, locator: &Locator, value: &str) -> EngineResult<bool>;

    /// Removes the ancestor `depth` levels above the first match
    ///
    /// Returns `false` if the element or that ancestor does not exist.
    async fn remove_ancestor(&self, locator: &Locator, depth: usize) -> EngineResult<bool>;

    /// Rendered text of the whole page
    async fn visible_text(&self) -> EngineResult<String>;

    /// Drops timers, cookies and cache held by the page
    async fn clear_state(&self) -> EngineResult<()>;

    fn crash_signal(&self) -> CrashSignal;

    /// Shuts down the page and its browser; later calls fail with `Closed`
    async fn close(&self) -> EngineResult<()>;
}
