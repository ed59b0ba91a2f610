//! Static pages that count what was done to them
//!
//! Used by crawler tests to check cleanup cadences and navigation
//! fallbacks without a browser.

use crate::engine::static_html::{MemoryPages, StaticLauncher};
use crate::engine::{
    CrashSignal, EngineError, EngineResult, Launcher, Locator, PageDriver, RouteMethod,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Calls made on one launched page
#[derive(Debug, Default)]
pub struct PageCalls {
    pub clears: AtomicUsize,
    pub routes: AtomicUsize,
    pub gotos: AtomicUsize,
}

/// Launches in-memory static pages and keeps their call counts in launch order
pub struct RecordingLauncher {
    inner: StaticLauncher,
    refuse_routes: bool,
    pages: Mutex<Vec<Arc<PageCalls>>>,
}

impl RecordingLauncher {
    pub fn new(pages: MemoryPages) -> Self {
        Self {
            inner: StaticLauncher::memory(pages),
            refuse_routes: false,
            pages: Mutex::new(Vec::new()),
        }
    }

    /// Makes every in-app route fail, as on a site without a client router
    pub fn refusing_routes(mut self) -> Self {
        self.refuse_routes = true;
        self
    }

    pub fn pages(&self) -> Vec<Arc<PageCalls>> {
        self.pages.lock().unwrap().clone()
    }

    /// `clear_state` calls per launched page
    pub fn clears(&self) -> Vec<usize> {
        self.pages()
            .iter()
            .map(|calls| calls.clears.load(Ordering::SeqCst))
            .collect()
    }
}

#[async_trait]
impl Launcher for RecordingLauncher {
    async fn launch(&self) -> EngineResult<Box<dyn PageDriver>> {
        let inner = self.inner.launch().await?;
        let calls = Arc::new(PageCalls::default());
        self.pages.lock().unwrap().push(Arc::clone(&calls));

        Ok(Box::new(RecordingPage {
            inner,
            calls,
            refuse_routes: self.refuse_routes,
        }))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct RecordingPage {
    inner: Box<dyn PageDriver>,
    calls: Arc<PageCalls>,
    refuse_routes: bool,
}

#[async_trait]
impl PageDriver for RecordingPage {
    async fn goto(&self, url: &str) -> EngineResult<Option<u16>> {
        self.calls.gotos.fetch_add(1, Ordering::SeqCst);
        self.inner.goto(url).await
    }

    async fn route_in_app(&self, url: &str) -> EngineResult<RouteMethod> {
        self.calls.routes.fetch_add(1, Ordering::SeqCst);
        if self.refuse_routes {
            return Err(EngineError::Navigation {
                url: url.to_string(),
                message: "no client router".to_string(),
            });
        }
        self.inner.route_in_app(url).await
    }

    async fn current_url(&self) -> EngineResult<String> {
        self.inner.current_url().await
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> EngineResult<()> {
        self.inner.wait_for_network_idle(timeout).await
    }

    async fn probe(&self) -> EngineResult<()> {
        self.inner.probe().await
    }

    async fn text(&self, locator: &Locator) -> EngineResult<Option<String>> {
        self.inner.text(locator).await
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> EngineResult<Option<String>> {
        self.inner.attribute(locator, name).await
    }

    async fn exists(&self, locator: &Locator) -> EngineResult<bool> {
        self.inner.exists(locator).await
    }

    async fn click(&self, locator: &Locator) -> EngineResult<bool> {
        self.inner.click(locator).await
    }

    async fn fill_and_submit(&self, locator: &Locator, value: &str) -> EngineResult<bool> {
        self.inner.fill_and_submit(locator, value).await
    }

    async fn remove_ancestor(&self, locator: &Locator, depth: usize) -> EngineResult<bool> {
        self.inner.remove_ancestor(locator, depth).await
    }

    async fn visible_text(&self) -> EngineResult<String> {
        self.inner.visible_text().await
    }

    async fn clear_state(&self) -> EngineResult<()> {
        self.calls.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_state().await
    }

    fn crash_signal(&self) -> CrashSignal {
        self.inner.crash_signal()
    }

    async fn close(&self) -> EngineResult<()> {
        self.inner.close().await
    }
}
