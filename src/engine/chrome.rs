//! Headless Chromium engine
//!
//! Each launch starts one browser process over the DevTools protocol and
//! opens a single page. Every DOM operation is a small script evaluated in
//! the page; scripts return `JSON.stringify`-ed values that are decoded with
//! `serde_json`, so absent elements come back as `null` rather than as
//! protocol errors.
//!
//! Crashes are detected two ways: the `Inspector.targetCrashed` event for
//! the page, and the end of the protocol handler stream (browser gone).

use super::{
    CrashNotifier, CrashSignal, EngineError, EngineResult, Launcher, Locator, PageDriver,
    RouteMethod,
};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::inspector::{
    EnableParams as InspectorEnableParams, EventTargetCrashed,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCacheParams, ClearBrowserCookiesParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Injected into every document before its own scripts run
const DISABLE_TRANSITIONS: &str = r#"(() => {
    const css = '*, *::before, *::after { transition: none !important; animation: none !important; scroll-behavior: auto !important; }';
    const apply = () => {
        const style = document.createElement('style');
        style.textContent = css;
        (document.head || document.documentElement).appendChild(style);
    };
    if (document.readyState === 'loading') {
        document.addEventListener('DOMContentLoaded', apply);
    } else {
        apply();
    }
})();"#;

/// Launch options for the Chromium engine
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    /// Unpacked extension directories loaded into every browser
    pub extensions: Vec<PathBuf>,
    pub args: Vec<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Upper bound for a single protocol request
    pub request_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            extensions: Vec::new(),
            args: Vec::new(),
            viewport_width: 1366,
            viewport_height: 768,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Command-line switches that load the given unpacked extensions
fn extension_args(extensions: &[PathBuf]) -> Vec<String> {
    if extensions.is_empty() {
        return Vec::new();
    }

    let joined = extensions
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",");

    vec![
        format!("--disable-extensions-except={}", joined),
        format!("--load-extension={}", joined),
    ]
}

/// Encodes a Rust string as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Wraps a function body so its (possibly awaited) result comes back as JSON text
fn json_script(body: &str) -> String {
    format!(
        "(async () => {{ const __value = await (async () => {{ {} }})(); \
         return JSON.stringify(__value === undefined ? null : __value); }})()",
        body
    )
}

fn engine_error(e: CdpError) -> EngineError {
    match e {
        CdpError::Timeout => EngineError::Unhealthy("protocol request timed out".to_string()),
        CdpError::NoResponse | CdpError::ChannelSendError(_) | CdpError::Ws(_) => {
            EngineError::Closed
        }
        CdpError::JavascriptException(details) => EngineError::Script(format!("{:?}", details)),
        other => EngineError::Script(other.to_string()),
    }
}

/// Launches headless Chromium browsers
pub struct ChromeLauncher {
    options: ChromeOptions,
}

impl ChromeLauncher {
    pub fn new(options: ChromeOptions) -> Self {
        Self { options }
    }

    fn browser_config(&self) -> EngineResult<BrowserConfig> {
        let options = &self.options;
        let mut builder = BrowserConfig::builder()
            .window_size(options.viewport_width, options.viewport_height)
            .viewport(Viewport {
                width: options.viewport_width,
                height: options.viewport_height,
                ..Viewport::default()
            })
            .request_timeout(options.request_timeout);

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        for arg in extension_args(&options.extensions)
            .into_iter()
            .chain(options.args.iter().cloned())
        {
            builder = builder.arg(arg);
        }

        builder.build().map_err(EngineError::Launch)
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    async fn launch(&self) -> EngineResult<Box<dyn PageDriver>> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| EngineError::Launch(e.to_string()))?;

        let (notifier, signal) = CrashSignal::channel();

        let handler_notifier = notifier.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
            // Handler stream ended: the browser connection is gone
            handler_notifier.notify();
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(EngineError::Launch(e.to_string()));
            }
        };

        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(DISABLE_TRANSITIONS))
            .await
        {
            warn!("Failed to inject transition override: {}", e);
        }

        watch_for_crash(&page, notifier).await;

        info!(
            extensions = self.options.extensions.len(),
            headless = self.options.headless,
            "Launched browser"
        );

        Ok(Box::new(ChromePage {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
            signal,
            closed: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &'static str {
        "chrome"
    }
}

async fn watch_for_crash(page: &Page, notifier: CrashNotifier) {
    if let Err(e) = page.execute(InspectorEnableParams::default()).await {
        warn!("Failed to enable inspector events: {}", e);
    }

    match page.event_listener::<EventTargetCrashed>().await {
        Ok(mut crashes) => {
            tokio::spawn(async move {
                if crashes.next().await.is_some() {
                    warn!("Page crashed");
                    notifier.notify();
                }
            });
        }
        Err(e) => warn!("Failed to subscribe to crash events: {}", e),
    }
}

/// One Chromium page and the browser process that owns it
pub struct ChromePage {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: JoinHandle<()>,
    signal: CrashSignal,
    closed: AtomicBool,
}

impl ChromePage {
    fn ensure_usable(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        if self.signal.is_crashed() {
            return Err(EngineError::Crashed);
        }
        Ok(())
    }

    /// Evaluates a function body in the page and decodes its JSON result
    async fn eval<T: DeserializeOwned>(&self, body: &str) -> EngineResult<T> {
        self.ensure_usable()?;

        let result = self
            .page
            .evaluate(json_script(body))
            .await
            .map_err(engine_error)?;
        let json = result
            .into_value::<String>()
            .map_err(|e| EngineError::Script(e.to_string()))?;

        serde_json::from_str(&json).map_err(|e| EngineError::Script(e.to_string()))
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn goto(&self, url: &str) -> EngineResult<Option<u16>> {
        self.ensure_usable()?;
        self.page.goto(url).await.map_err(|e| match engine_error(e) {
            EngineError::Script(message) => EngineError::Navigation {
                url: url.to_string(),
                message,
            },
            other => other,
        })?;

        self.eval(
            "const nav = performance.getEntriesByType('navigation')[0]; \
             return nav && nav.responseStatus ? nav.responseStatus : null;",
        )
        .await
    }

    async fn route_in_app(&self, url: &str) -> EngineResult<RouteMethod> {
        let script = format!(
            r#"const target = new URL({url}, location.href);
            const path = target.pathname + target.search + target.hash;
            if (window.next && window.next.router && typeof window.next.router.push === 'function') {{
                window.next.router.push(path);
                return 'router';
            }}
            const link = Array.from(document.querySelectorAll('a[href]')).find(a => {{
                try {{ return new URL(a.getAttribute('href'), location.href).pathname === target.pathname; }}
                catch (_) {{ return false; }}
            }});
            if (link) {{
                link.click();
                return 'link';
            }}
            location.assign(target.href);
            return 'location';"#,
            url = js_string(url)
        );

        let method: String = self.eval(&script).await?;
        Ok(match method.as_str() {
            "router" => RouteMethod::RouterHook,
            "link" => RouteMethod::LinkClick,
            _ => RouteMethod::LocationChange,
        })
    }

    async fn current_url(&self) -> EngineResult<String> {
        self.eval("return location.href;").await
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> EngineResult<()> {
        let script = format!(
            r#"const timeoutMs = {timeout_ms};
            const idleMs = 500;
            const interval = 100;
            const start = Date.now();
            let lastCount = performance.getEntriesByType('resource').length;
            let stableMs = 0;
            while (Date.now() - start < timeoutMs) {{
                await new Promise(r => setTimeout(r, interval));
                const count = performance.getEntriesByType('resource').length;
                if (document.readyState === 'complete' && count === lastCount) {{
                    stableMs += interval;
                    if (stableMs >= idleMs) return true;
                }} else {{
                    stableMs = 0;
                }}
                lastCount = count;
            }}
            return false;"#,
            timeout_ms = timeout.as_millis()
        );

        let idle: bool = self.eval(&script).await?;
        if !idle {
            warn!(?timeout, "Network did not settle, continuing");
        }
        Ok(())
    }

    async fn probe(&self) -> EngineResult<()> {
        let state: Option<String> = self.eval("return document.readyState;").await?;
        match state {
            Some(_) => Ok(()),
            None => Err(EngineError::Unhealthy("no document".to_string())),
        }
    }

    async fn text(&self, locator: &Locator) -> EngineResult<Option<String>> {
        let script = format!(
            "const el = document.querySelector({}); \
             return el ? el.textContent.replace(/\\s+/g, ' ').trim() : null;",
            js_string(locator.as_css())
        );
        self.eval(&script).await
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> EngineResult<Option<String>> {
        let script = format!(
            "const el = document.querySelector({}); return el ? el.getAttribute({}) : null;",
            js_string(locator.as_css()),
            js_string(name)
        );
        self.eval(&script).await
    }

    async fn exists(&self, locator: &Locator) -> EngineResult<bool> {
        let script = format!(
            "return document.querySelector({}) !== null;",
            js_string(locator.as_css())
        );
        self.eval(&script).await
    }

    async fn click(&self, locator: &Locator) -> EngineResult<bool> {
        let script = format!(
            "const el = document.querySelector({}); \
             if (!el) return false; \
             el.scrollIntoView({{ block: 'center' }}); \
             if (typeof el.focus === 'function') el.focus(); \
             el.click(); \
             return true;",
            js_string(locator.as_css())
        );
        self.eval(&script).await
    }

    async fn fill_and_submit(&self, locator: &Locator, value: &str) -> EngineResult<bool> {
        let script = format!(
            r#"const el = document.querySelector({selector});
            if (!el) return false;
            el.focus();
            el.value = {value};
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            const enter = {{ key: 'Enter', code: 'Enter', keyCode: 13, which: 13, bubbles: true }};
            el.dispatchEvent(new KeyboardEvent('keydown', enter));
            el.dispatchEvent(new KeyboardEvent('keyup', enter));
            if (el.form) {{
                if (typeof el.form.requestSubmit === 'function') el.form.requestSubmit();
                else el.form.submit();
            }}
            return true;"#,
            selector = js_string(locator.as_css()),
            value = js_string(value)
        );
        self.eval(&script).await
    }

    async fn remove_ancestor(&self, locator: &Locator, depth: usize) -> EngineResult<bool> {
        let script = format!(
            "let el = document.querySelector({}); \
             if (!el) return false; \
             for (let i = 0; i < {}; i++) {{ el = el.parentElement; if (!el) return false; }} \
             el.remove(); \
             return true;",
            js_string(locator.as_css()),
            depth
        );
        self.eval(&script).await
    }

    async fn visible_text(&self) -> EngineResult<String> {
        self.eval("return document.body ? document.body.innerText : '';")
            .await
    }

    async fn clear_state(&self) -> EngineResult<()> {
        let cleared: u64 = self
            .eval(
                "const last = setTimeout(() => {}, 0); \
                 for (let i = 0; i <= last; i++) { clearTimeout(i); clearInterval(i); } \
                 return last;",
            )
            .await?;

        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(engine_error)?;
        self.page
            .execute(ClearBrowserCacheParams::default())
            .await
            .map_err(engine_error)?;

        debug!(timers = cleared, "Cleared page state");
        Ok(())
    }

    fn crash_signal(&self) -> CrashSignal {
        self.signal.clone()
    }

    async fn close(&self) -> EngineResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close request failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Waiting for browser exit failed: {}", e);
            }
        }
        self.handler_task.abort();
        Ok(())
    }
}
