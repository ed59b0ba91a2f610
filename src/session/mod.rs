//! Recoverable rendering session
//!
//! A `Session` wraps one [`PageDriver`] behind an indirection cell so that a
//! crashed or hung browser can be replaced without the owner noticing: the
//! label stays the same, only the underlying page changes.
//!
//! Navigation is the only operation that retries. Each attempt probes the
//! page first, races the navigation against the page's crash signal and is
//! bounded by the navigation timeout. Failures that leave the page unusable
//! mark the session unhealthy; the next attempt then launches a replacement
//! before trying again.

use crate::engine::{EngineError, Launcher, Locator, PageDriver};
use crate::extract::find_email_in_text;
use crate::flow::{backoff_delay, wait_for, FlowError};
use crate::state::SessionState;
use crate::url::{resolve_link, same_path};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Errors raised by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Navigation to {url} failed after {attempts} attempts: {message}")]
    Navigation {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Failed to launch browser for session {label}: {source}")]
    Launch { label: String, source: EngineError },

    #[error("Unexpected status {status:?} for {url}")]
    Status { url: String, status: Option<u16> },

    #[error("Navigation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Route to {url} did not settle: {source}")]
    Route { url: String, source: FlowError },

    #[error("Required element missing: {selector}")]
    Required { selector: String },

    #[error("No ancestor {depth} levels above {selector}")]
    MissingAncestor { selector: String, depth: usize },
}

impl SessionError {
    /// Returns true if the page must be replaced before it is used again
    pub fn requires_recreation(&self) -> bool {
        match self {
            Self::Engine(e) => e.requires_recreation(),
            _ => false,
        }
    }
}

/// Result type alias for session operations
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// How a navigation is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationStrategy {
    /// Full document load; requires HTTP 200 and a settled network
    FullLoad,
    /// Client-side routing inside the already loaded application
    InAppRoute,
}

/// Whether a missing element is an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// Link text with its resolved target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkItem {
    pub text: Option<String>,
    pub url: String,
}

/// Timing knobs shared by every session
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Upper bound for one navigation attempt, probe included
    pub navigation_timeout: Duration,
    /// Upper bound for waiting on network quiescence
    pub idle_timeout: Duration,
    /// Delay after the first failed navigation attempt; doubled per attempt
    pub backoff_base: Duration,
    /// Poll interval while waiting for an in-app route to land
    pub poll_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// One exclusively owned, self-healing rendering session
pub struct Session {
    label: String,
    launcher: Arc<dyn Launcher>,
    driver: Option<Box<dyn PageDriver>>,
    state: SessionState,
    settings: SessionSettings,
    recreations: u32,
}

impl Session {
    /// Launches a browser and wraps it in a healthy session
    pub async fn open(
        label: impl Into<String>,
        launcher: Arc<dyn Launcher>,
        settings: SessionSettings,
    ) -> SessionResult<Self> {
        let label = label.into();
        let driver = launcher
            .launch()
            .await
            .map_err(|source| SessionError::Launch {
                label: label.clone(),
                source,
            })?;

        debug!(session = %label, engine = launcher.name(), "Opened session");

        Ok(Self {
            label,
            launcher,
            driver: Some(driver),
            state: SessionState::Healthy,
            settings,
            recreations: 0,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of times the underlying browser has been replaced
    pub fn recreations(&self) -> u32 {
        self.recreations
    }

    fn driver(&self) -> SessionResult<&dyn PageDriver> {
        self.driver
            .as_deref()
            .ok_or(SessionError::Engine(EngineError::Closed))
    }

    fn set_state(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!(session = %self.label, from = %self.state, to = %next, "Unexpected session state transition");
        }
        trace!(session = %self.label, from = %self.state, to = %next, "Session state");
        self.state = next;
    }

    /// Replaces the underlying browser, keeping the label
    async fn recreate(&mut self) -> SessionResult<()> {
        self.set_state(SessionState::Recreating);

        if let Some(old) = self.driver.take() {
            let closed = tokio::time::timeout(self.settings.navigation_timeout, old.close()).await;
            match closed {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(session = %self.label, "Closing broken page failed: {}", e),
                Err(_) => debug!(session = %self.label, "Closing broken page timed out"),
            }
        }

        match self.launcher.launch().await {
            Ok(driver) => {
                self.driver = Some(driver);
                self.recreations += 1;
                self.set_state(SessionState::Healthy);
                info!(
                    session = %self.label,
                    recreations = self.recreations,
                    "Recreated session"
                );
                Ok(())
            }
            Err(source) => {
                self.set_state(SessionState::Unhealthy);
                Err(SessionError::Launch {
                    label: self.label.clone(),
                    source,
                })
            }
        }
    }

    /// Navigates to `url`, retrying with exponential backoff
    ///
    /// # Arguments
    ///
    /// * `url` - Target URL
    /// * `strategy` - Full load or in-app route
    /// * `max_retries` - Total number of attempts (at least one is made)
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The page shows `url`
    /// * `Err(SessionError::Navigation)` - Every attempt failed; carries the
    ///   last failure and the attempt count
    /// * `Err(SessionError::Launch)` - A replacement browser could not be
    ///   launched; the session stays unhealthy
    pub async fn navigate(
        &mut self,
        url: &str,
        strategy: NavigationStrategy,
        max_retries: u32,
    ) -> SessionResult<()> {
        let attempts = max_retries.max(1);
        let mut last_message = String::new();

        for attempt in 1..=attempts {
            if self.state.needs_recreation() {
                self.recreate().await?;
            }

            let outcome = self.attempt_navigation(url, strategy).await;
            match outcome {
                Ok(()) => {
                    debug!(session = %self.label, url, ?strategy, attempt, "Navigated");
                    return Ok(());
                }
                Err(e) => {
                    if e.requires_recreation() {
                        self.set_state(SessionState::Unhealthy);
                    }
                    warn!(
                        session = %self.label,
                        url,
                        ?strategy,
                        attempt,
                        attempts,
                        error = %e,
                        "Navigation attempt failed"
                    );
                    last_message = e.to_string();

                    if attempt < attempts {
                        tokio::time::sleep(backoff_delay(self.settings.backoff_base, attempt)).await;
                    }
                }
            }
        }

        Err(SessionError::Navigation {
            url: url.to_string(),
            attempts,
            message: last_message,
        })
    }

    async fn attempt_navigation(&self, url: &str, strategy: NavigationStrategy) -> SessionResult<()> {
        let driver = self.driver()?;
        let limit = self.settings.navigation_timeout;

        match tokio::time::timeout(limit, driver.probe()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(EngineError::Unhealthy(e.to_string()).into()),
            Err(_) => return Err(EngineError::Unhealthy("probe timed out".to_string()).into()),
        }

        let mut crash = driver.crash_signal();
        tokio::select! {
            _ = crash.crashed() => Err(EngineError::Crashed.into()),
            outcome = tokio::time::timeout(limit, self.perform(driver, url, strategy)) => {
                outcome.unwrap_or(Err(SessionError::Timeout(limit)))
            }
        }
    }

    async fn perform(
        &self,
        driver: &dyn PageDriver,
        url: &str,
        strategy: NavigationStrategy,
    ) -> SessionResult<()> {
        match strategy {
            NavigationStrategy::FullLoad => {
                let status = driver.goto(url).await?;
                if status != Some(200) {
                    return Err(SessionError::Status {
                        url: url.to_string(),
                        status,
                    });
                }
            }
            NavigationStrategy::InAppRoute => {
                let method = driver.route_in_app(url).await?;
                trace!(session = %self.label, url, ?method, "Routing in app");

                wait_for(
                    || async move {
                        driver
                            .current_url()
                            .await
                            .map(|current| same_path(&current, url))
                            .unwrap_or(false)
                    },
                    self.settings.navigation_timeout,
                    self.settings.poll_interval,
                )
                .await
                .map_err(|source| SessionError::Route {
                    url: url.to_string(),
                    source,
                })?;
            }
        }

        driver.wait_for_network_idle(self.settings.idle_timeout).await?;
        Ok(())
    }

    /// Drops timers, cookies and cache of a healthy session
    ///
    /// Never fails: problems are logged, and a page found broken is marked
    /// for recreation.
    pub async fn cleanup_memory(&mut self) {
        if !self.state.is_healthy() {
            debug!(session = %self.label, state = %self.state, "Skipping cleanup of unhealthy session");
            return;
        }
        let Some(driver) = self.driver.as_deref() else {
            return;
        };

        let outcome = tokio::time::timeout(self.settings.navigation_timeout, driver.clear_state()).await;
        match outcome {
            Ok(Ok(())) => debug!(session = %self.label, "Cleaned up session memory"),
            Ok(Err(e)) => {
                warn!(session = %self.label, "Memory cleanup failed: {}", e);
                if e.requires_recreation() {
                    self.set_state(SessionState::Unhealthy);
                }
            }
            Err(_) => warn!(session = %self.label, "Memory cleanup timed out"),
        }
    }

    /// Text of the element, `None` if it is absent or empty
    pub async fn text(&self, locator: &Locator) -> SessionResult<Option<String>> {
        let text = self.driver()?.text(locator).await?;
        Ok(text.filter(|t| !t.is_empty()))
    }

    /// The element's `title` attribute
    pub async fn title_attr(&self, locator: &Locator) -> SessionResult<Option<String>> {
        self.non_empty_attribute(locator, "title").await
    }

    /// The element's `href`, resolved against the current page
    ///
    /// # Returns
    ///
    /// * `Ok(Some(url))` - The link exists
    /// * `Ok(None)` - The link is absent and `presence` is optional
    /// * `Err(SessionError::Required)` - The link is absent but required
    pub async fn link_url(
        &self,
        locator: &Locator,
        presence: Presence,
    ) -> SessionResult<Option<String>> {
        match self.resolved_attribute(locator, "href").await? {
            Some(url) => Ok(Some(url)),
            None if presence == Presence::Required => Err(SessionError::Required {
                selector: locator.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// The element's `src`, resolved against the current page
    pub async fn image_url(&self, locator: &Locator) -> SessionResult<Option<String>> {
        self.resolved_attribute(locator, "src").await
    }

    /// Text and resolved target of a link
    pub async fn link_item(&self, locator: &Locator) -> SessionResult<Option<LinkItem>> {
        let Some(url) = self.resolved_attribute(locator, "href").await? else {
            return Ok(None);
        };
        let text = self.text(locator).await?;
        Ok(Some(LinkItem { text, url }))
    }

    pub async fn has_element(&self, locator: &Locator) -> SessionResult<bool> {
        Ok(self.driver()?.exists(locator).await?)
    }

    /// Types `value` into an input and submits it
    pub async fn set_input(&self, locator: &Locator, value: &str) -> SessionResult<()> {
        if self.driver()?.fill_and_submit(locator, value).await? {
            Ok(())
        } else {
            Err(SessionError::Required {
                selector: locator.to_string(),
            })
        }
    }

    /// Focuses and clicks a button
    pub async fn click_button(&self, locator: &Locator) -> SessionResult<()> {
        if self.driver()?.click(locator).await? {
            Ok(())
        } else {
            Err(SessionError::Required {
                selector: locator.to_string(),
            })
        }
    }

    /// Looks for an email address: a `mailto:` link first, then the page text
    pub async fn find_email_on_page(&self) -> SessionResult<Option<String>> {
        let driver = self.driver()?;

        let mailto = driver
            .attribute(&Locator::css("a[href^='mailto:']"), "href")
            .await?;
        if let Some(href) = mailto {
            let address = href
                .trim()
                .trim_start_matches("mailto:")
                .split('?')
                .next()
                .unwrap_or_default();
            if let Some(email) = find_email_in_text(Some(address)) {
                return Ok(Some(email));
            }
        }

        let text = driver.visible_text().await?;
        Ok(find_email_in_text(Some(&text)))
    }

    /// Marks an element consumed by removing its ancestor `ancestor_depth`
    /// levels up
    pub async fn delete_outer_element(
        &self,
        locator: &Locator,
        ancestor_depth: usize,
    ) -> SessionResult<()> {
        if self.driver()?.remove_ancestor(locator, ancestor_depth).await? {
            Ok(())
        } else {
            Err(SessionError::MissingAncestor {
                selector: locator.to_string(),
                depth: ancestor_depth,
            })
        }
    }

    /// Releases the browser; the session cannot be used afterwards
    pub async fn close(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };

        let outcome = tokio::time::timeout(self.settings.navigation_timeout, driver.close()).await;
        match outcome {
            Ok(Ok(())) => debug!(session = %self.label, "Closed session"),
            Ok(Err(e)) => warn!(session = %self.label, "Failed to close session: {}", e),
            Err(_) => warn!(session = %self.label, "Closing session timed out"),
        }
    }

    async fn non_empty_attribute(&self, locator: &Locator, name: &str) -> SessionResult<Option<String>> {
        let value = self.driver()?.attribute(locator, name).await?;
        Ok(value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    async fn resolved_attribute(&self, locator: &Locator, name: &str) -> SessionResult<Option<String>> {
        let Some(value) = self.non_empty_attribute(locator, name).await? else {
            return Ok(None);
        };
        let base = self.driver()?.current_url().await.ok();
        Ok(Some(resolve_link(&value, base.as_deref())))
    }
}
