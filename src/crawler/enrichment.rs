//! Enrichment pool
//!
//! A fixed set of sessions parked on the detail site. A batch is split
//! round-robin over the sessions; partitions run concurrently on the
//! current task while each session works through its own partition one
//! posting at a time. A posting whose detail page cannot be opened or read
//! keeps empty detail fields and the batch carries on.

use crate::crawler::CrawlError;
use crate::engine::{Launcher, Locator};
use crate::extract::{
    clean_phone_number, find_email_in_text, find_phone_in_text, find_postal_code,
    parse_company_size, street_from_address,
};
use crate::flow::RetryPolicy;
use crate::posting::{DetailFields, Posting};
use crate::session::{NavigationStrategy, Presence, Session, SessionResult, SessionSettings};
use crate::url::DetailUrlTemplate;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Where the fields of a detail page live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailLayout {
    pub address: Locator,
    pub description: Locator,
    pub website: Locator,
    pub company_size: Locator,
}

impl Default for DetailLayout {
    fn default() -> Self {
        Self {
            address: Locator::css(".company-address"),
            description: Locator::css(".company-description"),
            website: Locator::css("a.company-website"),
            company_size: Locator::css(".company-size"),
        }
    }
}

/// Retry budgets for opening detail pages
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentPolicy {
    /// Attempts for the in-app route
    pub in_app_retries: u32,
    /// Attempts for the full-load fallback
    pub full_load_retries: u32,
    /// Outer attempts around route-then-fallback
    pub detail: RetryPolicy,
    /// Attempts for parking each session on the detail origin
    pub warm_up_retries: u32,
    /// Clean up a session's memory after every this many postings
    pub cleanup_every: usize,
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            in_app_retries: 2,
            full_load_retries: 4,
            detail: RetryPolicy::new(2, Duration::from_secs(2)),
            warm_up_retries: 5,
            cleanup_every: 10,
        }
    }
}

/// Outcome counts of one `enrich` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub enriched: usize,
    pub skipped: usize,
}

impl EnrichmentReport {
    fn merge(self, other: EnrichmentReport) -> Self {
        Self {
            enriched: self.enriched + other.enriched,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Splits items round-robin: item `i` goes to partition `i % workers`
///
/// # Examples
///
/// ```
/// use stellwerk::crawler::distribute;
///
/// let parts = distribute(0..7, 3);
/// assert_eq!(parts, vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
/// ```
pub fn distribute<T>(items: impl IntoIterator<Item = T>, workers: usize) -> Vec<Vec<T>> {
    let workers = workers.max(1);
    let mut partitions: Vec<Vec<T>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        partitions[i % workers].push(item);
    }
    partitions
}

/// Sessions dedicated to detail pages
pub struct EnrichmentPool {
    sessions: Vec<Session>,
    layout: DetailLayout,
    policy: EnrichmentPolicy,
    template: DetailUrlTemplate,
}

impl EnrichmentPool {
    /// Launches `size` sessions
    ///
    /// # Arguments
    ///
    /// * `size` - Number of sessions (at least one is opened)
    /// * `launcher` - Engine used for every session
    /// * `settings` - Session timing
    /// * `layout` - Detail page selectors
    /// * `policy` - Detail retry budgets
    /// * `template` - Detail URL template
    ///
    /// # Returns
    ///
    /// * `Ok(EnrichmentPool)` - Every session launched
    /// * `Err(CrawlError)` - A browser could not be launched
    pub async fn open(
        size: usize,
        launcher: Arc<dyn Launcher>,
        settings: SessionSettings,
        layout: DetailLayout,
        policy: EnrichmentPolicy,
        template: DetailUrlTemplate,
    ) -> Result<Self, CrawlError> {
        let mut sessions = Vec::with_capacity(size.max(1));
        for i in 0..size.max(1) {
            let session =
                Session::open(format!("enrichment-{}", i + 1), launcher.clone(), settings).await?;
            sessions.push(session);
        }

        tracing::info!("Opened enrichment pool of {} sessions", sessions.len());

        Ok(Self {
            sessions,
            layout,
            policy,
            template,
        })
    }

    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    /// Parks every session on the detail site's origin
    ///
    /// In-app routing needs the detail application loaded. A session that
    /// cannot be parked is logged and left to the full-load fallback.
    pub async fn warm_up(&mut self) -> Result<(), CrawlError> {
        let origin = self.template.origin()?;
        let retries = self.policy.warm_up_retries;

        let results = join_all(
            self.sessions
                .iter_mut()
                .map(|session| session.navigate(&origin, NavigationStrategy::FullLoad, retries)),
        )
        .await;

        for (session, result) in self.sessions.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!("Session {} could not open {}: {}", session.label(), origin, e);
            }
        }

        Ok(())
    }

    /// Enriches a batch in place
    ///
    /// Postings are distributed round-robin over the sessions. Every
    /// posting is touched by exactly one session.
    pub async fn enrich(&mut self, batch: &mut [Posting]) -> EnrichmentReport {
        let partitions = distribute(batch.iter_mut(), self.sessions.len());
        let layout = &self.layout;
        let policy = &self.policy;
        let template = &self.template;

        let reports = join_all(
            self.sessions
                .iter_mut()
                .zip(partitions)
                .map(|(session, partition)| {
                    enrich_partition(session, partition, layout, policy, template)
                }),
        )
        .await;

        let report = reports
            .into_iter()
            .fold(EnrichmentReport::default(), EnrichmentReport::merge);

        tracing::info!(
            "Enriched {} of {} postings ({} skipped)",
            report.enriched,
            report.enriched + report.skipped,
            report.skipped
        );
        report
    }

    pub async fn cleanup_memory(&mut self) {
        join_all(self.sessions.iter_mut().map(|s| s.cleanup_memory())).await;
    }

    pub async fn close(&mut self) {
        join_all(self.sessions.iter_mut().map(|s| s.close())).await;
    }
}

async fn enrich_partition(
    session: &mut Session,
    postings: Vec<&mut Posting>,
    layout: &DetailLayout,
    policy: &EnrichmentPolicy,
    template: &DetailUrlTemplate,
) -> EnrichmentReport {
    let mut report = EnrichmentReport::default();

    for (pos, posting) in postings.into_iter().enumerate() {
        if enrich_posting(session, posting, layout, policy, template).await {
            report.enriched += 1;
        } else {
            report.skipped += 1;
        }

        // After every `cleanup_every` postings, skipped ones included
        if policy.cleanup_every > 0 && (pos + 1) % policy.cleanup_every == 0 {
            session.cleanup_memory().await;
        }
    }

    report
}

/// Opens and reads one detail page; `false` leaves the posting untouched
async fn enrich_posting(
    session: &mut Session,
    posting: &mut Posting,
    layout: &DetailLayout,
    policy: &EnrichmentPolicy,
    template: &DetailUrlTemplate,
) -> bool {
    let url = template.render(&posting.id);
    if let Err(e) = open_detail(session, &url, policy).await {
        tracing::warn!(
            "Skipping {} ({}): detail page unreachable: {}",
            posting.company_name,
            posting.id,
            e
        );
        return false;
    }

    match read_detail(session, layout).await {
        Ok(fields) => {
            fields.apply_to(posting);
            true
        }
        Err(e) => {
            tracing::warn!(
                "Skipping {} ({}): detail page unreadable: {}",
                posting.company_name,
                posting.id,
                e
            );
            false
        }
    }
}

/// Opens a detail page: in-app route first, full load as fallback, with an
/// outer backoff around both
async fn open_detail(session: &mut Session, url: &str, policy: &EnrichmentPolicy) -> SessionResult<()> {
    let attempts = policy.detail.attempts.max(1);
    let mut attempt = 1;

    loop {
        let routed = session
            .navigate(url, NavigationStrategy::InAppRoute, policy.in_app_retries)
            .await;

        let result = match routed {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!("In-app route to {} failed, loading fully: {}", url, e);
                session
                    .navigate(url, NavigationStrategy::FullLoad, policy.full_load_retries)
                    .await
            }
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::debug!("Detail attempt {} for {} failed: {}", attempt, url, e);
                tokio::time::sleep(policy.detail.delay_after(attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// Reads a detail page into a separate value so a failure leaves the
/// posting untouched
async fn read_detail(session: &Session, layout: &DetailLayout) -> SessionResult<DetailFields> {
    let (address, description, website, size) = tokio::join!(
        session.text(&layout.address),
        session.text(&layout.description),
        session.link_url(&layout.website, Presence::Optional),
        session.text(&layout.company_size),
    );
    let (address, description, website, size) = (address?, description?, website?, size?);

    let postal_code = address
        .as_deref()
        .and_then(find_postal_code)
        .or_else(|| description.as_deref().and_then(find_postal_code));
    let street = address.as_deref().and_then(street_from_address);

    let email = match find_email_in_text(description.as_deref()) {
        Some(email) => Some(email),
        None => session.find_email_on_page().await?,
    };
    let phone = description
        .as_deref()
        .and_then(find_phone_in_text)
        .map(|raw| clean_phone_number(&raw));

    Ok(DetailFields {
        postal_code,
        street,
        email,
        phone,
        website,
        company_size: size.as_deref().and_then(parse_company_size),
    })
}
