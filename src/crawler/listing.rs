//! Listing extractor
//!
//! Reads one posting per listing row. Rows are addressed by element ids
//! built from templates such as `company-name-{index}`; a row that has been
//! read is removed from the page so the DOM does not grow without bound as
//! more pages are loaded.

use crate::crawler::CrawlError;
use crate::engine::Locator;
use crate::extract::parse_post_date;
use crate::posting::Posting;
use crate::session::{Presence, Session, SessionError};
use crate::url::last_path_segment;

/// Placeholder substituted with the row index in listing id templates
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Where the fields of a listing row live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLayout {
    pub company_name: String,
    pub job_title: String,
    pub location: String,
    pub start_date: String,
    pub post_date: String,
    pub detail_link: String,
    /// Levels between the company-name element and the row container
    pub row_container_depth: usize,
    pub load_more: Locator,
}

impl Default for ListingLayout {
    fn default() -> Self {
        Self {
            company_name: "company-name-{index}".to_string(),
            job_title: "job-title-{index}".to_string(),
            location: "location-{index}".to_string(),
            start_date: "start-date-{index}".to_string(),
            post_date: "post-date-{index}".to_string(),
            detail_link: "detail-link-{index}".to_string(),
            row_container_depth: 2,
            load_more: Locator::css("#load-more"),
        }
    }
}

impl ListingLayout {
    /// Locator for one templated field of row `index`
    pub fn field(template: &str, index: usize) -> Locator {
        Locator::id(&template.replace(INDEX_PLACEHOLDER, &index.to_string()))
    }

    /// The element whose presence means row `index` is loaded
    pub fn row(&self, index: usize) -> Locator {
        Self::field(&self.company_name, index)
    }
}

/// Reads listing row `index` from the primary session
///
/// # Arguments
///
/// * `session` - The primary session showing the listing
/// * `layout` - Field id templates
/// * `index` - Zero-based row index across all loaded pages
///
/// # Returns
///
/// * `Ok(Some(Posting))` - The row was read and removed from the page
/// * `Ok(None)` - No row with this index is loaded
/// * `Err(CrawlError)` - The row exists but could not be read
pub async fn read_row(
    session: &Session,
    layout: &ListingLayout,
    index: usize,
) -> Result<Option<Posting>, CrawlError> {
    let company = layout.row(index);
    let Some(company_name) = session.text(&company).await? else {
        tracing::trace!("No listing row {}", index);
        return Ok(None);
    };

    let job_title = ListingLayout::field(&layout.job_title, index);
    let location = ListingLayout::field(&layout.location, index);
    let start_date = ListingLayout::field(&layout.start_date, index);
    let post_date = ListingLayout::field(&layout.post_date, index);
    let detail_link = ListingLayout::field(&layout.detail_link, index);

    let (job_title, city, start_date, post_date, detail_url) = tokio::join!(
        async {
            // Titles are often truncated in the text; the attribute holds the full one
            match session.title_attr(&job_title).await? {
                Some(title) => Ok::<_, SessionError>(Some(title)),
                None => session.text(&job_title).await,
            }
        },
        session.text(&location),
        session.text(&start_date),
        session.text(&post_date),
        session.link_url(&detail_link, Presence::Required),
    );

    let detail_url = detail_url?.unwrap_or_default();
    let id = last_path_segment(&detail_url).ok_or(CrawlError::MissingSiteId { index })?;

    let post_date_text = post_date?;
    let parsed_post_date = post_date_text.as_deref().and_then(parse_post_date);
    if post_date_text.is_some() && parsed_post_date.is_none() {
        tracing::debug!(
            "Row {}: unparsable publication date {:?}",
            index,
            post_date_text
        );
    }

    let mut posting = Posting::new(id, company_name);
    posting.job_title = job_title?;
    posting.city = city?;
    posting.start_date = start_date?;
    posting.post_date = parsed_post_date;

    session
        .delete_outer_element(&company, layout.row_container_depth)
        .await?;

    tracing::trace!("Read row {}: {} ({})", index, posting.company_name, posting.id);
    Ok(Some(posting))
}
