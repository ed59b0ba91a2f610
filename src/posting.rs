//! Posting record produced by the crawl
//!
//! A `Posting` is created from one listing row, enriched in place from its
//! detail page and then handed to the output sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One job posting as read from the listing and detail pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Posting {
    pub company_name: String,
    pub city: Option<String>,
    /// Site-assigned id taken from the detail link; the storage key
    pub id: String,
    pub start_date: Option<String>,
    pub post_date: Option<DateTime<Utc>>,
    pub job_title: Option<String>,

    // Filled by enrichment
    pub postal_code: Option<u32>,
    pub street: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub company_size: Option<u32>,

    /// Listing URL the posting was found on, set when its batch closes
    pub search_url: Option<String>,
}

impl Posting {
    /// Creates a posting with only its listing identity filled in
    pub fn new(id: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            city: None,
            id: id.into(),
            start_date: None,
            post_date: None,
            job_title: None,
            postal_code: None,
            street: None,
            email: None,
            phone: None,
            website: None,
            company_size: None,
            search_url: None,
        }
    }

    /// Records the originating listing URL; later calls are ignored
    pub fn tag_search_url(&mut self, search_url: &str) {
        if self.search_url.is_none() {
            self.search_url = Some(search_url.to_string());
        }
    }

    /// Returns true if any detail-page field has been filled
    pub fn is_enriched(&self) -> bool {
        self.postal_code.is_some()
            || self.street.is_some()
            || self.email.is_some()
            || self.phone.is_some()
            || self.website.is_some()
            || self.company_size.is_some()
    }
}

/// Fields derived from a detail page, applied to a posting in one step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub postal_code: Option<u32>,
    pub street: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub company_size: Option<u32>,
}

impl DetailFields {
    /// Writes every detail field into the posting
    pub fn apply_to(self, posting: &mut Posting) {
        posting.postal_code = self.postal_code.filter(|code| *code > 0);
        posting.street = self.street;
        posting.email = self.email;
        posting.phone = self.phone;
        posting.website = self.website;
        posting.company_size = self.company_size;
    }
}
