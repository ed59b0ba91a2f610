//! URL handling module for Stellwerk
//!
//! This module provides the small amount of URL logic the crawler needs:
//! - Resolving hrefs read from the page against the page URL
//! - Taking the detail id from a listing anchor's last path segment
//! - Rendering detail-page URLs from the configured template
//! - Comparing paths after in-app routing

use crate::{UrlError, UrlResult};
use url::Url;

/// Placeholder substituted with the posting id in detail URL templates
pub const ID_PLACEHOLDER: &str = "{id}";

/// Parses a URL and requires an HTTP(S) scheme
///
/// # Arguments
///
/// * `raw` - The URL string to parse
///
/// # Returns
///
/// * `Ok(Url)` - The parsed URL
/// * `Err(UrlError)` - The URL is malformed or uses another scheme
pub fn parse_http_url(raw: &str) -> UrlResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    Ok(url)
}

/// Returns the origin (`scheme://host[:port]/`) of a URL
pub fn origin_of(raw: &str) -> UrlResult<String> {
    let url = parse_http_url(raw)?;
    Ok(format!("{}/", url.origin().ascii_serialization()))
}

/// Resolves an href read from a page into an absolute URL
///
/// Non-hierarchical schemes (`mailto:`, `tel:`) are returned untouched.
/// When no base is known, or the href cannot be joined, the trimmed href is
/// returned as-is.
pub fn resolve_link(href: &str, base: Option<&str>) -> String {
    let href = href.trim();

    if let Ok(absolute) = Url::parse(href) {
        return absolute.to_string();
    }

    base.and_then(|b| Url::parse(b).ok())
        .and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

/// Extracts the last non-empty path segment of an href
///
/// Relative hrefs are accepted. Query string and fragment are ignored.
///
/// # Examples
///
/// ```
/// use stellwerk::url::last_path_segment;
///
/// assert_eq!(last_path_segment("/jobs/acme-gmbh-4711?ref=list"), Some("acme-gmbh-4711".to_string()));
/// assert_eq!(last_path_segment("https://jobs.example/company/42/"), Some("42".to_string()));
/// assert_eq!(last_path_segment("/"), None);
/// ```
pub fn last_path_segment(href: &str) -> Option<String> {
    let base = Url::parse("http://localhost/").ok()?;
    let url = base.join(href.trim()).ok()?;

    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.to_string())
}

/// Returns true if both URLs point at the same path
///
/// Trailing slashes are ignored, query strings are not compared. This is the
/// check used to confirm that client-side routing actually moved the page.
pub fn same_path(current: &str, target: &str) -> bool {
    let base = match Url::parse("http://localhost/") {
        Ok(b) => b,
        Err(_) => return false,
    };

    let (Ok(current), Ok(target)) = (base.join(current), base.join(target)) else {
        return false;
    };

    current.path().trim_end_matches('/') == target.path().trim_end_matches('/')
}

/// Template for detail-page URLs, e.g. `https://jobs.example/company/{id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailUrlTemplate {
    template: String,
}

impl DetailUrlTemplate {
    /// Creates a template, checking that it contains the id placeholder and
    /// renders to a valid HTTP(S) URL
    pub fn new(template: &str) -> UrlResult<Self> {
        if !template.contains(ID_PLACEHOLDER) {
            return Err(UrlError::Malformed(format!(
                "detail URL template '{}' has no {} placeholder",
                template, ID_PLACEHOLDER
            )));
        }

        let this = Self {
            template: template.trim().to_string(),
        };
        parse_http_url(&this.render("probe"))?;
        Ok(this)
    }

    /// Renders the detail URL for one posting id
    pub fn render(&self, id: &str) -> String {
        self.template.replace(ID_PLACEHOLDER, id)
    }

    /// Origin of the detail site, where pool sessions are parked
    pub fn origin(&self) -> UrlResult<String> {
        origin_of(&self.render("probe"))
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_url() {
        assert!(parse_http_url("https://jobs.example/search").is_ok());
        assert!(parse_http_url("http://127.0.0.1:8080/").is_ok());

        assert!(matches!(
            parse_http_url("ftp://jobs.example/"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(parse_http_url("not a url"), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://jobs.example/company/42?x=1").unwrap(),
            "https://jobs.example/"
        );
        assert_eq!(
            origin_of("http://127.0.0.1:4000/a/b").unwrap(),
            "http://127.0.0.1:4000/"
        );
    }

    #[test]
    fn test_resolve_link() {
        let base = Some("https://jobs.example/search?page=1");
        assert_eq!(
            resolve_link("/company/42", base),
            "https://jobs.example/company/42"
        );
        assert_eq!(
            resolve_link("https://other.example/", base),
            "https://other.example/"
        );
        assert_eq!(
            resolve_link("mailto:hr@acme.example", base),
            "mailto:hr@acme.example"
        );
        assert_eq!(resolve_link(" /x ", None), "/x");
    }

    #[test]
    fn test_last_path_segment() {
        assert_eq!(last_path_segment("/company/abc-1"), Some("abc-1".to_string()));
        assert_eq!(last_path_segment("company/abc-1#top"), Some("abc-1".to_string()));
        assert_eq!(last_path_segment(""), None);
    }

    #[test]
    fn test_same_path() {
        assert!(same_path("https://jobs.example/company/42/", "/company/42"));
        assert!(same_path("https://jobs.example/company/42?tab=1", "https://jobs.example/company/42"));
        assert!(!same_path("https://jobs.example/company/43", "/company/42"));
    }

    #[test]
    fn test_detail_template() {
        let template = DetailUrlTemplate::new("https://jobs.example/company/{id}").unwrap();
        assert_eq!(template.render("42"), "https://jobs.example/company/42");
        assert_eq!(template.origin().unwrap(), "https://jobs.example/");

        assert!(DetailUrlTemplate::new("https://jobs.example/company/").is_err());
        assert!(DetailUrlTemplate::new("file:///{id}").is_err());
    }
}
