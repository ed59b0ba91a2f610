//! Email and phone number extraction

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}").expect("valid email regex")
});

// A phone number starts with + or 0, then digits with common separators.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+|\b0)[0-9][0-9 /()\-]{5,}[0-9]").expect("valid phone regex")
});

/// Finds the first email address in a text, lowercased
///
/// # Examples
///
/// ```
/// use stellwerk::extract::find_email_in_text;
///
/// assert_eq!(
///     find_email_in_text(Some("contact us at Jane.Doe@Example.com today")),
///     Some("jane.doe@example.com".to_string())
/// );
/// assert_eq!(find_email_in_text(None), None);
/// ```
pub fn find_email_in_text(text: Option<&str>) -> Option<String> {
    let text = text?;
    EMAIL_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
}

/// Finds the first phone-number-shaped token in a text
///
/// The match is returned raw; pass it through [`clean_phone_number`] before
/// storing it.
pub fn find_phone_in_text(text: &str) -> Option<String> {
    PHONE_RE
        .find(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|candidate| candidate.chars().filter(|c| c.is_ascii_digit()).count() >= 6)
}

/// Normalizes a phone number to national notation
///
/// A leading `+49` or `0049` country code is replaced by the trunk prefix
/// `0`, bracketed zeros (`+49 (0)30`) are dropped, and separators collapse
/// to single spaces.
///
/// # Examples
///
/// ```
/// use stellwerk::extract::clean_phone_number;
///
/// assert_eq!(clean_phone_number("+49 30 1234567"), "030 1234567");
/// assert_eq!(clean_phone_number("0049 (0)89/123-45"), "089 123 45");
/// ```
pub fn clean_phone_number(raw: &str) -> String {
    let mut number = raw.trim().replace("(0)", " ");

    for prefix in ["+49", "0049"] {
        if let Some(rest) = number.strip_prefix(prefix) {
            number = format!("0{}", rest.trim_start());
            break;
        }
    }

    number
        .split(|c: char| c.is_whitespace() || matches!(c, '/' | '-' | '(' | ')' | '.'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
