//! Postal code and street derivation from free-form address text

use once_cell::sync::Lazy;
use regex::Regex;

// Four or five digits standing alone: German/Austrian/Swiss postal codes.
static POSTAL_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4,5}\b").expect("valid postal code regex"));

/// Finds the first postal-code-shaped token in a text
///
/// Returns `None` when no token is present or the token is all zeros.
///
/// # Examples
///
/// ```
/// use stellwerk::extract::find_postal_code;
///
/// assert_eq!(find_postal_code("Musterstr. 1, 12345 Berlin"), Some(12345));
/// assert_eq!(find_postal_code("Musterstr. 1, Berlin"), None);
/// ```
pub fn find_postal_code(text: &str) -> Option<u32> {
    POSTAL_CODE_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .find(|code| *code > 0)
}

/// Derives the street from an address: everything before the first
/// postal-code-shaped token, trimmed of separators
///
/// # Examples
///
/// ```
/// use stellwerk::extract::street_from_address;
///
/// assert_eq!(street_from_address("Musterstr. 1, 12345 Berlin"), Some("Musterstr. 1".to_string()));
/// assert_eq!(street_from_address("12345 Berlin"), None);
/// ```
pub fn street_from_address(address: &str) -> Option<String> {
    let token = POSTAL_CODE_RE.find(address)?;
    let street = address[..token.start()]
        .trim()
        .trim_end_matches([',', ';', '-', '|'])
        .trim();

    if street.is_empty() {
        None
    } else {
        Some(super::normalize_whitespace(street))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postal_code_and_street_from_address() {
        let address = "Musterstr. 1, 12345 Berlin";
        assert_eq!(find_postal_code(address), Some(12345));
        assert_eq!(street_from_address(address), Some("Musterstr. 1".to_string()));
    }

    #[test]
    fn test_multiline_address() {
        let address = "Hauptstraße 17a\n  80331 München";
        assert_eq!(find_postal_code(address), Some(80331));
        assert_eq!(street_from_address(address), Some("Hauptstraße 17a".to_string()));
    }

    #[test]
    fn test_short_house_numbers_are_not_postal_codes() {
        assert_eq!(find_postal_code("Am Ring 123"), None);
        assert_eq!(street_from_address("Am Ring 123"), None);
    }

    #[test]
    fn test_leading_zero_postal_code() {
        assert_eq!(find_postal_code("Prager Str. 2, 01069 Dresden"), Some(1069));
    }

    #[test]
    fn test_all_zero_token_is_skipped() {
        assert_eq!(find_postal_code("0000 then 4020 Linz"), Some(4020));
    }
}
