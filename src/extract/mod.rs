//! Stateless text extraction helpers
//!
//! These are pure functions over text already read from a page:
//! - Email and phone detection and normalization
//! - Postal code and street derivation from free-form addresses
//! - Company size and publication date parsing

mod address;
mod contact;
mod values;

pub use address::{find_postal_code, street_from_address};
pub use contact::{clean_phone_number, find_email_in_text, find_phone_in_text};
pub use values::{parse_company_size, parse_post_date};

/// Collapses runs of whitespace into single spaces and trims the result
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  c "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }
}
