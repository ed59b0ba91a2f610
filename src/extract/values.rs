//! Company size and publication date parsing

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)*").expect("valid number regex"));

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})\.(\d{2})\.(\d{4})").expect("valid date regex"));

/// Parses a company size from its leading numeric token, rounded
///
/// Groups of exactly three digits after a `.` or `,` are read as thousands
/// (`"1.000"`, `"1,000"`); any other trailing group is a decimal fraction
/// (`"2,5"`).
///
/// # Examples
///
/// ```
/// use stellwerk::extract::parse_company_size;
///
/// assert_eq!(parse_company_size("51-200 Mitarbeiter"), Some(51));
/// assert_eq!(parse_company_size("1.000+ employees"), Some(1000));
/// assert_eq!(parse_company_size("2,5 Tsd."), Some(3));
/// assert_eq!(parse_company_size("keine Angabe"), None);
/// ```
pub fn parse_company_size(text: &str) -> Option<u32> {
    let token = NUMBER_RE.find(text)?.as_str();
    let groups: Vec<&str> = token.split(|c| c == '.' || c == ',').collect();

    let mut integer = groups[0].to_string();
    let mut fraction: Option<&str> = None;
    for (i, group) in groups.iter().enumerate().skip(1) {
        if fraction.is_none() && group.len() == 3 {
            integer.push_str(group);
        } else if fraction.is_none() && i == groups.len() - 1 {
            fraction = Some(group);
        } else {
            break;
        }
    }

    let value: f64 = match fraction {
        Some(frac) => format!("{}.{}", integer, frac).parse().ok()?,
        None => integer.parse().ok()?,
    };

    let rounded = value.round();
    if !(0.0..=f64::from(u32::MAX)).contains(&rounded) {
        return None;
    }
    Some(rounded as u32)
}

/// Parses the `dd.mm.yyyy` date embedded in a publication-date text
///
/// The date is interpreted as midnight UTC.
///
/// # Examples
///
/// ```
/// use stellwerk::extract::parse_post_date;
///
/// let date = parse_post_date("Veröffentlicht: 03.04.2024").unwrap();
/// assert_eq!(date.to_rfc3339(), "2024-04-03T00:00:00+00:00");
/// assert!(parse_post_date("vor 3 Tagen").is_none());
/// ```
pub fn parse_post_date(text: &str) -> Option<DateTime<Utc>> {
    let caps = DATE_RE.captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_size_ranges() {
        assert_eq!(parse_company_size("11-50"), Some(11));
        assert_eq!(parse_company_size("10.000 - 50.000 Mitarbeiter"), Some(10000));
        assert_eq!(parse_company_size("ca. 250"), Some(250));
    }

    #[test]
    fn test_company_size_decimals() {
        assert_eq!(parse_company_size("1.5"), Some(2));
        assert_eq!(parse_company_size("1,4"), Some(1));
        assert_eq!(parse_company_size("1.250,7"), Some(1251));
    }

    #[test]
    fn test_company_size_without_number() {
        assert_eq!(parse_company_size(""), None);
        assert_eq!(parse_company_size("viele"), None);
    }

    #[test]
    fn test_post_date_invalid_calendar_date() {
        assert!(parse_post_date("31.02.2024").is_none());
    }

    #[test]
    fn test_post_date_with_prefix_text() {
        let date = parse_post_date("Online seit 28.12.2023 (aktualisiert)").unwrap();
        assert_eq!(date.to_rfc3339(), "2023-12-28T00:00:00+00:00");
    }
}
