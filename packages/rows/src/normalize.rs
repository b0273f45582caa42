//! Field normalizers: currency, parcel identifiers, and dates.
//!
//! All of these are total. Bad input yields `0.0`, an empty string, or the
//! raw value, never an error.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

/// Dashes with any surrounding whitespace.
static DASH_SPACING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-\s*").expect("valid regex"));

/// Remaining whitespace runs inside an identifier.
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Consecutive dashes left after the two passes above.
static REPEATED_DASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{2,}").expect("valid regex"));

/// `M/D/YY` and `MM/DD/YYYY` (also with `-` separators).
static NUMERIC_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{2}|\d{4})$").expect("valid regex")
});

/// Parses a currency amount, returning `0.0` for anything that is not a
/// finite non-negative number.
///
/// `$`, thousands separators, and whitespace are ignored, so
/// `"$1,250.00"` parses as `1250.0`. Accounting negatives such as
/// `"(12.00)"` and plain negatives both yield `0.0`.
#[must_use]
pub fn parse_currency(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();

    if cleaned.starts_with('(') {
        return 0.0;
    }

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value,
        _ => 0.0,
    }
}

/// Canonicalizes a parcel identifier.
///
/// Whitespace around dashes is removed, remaining whitespace runs become a
/// single dash, repeated dashes collapse, leading and trailing dashes are
/// stripped, and the result is uppercased. `"14 -0184-0008-002-7"` and
/// `"14  0184  0008  002  7"` both become `"14-0184-0008-002-7"`.
#[must_use]
pub fn normalize_parcel_id(raw: &str) -> String {
    let unified: String = raw
        .trim()
        .chars()
        .map(|c| if matches!(c, '\u{2010}'..='\u{2015}') { '-' } else { c })
        .collect();

    let dashed = DASH_SPACING_RE.replace_all(&unified, "-");
    let dashed = WHITESPACE_RE.replace_all(&dashed, "-");
    let dashed = REPEATED_DASH_RE.replace_all(&dashed, "-");

    dashed.trim_matches('-').to_uppercase()
}

/// Converts a recognized date to ISO `YYYY-MM-DD`; anything unrecognized
/// is returned trimmed but otherwise unchanged.
///
/// Recognized: `MM/DD/YYYY`, `M/D/YY`, `Month D, YYYY` (full or
/// abbreviated month), and ISO dates.
#[must_use]
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    parse_date(trimmed).map_or_else(|| trimmed.to_owned(), |d| d.format("%Y-%m-%d").to_string())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Some(caps) = NUMERIC_DATE_RE.captures(s) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year_digits = &caps[3];
        let mut year: i32 = year_digits.parse().ok()?;
        if year_digits.len() == 2 {
            year += if year < 70 { 2000 } else { 1900 };
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }

    let without_period = s.replacen('.', "", 1);
    NaiveDate::parse_from_str(&without_period, "%B %d, %Y")
        .or_else(|_| NaiveDate::parse_from_str(&without_period, "%B %d %Y"))
        .ok()
}
