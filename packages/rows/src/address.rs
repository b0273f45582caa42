//! Situs address parsing.
//!
//! County listings print the situs address in one of three shapes:
//! comma-separated (`"100 Main St, Atlanta, GA 30303"`), run-on with a
//! trailing zip (`"100 Main St Atlanta 30303"`), or street only
//! (`"0 BOULEVARD GRANADA SW"`). Street-only text is left alone: without
//! a zip or comma there is no reliable boundary between street and city.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Street suffixes, abbreviated and spelled out.
static STREET_SUFFIXES: LazyLock<BTreeSet<&'static str>> = LazyLock::new(|| {
    BTreeSet::from([
        "ALY", "ALLEY", "AV", "AVE", "AVENUE", "BLVD", "BOULEVARD", "CIR", "CIRCLE", "CT",
        "COURT", "CV", "COVE", "DR", "DRIVE", "HWY", "HIGHWAY", "LN", "LANE", "LOOP", "PATH",
        "PIKE", "PKWY", "PARKWAY", "PL", "PLACE", "RD", "ROAD", "ROW", "RUN", "SQ", "SQUARE",
        "ST", "STREET", "TER", "TERRACE", "TRL", "TRAIL", "WALK", "WAY", "XING",
    ])
});

/// Directional abbreviations.
static DIRECTIONALS: LazyLock<BTreeSet<&'static str>> =
    LazyLock::new(|| BTreeSet::from(["N", "S", "E", "W", "NE", "NW", "SE", "SW"]));

/// USPS state and territory codes.
static STATE_CODES: LazyLock<BTreeSet<&'static str>> = LazyLock::new(|| {
    BTreeSet::from([
        "AK", "AL", "AR", "AZ", "CA", "CO", "CT", "DC", "DE", "FL", "GA", "HI", "IA", "ID", "IL",
        "IN", "KS", "KY", "LA", "MA", "MD", "ME", "MI", "MN", "MO", "MS", "MT", "NC", "ND", "NE",
        "NH", "NJ", "NM", "NV", "NY", "OH", "OK", "OR", "PA", "PR", "RI", "SC", "SD", "TN", "TX",
        "UT", "VA", "VT", "WA", "WI", "WV", "WY",
    ])
});

static ZIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}(?:-\d{4})?$").expect("valid regex"));

/// A house number followed by a word, marking where a street begins.
static HOUSE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+[A-Za-z]?\s+[A-Za-z0-9]").expect("valid regex"));

/// Text made only of name characters (letters, spaces, `&`, `,`, `.`,
/// `'`, `-`).
static NAME_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z&,.'\- ]*$").expect("valid regex"));

/// Components recovered from free-text situs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAddress {
    /// Street portion (house number, name, suffix, directional).
    pub street: String,
    /// City, when it could be separated from the street.
    pub city: Option<String>,
    /// Two-letter state code or the configured state name.
    pub state: Option<String>,
    /// Five-digit or ZIP+4 code.
    pub zip: Option<String>,
}

/// Splits free-text situs into street, city, state, and zip.
///
/// `default_state` is additionally accepted as a state token (e.g.
/// `"GEORGIA"`), case-insensitively.
#[must_use]
pub fn parse_address(raw: &str, default_state: Option<&str>) -> ParsedAddress {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    if text.contains(',') {
        return parse_comma_separated(&text, default_state);
    }

    let tokens: Vec<&str> = text.split(' ').filter(|t| !t.is_empty()).collect();
    match tokens.last() {
        Some(last) if ZIP_RE.is_match(last) => parse_trailing_zip(&tokens, default_state),
        _ => ParsedAddress {
            street: text,
            ..ParsedAddress::default()
        },
    }
}

fn parse_comma_separated(text: &str, default_state: Option<&str>) -> ParsedAddress {
    let parts: Vec<&str> = text
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let Some((street, rest)) = parts.split_first() else {
        return ParsedAddress::default();
    };

    let mut tail: Vec<&str> = rest.iter().flat_map(|p| p.split(' ')).collect();
    let zip = take_zip(&mut tail);
    let state = take_state(&mut tail, default_state);

    ParsedAddress {
        street: (*street).to_owned(),
        city: non_empty(&tail.join(" ")),
        state,
        zip,
    }
}

fn parse_trailing_zip(tokens: &[&str], default_state: Option<&str>) -> ParsedAddress {
    let mut tokens = tokens.to_vec();
    let zip = take_zip(&mut tokens);
    let state = take_state(&mut tokens, default_state);

    // The city starts after the last suffix or directional, provided
    // something follows it.
    let boundary = tokens
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .find(|(_, t)| is_street_marker(t))
        .map(|(i, _)| i);

    let (street, city) = match boundary {
        Some(i) if i + 1 < tokens.len() => (tokens[..=i].join(" "), tokens[i + 1..].join(" ")),
        _ => (tokens.join(" "), String::new()),
    };

    ParsedAddress {
        street,
        city: non_empty(&city),
        state,
        zip,
    }
}

fn take_zip(tokens: &mut Vec<&str>) -> Option<String> {
    match tokens.last() {
        Some(last) if ZIP_RE.is_match(last) => tokens.pop().map(str::to_owned),
        _ => None,
    }
}

fn take_state(tokens: &mut Vec<&str>, default_state: Option<&str>) -> Option<String> {
    let last = tokens.last()?.trim_end_matches('.');
    let upper = last.to_uppercase();

    // "100 MAIN ST NE 30303": a directional right after a suffix is not
    // Nebraska.
    let after_suffix = tokens.len() > 1
        && DIRECTIONALS.contains(upper.as_str())
        && STREET_SUFFIXES.contains(tokens[tokens.len() - 2].to_uppercase().as_str());
    let is_code = last.len() == 2
        && STATE_CODES.contains(upper.as_str())
        && tokens.len() > 1
        && !after_suffix;
    let is_default = default_state.is_some_and(|s| s.eq_ignore_ascii_case(last));

    if is_code || is_default {
        tokens.pop();
        return Some(upper);
    }
    None
}

fn is_street_marker(token: &str) -> bool {
    let upper = token.trim_end_matches('.').to_uppercase();
    STREET_SUFFIXES.contains(upper.as_str()) || DIRECTIONALS.contains(upper.as_str())
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Separates an owner name that leaked into the front of an address
/// column (`"SMITH JOHN 100 MAIN ST"`).
///
/// Returns `(Some(name), street)` when the address does not start with a
/// digit, a house number appears later, and everything before it looks
/// like a name. Otherwise returns `(None, address)` unchanged.
#[must_use]
pub fn split_leading_name(address: &str) -> (Option<String>, String) {
    let trimmed = address.trim();
    if trimmed.is_empty() || trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        return (None, trimmed.to_owned());
    }

    let Some(found) = HOUSE_NUMBER_RE.find(trimmed) else {
        return (None, trimmed.to_owned());
    };

    let name = trimmed[..found.start()].trim().trim_end_matches(',').trim();
    if name.is_empty() || !NAME_LIKE_RE.is_match(name) {
        return (None, trimmed.to_owned());
    }

    (Some(name.to_owned()), trimmed[found.start()..].trim().to_owned())
}
