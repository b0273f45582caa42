//! Per-jurisdiction row layout.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::RowsError;

/// A column a listing header can name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HeaderColumn {
    /// Parcel / map identifier.
    Parcel,
    /// Owner of record.
    Owner,
    /// Situs address.
    Address,
    /// City.
    City,
    /// Zip code.
    Zip,
    /// Amount due.
    Amount,
    /// Sale date.
    SaleDate,
    /// Sale or item number.
    SaleNumber,
    /// Legal description.
    Legal,
}

/// Header aliases used when a layout does not override them.
const DEFAULT_HEADER_KEYWORDS: &[(HeaderColumn, &[&str])] = &[
    (
        HeaderColumn::Parcel,
        &["parcel", "parcel id", "parcel number", "map parcel", "pin", "apn"],
    ),
    (HeaderColumn::Owner, &["owner", "owner name", "taxpayer", "name"]),
    (
        HeaderColumn::Address,
        &["address", "property address", "situs", "location", "property location"],
    ),
    (HeaderColumn::City, &["city"]),
    (HeaderColumn::Zip, &["zip", "zip code"]),
    (
        HeaderColumn::Amount,
        &["amount", "amount due", "tax due", "total due", "balance", "taxes"],
    ),
    (HeaderColumn::SaleDate, &["sale date", "date"]),
    (HeaderColumn::SaleNumber, &["sale no", "sale number", "item"]),
    (HeaderColumn::Legal, &["legal", "legal description", "description"]),
];

/// How to reconstruct rows from one jurisdiction's listing text.
#[derive(Debug, Clone)]
pub struct RowLayout {
    /// Per-column aliases, each split into lowercase tokens.
    pub(crate) header_keywords: BTreeMap<HeaderColumn, Vec<Vec<String>>>,
    pub(crate) min_header_matches: usize,
    pub(crate) parcel_pattern: Regex,
    pub(crate) parcel_shape: Regex,
    pub(crate) record_start: Option<Regex>,
    pub(crate) denylist: Vec<String>,
    pub(crate) default_city: Option<String>,
    pub(crate) default_state: Option<String>,
    pub(crate) continuation: bool,
}

impl RowLayout {
    /// Builds a layout from the pattern that finds parcel ids in text and
    /// the anchored shape a normalized parcel id must match.
    ///
    /// # Errors
    ///
    /// Returns [`RowsError::Regex`] if either pattern does not compile.
    pub fn new(parcel_pattern: &str, parcel_shape: &str) -> Result<Self, RowsError> {
        let mut header_keywords = BTreeMap::new();
        for (column, aliases) in DEFAULT_HEADER_KEYWORDS {
            header_keywords.insert(*column, aliases.iter().map(|a| tokenize(a)).collect());
        }

        Ok(Self {
            header_keywords,
            min_header_matches: 2,
            parcel_pattern: compile("parcel_pattern", parcel_pattern)?,
            parcel_shape: compile("parcel_shape", &anchor(parcel_shape))?,
            record_start: None,
            denylist: Vec::new(),
            default_city: None,
            default_state: None,
            continuation: false,
        })
    }

    /// Replaces the aliases for `column`.
    #[must_use]
    pub fn with_header_keywords(mut self, column: HeaderColumn, aliases: &[String]) -> Self {
        self.header_keywords
            .insert(column, aliases.iter().map(|a| tokenize(a)).collect());
        self
    }

    /// Minimum number of distinct columns a line must name to count as a
    /// header.
    #[must_use]
    pub fn with_min_header_matches(mut self, min: usize) -> Self {
        self.min_header_matches = min.max(1);
        self
    }

    /// Sets the pattern that marks the first line of a multi-line record
    /// (typically a sale number).
    ///
    /// # Errors
    ///
    /// Returns [`RowsError::Regex`] if the pattern does not compile.
    pub fn with_record_start(mut self, pattern: &str) -> Result<Self, RowsError> {
        self.record_start = Some(compile("record_start", pattern)?);
        Ok(self)
    }

    /// Adds lowercase substrings that mark section-title and footer lines.
    #[must_use]
    pub fn with_denylist(mut self, entries: &[String]) -> Self {
        self.denylist
            .extend(entries.iter().map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()));
        self
    }

    /// City used when a record's address does not carry one.
    #[must_use]
    pub fn with_default_city(mut self, city: impl Into<String>) -> Self {
        self.default_city = Some(city.into());
        self
    }

    /// State accepted as a state token when splitting addresses.
    #[must_use]
    pub fn with_default_state(mut self, state: impl Into<String>) -> Self {
        self.default_state = Some(state.into());
        self
    }

    /// Enables joining continuation lines into one logical record.
    #[must_use]
    pub const fn with_continuation(mut self, enabled: bool) -> Self {
        self.continuation = enabled;
        self
    }

    /// Default city, if configured.
    #[must_use]
    pub fn default_city(&self) -> Option<&str> {
        self.default_city.as_deref()
    }

    /// Default state, if configured.
    #[must_use]
    pub fn default_state(&self) -> Option<&str> {
        self.default_state.as_deref()
    }

    /// Returns `true` if a normalized parcel id has this jurisdiction's
    /// shape.
    #[must_use]
    pub fn parcel_has_shape(&self, parcel_id: &str) -> bool {
        self.parcel_shape.is_match(parcel_id)
    }
}

/// Lowercases and splits an alias into tokens.
pub(crate) fn tokenize(alias: &str) -> Vec<String> {
    alias
        .split(|c: char| c.is_whitespace() || c == '/' || c == '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn anchor(pattern: &str) -> String {
    let start = if pattern.starts_with('^') { "" } else { "^" };
    let end = if pattern.ends_with('$') { "" } else { "$" };
    format!("{start}(?:{}){end}", pattern.trim_start_matches('^').trim_end_matches('$'))
}

fn compile(field: &'static str, pattern: &str) -> Result<Regex, RowsError> {
    Regex::new(pattern).map_err(|source| RowsError::Regex { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULTON_PATTERN: &str = r"\b\d{2}[\s-]+\d{3,4}[A-Z]?[\s-]+\d{4}[\s-]+\d{3}[\s-]+\d\b";
    const FULTON_SHAPE: &str = r"\d{2}-\d{3,4}[A-Z]?-\d{4}-\d{3}-\d";

    #[test]
    fn shape_is_anchored() {
        let layout = RowLayout::new(FULTON_PATTERN, FULTON_SHAPE).unwrap();
        assert!(layout.parcel_has_shape("14-0184-0008-002-7"));
        assert!(!layout.parcel_has_shape("X14-0184-0008-002-7"));
        assert!(!layout.parcel_has_shape("14-0184-0008-002-77"));
    }

    #[test]
    fn invalid_pattern_names_the_field() {
        let err = RowLayout::new("(", FULTON_SHAPE).unwrap_err();
        assert!(err.to_string().contains("parcel_pattern"));
    }

    #[test]
    fn header_keywords_can_be_replaced() {
        let layout = RowLayout::new(FULTON_PATTERN, FULTON_SHAPE)
            .unwrap()
            .with_header_keywords(HeaderColumn::Parcel, &["Map/Parcel No".to_owned()]);
        assert_eq!(
            layout.header_keywords[&HeaderColumn::Parcel],
            vec![vec!["map".to_owned(), "parcel".to_owned(), "no".to_owned()]]
        );
    }

    #[test]
    fn header_column_parses_from_snake_case() {
        assert_eq!("sale_date".parse::<HeaderColumn>().unwrap(), HeaderColumn::SaleDate);
    }
}
