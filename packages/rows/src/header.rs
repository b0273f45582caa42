//! Header detection and section segmentation.
//!
//! A header is any line (or pair of adjacent lines) that names at least
//! `min_header_matches` distinct columns. Matching is case-insensitive,
//! ignores column order, undoes common OCR digit-for-letter swaps, and
//! tolerates one edit in keywords of four or more letters (`OWNFR`,
//! `ADDRES`). Each header opens a [`Segment`] that runs until the next
//! header or the end of the document.

use std::sync::LazyLock;

use regex::Regex;

use crate::layout::{HeaderColumn, RowLayout};

/// Pagination footers: `Page 3`, `Page 3 of 12`, `3 of 12`, `- 3 -`.
static PAGINATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:page\s+\d+(?:\s+of\s+\d+)?|\d+\s+of\s+\d+|-\s*\d+\s*-)\s*$")
        .expect("valid regex")
});

/// Keywords at least this long tolerate one edit.
const FUZZY_MIN_LEN: usize = 4;

/// A run of lines under one header (or before the first header).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Columns named by the header, in the order they appear. `None` for
    /// text preceding the first header.
    pub columns: Option<Vec<HeaderColumn>>,
    /// Data lines, with noise and blank lines removed.
    pub lines: Vec<String>,
}

/// Splits `lines` into header-bounded segments.
///
/// Lines before the first header form a segment without columns, which is
/// omitted when empty.
#[must_use]
pub fn segment(lines: &[String], layout: &RowLayout) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = Segment {
        columns: None,
        lines: Vec::new(),
    };

    let mut i = 0;
    while i < lines.len() {
        if let Some((columns, consumed)) = detect_at(lines, i, layout) {
            if current.columns.is_some() || !current.lines.is_empty() {
                segments.push(current);
            }
            log::trace!("header at line {i}: {columns:?}");
            current = Segment {
                columns: Some(columns),
                lines: Vec::new(),
            };
            i += consumed;
            continue;
        }

        let line = &lines[i];
        if !line.trim().is_empty() && !is_noise(line, layout) {
            current.lines.push(line.clone());
        }
        i += 1;
    }

    if current.columns.is_some() || !current.lines.is_empty() {
        segments.push(current);
    }

    segments
}

/// Detects a header starting at `lines[i]`, returning its columns and how
/// many lines it spans (one or two).
#[must_use]
pub fn detect_at(lines: &[String], i: usize, layout: &RowLayout) -> Option<(Vec<HeaderColumn>, usize)> {
    let line = lines.get(i)?;
    if let Some(columns) = match_header(line, layout) {
        return Some((columns, 1));
    }

    let next = lines.get(i + 1)?;
    if line.trim().is_empty() || next.trim().is_empty() {
        return None;
    }

    let joined = match_header(&format!("{line} {next}"), layout)?;
    if match_header(next, layout).is_some_and(|alone| alone.len() >= joined.len()) {
        return None;
    }

    Some((joined, 2))
}

/// Returns the columns `line` names if it qualifies as a header.
#[must_use]
pub fn match_header(line: &str, layout: &RowLayout) -> Option<Vec<HeaderColumn>> {
    if layout.parcel_pattern.is_match(line) {
        return None;
    }

    let tokens = header_tokens(line);
    if tokens.is_empty() {
        return None;
    }

    let mut aliases: Vec<(HeaderColumn, &Vec<String>)> = layout
        .header_keywords
        .iter()
        .flat_map(|(column, aliases)| aliases.iter().map(move |alias| (*column, alias)))
        .filter(|(_, alias)| !alias.is_empty())
        .collect();
    // Longer aliases claim tokens first so "sale date" beats "date".
    aliases.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut used = vec![false; tokens.len()];
    let mut found: Vec<(usize, HeaderColumn)> = Vec::new();

    for (column, alias) in aliases {
        if found.iter().any(|(_, c)| *c == column) || alias.len() > tokens.len() {
            continue;
        }

        let position = (0..=tokens.len() - alias.len()).find(|&start| {
            alias.iter().enumerate().all(|(k, keyword)| {
                !used[start + k] && fuzzy_eq(&tokens[start + k], keyword)
            })
        });

        if let Some(start) = position {
            used[start..start + alias.len()].fill(true);
            found.push((start, column));
        }
    }

    if found.len() < layout.min_header_matches {
        return None;
    }

    found.sort_by_key(|(position, _)| *position);
    Some(found.into_iter().map(|(_, column)| column).collect())
}

/// Returns `true` for section titles, footers, and pagination lines.
///
/// A line holding a parcel id is never noise, whatever else it contains.
#[must_use]
pub fn is_noise(line: &str, layout: &RowLayout) -> bool {
    if layout.parcel_pattern.is_match(line) {
        return false;
    }
    if PAGINATION_RE.is_match(line) {
        return true;
    }

    let lower = line.to_lowercase();
    layout.denylist.iter().any(|entry| lower.contains(entry.as_str()))
}

/// Lowercases, maps OCR digit look-alikes back to letters, and splits on
/// anything that is not a letter.
fn header_tokens(line: &str) -> Vec<String> {
    let mapped: String = line
        .chars()
        .map(|c| match c {
            '0' => 'o',
            '1' => 'l',
            '5' => 's',
            other => other.to_ascii_lowercase(),
        })
        .collect();

    mapped
        .split(|c: char| !c.is_alphabetic())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

fn fuzzy_eq(token: &str, keyword: &str) -> bool {
    token == keyword
        || (keyword.chars().count() >= FUZZY_MIN_LEN && edit_distance(token, keyword) <= 1)
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> RowLayout {
        RowLayout::new(
            r"\b\d{2}[\s-]+\d{3,4}[A-Z]?[\s-]+\d{4}[\s-]+\d{3}[\s-]+\d\b",
            r"\d{2}-\d{3,4}[A-Z]?-\d{4}-\d{3}-\d",
        )
        .unwrap()
        .with_denylist(&["delinquent tax sale".to_owned()])
    }

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_owned).collect()
    }

    #[test]
    fn detects_header_in_any_order_and_case() {
        let columns = match_header("Owner Name   PARCEL ID   Property Address   Amount Due", &layout());
        assert_eq!(
            columns,
            Some(vec![
                HeaderColumn::Owner,
                HeaderColumn::Parcel,
                HeaderColumn::Address,
                HeaderColumn::Amount,
            ])
        );
    }

    #[test]
    fn tolerates_ocr_damage() {
        let columns = match_header("PARCE1  OWNFR  ADDRES", &layout());
        assert_eq!(
            columns,
            Some(vec![HeaderColumn::Parcel, HeaderColumn::Owner, HeaderColumn::Address])
        );
    }

    #[test]
    fn short_keywords_need_exact_match() {
        // "zap" is one edit from "zip" but too short to be fuzzy.
        assert_eq!(match_header("zap city", &layout()), None);
    }

    #[test]
    fn data_lines_are_never_headers() {
        assert_eq!(
            match_header("14-0184-0008-002-7 OWNER ADDRESS PARCEL", &layout()),
            None
        );
    }

    #[test]
    fn joins_header_split_across_two_lines() {
        let text = lines("PARCEL ID\nOWNER NAME ADDRESS\n14-0184-0008-002-7 SMITH 1 MAIN ST");
        let (columns, consumed) = detect_at(&text, 0, &layout()).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(
            columns,
            vec![HeaderColumn::Parcel, HeaderColumn::Owner, HeaderColumn::Address]
        );
    }

    #[test]
    fn two_sections_give_two_bounded_segments() {
        let text = lines(
            "FULTON COUNTY DELINQUENT TAX SALE\n\
             PARCEL ID   OWNER   ADDRESS   AMOUNT DUE\n\
             14-0184-0008-002-7   SMITH JOHN   0 BOULEVARD GRANADA SW   $1,204.11\n\
             14-0185-0001-010-2   DOE JANE   12 OAK DR   $88.00\n\
             Page 1 of 2\n\
             \n\
             OWNER | PARCEL ID | ADDRESS\n\
             ACME LLC | 17-0001-0002-003-4 | 500 PEACHTREE ST NE\n",
        );

        let segments = segment(&text, &layout());
        assert_eq!(segments.len(), 2);

        assert_eq!(
            segments[0].columns.as_deref(),
            Some(
                &[
                    HeaderColumn::Parcel,
                    HeaderColumn::Owner,
                    HeaderColumn::Address,
                    HeaderColumn::Amount
                ][..]
            )
        );
        assert_eq!(segments[0].lines.len(), 2);
        assert!(segments[0].lines[1].starts_with("14-0185"));

        assert_eq!(
            segments[1].columns.as_deref(),
            Some(&[HeaderColumn::Owner, HeaderColumn::Parcel, HeaderColumn::Address][..])
        );
        assert_eq!(segments[1].lines, vec!["ACME LLC | 17-0001-0002-003-4 | 500 PEACHTREE ST NE"]);
    }

    #[test]
    fn pagination_and_denylist_are_noise() {
        let layout = layout();
        assert!(is_noise("Page 3 of 12", &layout));
        assert!(is_noise("  - 4 -  ", &layout));
        assert!(is_noise("2025 Delinquent Tax Sale (continued)", &layout));
        assert!(!is_noise("SMITH JOHN 0 BOULEVARD GRANADA SW", &layout));
    }

    #[test]
    fn edit_distance_counts_single_edits() {
        assert_eq!(edit_distance("owner", "owner"), 0);
        assert_eq!(edit_distance("ownfr", "owner"), 1);
        assert_eq!(edit_distance("addres", "address"), 1);
        assert_eq!(edit_distance("parcel", "pin"), 5);
    }
}
