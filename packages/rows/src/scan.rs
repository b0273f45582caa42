//! Pattern-scan row parsing.
//!
//! Used when a document has no recognizable header, or when a row under a
//! header does not split into the header's column count. The parcel id is
//! found by pattern and becomes the anchor. The remainder is split on the
//! strongest delimiter present (`|`, then tab, then runs of three or more
//! spaces) and each piece is further broken into dates, amounts, and
//! identifiers located in source order. What is left is text: the first
//! digit-led text is the address, the first other text is the owner.

use std::sync::LazyLock;

use regex::Regex;

use crate::RawRow;
use crate::address::split_leading_name;
use crate::layout::RowLayout;

static WIDE_GAP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {3,}").expect("valid regex"));

/// Dates, amounts, and identifiers inside free text. Alternation order
/// matters: a date must win over an amount.
static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        (?P<date>
            \b\d{1,2}/\d{1,2}/(?:\d{4}|\d{2})\b
          | \b\d{4}-\d{2}-\d{2}\b
          | \b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}\b
        )
        | (?P<amount>
            \$\s*\d[\d,]*(?:\.\d{2})?
          | \b\d{1,3}(?:,\d{3})+(?:\.\d{2})?\b
          | \b\d+\.\d{2}\b
        )
        | (?P<ident>
            (?:\#|\bno\.?\s*)\d+\b
        )",
    )
    .expect("valid regex")
});

static ZIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}(?:-\d{4})?$").expect("valid regex"));

static BARE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?\d+$").expect("valid regex"));

/// A typed piece of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Date(String),
    Amount(String),
    Identifier(String),
    Text(String),
}

/// Splits a row on the strongest delimiter it contains.
///
/// Returns a single cell when the row has no delimiter.
#[must_use]
pub fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let cells: Vec<&str> = if trimmed.contains('|') {
        trimmed.split('|').collect()
    } else if trimmed.contains('\t') {
        trimmed.split('\t').collect()
    } else if WIDE_GAP_RE.is_match(trimmed) {
        WIDE_GAP_RE.split(trimmed).collect()
    } else {
        vec![trimmed]
    };

    cells
        .into_iter()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Scans one line for a parcel id and classifies the rest of the line.
///
/// Returns `None` when the line contains no parcel id.
#[must_use]
pub fn scan_line(line: &str, layout: &RowLayout) -> Option<RawRow> {
    let anchor = layout.parcel_pattern.find(line)?;

    let mut row = RawRow {
        parcel: Some(anchor.as_str().to_owned()),
        ..RawRow::default()
    };

    let before = line[..anchor.start()].trim().trim_matches('|').trim();
    let after = line[anchor.end()..].trim();

    let mut parts = Vec::new();
    if !before.is_empty() {
        if BARE_NUMBER_RE.is_match(before)
            || layout.record_start.as_ref().is_some_and(|re| re.is_match(before))
        {
            parts.push(Part::Identifier(before.to_owned()));
        } else {
            for cell in split_cells(before) {
                parts.extend(decompose(&cell));
            }
        }
    }
    for cell in split_cells(after) {
        parts.extend(decompose(&cell));
    }

    classify(&mut row, parts);
    Some(row)
}

/// Breaks free text into dates, amounts, identifiers, and the text
/// between them, in source order.
fn decompose(text: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut last = 0;

    for caps in FIELD_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };

        push_text(&mut parts, &text[last..whole.start()]);
        let value = whole.as_str().trim().to_owned();
        if caps.name("date").is_some() {
            parts.push(Part::Date(value));
        } else if caps.name("amount").is_some() {
            parts.push(Part::Amount(value));
        } else {
            parts.push(Part::Identifier(value));
        }
        last = whole.end();
    }

    push_text(&mut parts, &text[last..]);
    parts
}

fn push_text(parts: &mut Vec<Part>, text: &str) {
    let trimmed = text.trim().trim_matches(|c: char| c == ',' || c == ';').trim();
    if !trimmed.is_empty() {
        parts.push(Part::Text(trimmed.to_owned()));
    }
}

fn classify(row: &mut RawRow, parts: Vec<Part>) {
    for part in parts {
        match part {
            Part::Date(value) if row.sale_date.is_none() => row.sale_date = Some(value),
            Part::Amount(value) if row.amount.is_none() => row.amount = Some(value),
            Part::Date(value) | Part::Amount(value) | Part::Identifier(value) => {
                row.legal.push(value);
            }
            Part::Text(value) => classify_text(row, value),
        }
    }
}

fn classify_text(row: &mut RawRow, value: String) {
    if row.address.is_some() && row.zip.is_none() && ZIP_RE.is_match(&value) {
        row.zip = Some(value);
    } else if row.address.is_none() && value.starts_with(|c: char| c.is_ascii_digit()) {
        row.address = Some(value);
    } else if row.address.is_none() && row.owner.is_none() {
        match split_leading_name(&value) {
            (Some(name), street) => {
                row.owner = Some(name);
                row.address = Some(street);
            }
            (None, text) => row.owner = Some(text),
        }
    } else if row.owner.is_none() {
        row.owner = Some(value);
    } else {
        row.legal.push(value);
    }
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
    }

    #[test]
    fn delimiter_priority() {
        assert_eq!(split_cells("a | b   c"), vec!["a", "b   c"]);
        assert_eq!(split_cells("a\tb   c"), vec!["a", "b   c"]);
        assert_eq!(split_cells("a   b  c"), vec!["a", "b  c"]);
        assert_eq!(split_cells(" a b c "), vec!["a b c"]);
    }

    #[test]
    fn parcel_followed_by_street_only() {
        let row = scan_line("14-0184-0008-002-7 0 BOULEVARD GRANADA SW", &layout()).unwrap();
        assert_eq!(row.parcel.as_deref(), Some("14-0184-0008-002-7"));
        assert_eq!(row.address.as_deref(), Some("0 BOULEVARD GRANADA SW"));
        assert_eq!(row.owner, None);
    }

    #[test]
    fn free_text_row_with_owner_amount_and_date() {
        let row = scan_line(
            "14 0184 0008 002 7 SMITH JOHN 100 MAIN ST ATLANTA 30303 $1,250.00 06/03/2025",
            &layout(),
        )
        .unwrap();
        assert_eq!(row.parcel.as_deref(), Some("14 0184 0008 002 7"));
        assert_eq!(row.owner.as_deref(), Some("SMITH JOHN"));
        assert_eq!(row.address.as_deref(), Some("100 MAIN ST ATLANTA 30303"));
        assert_eq!(row.amount.as_deref(), Some("$1,250.00"));
        assert_eq!(row.sale_date.as_deref(), Some("06/03/2025"));
    }

    #[test]
    fn delimited_row_with_sale_number_prefix() {
        let row = scan_line(
            "1001   14-0184-0008-002-7   DOE JANE   12 OAK DR   30344   1,204.11   #5521",
            &layout(),
        )
        .unwrap();
        assert_eq!(row.owner.as_deref(), Some("DOE JANE"));
        assert_eq!(row.address.as_deref(), Some("12 OAK DR"));
        assert_eq!(row.zip.as_deref(), Some("30344"));
        assert_eq!(row.amount.as_deref(), Some("1,204.11"));
        assert_eq!(row.legal, vec!["1001", "#5521"]);
    }

    #[test]
    fn lines_without_parcel_are_not_rows() {
        assert_eq!(scan_line("SMITH JOHN 100 MAIN ST", &layout()), None);
    }
}
