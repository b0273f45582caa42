#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row reconstruction for tax lien listing text.
//!
//! Text recovered from a county PDF (or pasted by hand) has lost its table
//! structure. [`reconstruct`] rebuilds rows from it with a
//! jurisdiction-specific [`RowLayout`]:
//!
//! 1. Optionally join wrapped records into logical lines
//!    ([`accumulate`]).
//! 2. Split the document into header-bounded segments and map delimited
//!    cells to the header's columns ([`header`]).
//! 3. Fall back to pattern-scanning every line for a parcel id when no
//!    header is found or header parsing yields nothing ([`scan`]).
//! 4. Normalize fields and drop rows that fail validation ([`filter`]).

pub mod accumulate;
pub mod address;
pub mod filter;
pub mod header;
pub mod layout;
pub mod normalize;
pub mod scan;

pub use layout::{HeaderColumn, RowLayout};
use tax_lien_models::CandidateLienRecord;

/// Errors building a [`RowLayout`].
#[derive(Debug, thiserror::Error)]
pub enum RowsError {
    /// A configured pattern did not compile.
    #[error("invalid {field} pattern: {source}")]
    Regex {
        /// Which layout field held the pattern.
        field: &'static str,
        /// Compiler error.
        source: regex::Error,
    },
}

/// Un-normalized field values for one row, as found in the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// Parcel id text.
    pub parcel: Option<String>,
    /// Owner text.
    pub owner: Option<String>,
    /// Situs text, possibly with city, state, and zip attached.
    pub address: Option<String>,
    /// City column, when the source has one.
    pub city: Option<String>,
    /// Zip column, when the source has one.
    pub zip: Option<String>,
    /// Amount text (`"$1,250.00"`).
    pub amount: Option<String>,
    /// Sale date text.
    pub sale_date: Option<String>,
    /// Everything else worth keeping: sale numbers, legal descriptions.
    pub legal: Vec<String>,
}

impl RawRow {
    /// Assigns a cell to the field for `column`.
    pub fn set(&mut self, column: HeaderColumn, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }

        let slot = match column {
            HeaderColumn::Parcel => &mut self.parcel,
            HeaderColumn::Owner => &mut self.owner,
            HeaderColumn::Address => &mut self.address,
            HeaderColumn::City => &mut self.city,
            HeaderColumn::Zip => &mut self.zip,
            HeaderColumn::Amount => &mut self.amount,
            HeaderColumn::SaleDate => &mut self.sale_date,
            HeaderColumn::SaleNumber | HeaderColumn::Legal => {
                self.legal.push(value.to_owned());
                return;
            }
        };
        *slot = Some(value.to_owned());
    }
}

/// Which strategy produced a [`Reconstruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    /// Rows came from header-bounded segments.
    HeaderAnchored,
    /// Rows came from scanning every line for a parcel id.
    PatternScan,
}

/// Records rebuilt from one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    /// Valid records, in document order.
    pub records: Vec<CandidateLienRecord>,
    /// Rows dropped by the validity filter, plus lines under a header
    /// that held no parcel id.
    pub skipped: usize,
    /// Strategy that produced the rows.
    pub strategy: Strategy,
}

/// Rebuilds candidate records from listing text.
#[must_use]
pub fn reconstruct(text: &str, layout: &RowLayout) -> Reconstruction {
    let mut lines: Vec<String> = text.lines().map(|l| l.trim_end().to_owned()).collect();
    if layout.continuation {
        lines = accumulate::logical_lines(&lines, layout);
    }

    let segments = header::segment(&lines, layout);
    let mut strategy = Strategy::HeaderAnchored;
    let mut rows = Vec::new();
    let mut unparsed = 0;
    if segments.iter().any(|s| s.columns.is_some()) {
        for segment in &segments {
            let (segment_rows, segment_unparsed) = rows_from_segment(segment, layout);
            rows.extend(segment_rows);
            unparsed += segment_unparsed;
        }
    }

    if rows.is_empty() {
        strategy = Strategy::PatternScan;
        unparsed = 0;
        rows = lines
            .iter()
            .filter(|line| !header::is_noise(line, layout))
            .filter_map(|line| scan::scan_line(line, layout))
            .collect();
    } else if unparsed > 0 {
        log::debug!("Skipping {unparsed} line(s) under a header with no parcel id");
    }

    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = unparsed;
    for row in rows {
        match filter::finish(row, layout) {
            Ok(record) => records.push(record),
            Err(reason) => {
                log::debug!("Skipping row: {reason}");
                skipped += 1;
            }
        }
    }

    log::debug!(
        "Reconstructed {} record(s) via {strategy}, skipped {skipped}",
        records.len()
    );

    Reconstruction {
        records,
        skipped,
        strategy,
    }
}

/// Maps a segment's lines to rows. Returns the rows and the number of
/// lines under a header that held no parcel id; text before the first
/// header is not counted.
fn rows_from_segment(segment: &header::Segment, layout: &RowLayout) -> (Vec<RawRow>, usize) {
    let mut rows = Vec::with_capacity(segment.lines.len());
    let mut unparsed = 0;

    for line in &segment.lines {
        let row = match &segment.columns {
            Some(columns) if columns.len() > 1 => {
                let cells = scan::split_cells(line);
                if cells.len() == columns.len() {
                    let mut row = RawRow::default();
                    for (column, cell) in columns.iter().zip(&cells) {
                        row.set(*column, cell);
                    }
                    Some(row)
                } else {
                    scan::scan_line(line, layout)
                }
            }
            _ => scan::scan_line(line, layout),
        };

        match row {
            Some(row) => rows.push(row),
            None if segment.columns.is_some() => unparsed += 1,
            None => {}
        }
    }

    (rows, unparsed)
}
