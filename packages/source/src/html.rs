//! HTML listing extraction.
//!
//! Maps table cells to fields by fixed column offset, or runs the
//! jurisdiction's block pattern over the concatenated text of selected
//! blocks when the page has no matching table. Rows go through the same
//! cleanup and validity filter as reconstructed text rows.

use regex::Regex;
use tax_lien_rows::{HeaderColumn, RawRow, RowLayout};
use tax_lien_scraper::html_blocks::block_texts;
use tax_lien_scraper::html_table::HtmlTableExtractor;

use crate::jurisdiction::{BlockPattern, ExtractorConfig, HtmlColumns};
use crate::{Extraction, SourceError};

/// Header literals used when a jurisdiction does not list its own.
const DEFAULT_HEADER_LITERALS: &[&str] = &[
    "parcel",
    "parcel id",
    "parcel number",
    "map/parcel",
    "owner",
    "owner name",
    "address",
    "property address",
    "amount",
    "amount due",
    "tax due",
    "total due",
];

/// Named groups a block pattern may use, and the field each fills.
const BLOCK_GROUPS: &[(&str, HeaderColumn)] = &[
    ("parcel", HeaderColumn::Parcel),
    ("owner", HeaderColumn::Owner),
    ("address", HeaderColumn::Address),
    ("city", HeaderColumn::City),
    ("zip", HeaderColumn::Zip),
    ("amount", HeaderColumn::Amount),
    ("sale_date", HeaderColumn::SaleDate),
    ("legal", HeaderColumn::Legal),
];

/// Extracts candidate records from a listing page.
///
/// # Errors
///
/// * [`SourceError::NoStructure`] if neither a table nor a block pattern
///   matched anything.
/// * [`SourceError::Scrape`] if a configured selector does not compile.
/// * [`SourceError::Pattern`] if a block pattern does not compile.
/// * [`SourceError::NotHtml`] for PDF-document jurisdictions.
pub fn extract(
    html: &str,
    extractor: &ExtractorConfig,
    layout: &RowLayout,
) -> Result<Extraction, SourceError> {
    let rows = match extractor {
        ExtractorConfig::HtmlTable {
            table_selector,
            table_index,
            table_keywords,
            min_cells,
            header_literals,
            columns,
            blocks,
        } => {
            let mut table = HtmlTableExtractor::new().with_table_keywords(table_keywords);
            if let Some(selector) = table_selector {
                table = table.with_table_selector(selector);
            }
            if let Some(index) = *table_index {
                table = table.with_table_index(index);
            }
            if let Some(min) = *min_cells {
                table = table.with_min_cells(min);
            }
            table = if header_literals.is_empty() {
                table.with_header_literals(
                    &DEFAULT_HEADER_LITERALS
                        .iter()
                        .map(|&l| l.to_owned())
                        .collect::<Vec<_>>(),
                )
            } else {
                table.with_header_literals(header_literals)
            };

            let cells = table.extract(html)?;
            log::debug!("Table yielded {} data row(s)", cells.len());

            match blocks {
                Some(blocks) if cells.is_empty() => {
                    log::debug!("No table rows, falling back to block pattern");
                    block_rows(html, blocks)?
                }
                _ => cells.iter().map(|c| row_from_cells(c, columns)).collect(),
            }
        }
        ExtractorConfig::HtmlBlocks { blocks } => block_rows(html, blocks)?,
        ExtractorConfig::PdfDocuments { .. } => {
            return Err(SourceError::NotHtml {
                kind: extractor.kind(),
            });
        }
    };

    if rows.is_empty() {
        return Err(SourceError::NoStructure {
            kind: extractor.kind(),
        });
    }

    Ok(Extraction::from_rows(rows, layout))
}

/// Maps one table row to fields by column offset. Offsets past the end
/// of a short row leave the field empty.
fn row_from_cells(cells: &[String], columns: &HtmlColumns) -> RawRow {
    let mut row = RawRow::default();
    let fields = [
        (Some(columns.parcel), HeaderColumn::Parcel),
        (columns.owner, HeaderColumn::Owner),
        (columns.address, HeaderColumn::Address),
        (columns.city, HeaderColumn::City),
        (columns.zip, HeaderColumn::Zip),
        (columns.amount, HeaderColumn::Amount),
        (columns.sale_date, HeaderColumn::SaleDate),
    ];

    for (index, column) in fields {
        if let Some(value) = index.and_then(|i| cells.get(i)) {
            row.set(column, value);
        }
    }
    for value in columns.legal.iter().filter_map(|&i| cells.get(i)) {
        row.set(HeaderColumn::Legal, value);
    }

    row
}

/// Runs a block pattern over the joined text of the selected blocks.
fn block_rows(html: &str, blocks: &BlockPattern) -> Result<Vec<RawRow>, SourceError> {
    let pattern = Regex::new(&blocks.pattern)?;
    let text = block_texts(html, &blocks.block_selector)?.join("\n");

    Ok(pattern
        .captures_iter(&text)
        .map(|caps| {
            let mut row = RawRow::default();
            for (name, column) in BLOCK_GROUPS {
                if let Some(value) = caps.name(name) {
                    row.set(*column, value.as_str());
                }
            }
            row
        })
        .collect())
}
