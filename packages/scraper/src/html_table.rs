//! HTML table extraction.
//!
//! County listing pages rarely mark up their tables consistently: the data
//! table may be the second `<table>` on the page, sit among layout tables,
//! or repeat its header row every few dozen rows. [`HtmlTableExtractor`]
//! locates the data table with a positional index, header keywords, or a
//! minimum-cell-count heuristic, and returns each data row as a list of
//! whitespace-collapsed cell strings.
//!
//! Header and label rows are skipped by comparing cell text against known
//! header literals, not by row position.

use scraper::{ElementRef, Html, Selector};

use crate::{ScrapeError, collapse_whitespace};

/// Rows inside a located table.
const ROW_SELECTOR: &str = "tr";

/// Cells within a row.
const CELL_SELECTOR: &str = "td, th";

/// Extracts data rows from a table in an HTML document.
#[derive(Debug, Clone)]
pub struct HtmlTableExtractor {
    /// CSS selector for candidate table elements.
    table_selector: String,
    /// Zero-based index among candidate tables ("second table" = 1).
    table_index: Option<usize>,
    /// Keywords that must all appear in the chosen table's text.
    table_keywords: Vec<String>,
    /// Rows with fewer cells than this are ignored.
    min_cells: usize,
    /// Cell values (case-insensitive) that mark a row as a header/label row.
    header_literals: Vec<String>,
}

impl Default for HtmlTableExtractor {
    fn default() -> Self {
        Self {
            table_selector: "table".to_owned(),
            table_index: None,
            table_keywords: Vec::new(),
            min_cells: 1,
            header_literals: Vec::new(),
        }
    }
}

impl HtmlTableExtractor {
    /// Creates an extractor with default selectors that picks the first
    /// table with at least one non-empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the CSS selector used to find candidate tables.
    #[must_use]
    pub fn with_table_selector(mut self, selector: &str) -> Self {
        selector.clone_into(&mut self.table_selector);
        self
    }

    /// Picks the table at `index` among the candidates.
    #[must_use]
    pub const fn with_table_index(mut self, index: usize) -> Self {
        self.table_index = Some(index);
        self
    }

    /// Picks the first table whose text contains every keyword.
    #[must_use]
    pub fn with_table_keywords(mut self, keywords: &[String]) -> Self {
        self.table_keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
        self
    }

    /// Ignores rows with fewer than `min_cells` cells.
    #[must_use]
    pub const fn with_min_cells(mut self, min_cells: usize) -> Self {
        self.min_cells = min_cells;
        self
    }

    /// Treats any row containing one of these literals as a header row.
    #[must_use]
    pub fn with_header_literals(mut self, literals: &[String]) -> Self {
        self.header_literals = literals.iter().map(|l| l.to_lowercase()).collect();
        self
    }

    /// Parses a CSS selector string, returning a [`ScrapeError`] on failure.
    pub(crate) fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
        Selector::parse(selector).map_err(|e| ScrapeError::InvalidSelector {
            selector: selector.to_owned(),
            message: e.to_string(),
        })
    }

    /// Extracts the data rows of the located table.
    ///
    /// Returns an empty list when the document has no matching table;
    /// callers treat that as "no structure found", not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::InvalidSelector`] if a configured selector
    /// does not compile.
    pub fn extract(&self, html: &str) -> Result<Vec<Vec<String>>, ScrapeError> {
        let document = Html::parse_document(html);
        let table_sel = Self::parse_selector(&self.table_selector)?;
        let row_sel = Self::parse_selector(ROW_SELECTOR)?;
        let cell_sel = Self::parse_selector(CELL_SELECTOR)?;

        let tables: Vec<ElementRef<'_>> = document.select(&table_sel).collect();
        log::debug!("Found {} candidate table(s)", tables.len());

        let Some(table) = self.locate(&tables, &row_sel, &cell_sel) else {
            log::debug!("No table matched the configured heuristics");
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for row in table.select(&row_sel) {
            let cells = row_cells(row, &cell_sel);

            if cells.len() < self.min_cells || cells.iter().all(String::is_empty) {
                continue;
            }
            if self.is_header_row(&cells) {
                continue;
            }

            rows.push(cells);
        }

        Ok(rows)
    }

    /// Chooses the data table among the candidates.
    fn locate<'a>(
        &self,
        tables: &[ElementRef<'a>],
        row_sel: &Selector,
        cell_sel: &Selector,
    ) -> Option<ElementRef<'a>> {
        if let Some(index) = self.table_index {
            return tables.get(index).copied();
        }

        if !self.table_keywords.is_empty() {
            return tables.iter().copied().find(|table| {
                let text = table.text().collect::<String>().to_lowercase();
                self.table_keywords.iter().all(|k| text.contains(k.as_str()))
            });
        }

        tables.iter().copied().find(|table| {
            table
                .select(row_sel)
                .any(|row| row.select(cell_sel).count() >= self.min_cells)
        })
    }

    /// Returns `true` if any cell equals a known header literal.
    fn is_header_row(&self, cells: &[String]) -> bool {
        cells.iter().any(|cell| {
            let cell = cell.trim_end_matches(':').to_lowercase();
            self.header_literals.iter().any(|literal| *literal == cell)
        })
    }
}

/// Returns the whitespace-collapsed text of each cell in `row`.
fn row_cells(row: ElementRef<'_>, cell_sel: &Selector) -> Vec<String> {
    row.select(cell_sel)
        .map(|cell| collapse_whitespace(&cell.text().collect::<Vec<_>>().join(" ")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r"
        <html><body>
          <table><tr><td>Home</td><td>Contact</td></tr></table>
          <table>
            <tr><th>Parcel</th><th>Owner</th><th>Address</th><th>Tax Due</th></tr>
            <tr><td>12-345</td><td>J Smith</td><td>100 Main St Atlanta 30303</td><td>$1,250.00</td></tr>
            <tr><th>Parcel</th><th>Owner</th><th>Address</th><th>Tax Due</th></tr>
            <tr><td>12-346</td><td>A  Jones</td><td>5 Oak Ave</td><td>$80.10</td></tr>
            <tr><td colspan='4'>Page 1</td></tr>
          </table>
        </body></html>";

    fn literals() -> Vec<String> {
        vec!["Parcel".to_owned(), "Owner".to_owned()]
    }

    #[test]
    fn picks_table_by_index_and_skips_repeated_headers() {
        let rows = HtmlTableExtractor::new()
            .with_table_index(1)
            .with_min_cells(4)
            .with_header_literals(&literals())
            .extract(PAGE)
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "12-345");
        assert_eq!(rows[1][1], "A Jones");
    }

    #[test]
    fn picks_table_by_min_cells() {
        let rows = HtmlTableExtractor::new()
            .with_min_cells(4)
            .with_header_literals(&literals())
            .extract(PAGE)
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][3], "$1,250.00");
    }

    #[test]
    fn picks_table_by_keywords() {
        let rows = HtmlTableExtractor::new()
            .with_table_keywords(&["tax due".to_owned()])
            .with_min_cells(4)
            .extract(PAGE)
            .unwrap();

        // Without header literals the header rows are kept.
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0][0], "Parcel");
    }

    #[test]
    fn missing_table_yields_no_rows() {
        let rows = HtmlTableExtractor::new()
            .with_table_index(5)
            .extract(PAGE)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let result = HtmlTableExtractor::new()
            .with_table_selector("table[")
            .extract(PAGE);
        assert!(matches!(result, Err(ScrapeError::InvalidSelector { .. })));
    }
}
