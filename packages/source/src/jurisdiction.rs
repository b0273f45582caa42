//! Config-driven jurisdiction definition.
//!
//! [`JurisdictionDefinition`] captures everything unique about one county's
//! lien listing in a serializable config struct: where the listing lives,
//! how to get structure out of it, and what a valid parcel id looks like.
//! A single generic orchestrator handles every jurisdiction.

use std::collections::BTreeMap;

use serde::Deserialize;
use tax_lien_rows::{HeaderColumn, RowLayout, RowsError};

// ── Top-level definition ─────────────────────────────────────────────────

/// A complete, config-driven jurisdiction definition.
///
/// Loaded from TOML files embedded at compile time.
#[derive(Debug, Clone, Deserialize)]
pub struct JurisdictionDefinition {
    /// Unique identifier (e.g., `"fulton_ga"`), used as the store key.
    pub id: String,
    /// Human-readable name (e.g., `"Fulton County, GA"`).
    pub name: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// Spelled-out state name, accepted as a state token in addresses.
    #[serde(default)]
    pub state_name: Option<String>,
    /// City assigned to records whose address carries none. Set for
    /// single-metro counties only.
    #[serde(default)]
    pub default_city: Option<String>,
    /// Page holding the listing (HTML table/blocks) or linking to it (PDFs).
    pub listing_url: String,
    /// Environment variable that, when set to non-blank text, replaces the
    /// remote fetch with pasted listing text.
    #[serde(default)]
    pub manual_text_var: Option<String>,
    /// Parcel id patterns.
    pub parcel: ParcelConfig,
    /// Row reconstruction settings for text sources.
    #[serde(default)]
    pub rows: RowConfig,
    /// How structure is extracted from the fetched listing.
    pub extractor: ExtractorConfig,
}

/// Parcel id patterns for a jurisdiction.
#[derive(Debug, Clone, Deserialize)]
pub struct ParcelConfig {
    /// Unanchored pattern that finds a parcel id inside a line of text,
    /// tolerating spaces where dashes belong.
    pub pattern: String,
    /// Shape a parcel id must have after normalization (anchored
    /// automatically).
    pub shape: String,
}

/// Row reconstruction settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowConfig {
    /// Header alias overrides, per column.
    #[serde(default)]
    pub header_keywords: BTreeMap<HeaderColumn, Vec<String>>,
    /// Distinct columns a line must name to count as a header.
    #[serde(default)]
    pub min_header_matches: Option<usize>,
    /// Pattern marking the first line of a wrapped record.
    #[serde(default)]
    pub record_start: Option<String>,
    /// Lowercase substrings marking section-title and footer lines.
    #[serde(default)]
    pub denylist: Vec<String>,
    /// Join wrapped records into one logical line before parsing.
    #[serde(default)]
    pub continuation: bool,
}

// ── Extractor config ─────────────────────────────────────────────────────

/// How to get structure out of a jurisdiction's listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorConfig {
    /// An HTML table on the listing page.
    HtmlTable {
        /// CSS selector for candidate tables.
        table_selector: Option<String>,
        /// Zero-based position among candidate tables.
        table_index: Option<usize>,
        /// Keywords that must all appear in the chosen table's text.
        #[serde(default)]
        table_keywords: Vec<String>,
        /// Rows with fewer cells are ignored.
        min_cells: Option<usize>,
        /// Cell values marking header/label rows. Defaults to common
        /// column names when empty.
        #[serde(default)]
        header_literals: Vec<String>,
        /// Fixed column offsets.
        columns: HtmlColumns,
        /// Regex fallback for when the page has no matching table.
        blocks: Option<BlockPattern>,
    },
    /// Listing published as a run of text blocks, no table.
    HtmlBlocks {
        /// Block selection and the row pattern.
        blocks: BlockPattern,
    },
    /// Listing published as one or more PDF documents.
    PdfDocuments {
        /// Fixed document URLs.
        #[serde(default)]
        documents: Vec<String>,
        /// Discover documents linked from the listing page whose anchor
        /// text or target contains any of these keywords.
        #[serde(default)]
        link_keywords: Vec<String>,
    },
}

impl ExtractorConfig {
    /// Short strategy name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::HtmlTable { .. } => "html_table",
            Self::HtmlBlocks { .. } => "html_blocks",
            Self::PdfDocuments { .. } => "pdf_documents",
        }
    }
}

/// Zero-based cell offsets for each field of a table row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HtmlColumns {
    /// Parcel id cell.
    pub parcel: usize,
    /// Owner cell.
    pub owner: Option<usize>,
    /// Situs address cell.
    pub address: Option<usize>,
    /// City cell.
    pub city: Option<usize>,
    /// Zip cell.
    pub zip: Option<usize>,
    /// Amount due cell.
    pub amount: Option<usize>,
    /// Sale date cell.
    pub sale_date: Option<usize>,
    /// Auxiliary cells concatenated into the legal description.
    #[serde(default)]
    pub legal: Vec<usize>,
}

/// Regex extraction over the concatenated text of selected blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockPattern {
    /// CSS selector for the blocks.
    pub block_selector: String,
    /// Pattern with named groups: `parcel`, `owner`, `address`, `city`,
    /// `zip`, `amount`, `sale_date`, `legal`.
    pub pattern: String,
}

// ── Input source ─────────────────────────────────────────────────────────

/// Where a run gets its listing from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Fetch the listing over HTTP.
    Remote,
    /// Reconstruct rows from pasted text.
    ManualText(String),
}

impl JurisdictionDefinition {
    /// Builds the row layout for this jurisdiction.
    ///
    /// # Errors
    ///
    /// Returns [`RowsError`] if a configured pattern does not compile.
    pub fn layout(&self) -> Result<RowLayout, RowsError> {
        let rows = &self.rows;
        let mut layout = RowLayout::new(&self.parcel.pattern, &self.parcel.shape)?
            .with_denylist(&rows.denylist)
            .with_continuation(rows.continuation);

        for (column, aliases) in &rows.header_keywords {
            layout = layout.with_header_keywords(*column, aliases);
        }
        if let Some(min) = rows.min_header_matches {
            layout = layout.with_min_header_matches(min);
        }
        if let Some(pattern) = &rows.record_start {
            layout = layout.with_record_start(pattern)?;
        }
        if let Some(city) = &self.default_city {
            layout = layout.with_default_city(city.as_str());
        }
        if let Some(state) = &self.state_name {
            layout = layout.with_default_state(state.as_str());
        }

        Ok(layout)
    }

    /// Picks the input source: manual text when the configured variable
    /// holds non-blank text, remote otherwise.
    pub fn input_source<F>(&self, lookup: F) -> InputSource
    where
        F: Fn(&str) -> Option<String>,
    {
        self.manual_text_var
            .as_deref()
            .and_then(lookup)
            .filter(|text| !text.trim().is_empty())
            .map_or(InputSource::Remote, InputSource::ManualText)
    }
}

/// Parses a TOML string into a [`JurisdictionDefinition`].
///
/// # Errors
///
/// Returns an error string if the TOML is malformed or missing required
/// fields.
pub fn parse_jurisdiction_toml(toml_str: &str) -> Result<JurisdictionDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
id = "sample_ga"
name = "Sample County, GA"
state = "GA"
state_name = "Georgia"
default_city = "Sampleton"
listing_url = "https://example.test/liens"
manual_text_var = "SAMPLE_LIEN_TEXT"

[parcel]
pattern = '\b\d{2}[\s-]+\d{3}\b'
shape = '\d{2}-\d{3}'

[rows]
record_start = '^\d{3,5}\s{2,}'
denylist = ["Sample County Tax Sale"]
continuation = true
min_header_matches = 3

[rows.header_keywords]
parcel = ["map/parcel"]

[extractor]
type = "html_table"
table_index = 1
min_cells = 4

[extractor.columns]
parcel = 0
owner = 1
address = 2
amount = 3
legal = [4, 5]
"#;

    #[test]
    fn parses_html_table_definition() {
        let def = parse_jurisdiction_toml(TOML).unwrap();
        assert_eq!(def.id, "sample_ga");
        assert_eq!(def.extractor.kind(), "html_table");
        assert!(def.rows.continuation);

        let ExtractorConfig::HtmlTable {
            table_index,
            min_cells,
            columns,
            blocks,
            ..
        } = &def.extractor
        else {
            panic!("expected html_table");
        };
        assert_eq!(*table_index, Some(1));
        assert_eq!(*min_cells, Some(4));
        assert_eq!(columns.amount, Some(3));
        assert_eq!(columns.legal, vec![4, 5]);
        assert!(blocks.is_none());
    }

    #[test]
    fn builds_layout_from_definition() {
        let def = parse_jurisdiction_toml(TOML).unwrap();
        let layout = def.layout().unwrap();
        assert_eq!(layout.default_city(), Some("Sampleton"));
        assert_eq!(layout.default_state(), Some("Georgia"));
        assert!(layout.parcel_has_shape("12-345"));
        assert!(!layout.parcel_has_shape("12 345"));
    }

    #[test]
    fn bad_record_start_is_a_layout_error() {
        let toml = TOML.replace(r"'^\d{3,5}\s{2,}'", "'^(unclosed'");
        let def = parse_jurisdiction_toml(&toml).unwrap();
        let err = def.layout().unwrap_err();
        assert!(err.to_string().contains("record_start"));
    }

    #[test]
    fn parses_block_and_pdf_extractors() {
        let blocks = TOML.split("[extractor]").next().unwrap().to_owned()
            + r#"
[extractor]
type = "html_blocks"

[extractor.blocks]
block_selector = "div.lien"
pattern = '(?P<parcel>\d{2}-\d{3})'
"#;
        let def = parse_jurisdiction_toml(&blocks).unwrap();
        let ExtractorConfig::HtmlBlocks { blocks } = &def.extractor else {
            panic!("expected html_blocks");
        };
        assert_eq!(blocks.block_selector, "div.lien");

        let pdf = TOML.split("[extractor]").next().unwrap().to_owned()
            + r#"
[extractor]
type = "pdf_documents"
link_keywords = ["tax sale"]
"#;
        let def = parse_jurisdiction_toml(&pdf).unwrap();
        let ExtractorConfig::PdfDocuments {
            documents,
            link_keywords,
        } = &def.extractor
        else {
            panic!("expected pdf_documents");
        };
        assert!(documents.is_empty());
        assert_eq!(link_keywords, &["tax sale"]);
    }

    #[test]
    fn manual_text_wins_only_when_non_blank() {
        let def = parse_jurisdiction_toml(TOML).unwrap();

        let input = def.input_source(|key| (key == "SAMPLE_LIEN_TEXT").then(|| "12-345 1 MAIN ST".to_owned()));
        assert_eq!(input, InputSource::ManualText("12-345 1 MAIN ST".to_owned()));

        assert_eq!(def.input_source(|_| Some("   ".to_owned())), InputSource::Remote);
        assert_eq!(def.input_source(|_| None), InputSource::Remote);
    }
}
