#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Jurisdiction definitions and the extraction orchestrator.
//!
//! Every county is a [`JurisdictionDefinition`] loaded from embedded TOML
//! ([`registry`]). One generic [`Orchestrator`] runs any of them:
//! fetch the listing, extract structure from HTML or PDF text, filter
//! invalid rows, persist through a [`LienStore`], and optionally validate
//! and enrich through an [`Enricher`].

pub mod collaborators;
pub mod html;
pub mod jurisdiction;
pub mod orchestrator;
pub mod progress;
pub mod registry;

pub use collaborators::{EnrichError, Enricher, Enrichment, LienStore, StoreError};
pub use jurisdiction::{ExtractorConfig, InputSource, JurisdictionDefinition};
pub use orchestrator::Orchestrator;

use tax_lien_models::CandidateLienRecord;
use tax_lien_pdf::ExtractionFailure;
use tax_lien_rows::{RawRow, Reconstruction, RowLayout, RowsError};
use tax_lien_scraper::ScrapeError;

/// Errors that can occur while extracting a jurisdiction's listing.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Fetching a page or document failed.
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    /// Every PDF text extraction tier failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),

    /// The jurisdiction's row layout is invalid.
    #[error("Invalid row layout: {0}")]
    Layout(#[from] RowsError),

    /// A block pattern did not compile.
    #[error("Invalid block pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Persisting records failed.
    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),

    /// The page had no table or block matching the configuration.
    #[error("No {kind} structure found")]
    NoStructure {
        /// Extractor kind that found nothing.
        kind: &'static str,
    },

    /// HTML extraction was requested for a non-HTML jurisdiction.
    #[error("Extractor {kind} does not read HTML")]
    NotHtml {
        /// Extractor kind.
        kind: &'static str,
    },
}

/// Valid records from one document plus the count of rows dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Records that passed the validity filter, in document order.
    pub records: Vec<CandidateLienRecord>,
    /// Rows dropped by the validity filter.
    pub skipped: u64,
}

impl Extraction {
    /// Cleans and filters raw rows.
    #[must_use]
    pub fn from_rows(rows: Vec<RawRow>, layout: &RowLayout) -> Self {
        let mut extraction = Self::default();
        for row in rows {
            match tax_lien_rows::filter::finish(row, layout) {
                Ok(record) => extraction.records.push(record),
                Err(reason) => {
                    log::debug!("Skipping row: {reason}");
                    extraction.skipped += 1;
                }
            }
        }
        extraction
    }

    /// Reconstructs records from listing text.
    #[must_use]
    pub fn from_text(text: &str, layout: &RowLayout) -> Self {
        reconstruct(text, layout).into()
    }
}

impl From<Reconstruction> for Extraction {
    fn from(value: Reconstruction) -> Self {
        Self {
            records: value.records,
            skipped: value.skipped as u64,
        }
    }
}

fn reconstruct(text: &str, layout: &RowLayout) -> Reconstruction {
    let reconstruction = tax_lien_rows::reconstruct(text, layout);
    log::debug!(
        "Reconstructed {} record(s) from {} chars via {}",
        reconstruction.records.len(),
        text.len(),
        reconstruction.strategy
    );
    reconstruction
}
