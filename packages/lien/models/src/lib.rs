#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Candidate lien record and extraction run types.
//!
//! Every jurisdiction extractor (HTML table, PDF text, manual paste)
//! produces [`CandidateLienRecord`]s. A record is built once per
//! extraction run and handed to a persistence collaborator keyed by
//! `(jurisdiction, parcel_id)`.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A tax-lien listing recovered from a county publication.
///
/// `parcel_id` is always normalized (see `tax_lien_rows::normalize`) and
/// non-empty for any record that leaves the extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateLienRecord {
    /// Jurisdiction-assigned parcel identifier (APN).
    pub parcel_id: String,
    /// Owner of record. Some sources omit owners entirely.
    pub owner_name: Option<String>,
    /// Street portion of the situs address (e.g. `"100 Main St"`).
    pub property_address: String,
    /// City, parsed from the situs text or defaulted per jurisdiction.
    pub city: Option<String>,
    /// Five-digit (or ZIP+4) postal code.
    pub zip: Option<String>,
    /// Amount due. Zero when the source does not publish it; filled in
    /// later by enrichment.
    pub tax_amount_due: f64,
    /// Sale date, ISO `YYYY-MM-DD` when the source format was recognized.
    pub sale_date: Option<String>,
    /// Jurisdiction-specific auxiliary fields, concatenated.
    pub legal_description: Option<String>,
}

impl CandidateLienRecord {
    /// Creates a record with only the required fields set.
    #[must_use]
    pub fn new(parcel_id: impl Into<String>, property_address: impl Into<String>) -> Self {
        Self {
            parcel_id: parcel_id.into(),
            owner_name: None,
            property_address: property_address.into(),
            city: None,
            zip: None,
            tax_amount_due: 0.0,
            sale_date: None,
            legal_description: None,
        }
    }

    /// Returns `true` if the record carries a non-empty parcel id.
    #[must_use]
    pub fn has_parcel_id(&self) -> bool {
        !self.parcel_id.trim().is_empty()
    }
}

/// A record acknowledged by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecord {
    /// Store-assigned identifier, stable across re-scrapes of the same
    /// `(jurisdiction, parcel_id)`.
    pub record_id: String,
    /// Parcel the record was saved under.
    pub parcel_id: String,
    /// `true` when the upsert created a new row, `false` when it refreshed
    /// an existing one.
    pub created: bool,
}

/// Counters accumulated over one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Documents (pages or PDFs) the run attempted.
    pub documents_attempted: u64,
    /// Documents that could not be fetched or yielded no text/structure.
    pub documents_failed: u64,
    /// Records that passed row validation.
    pub records_extracted: u64,
    /// Rows dropped for a missing or malformed parcel id or address.
    pub rows_skipped: u64,
    /// Records dropped because enrichment rejected or failed them.
    pub records_rejected: u64,
    /// Records the store acknowledged.
    pub records_saved: u64,
}

impl RunStats {
    /// Folds another run's counters into this one.
    pub const fn absorb(&mut self, other: &Self) {
        self.documents_attempted += other.documents_attempted;
        self.documents_failed += other.documents_failed;
        self.records_extracted += other.records_extracted;
        self.rows_skipped += other.rows_skipped;
        self.records_rejected += other.records_rejected;
        self.records_saved += other.records_saved;
    }
}

/// Terminal state of an extraction run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// The run finished, possibly with some documents failing.
    Completed,
    /// The run aborted on a systemic error (persistence).
    Failed,
}

/// Result of running one jurisdiction end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    /// Jurisdiction identifier (e.g. `"fulton_ga"`).
    pub jurisdiction: String,
    /// Whether the run completed or failed.
    pub status: RunStatus,
    /// Counters at the time the run ended.
    pub stats: RunStats,
    /// Terminal error message for failed runs.
    pub error: Option<String>,
}

impl RunOutcome {
    /// Builds a completed outcome.
    #[must_use]
    pub fn completed(jurisdiction: &str, stats: RunStats) -> Self {
        Self {
            jurisdiction: jurisdiction.to_owned(),
            status: RunStatus::Completed,
            stats,
            error: None,
        }
    }

    /// Builds a failed outcome carrying the captured error.
    #[must_use]
    pub fn failed(jurisdiction: &str, stats: RunStats, error: impl Into<String>) -> Self {
        Self {
            jurisdiction: jurisdiction.to_owned(),
            status: RunStatus::Failed,
            stats,
            error: Some(error.into()),
        }
    }

    /// Returns `true` if the run completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
