//! Interfaces to the persistence and valuation collaborators.
//!
//! The orchestrator only sees these traits. Concrete stores live in
//! `tax_lien_store`; the valuation client lives outside this workspace.

use async_trait::async_trait;
use tax_lien_models::{CandidateLienRecord, SavedRecord};

/// Errors raised by a [`LienStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend rejected the write.
    #[error("Store backend error: {message}")]
    Backend {
        /// Description of what went wrong.
        message: String,
    },
}

/// Idempotent persistence for candidate records.
#[async_trait]
pub trait LienStore: Send + Sync {
    /// Inserts or refreshes `records` under `jurisdiction`, keyed by
    /// `(jurisdiction, parcel_id)`. Re-saving a parcel must refresh its
    /// fields and keep its record id, never create a duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails. Records written by
    /// earlier calls stay intact.
    async fn upsert(
        &self,
        jurisdiction: &str,
        records: &[CandidateLienRecord],
    ) -> Result<Vec<SavedRecord>, StoreError>;
}

/// Errors raised by an [`Enricher`].
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// The valuation lookup failed or timed out.
    #[error("Valuation lookup failed for {parcel_id}: {message}")]
    Lookup {
        /// Parcel being looked up.
        parcel_id: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The saved record could not be updated with derived fields.
    #[error("Enrichment update failed for record {record_id}: {message}")]
    Update {
        /// Store-assigned record id.
        record_id: String,
        /// Description of what went wrong.
        message: String,
    },
}

/// Valuation data returned for one parcel.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    /// Assessed improvement value. `None` when the lookup produced no
    /// signal.
    pub improvement_value: Option<f64>,
    /// Raw property data from the valuation provider.
    pub property_data: serde_json::Value,
}

impl Enrichment {
    /// A record is worth keeping only with a present, non-zero improvement
    /// value.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.improvement_value.is_some_and(|v| v.is_finite() && v != 0.0)
    }
}

/// Third-party valuation lookups.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Looks up valuation data for a candidate parcel.
    ///
    /// `Ok(None)` means the provider knows nothing about the parcel.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if the lookup fails.
    async fn enrich_and_validate(
        &self,
        parcel_id: &str,
        address: &str,
    ) -> Result<Option<Enrichment>, EnrichError>;

    /// Fills valuation, scoring, and derived fields on a saved record.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if the update fails.
    async fn enrich_saved(&self, record_id: &str, parcel_id: &str) -> Result<(), EnrichError>;
}
