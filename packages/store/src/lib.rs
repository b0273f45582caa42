#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Lien record stores.
//!
//! Both stores upsert by `(jurisdiction, parcel_id)`: re-saving a parcel
//! refreshes its fields and `last_seen` timestamp, keeps its record id and
//! `first_seen`, and never creates a duplicate.
//!
//! * [`MemoryStore`]: process-local, for tests and dry runs.
//! * [`JsonFileStore`]: one JSON file, rewritten atomically on every
//!   upsert, so CLI runs can be repeated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tax_lien_models::{CandidateLienRecord, SavedRecord};
use tax_lien_source::{LienStore, StoreError};

/// A persisted lien record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredLien {
    /// Stable identifier derived from the key.
    pub record_id: String,
    /// Jurisdiction the record was scraped from.
    pub jurisdiction: String,
    /// Latest field values.
    #[serde(flatten)]
    pub record: CandidateLienRecord,
    /// RFC 3339 timestamp of the first save.
    pub first_seen: String,
    /// RFC 3339 timestamp of the latest save.
    pub last_seen: String,
}

type Table = BTreeMap<String, StoredLien>;

/// Returns the record id for a `(jurisdiction, parcel_id)` key.
#[must_use]
pub fn record_id(jurisdiction: &str, parcel_id: &str) -> String {
    format!("{jurisdiction}/{parcel_id}")
}

fn upsert_into(
    table: &mut Table,
    jurisdiction: &str,
    records: &[CandidateLienRecord],
) -> Vec<SavedRecord> {
    let now = chrono::Utc::now().to_rfc3339();

    records
        .iter()
        .filter(|record| record.has_parcel_id())
        .map(|record| {
            let id = record_id(jurisdiction, &record.parcel_id);
            let created = match table.get_mut(&id) {
                Some(existing) => {
                    existing.record = record.clone();
                    existing.last_seen.clone_from(&now);
                    false
                }
                None => {
                    table.insert(
                        id.clone(),
                        StoredLien {
                            record_id: id.clone(),
                            jurisdiction: jurisdiction.to_owned(),
                            record: record.clone(),
                            first_seen: now.clone(),
                            last_seen: now.clone(),
                        },
                    );
                    true
                }
            };

            SavedRecord {
                record_id: id,
                parcel_id: record.parcel_id.clone(),
                created,
            }
        })
        .collect()
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Keeps records in memory for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<Table>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored record, ordered by record id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the store lock is poisoned.
    pub fn records(&self) -> Result<Vec<StoredLien>, StoreError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Table>, StoreError> {
        self.table.lock().map_err(|e| StoreError::Backend {
            message: format!("store lock poisoned: {e}"),
        })
    }
}

#[async_trait]
impl LienStore for MemoryStore {
    async fn upsert(
        &self,
        jurisdiction: &str,
        records: &[CandidateLienRecord],
    ) -> Result<Vec<SavedRecord>, StoreError> {
        let mut table = self.lock()?;
        Ok(upsert_into(&mut table, jurisdiction, records))
    }
}

// ── JSON file ────────────────────────────────────────────────────────────

/// Keeps records in a single JSON file.
///
/// Each upsert reads the file, applies the changes, and replaces it with a
/// write to `<path>.tmp` followed by a rename, so an interrupted write
/// never leaves a truncated file behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. The file is created on the first
    /// upsert.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every stored record, ordered by record id. A missing file
    /// holds no records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file cannot be read or parsed.
    pub async fn records(&self) -> Result<Vec<StoredLien>, StoreError> {
        Ok(self.load().await?.into_values().collect())
    }

    async fn load(&self) -> Result<Table, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Table::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, table: &Table) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, serde_json::to_vec_pretty(table)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LienStore for JsonFileStore {
    async fn upsert(
        &self,
        jurisdiction: &str,
        records: &[CandidateLienRecord],
    ) -> Result<Vec<SavedRecord>, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut table = self.load().await?;
        let saved = upsert_into(&mut table, jurisdiction, records);
        self.save(&table).await?;

        log::debug!(
            "Wrote {} record(s) to {} ({} total)",
            saved.len(),
            self.path.display(),
            table.len()
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(parcel: &str, amount: f64) -> CandidateLienRecord {
        let mut record = CandidateLienRecord::new(parcel, "100 Main St");
        record.tax_amount_due = amount;
        record
    }

    #[tokio::test]
    async fn memory_upsert_is_idempotent_per_jurisdiction() {
        let store = MemoryStore::new();

        let first = store
            .upsert("fulton_ga", &[record("14-0184-0008-002-7", 10.0)])
            .await
            .unwrap();
        assert!(first[0].created);

        let second = store
            .upsert("fulton_ga", &[record("14-0184-0008-002-7", 25.0)])
            .await
            .unwrap();
        assert!(!second[0].created);
        assert_eq!(second[0].record_id, first[0].record_id);

        store
            .upsert("cobb_ga", &[record("14-0184-0008-002-7", 1.0)])
            .await
            .unwrap();

        let records = store.records().unwrap();
        assert_eq!(records.len(), 2);
        let fulton = records.iter().find(|r| r.jurisdiction == "fulton_ga").unwrap();
        assert!((fulton.record.tax_amount_due - 25.0).abs() < f64::EPSILON);
        assert!(fulton.first_seen <= fulton.last_seen);
    }

    #[tokio::test]
    async fn records_without_parcel_are_not_stored() {
        let store = MemoryStore::new();
        let saved = store.upsert("fulton_ga", &[record("  ", 1.0)]).await.unwrap();
        assert!(saved.is_empty());
        assert!(store.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn poisoned_memory_store_reports_backend_errors() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store
            .upsert("fulton_ga", &[record("14-0184-0008-002-7", 1.0)])
            .await
            .unwrap();

        let poisoner = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.table.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(store.records(), Err(StoreError::Backend { .. })));
        assert!(matches!(
            store.upsert("fulton_ga", &[record("14-0185-0001-010-2", 1.0)]).await,
            Err(StoreError::Backend { .. })
        ));
    }

    #[tokio::test]
    async fn json_file_survives_reopen_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("liens.json");

        let store = JsonFileStore::new(&path);
        store
            .upsert("dekalb_ga", &[record("15-203-04-017", 5.0), record("15-203-04-018", 6.0)])
            .await
            .unwrap();

        let reopened = JsonFileStore::new(&path);
        let saved = reopened
            .upsert("dekalb_ga", &[record("15-203-04-017", 7.5)])
            .await
            .unwrap();
        assert!(!saved[0].created);

        let records = reopened.records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_id, "dekalb_ga/15-203-04-017");
        assert!((records[0].record.tax_amount_due - 7.5).abs() < f64::EPSILON);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_has_no_records_and_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liens.json");

        assert!(JsonFileStore::new(&path).records().await.unwrap().is_empty());

        std::fs::write(&path, b"{not json").unwrap();
        let err = JsonFileStore::new(&path)
            .upsert("dekalb_ga", &[record("15-203-04-017", 5.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn stored_record_serializes_flat() {
        let stored = StoredLien {
            record_id: record_id("fulton_ga", "14-0184-0008-002-7"),
            jurisdiction: "fulton_ga".to_owned(),
            record: record("14-0184-0008-002-7", 1.0),
            first_seen: "2025-06-03T00:00:00+00:00".to_owned(),
            last_seen: "2025-06-03T00:00:00+00:00".to_owned(),
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["recordId"], "fulton_ga/14-0184-0008-002-7");
        assert_eq!(json["parcelId"], "14-0184-0008-002-7");
        assert_eq!(json["propertyAddress"], "100 Main St");
    }
}
