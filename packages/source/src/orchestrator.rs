//! The generic extraction orchestrator.
//!
//! One run of one jurisdiction is linear:
//! fetch → extract → filter → persist → enrich. Each document is processed
//! on its own; a fetch or extraction failure is logged, counted, and the
//! run moves on. Only a persistence failure ends a run as failed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tax_lien_models::{CandidateLienRecord, RunOutcome, RunStats, SavedRecord};
use tax_lien_pdf::PdfPipeline;
use tax_lien_rows::RowLayout;
use tax_lien_scraper::Fetcher;
use tax_lien_scraper::html_blocks::find_links;

use crate::collaborators::{Enricher, LienStore};
use crate::jurisdiction::{ExtractorConfig, InputSource, JurisdictionDefinition};
use crate::progress::{ProgressCallback, null_progress};
use crate::{Extraction, SourceError, html};

/// Default pause between successive enrichment calls.
pub const DEFAULT_ENRICH_DELAY: Duration = Duration::from_millis(200);

/// Runs jurisdictions end to end against injected collaborators.
pub struct Orchestrator {
    fetcher: Fetcher,
    pipeline: PdfPipeline,
    store: Arc<dyn LienStore>,
    enricher: Option<Arc<dyn Enricher>>,
    enrich_delay: Duration,
    progress: Arc<dyn ProgressCallback>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pipeline", &self.pipeline)
            .field("enricher", &self.enricher.is_some())
            .field("enrich_delay", &self.enrich_delay)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with the default PDF pipeline, no
    /// enrichment, and silent progress.
    #[must_use]
    pub fn new(fetcher: Fetcher, store: Arc<dyn LienStore>) -> Self {
        Self {
            fetcher,
            pipeline: PdfPipeline::new(),
            store,
            enricher: None,
            enrich_delay: DEFAULT_ENRICH_DELAY,
            progress: null_progress(),
        }
    }

    /// Replaces the PDF text extraction pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: PdfPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Enables enrichment validation before persisting and enrichment of
    /// saved records after.
    #[must_use]
    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Sets the pause between successive enrichment calls.
    #[must_use]
    pub const fn with_enrich_delay(mut self, delay: Duration) -> Self {
        self.enrich_delay = delay;
        self
    }

    /// Reads the enrichment delay from `TAX_LIEN_ENRICH_DELAY_MS` when set.
    #[must_use]
    pub fn with_enrich_delay_from_env(self) -> Self {
        match std::env::var("TAX_LIEN_ENRICH_DELAY_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            Some(ms) => self.with_enrich_delay(Duration::from_millis(ms)),
            None => self,
        }
    }

    /// Sets the progress reporter.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs every jurisdiction in turn, never concurrently.
    pub async fn run_all(&self, jurisdictions: &[JurisdictionDefinition]) -> Vec<RunOutcome> {
        let mut outcomes = Vec::with_capacity(jurisdictions.len());
        let mut totals = RunStats::default();

        for def in jurisdictions {
            let outcome = self.run(def).await;
            totals.absorb(&outcome.stats);
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| !o.is_completed()).count();
        log::info!(
            "Ran {} jurisdiction(s): {} saved, {} skipped, {} rejected, {failed} failed",
            outcomes.len(),
            totals.records_saved,
            totals.rows_skipped,
            totals.records_rejected,
        );

        outcomes
    }

    /// Runs one jurisdiction, taking manual text from its configured
    /// environment variable when set.
    pub async fn run(&self, def: &JurisdictionDefinition) -> RunOutcome {
        let input = def.input_source(|key| std::env::var(key).ok());
        self.run_with_input(def, input).await
    }

    /// Runs one jurisdiction from the given input source.
    pub async fn run_with_input(
        &self,
        def: &JurisdictionDefinition,
        input: InputSource,
    ) -> RunOutcome {
        let mut stats = RunStats::default();

        let layout = match def.layout() {
            Ok(layout) => layout,
            Err(e) => {
                log::error!("[{}] Invalid row layout: {e}", def.id);
                return RunOutcome::failed(&def.id, stats, e.to_string());
            }
        };

        log::info!("[{}] Starting {} run", def.id, def.extractor.kind());
        let extracted = self.extract(def, &layout, input, &mut stats).await;
        let records = dedupe(&def.id, extracted);
        stats.records_extracted = records.len() as u64;

        let records = match &self.enricher {
            Some(enricher) => self.validate(def, enricher.as_ref(), records, &mut stats).await,
            None => records,
        };

        if records.is_empty() {
            log::info!(
                "[{}] No records to save ({} document(s), {} failed, {} row(s) skipped)",
                def.id,
                stats.documents_attempted,
                stats.documents_failed,
                stats.rows_skipped
            );
            self.progress.finish(format!("[{}] no records", def.id));
            return RunOutcome::completed(&def.id, stats);
        }

        let saved = match self.store.upsert(&def.id, &records).await {
            Ok(saved) => saved,
            Err(e) => {
                let e = SourceError::from(e);
                log::error!(
                    "[{}] Failed to save {} record(s): {e}",
                    def.id,
                    records.len()
                );
                self.progress.finish(format!("[{}] failed", def.id));
                return RunOutcome::failed(&def.id, stats, e.to_string());
            }
        };
        stats.records_saved = saved.len() as u64;
        log::info!(
            "[{}] Saved {} record(s) ({} new)",
            def.id,
            saved.len(),
            saved.iter().filter(|s| s.created).count()
        );

        if let Some(enricher) = &self.enricher {
            self.enrich_saved(def, enricher.as_ref(), &saved).await;
        }

        self.progress
            .finish(format!("[{}] {} saved", def.id, stats.records_saved));
        RunOutcome::completed(&def.id, stats)
    }

    /// Produces candidate records from every document of the input.
    async fn extract(
        &self,
        def: &JurisdictionDefinition,
        layout: &RowLayout,
        input: InputSource,
        stats: &mut RunStats,
    ) -> Vec<CandidateLienRecord> {
        if let InputSource::ManualText(text) = input {
            log::info!("[{}] Using manual text ({} chars)", def.id, text.len());
            stats.documents_attempted += 1;
            let extraction = Extraction::from_text(&text, layout);
            return tally(def, "manual text", extraction, stats);
        }

        match &def.extractor {
            ExtractorConfig::HtmlTable { .. } | ExtractorConfig::HtmlBlocks { .. } => {
                self.progress.set_total(1);
                stats.documents_attempted += 1;
                let result = self.extract_page(def, layout).await;
                self.progress.inc(1);
                match result {
                    Ok(extraction) => tally(def, &def.listing_url, extraction, stats),
                    Err(e) => {
                        log::warn!("[{}] {}: {e}", def.id, def.listing_url);
                        stats.documents_failed += 1;
                        Vec::new()
                    }
                }
            }
            ExtractorConfig::PdfDocuments {
                documents,
                link_keywords,
            } => {
                let urls = match self.document_urls(def, documents, link_keywords).await {
                    Ok(urls) => urls,
                    Err(e) => {
                        log::warn!("[{}] Could not list documents: {e}", def.id);
                        stats.documents_attempted += 1;
                        stats.documents_failed += 1;
                        return Vec::new();
                    }
                };

                self.progress.set_total(urls.len() as u64);
                let mut records = Vec::new();
                for (i, url) in urls.iter().enumerate() {
                    self.progress
                        .set_message(format!("[{}] document {}/{}", def.id, i + 1, urls.len()));
                    stats.documents_attempted += 1;
                    match self.extract_document(url, layout).await {
                        Ok(extraction) => records.extend(tally(def, url, extraction, stats)),
                        Err(e) => {
                            log::warn!("[{}] {url}: {e}", def.id);
                            stats.documents_failed += 1;
                        }
                    }
                    self.progress.inc(1);
                }
                records
            }
        }
    }

    async fn extract_page(
        &self,
        def: &JurisdictionDefinition,
        layout: &RowLayout,
    ) -> Result<Extraction, SourceError> {
        let html = self.fetcher.fetch_text(&def.listing_url).await?;
        html::extract(&html, &def.extractor, layout)
    }

    async fn extract_document(
        &self,
        url: &str,
        layout: &RowLayout,
    ) -> Result<Extraction, SourceError> {
        let bytes = self.fetcher.fetch_bytes(url).await?;
        let extracted = self.pipeline.extract(&bytes).await?;
        log::debug!(
            "{url}: {} chars via {}",
            extracted.text.len(),
            extracted.tier
        );
        Ok(Extraction::from_text(&extracted.text, layout))
    }

    /// Fixed documents first, then PDFs linked from the listing page.
    async fn document_urls(
        &self,
        def: &JurisdictionDefinition,
        documents: &[String],
        link_keywords: &[String],
    ) -> Result<Vec<String>, SourceError> {
        let mut urls = documents.to_vec();

        if !link_keywords.is_empty() {
            let html = self.fetcher.fetch_text(&def.listing_url).await?;
            let links = find_links(&html, &def.listing_url, link_keywords)?;
            for link in links {
                if is_pdf_link(&link.href) && !urls.contains(&link.href) {
                    log::debug!("[{}] Found document '{}' at {}", def.id, link.text, link.href);
                    urls.push(link.href);
                }
            }
        }

        log::info!("[{}] {} document(s) to process", def.id, urls.len());
        Ok(urls)
    }

    /// Keeps records the valuation provider confirms, pausing between
    /// calls.
    async fn validate(
        &self,
        def: &JurisdictionDefinition,
        enricher: &dyn Enricher,
        records: Vec<CandidateLienRecord>,
        stats: &mut RunStats,
    ) -> Vec<CandidateLienRecord> {
        let mut kept = Vec::with_capacity(records.len());

        for (i, record) in records.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.enrich_delay).await;
            }

            match enricher
                .enrich_and_validate(&record.parcel_id, &record.property_address)
                .await
            {
                Ok(Some(enrichment)) if enrichment.is_valid() => kept.push(record),
                Ok(Some(_)) => {
                    log::debug!("[{}] {}: zero improvement value", def.id, record.parcel_id);
                    stats.records_rejected += 1;
                }
                Ok(None) => {
                    log::debug!("[{}] {}: no valuation data", def.id, record.parcel_id);
                    stats.records_rejected += 1;
                }
                Err(e) => {
                    log::warn!("[{}] {e}", def.id);
                    stats.records_rejected += 1;
                }
            }
        }

        log::info!(
            "[{}] Enrichment kept {} record(s), rejected {}",
            def.id,
            kept.len(),
            stats.records_rejected
        );
        kept
    }

    /// Fills derived fields on saved records. Failures are logged only.
    async fn enrich_saved(
        &self,
        def: &JurisdictionDefinition,
        enricher: &dyn Enricher,
        saved: &[SavedRecord],
    ) {
        for (i, record) in saved.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.enrich_delay).await;
            }
            if let Err(e) = enricher
                .enrich_saved(&record.record_id, &record.parcel_id)
                .await
            {
                log::warn!("[{}] {e}", def.id);
            }
        }
    }
}

/// Adds a document's counts to the run and returns its records.
fn tally(
    def: &JurisdictionDefinition,
    label: &str,
    extraction: Extraction,
    stats: &mut RunStats,
) -> Vec<CandidateLienRecord> {
    log::info!(
        "[{}] {label}: {} record(s), {} row(s) skipped",
        def.id,
        extraction.records.len(),
        extraction.skipped
    );
    stats.rows_skipped += extraction.skipped;
    extraction.records
}

/// Drops repeat parcels across documents, keeping the first occurrence.
fn dedupe(id: &str, records: Vec<CandidateLienRecord>) -> Vec<CandidateLienRecord> {
    let mut seen = BTreeSet::new();
    let before = records.len();
    let unique: Vec<_> = records
        .into_iter()
        .filter(|r| seen.insert(r.parcel_id.clone()))
        .collect();
    if unique.len() < before {
        log::debug!("[{id}] Dropped {} repeated parcel(s)", before - unique.len());
    }
    unique
}

fn is_pdf_link(href: &str) -> bool {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.to_ascii_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tax_lien_models::RunStatus;
    use tax_lien_scraper::FetchConfig;

    use super::*;
    use crate::collaborators::{EnrichError, Enrichment, StoreError};
    use crate::jurisdiction::parse_jurisdiction_toml;

    const DEF: &str = r#"
id = "fulton_test"
name = "Fulton Test"
state = "GA"
default_city = "Atlanta"
listing_url = "http://127.0.0.1:9/unreachable"
manual_text_var = "FULTON_TEST_TEXT"

[parcel]
pattern = '\b\d{2}[\s-]+\d{3,4}[A-Z]?[\s-]+\d{4}[\s-]+\d{3}[\s-]+\d\b'
shape = '\d{2}-\d{3,4}[A-Z]?-\d{4}-\d{3}-\d'

[extractor]
type = "pdf_documents"
documents = ["http://127.0.0.1:9/list.pdf"]
"#;

    const TEXT: &str = "\
14-0184-0008-002-7 0 BOULEVARD GRANADA SW
14 0185 0001 010 2   DOE JANE   12 OAK DR   $88.00
14-0184-0008-002-7 0 BOULEVARD GRANADA SW
99-1 NOT A PARCEL
";

    #[derive(Default)]
    struct FakeStore {
        saved: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl LienStore for FakeStore {
        async fn upsert(
            &self,
            jurisdiction: &str,
            records: &[CandidateLienRecord],
        ) -> Result<Vec<SavedRecord>, StoreError> {
            if self.fail {
                return Err(StoreError::Backend {
                    message: "disk full".to_owned(),
                });
            }
            let mut saved = self.saved.lock().unwrap();
            Ok(records
                .iter()
                .map(|r| {
                    saved.push((jurisdiction.to_owned(), r.parcel_id.clone()));
                    SavedRecord {
                        record_id: format!("{jurisdiction}:{}", r.parcel_id),
                        parcel_id: r.parcel_id.clone(),
                        created: true,
                    }
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeEnricher {
        enriched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Enricher for FakeEnricher {
        async fn enrich_and_validate(
            &self,
            parcel_id: &str,
            _address: &str,
        ) -> Result<Option<Enrichment>, EnrichError> {
            match parcel_id {
                "14-0184-0008-002-7" => Ok(Some(Enrichment {
                    improvement_value: Some(120_000.0),
                    property_data: serde_json::json!({"beds": 3}),
                })),
                "14-0185-0001-010-2" => Ok(Some(Enrichment {
                    improvement_value: Some(0.0),
                    property_data: serde_json::Value::Null,
                })),
                _ => Err(EnrichError::Lookup {
                    parcel_id: parcel_id.to_owned(),
                    message: "timeout".to_owned(),
                }),
            }
        }

        async fn enrich_saved(&self, record_id: &str, _parcel_id: &str) -> Result<(), EnrichError> {
            self.enriched.lock().unwrap().push(record_id.to_owned());
            Err(EnrichError::Update {
                record_id: record_id.to_owned(),
                message: "ignored".to_owned(),
            })
        }
    }

    fn fetcher() -> Fetcher {
        let config = FetchConfig {
            max_retries: 0,
            ..FetchConfig::default()
        };
        Fetcher::new(&config.with_timeout(Duration::from_millis(200))).unwrap()
    }

    fn def() -> JurisdictionDefinition {
        parse_jurisdiction_toml(DEF).unwrap()
    }

    #[tokio::test]
    async fn manual_text_is_reconstructed_and_saved_once_per_parcel() {
        let store = Arc::new(FakeStore::default());
        let orchestrator = Orchestrator::new(fetcher(), store.clone());

        let outcome = orchestrator
            .run_with_input(&def(), InputSource::ManualText(TEXT.to_owned()))
            .await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.stats.documents_attempted, 1);
        assert_eq!(outcome.stats.records_extracted, 2);
        assert_eq!(outcome.stats.records_saved, 2);
        let saved = store.saved.lock().unwrap();
        assert_eq!(
            *saved,
            vec![
                ("fulton_test".to_owned(), "14-0184-0008-002-7".to_owned()),
                ("fulton_test".to_owned(), "14-0185-0001-010-2".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn enrichment_rejects_zero_and_keeps_valid() {
        let store = Arc::new(FakeStore::default());
        let enricher = Arc::new(FakeEnricher::default());
        let orchestrator = Orchestrator::new(fetcher(), store.clone())
            .with_enricher(enricher.clone())
            .with_enrich_delay(Duration::ZERO);

        let outcome = orchestrator
            .run_with_input(&def(), InputSource::ManualText(TEXT.to_owned()))
            .await;

        assert!(outcome.is_completed());
        assert_eq!(outcome.stats.records_rejected, 1);
        assert_eq!(outcome.stats.records_saved, 1);
        assert_eq!(
            *enricher.enriched.lock().unwrap(),
            vec!["fulton_test:14-0184-0008-002-7".to_owned()]
        );
    }

    #[tokio::test]
    async fn persistence_failure_fails_the_run() {
        let store = Arc::new(FakeStore {
            fail: true,
            ..FakeStore::default()
        });
        let orchestrator = Orchestrator::new(fetcher(), store);

        let outcome = orchestrator
            .run_with_input(&def(), InputSource::ManualText(TEXT.to_owned()))
            .await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.stats.records_extracted, 2);
        assert_eq!(outcome.stats.records_saved, 0);
        assert!(outcome.error.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn unreachable_document_is_counted_not_fatal() {
        let store = Arc::new(FakeStore::default());
        let orchestrator = Orchestrator::new(fetcher(), store.clone());

        let outcome = orchestrator.run_with_input(&def(), InputSource::Remote).await;

        assert!(outcome.is_completed());
        assert_eq!(outcome.stats.documents_attempted, 1);
        assert_eq!(outcome.stats.documents_failed, 1);
        assert_eq!(outcome.stats.records_saved, 0);
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_all_is_sequential_and_keeps_going() {
        let store = Arc::new(FakeStore::default());
        let orchestrator = Orchestrator::new(fetcher(), store);
        let mut broken = def();
        broken.id = "broken".to_owned();
        broken.parcel.pattern = "(".to_owned();

        let outcomes = orchestrator.run_all(&[broken, def()]).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].jurisdiction, "broken");
        assert_eq!(outcomes[0].status, RunStatus::Failed);
        assert_eq!(outcomes[1].jurisdiction, "fulton_test");
        assert!(outcomes[1].is_completed());
    }

    #[test]
    fn pdf_links_ignore_query_and_case() {
        assert!(is_pdf_link("https://x.test/Tax%20Sale.PDF?v=2"));
        assert!(!is_pdf_link("https://x.test/sale.pdf.html"));
    }
}
