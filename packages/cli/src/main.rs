#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the tax lien extraction pipeline.
//!
//! Runs configured jurisdictions into a JSON file store (or an in-memory
//! store with `--dry-run`), and offers offline commands for debugging a
//! single PDF or text file against a jurisdiction's row layout.
//!
//! Log output is routed through `indicatif-log-bridge` (see
//! [`progress::init_logger`]) so log lines and progress bars share the
//! terminal cleanly.

mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::MultiProgress;
use tax_lien_models::RunOutcome;
use tax_lien_pdf::PdfPipeline;
use tax_lien_scraper::{FetchConfig, Fetcher};
use tax_lien_source::{
    Extraction, InputSource, JurisdictionDefinition, LienStore, Orchestrator, registry,
};
use tax_lien_store::{JsonFileStore, MemoryStore};

use crate::progress::IndicatifProgress;

/// Where runs persist records unless `--store` says otherwise.
const DEFAULT_STORE_PATH: &str = "data/tax_liens.json";

#[derive(Parser)]
#[command(name = "tax_lien_cli", about = "Tax lien listing extraction tool")]
struct Cli {
    /// JSON file that saved records are upserted into
    #[arg(long, global = true, default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,
    /// Keep records in memory and print them instead of writing the store
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all configured jurisdictions
    List,
    /// Run specific jurisdictions
    Run {
        /// Jurisdiction identifiers (e.g., "`fulton_ga`")
        #[arg(required = true)]
        ids: Vec<String>,
        /// Read the listing from this text file instead of fetching it.
        /// Requires exactly one jurisdiction.
        #[arg(long)]
        text_file: Option<PathBuf>,
    },
    /// Run every configured jurisdiction, one after another
    RunAll {
        /// Comma-separated list of jurisdiction IDs to run
        #[arg(long, env = "TAX_LIEN_JURISDICTIONS", value_delimiter = ',')]
        jurisdictions: Vec<String>,
    },
    /// Extract text from a local PDF, optionally reconstructing records
    ExtractPdf {
        /// Path to the PDF
        path: PathBuf,
        /// Reconstruct records with this jurisdiction's row layout
        #[arg(long)]
        jurisdiction: Option<String>,
    },
    /// Reconstruct records from a local text file
    ParseText {
        /// Path to the text file
        path: PathBuf,
        /// Jurisdiction whose row layout to apply
        #[arg(long)]
        jurisdiction: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = progress::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            println!("{:<14} {:<14} {:<30} LISTING", "ID", "EXTRACTOR", "NAME");
            println!("{}", "-".repeat(90));
            for def in &registry::all_jurisdictions() {
                println!(
                    "{:<14} {:<14} {:<30} {}",
                    def.id,
                    def.extractor.kind(),
                    def.name,
                    def.listing_url
                );
            }
        }
        Commands::Run { ids, text_file } => {
            let defs = select(&trim_ids(ids))?;
            let text = match text_file {
                Some(path) if defs.len() == 1 => Some(tokio::fs::read_to_string(&path).await?),
                Some(_) => return Err("--text-file requires exactly one jurisdiction".into()),
                None => None,
            };
            run_jurisdictions(&cli.store, cli.dry_run, &defs, text, &multi).await?;
        }
        Commands::RunAll { jurisdictions } => {
            let defs = select(&trim_ids(jurisdictions))?;
            log::info!(
                "Running {} jurisdiction(s): {}",
                defs.len(),
                defs.iter()
                    .map(|d| d.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            run_jurisdictions(&cli.store, cli.dry_run, &defs, None, &multi).await?;
        }
        Commands::ExtractPdf { path, jurisdiction } => {
            let extracted = PdfPipeline::new().extract_file(&path).await?;
            log::info!(
                "{}: {} characters via {}",
                path.display(),
                extracted.text.len(),
                extracted.tier
            );

            match jurisdiction {
                Some(id) => print_extraction(&extracted.text, &id)?,
                None => println!("{}", extracted.text),
            }
        }
        Commands::ParseText { path, jurisdiction } => {
            let text = tokio::fs::read_to_string(&path).await?;
            print_extraction(&text, &jurisdiction)?;
        }
    }

    Ok(())
}

/// Runs `defs` against the configured store and prints a summary.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built, printing records
/// fails, or any run ends as failed.
async fn run_jurisdictions(
    store_path: &Path,
    dry_run: bool,
    defs: &[JurisdictionDefinition],
    text: Option<String>,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = Fetcher::new(&FetchConfig::from_env())?;

    let memory = dry_run.then(|| Arc::new(MemoryStore::new()));
    let store: Arc<dyn LienStore> = match &memory {
        Some(memory) => Arc::clone(memory) as Arc<dyn LienStore>,
        None => Arc::new(JsonFileStore::new(store_path)),
    };

    let orchestrator = Orchestrator::new(fetcher, store)
        .with_enrich_delay_from_env()
        .with_progress(IndicatifProgress::documents_bar(multi, "Starting"));

    let outcomes = match (defs, text) {
        ([def], Some(text)) => vec![
            orchestrator
                .run_with_input(def, InputSource::ManualText(text))
                .await,
        ],
        _ => orchestrator.run_all(defs).await,
    };

    print_outcomes(&outcomes);

    if let Some(memory) = memory {
        println!("{}", serde_json::to_string_pretty(&memory.records()?)?);
    } else {
        log::info!("Records stored in {}", store_path.display());
    }

    let failed = outcomes.iter().filter(|o| !o.is_completed()).count();
    if failed > 0 {
        return Err(format!("{failed} of {} run(s) failed", outcomes.len()).into());
    }
    Ok(())
}

/// Reconstructs records from `text` with `id`'s layout and prints them as
/// JSON.
fn print_extraction(text: &str, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let def = select(&[id.to_owned()])?.remove(0);
    let layout = def.layout()?;
    let extraction = Extraction::from_text(text, &layout);

    log::info!(
        "[{}] {} record(s), {} row(s) skipped",
        def.id,
        extraction.records.len(),
        extraction.skipped
    );
    println!("{}", serde_json::to_string_pretty(&extraction.records)?);
    Ok(())
}

fn print_outcomes(outcomes: &[RunOutcome]) {
    println!(
        "{:<14} {:<10} {:>5} {:>7} {:>6} {:>8} {:>6}  ERROR",
        "JURISDICTION", "STATUS", "DOCS", "FAILED", "SAVED", "SKIPPED", "REJECT"
    );
    println!("{}", "-".repeat(80));
    for outcome in outcomes {
        let stats = &outcome.stats;
        println!(
            "{:<14} {:<10} {:>5} {:>7} {:>6} {:>8} {:>6}  {}",
            outcome.jurisdiction,
            outcome.status.to_string(),
            stats.documents_attempted,
            stats.documents_failed,
            stats.records_saved,
            stats.rows_skipped,
            stats.records_rejected,
            outcome.error.as_deref().unwrap_or("")
        );
    }
}

fn select(ids: &[String]) -> Result<Vec<JurisdictionDefinition>, String> {
    registry::select(ids)
        .map_err(|unknown| format!("Unknown jurisdiction(s): {}", unknown.join(", ")))
}

fn trim_ids(ids: Vec<String>) -> Vec<String> {
    ids.into_iter()
        .map(|id| id.trim().to_owned())
        .filter(|id| !id.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_all_splits_and_trims_jurisdictions() {
        let cli = Cli::try_parse_from([
            "tax_lien_cli",
            "run-all",
            "--jurisdictions",
            "fulton_ga, cobb_ga,",
        ])
        .unwrap();

        let Commands::RunAll { jurisdictions } = cli.command else {
            panic!("expected run-all");
        };
        assert_eq!(
            trim_ids(jurisdictions),
            vec!["fulton_ga".to_owned(), "cobb_ga".to_owned()]
        );
        assert_eq!(cli.store, PathBuf::from(DEFAULT_STORE_PATH));
        assert!(!cli.dry_run);
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "tax_lien_cli",
            "run",
            "dekalb_ga",
            "--dry-run",
            "--store",
            "/tmp/liens.json",
        ])
        .unwrap();

        assert!(cli.dry_run);
        assert_eq!(cli.store, PathBuf::from("/tmp/liens.json"));
        assert!(matches!(cli.command, Commands::Run { ref ids, .. } if ids == &["dekalb_ga"]));
    }

    #[test]
    fn run_requires_an_id() {
        assert!(Cli::try_parse_from(["tax_lien_cli", "run"]).is_err());
    }

    #[test]
    fn unknown_ids_are_reported() {
        let err = select(&["nowhere_ga".to_owned()]).unwrap_err();
        assert_eq!(err, "Unknown jurisdiction(s): nowhere_ga");
    }
}
