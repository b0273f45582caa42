#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tiered PDF text extraction for county lien publications.
//!
//! County PDFs range from clean text-layer exports to scanned faxes with
//! no text at all. [`PdfPipeline`] tries an ordered list of
//! [`TextExtractor`] strategies and returns the first one that produces
//! non-whitespace text:
//!
//! 1. [`text_layer::TextLayerExtractor`]: operator-level walk of each
//!    page's content stream with [`lopdf`], one line per text line move,
//!    salvaging raw string literals when the document does not load.
//! 2. [`alternate::AlternateTextExtractor`]: an independent parser
//!    ([`pdf_extract`]).
//! 3. [`ocr::OcrExtractor`]: rasterize, preprocess, and recognize with
//!    external `pdftoppm` / `tesseract` binaries. Output passes through
//!    [`cleanup::clean_ocr_text`].
//!
//! When every tier fails the caller gets an [`ExtractionFailure`] listing
//! what each tier reported.

pub mod alternate;
pub mod cleanup;
pub mod ocr;
pub mod text_layer;

use std::path::Path;

use async_trait::async_trait;
use strum_macros::{AsRefStr, Display};

/// How many leading bytes are searched for the `%PDF-` signature.
const SIGNATURE_WINDOW: usize = 1024;

/// The extraction strategy that produced a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionTier {
    /// Structural text layer via `lopdf`.
    TextLayer,
    /// Independent text-layer parser via `pdf-extract`.
    AlternateTextLayer,
    /// Optical character recognition on rasterized pages.
    Ocr,
}

/// Text recovered from a PDF and the tier that recovered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Extracted text, pages separated by newlines.
    pub text: String,
    /// Which tier succeeded.
    pub tier: ExtractionTier,
}

/// Why a single tier did not produce text.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    /// The tier ran but produced no non-whitespace text.
    #[error("no text recovered")]
    Empty,

    /// The document could not be parsed by this tier.
    #[error("parse error: {0}")]
    Parse(String),

    /// The tier cannot run in this environment.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// An external tool exited unsuccessfully.
    #[error("{tool} failed: {message}")]
    Tool {
        /// Binary name.
        tool: &'static str,
        /// Exit status and stderr excerpt.
        message: String,
    },

    /// An external tool exceeded its time limit.
    #[error("{tool} timed out after {secs}s")]
    Timeout {
        /// Binary name.
        tool: &'static str,
        /// Configured limit in seconds.
        secs: u64,
    },

    /// A parser panicked or its blocking task was cancelled.
    #[error("parser aborted: {0}")]
    Aborted(String),

    /// Image decoding or encoding failed during OCR preprocessing.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One tier's failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierAttempt {
    /// The tier that was attempted.
    pub tier: ExtractionTier,
    /// Rendered [`TierError`].
    pub message: String,
}

/// Every tier failed for a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("all {} extraction tier(s) failed: {}", .attempts.len(), summarize(.attempts))]
pub struct ExtractionFailure {
    /// Attempts in the order they were made.
    pub attempts: Vec<TierAttempt>,
}

fn summarize(attempts: &[TierAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.tier, a.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from file-based extraction.
#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    /// Reading the input failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No tier produced text.
    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),
}

/// A single PDF-to-text strategy.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Short label for log messages.
    fn name(&self) -> &'static str;

    /// The tier this strategy represents.
    fn kind(&self) -> ExtractionTier;

    /// Extracts text from the raw PDF bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`TierError`] describing why this strategy failed.
    async fn extract(&self, bytes: &[u8]) -> Result<String, TierError>;
}

/// Ordered fallback over [`TextExtractor`] strategies.
pub struct PdfPipeline {
    tiers: Vec<Box<dyn TextExtractor>>,
}

impl std::fmt::Debug for PdfPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfPipeline")
            .field(
                "tiers",
                &self.tiers.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for PdfPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfPipeline {
    /// Builds the standard three-tier pipeline. OCR availability is read
    /// from the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tiers(vec![
            Box::new(text_layer::TextLayerExtractor),
            Box::new(alternate::AlternateTextExtractor),
            Box::new(ocr::OcrExtractor::from_env()),
        ])
    }

    /// Builds a pipeline over an explicit tier list.
    #[must_use]
    pub fn with_tiers(tiers: Vec<Box<dyn TextExtractor>>) -> Self {
        Self { tiers }
    }

    /// Extracts text, falling through tiers until one yields content.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionFailure`] if every tier fails or yields only
    /// whitespace.
    pub async fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, ExtractionFailure> {
        if !has_pdf_signature(bytes) {
            log::warn!(
                "Document ({} bytes) lacks a %PDF- signature; attempting to parse anyway",
                bytes.len()
            );
        }

        let mut attempts = Vec::with_capacity(self.tiers.len());

        for tier in &self.tiers {
            let result = match tier.extract(bytes).await {
                Ok(text) if has_content(&text) => Ok(text),
                Ok(_) => Err(TierError::Empty),
                Err(e) => Err(e),
            };

            match result {
                Ok(text) => {
                    log::debug!(
                        "{}: extracted {} characters of text",
                        tier.name(),
                        text.len()
                    );
                    return Ok(ExtractedText {
                        text,
                        tier: tier.kind(),
                    });
                }
                Err(e) => {
                    log::warn!("{}: {e}", tier.name());
                    attempts.push(TierAttempt {
                        tier: tier.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(ExtractionFailure { attempts })
    }

    /// Reads `path` and extracts its text.
    ///
    /// # Errors
    ///
    /// Returns [`PdfError::Io`] if the file cannot be read and
    /// [`PdfError::Extraction`] if no tier produced text.
    pub async fn extract_file(&self, path: &Path) -> Result<ExtractedText, PdfError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(self.extract(&bytes).await?)
    }
}

/// Returns `true` if `%PDF-` appears near the start of the buffer.
#[must_use]
pub fn has_pdf_signature(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(SIGNATURE_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Returns `true` if `text` contains at least one non-whitespace character.
#[must_use]
pub fn has_content(text: &str) -> bool {
    text.chars().any(|c| !c.is_whitespace())
}

/// Runs a CPU-bound parser on the blocking pool so a panic surfaces as a
/// [`TierError::Aborted`].
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, TierError>
where
    F: FnOnce() -> Result<T, TierError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TierError::Aborted(e.to_string()))?
}

#[cfg(test)]
pub(crate) mod test_pdf {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    /// Builds a one-page PDF that shows each line with `Tj` at 10 pt.
    pub fn single_page(lines: &[&str]) -> Vec<u8> {
        sized_page(lines, 10)
    }

    /// Builds a one-page PDF that shows each line with `Tj` at `size` pt.
    pub fn sized_page(lines: &[&str], size: i64) -> Vec<u8> {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), size.into()]),
            Operation::new("TL", vec![(size + size / 5).into()]),
            Operation::new("Td", vec![40.into(), 780.into()]),
        ];
        for line in lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));
        page(operations)
    }

    /// Builds a one-page PDF that only paints an image, with no text
    /// operators at all.
    pub fn image_only_page() -> Vec<u8> {
        page(vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![400.into(), 0.into(), 0.into(), 200.into(), 40.into(), 500.into()],
            ),
            Operation::new("Do", vec!["Im1".into()]),
            Operation::new("Q", vec![]),
        ])
    }

    fn page(operations: Vec<Operation>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        // 8x8 greyscale stripes.
        let pixels: Vec<u8> = (0..64u8).map(|i| if (i / 8) % 2 == 0 { 0 } else { 255 }).collect();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 8,
                "Height" => 8,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            pixels,
        ));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => dictionary! { "Im1" => image_id },
        });

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }
}
