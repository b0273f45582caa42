//! Second tier: [`pdf_extract`] as an independent text-layer parser.
//!
//! `pdf-extract` handles font encodings and CMaps differently from
//! `lopdf`, so it often recovers text the first tier mangles. It is also
//! known to panic on some malformed inputs; the call runs on the blocking
//! pool so a panic fails the tier instead of the process.

use async_trait::async_trait;

use crate::{ExtractionTier, TextExtractor, TierError, run_blocking};

/// Text-layer extraction through `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlternateTextExtractor;

#[async_trait]
impl TextExtractor for AlternateTextExtractor {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn kind(&self) -> ExtractionTier {
        ExtractionTier::AlternateTextLayer
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String, TierError> {
        let owned = bytes.to_vec();
        run_blocking(move || {
            pdf_extract::extract_text_from_mem(&owned).map_err(|e| TierError::Parse(e.to_string()))
        })
        .await
    }
}
