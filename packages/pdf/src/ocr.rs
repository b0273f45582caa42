//! Third tier: OCR with `pdftoppm` and `tesseract`.
//!
//! Pages are rasterized at 2x (144 DPI) into a temporary directory,
//! converted to greyscale, contrast-stretched, and sharpened, then piped
//! through `tesseract` one page at a time. The recognized text goes
//! through [`clean_ocr_text`] before it is returned.
//!
//! Serverless runtimes have neither binary nor a writable scratch disk to
//! speak of, so the tier refuses to run when one is detected.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat};
use tokio::io::AsyncWriteExt as _;

use crate::cleanup::clean_ocr_text;
use crate::{ExtractionTier, TextExtractor, TierError, run_blocking};

/// Environment variables that mark a restricted runtime.
pub const RESTRICTED_RUNTIME_VARS: &[&str] = &[
    "AWS_LAMBDA_FUNCTION_NAME",
    "VERCEL",
    "NETLIFY",
    "FUNCTION_TARGET",
];

/// Explicit opt-out for OCR.
pub const DISABLE_OCR_VAR: &str = "TAX_LIEN_DISABLE_OCR";

/// Tunables for the OCR tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrConfig {
    /// Rasterization resolution passed to `pdftoppm -r`.
    pub dpi: u32,
    /// Limit for each external tool invocation.
    pub timeout: Duration,
    /// Tesseract language pack.
    pub language: String,
    /// Tesseract page segmentation mode. `6` treats a page as one uniform
    /// block, which suits tabular listings.
    pub page_seg_mode: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: 144,
            timeout: Duration::from_secs(120),
            language: "eng".to_owned(),
            page_seg_mode: 6,
        }
    }
}

/// Rasterize-and-recognize extraction.
#[derive(Debug, Clone)]
pub struct OcrExtractor {
    config: OcrConfig,
    restricted: Option<String>,
}

impl OcrExtractor {
    /// Builds an extractor, detecting restricted runtimes from the
    /// process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            config: OcrConfig::default(),
            restricted: restricted_runtime(|key| std::env::var(key).ok()),
        }
    }

    /// Builds an extractor from an explicit config, without runtime
    /// detection.
    #[must_use]
    pub const fn new(config: OcrConfig) -> Self {
        Self {
            config,
            restricted: None,
        }
    }

    /// Marks the runtime as restricted for the given reason.
    #[must_use]
    pub fn with_restriction(mut self, reason: impl Into<String>) -> Self {
        self.restricted = Some(reason.into());
        self
    }

    async fn recognize(&self, bytes: &[u8]) -> Result<String, TierError> {
        let pdftoppm = locate("pdftoppm")?;
        let tesseract = locate("tesseract")?;

        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("input.pdf");
        tokio::fs::write(&input, bytes).await?;

        self.rasterize(&pdftoppm, &input, scratch.path()).await?;

        let pages = page_images(scratch.path())?;
        log::debug!("ocr: rasterized {} page(s)", pages.len());
        if pages.is_empty() {
            return Err(TierError::Empty);
        }

        let mut text = String::new();
        for (index, page) in pages.iter().enumerate() {
            let png = tokio::fs::read(page).await?;
            let prepared = run_blocking(move || preprocess(&png)).await?;
            let page_text = self.tesseract(&tesseract, prepared).await?;
            log::debug!("ocr: page {} yielded {} characters", index + 1, page_text.len());

            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&page_text);
        }

        Ok(clean_ocr_text(&text))
    }

    async fn rasterize(&self, pdftoppm: &Path, input: &Path, dir: &Path) -> Result<(), TierError> {
        let mut cmd = tokio::process::Command::new(pdftoppm);
        cmd.arg("-r")
            .arg(self.config.dpi.to_string())
            .arg("-png")
            .arg(input)
            .arg(dir.join("page"))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| TierError::Timeout {
                tool: "pdftoppm",
                secs: self.config.timeout.as_secs(),
            })??;

        if !output.status.success() {
            return Err(TierError::Tool {
                tool: "pdftoppm",
                message: failure_message(output.status, &output.stderr),
            });
        }

        Ok(())
    }

    async fn tesseract(&self, tesseract: &Path, png: Vec<u8>) -> Result<String, TierError> {
        let mut child = tokio::process::Command::new(tesseract)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .arg("--psm")
            .arg(self.config.page_seg_mode.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let timed_out = || TierError::Timeout {
            tool: "tesseract",
            secs: self.config.timeout.as_secs(),
        };

        let run = async {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&png).await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.config.timeout, run)
            .await
            .map_err(|_| timed_out())??;

        if !output.status.success() {
            return Err(TierError::Tool {
                tool: "tesseract",
                message: failure_message(output.status, &output.stderr),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TextExtractor for OcrExtractor {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn kind(&self) -> ExtractionTier {
        ExtractionTier::Ocr
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String, TierError> {
        if let Some(reason) = &self.restricted {
            return Err(TierError::Unavailable(format!(
                "OCR is disabled in this runtime ({reason})"
            )));
        }

        self.recognize(bytes).await
    }
}

/// Returns the name of the first variable that marks the runtime as
/// restricted, using `lookup` to read the environment.
///
/// `TAX_LIEN_DISABLE_OCR` counts unless it is empty, `0`, or `false`.
pub fn restricted_runtime<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(DISABLE_OCR_VAR) {
        let value = value.trim().to_ascii_lowercase();
        if !value.is_empty() && value != "0" && value != "false" {
            return Some(DISABLE_OCR_VAR.to_owned());
        }
    }

    RESTRICTED_RUNTIME_VARS
        .iter()
        .find(|var| lookup(var).is_some())
        .map(|var| (*var).to_owned())
}

/// Converts a rasterized page into a cleaner greyscale PNG for OCR.
///
/// # Errors
///
/// Returns [`TierError::Image`] if the input cannot be decoded or the
/// output cannot be encoded.
pub fn preprocess(png: &[u8]) -> Result<Vec<u8>, TierError> {
    let gray = image::load_from_memory(png)?.to_luma8();
    let stretched = stretch_contrast(gray);
    let sharpened = image::imageops::unsharpen(&stretched, 1.0, 4);

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(sharpened).write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Linearly maps the darkest pixel to 0 and the brightest to 255.
fn stretch_contrast(mut gray: GrayImage) -> GrayImage {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));

    if max <= min {
        return gray;
    }

    let range = u16::from(max - min);
    for pixel in gray.pixels_mut() {
        let shifted = u16::from(pixel.0[0] - min) * 255 / range;
        pixel.0[0] = u8::try_from(shifted).unwrap_or(u8::MAX);
    }

    gray
}

fn locate(binary: &str) -> Result<PathBuf, TierError> {
    which::which(binary)
        .map_err(|_| TierError::Unavailable(format!("`{binary}` not found on PATH")))
}

/// Lists `pdftoppm` output in page order. `pdftoppm` zero-pads page
/// numbers, so a lexical sort is page order.
fn page_images(dir: &Path) -> Result<Vec<PathBuf>, TierError> {
    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "png"))
        .collect();
    pages.sort();
    Ok(pages)
}

fn failure_message(status: std::process::ExitStatus, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let excerpt: String = stderr.trim().chars().take(200).collect();
    format!("{status}: {excerpt}")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use image::Luma;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn detects_serverless_runtimes() {
        assert_eq!(
            restricted_runtime(env(&[("AWS_LAMBDA_FUNCTION_NAME", "scrape")])),
            Some("AWS_LAMBDA_FUNCTION_NAME".to_owned())
        );
        assert_eq!(
            restricted_runtime(env(&[("VERCEL", "1")])),
            Some("VERCEL".to_owned())
        );
        assert_eq!(restricted_runtime(env(&[("HOME", "/root")])), None);
    }

    #[test]
    fn explicit_opt_out_respects_falsy_values() {
        assert_eq!(
            restricted_runtime(env(&[("TAX_LIEN_DISABLE_OCR", "1")])),
            Some("TAX_LIEN_DISABLE_OCR".to_owned())
        );
        assert_eq!(restricted_runtime(env(&[("TAX_LIEN_DISABLE_OCR", "false")])), None);
        assert_eq!(restricted_runtime(env(&[("TAX_LIEN_DISABLE_OCR", "")])), None);
    }

    #[tokio::test]
    async fn restricted_runtime_fails_fast_without_spawning() {
        let extractor = OcrExtractor::new(OcrConfig::default()).with_restriction("NETLIFY");

        let started = std::time::Instant::now();
        let result = extractor.extract(b"%PDF-1.4").await;

        assert!(started.elapsed() < Duration::from_secs(1));
        match result {
            Err(TierError::Unavailable(message)) => assert!(message.contains("NETLIFY")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recognizes_a_rendered_page_when_tools_are_installed() {
        if which::which("pdftoppm").is_err() || which::which("tesseract").is_err() {
            eprintln!("pdftoppm or tesseract not installed; skipping");
            return;
        }

        let bytes = crate::test_pdf::sized_page(&["14-0184-0008-002-7 SMITH JOHN"], 28);
        let text = OcrExtractor::new(OcrConfig::default())
            .extract(&bytes)
            .await
            .unwrap();

        assert!(crate::has_content(&text));
        assert!(text.to_uppercase().contains("SMITH"), "recognized {text:?}");
    }

    #[test]
    fn preprocess_keeps_dimensions_and_stretches_contrast() {
        let source = GrayImage::from_fn(24, 12, |x, _| Luma([100 + u8::try_from(x).unwrap()]));
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(source)
            .write_to(&mut png, ImageFormat::Png)
            .unwrap();

        let processed = preprocess(png.get_ref()).unwrap();
        let decoded = image::load_from_memory(&processed).unwrap().to_luma8();

        assert_eq!(decoded.dimensions(), (24, 12));
        let darkest = decoded.pixels().map(|p| p.0[0]).min().unwrap();
        let brightest = decoded.pixels().map(|p| p.0[0]).max().unwrap();
        assert!(darkest < 20, "darkest pixel {darkest}");
        assert!(brightest > 235, "brightest pixel {brightest}");
    }

    #[test]
    fn stretch_leaves_flat_images_alone() {
        let flat = GrayImage::from_pixel(4, 4, Luma([128]));
        assert_eq!(stretch_contrast(flat.clone()), flat);
    }

    #[test]
    fn preprocess_rejects_non_images() {
        assert!(matches!(preprocess(b"not a png"), Err(TierError::Image(_))));
    }
}
