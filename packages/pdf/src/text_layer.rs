//! Text-layer extraction with [`lopdf`].
//!
//! Each page's decoded content stream is walked operator by operator:
//! string operands of `Tj`, `TJ`, `'` and `"` are collected, and every
//! line move starts a new output line, so table rows stay on their own
//! lines. Pages whose strings do not decode to readable text go through
//! `lopdf`'s font-aware extraction instead. When the page tree does not
//! load at all, the raw buffer is scanned for parenthesised string
//! literals.

use async_trait::async_trait;
use lopdf::{Document, Object, ObjectId};

use crate::{ExtractionTier, TextExtractor, TierError, has_content, run_blocking};

/// First tier: the document's own text layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLayerExtractor;

#[async_trait]
impl TextExtractor for TextLayerExtractor {
    fn name(&self) -> &'static str {
        "text-layer"
    }

    fn kind(&self) -> ExtractionTier {
        ExtractionTier::TextLayer
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String, TierError> {
        let owned = bytes.to_vec();
        run_blocking(move || extract_text_layer(&owned)).await
    }
}

/// Walks every page, then falls back to the raw literal scan, returning
/// the first non-empty result.
///
/// # Errors
///
/// Returns [`TierError::Parse`] if the document does not load and the raw
/// scan finds nothing, or [`TierError::Empty`] if it loads but holds no
/// recoverable text.
pub fn extract_text_layer(bytes: &[u8]) -> Result<String, TierError> {
    let doc = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            log::debug!("lopdf could not load document: {e}");
            let salvaged = salvage_raw_literals(bytes);
            if has_content(&salvaged) {
                return Ok(salvaged);
            }
            return Err(TierError::Parse(e.to_string()));
        }
    };

    let walked = decode_percent_escapes(&walk_pages(&doc));
    if has_content(&walked) {
        return Ok(walked);
    }

    log::debug!("Page walk found no text; scanning raw literals");
    let raw = salvage_raw_literals(bytes);
    if has_content(&raw) {
        return Ok(decode_percent_escapes(&raw));
    }

    Err(TierError::Empty)
}

/// Extracts each page's text, one output line per positioned text line.
///
/// A page whose shown strings decode to unreadable bytes (composite or
/// custom-encoded fonts) is handed to `lopdf`'s font-aware extraction
/// instead. Pages that fail both are skipped.
fn walk_pages(doc: &Document) -> String {
    let mut pages = Vec::new();

    for (page_number, page_id) in doc.get_pages() {
        let shown = page_operator_text(doc, page_number, page_id);
        let text = match shown {
            Some(text) if has_content(&text) && is_readable(&text) => text,
            _ => match doc.extract_text(&[page_number]) {
                Ok(text) => text,
                Err(e) => {
                    log::debug!("page {page_number}: text extraction failed: {e}");
                    continue;
                }
            },
        };
        pages.push(text.trim_end().to_owned());
    }

    pages.join("\n")
}

/// Collects string operands of the text-showing operators in one page's
/// decoded content stream. Line moves (`Td`, `TD`, `Tm`, `T*`, `ET`, `'`,
/// `"`) start a new line.
fn page_operator_text(doc: &Document, page_number: u32, page_id: ObjectId) -> Option<String> {
    let content = match doc.get_and_decode_page_content(page_id) {
        Ok(content) => content,
        Err(e) => {
            log::debug!("page {page_number}: content stream unreadable: {e}");
            return None;
        }
    };

    let mut out = String::new();
    for op in &content.operations {
        match op.operator.as_str() {
            "Tj" | "'" | "\"" => {
                if matches!(op.operator.as_str(), "'" | "\"") {
                    push_line_break(&mut out);
                }
                if let Some(Object::String(bytes, _)) = op.operands.last() {
                    out.push_str(&decode_pdf_string(bytes));
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => out.push_str(&decode_pdf_string(bytes)),
                            // Large negative kerning is a visual word gap.
                            Object::Integer(n) if *n < -200 => out.push(' '),
                            Object::Real(n) if *n < -200.0 => out.push(' '),
                            _ => {}
                        }
                    }
                }
            }
            "Td" | "TD" | "Tm" | "T*" | "ET" => push_line_break(&mut out),
            _ => {}
        }
    }

    Some(out)
}

/// At most one in twenty visible characters may be a control character.
fn is_readable(text: &str) -> bool {
    let (visible, control) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(visible, control), c| {
            (visible + 1, control + usize::from(c.is_control()))
        });
    control * 20 <= visible
}

fn push_line_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Scans the raw buffer for `( ... )` string literals.
///
/// Literals separated by a positioning operator start a new line; others
/// are joined with a space. Literals without any alphanumeric character
/// are ignored.
#[must_use]
pub fn salvage_raw_literals(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut i = 0;
    let mut gap_start = 0;

    while i < bytes.len() {
        if bytes[i] != b'(' {
            i += 1;
            continue;
        }

        let Some((literal, end)) = read_literal(bytes, i + 1) else {
            break;
        };
        let text = decode_pdf_string(&literal);

        if text.chars().any(char::is_alphanumeric) {
            if !out.is_empty() {
                let gap = &bytes[gap_start..i];
                if contains_positioning_operator(gap) {
                    push_line_break(&mut out);
                } else if !out.ends_with('\n') {
                    out.push(' ');
                }
            }
            out.push_str(text.trim());
            gap_start = end;
        }

        i = end;
    }

    out
}

/// Reads a literal string starting just after its opening parenthesis.
/// Returns the unescaped bytes and the index after the closing one.
fn read_literal(bytes: &[u8], start: usize) -> Option<(Vec<u8>, usize)> {
    let mut depth = 1usize;
    let mut literal = Vec::new();
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\\' => {
                let next = *bytes.get(i + 1)?;
                i += 2;
                match next {
                    b'n' => literal.push(b'\n'),
                    b'r' => literal.push(b'\r'),
                    b't' => literal.push(b'\t'),
                    b'b' | b'f' => {}
                    b'0'..=b'7' => {
                        let mut value = u32::from(next - b'0');
                        let mut digits = 1;
                        while digits < 3 {
                            match bytes.get(i) {
                                Some(d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    i += 1;
                                    digits += 1;
                                }
                                _ => break,
                            }
                        }
                        literal.push(u8::try_from(value & 0xFF).unwrap_or(b'?'));
                    }
                    b'\r' | b'\n' => {}
                    other => literal.push(other),
                }
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((literal, i + 1));
                }
            }
            _ => {}
        }
        literal.push(b);
        i += 1;
    }

    None
}

fn contains_positioning_operator(gap: &[u8]) -> bool {
    gap.split(u8::is_ascii_whitespace)
        .any(|token| matches!(token, b"Td" | b"TD" | b"Tm" | b"T*" | b"ET" | b"'" | b"\""))
}

/// Decodes a PDF string: UTF-16BE when it carries a byte-order mark,
/// single-byte Latin-1 otherwise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Decodes `%XX` escapes (e.g. `%20`, `%2C`) left in text runs by some
/// exporters. A `%` not followed by two hex digits is kept as-is.
#[must_use]
pub fn decode_percent_escapes(text: &str) -> String {
    if !text.contains('%') {
        return text.to_owned();
    }

    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| hex_value(*b)),
                bytes.get(i + 2).and_then(|b| hex_value(*b)),
            )
        {
            out.push(hi * 16 + lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pdf;

    #[test]
    fn recovers_lines_from_generated_document() {
        let lines = [
            "PARCEL ID   OWNER   ADDRESS",
            "14-0184-0008-002-7   SMITH JOHN   0 BOULEVARD GRANADA SW",
            "14-0185-0001-010-2   DOE JANE   12 OAK DR",
        ];
        let bytes = test_pdf::single_page(&lines);

        let text = extract_text_layer(&bytes).unwrap();
        assert_eq!(text, lines.join("\n"));
    }

    #[test]
    fn readability_rejects_undecoded_glyph_codes() {
        assert!(is_readable("14-0184-0008-002-7 SMITH JOHN"));
        assert!(!is_readable("\u{0}\u{3}\u{0}\u{11}\u{0}\u{2}"));
    }

    #[test]
    fn salvages_literals_from_unloadable_buffer() {
        let junk = b"garbage BT /F1 10 Tf (14-0184-0008-002-7) Tj (SMITH JOHN) Tj \
                     0 -12 Td (100 MAIN ST) Tj ET trailing";

        let text = extract_text_layer(junk).unwrap();
        assert_eq!(text, "14-0184-0008-002-7 SMITH JOHN\n100 MAIN ST");
    }

    #[test]
    fn raw_scan_handles_escapes_and_nesting() {
        let text = salvage_raw_literals(br"(O\(Brien\) \050x\051) Tj (a (b) c) Tj");
        assert_eq!(text, "O(Brien) (x) a (b) c");
    }

    #[test]
    fn empty_buffer_is_a_parse_failure() {
        assert!(matches!(extract_text_layer(b""), Err(TierError::Parse(_))));
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(decode_percent_escapes("100%20MAIN%2C%20ST"), "100 MAIN, ST");
        assert_eq!(decode_percent_escapes("50% off %zz"), "50% off %zz");
    }

    #[test]
    fn decodes_utf16_strings() {
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0x42]), "AB");
        assert_eq!(decode_pdf_string(b"Main"), "Main");
    }
}
