//! Multi-line record accumulation.
//!
//! Some listings wrap each record over several lines, with only the first
//! line carrying the sale number or parcel id:
//!
//! ```text
//! 1001   16-0245-0-012-0   JONES MARY
//!                          123 ELM ST MARIETTA 30060     $1,234.56
//! ```
//!
//! [`logical_lines`] joins such continuations onto the line that started
//! the record. The buffer flushes on the next record start, a header, a
//! noise line, or a blank line. Pieces are joined with a wide gap so the
//! result still splits on the three-space delimiter.

use crate::header::{detect_at, is_noise};
use crate::layout::RowLayout;

const JOIN: &str = "   ";

/// Joins continuation lines onto their record's first line.
///
/// Header, noise, and orphan lines (continuations with no open record)
/// pass through unchanged; blank lines are dropped.
#[must_use]
pub fn logical_lines(lines: &[String], layout: &RowLayout) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut buffer: Option<String> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();

        if line.is_empty() {
            out.extend(buffer.take());
            i += 1;
            continue;
        }

        if let Some((_, consumed)) = detect_at(lines, i, layout) {
            out.extend(buffer.take());
            out.extend(lines[i..i + consumed].iter().cloned());
            i += consumed;
            continue;
        }

        if is_noise(line, layout) {
            out.extend(buffer.take());
            out.push(line.to_owned());
        } else if is_record_start(line, layout) {
            out.extend(buffer.replace(line.to_owned()));
        } else if let Some(open) = buffer.as_mut() {
            open.push_str(JOIN);
            open.push_str(line);
        } else {
            out.push(line.to_owned());
        }

        i += 1;
    }

    out.extend(buffer);
    out
}

/// A record starts with the configured sale-number pattern or with a
/// parcel id at the beginning of the line.
fn is_record_start(line: &str, layout: &RowLayout) -> bool {
    if layout
        .record_start
        .as_ref()
        .is_some_and(|re| re.find(line).is_some_and(|m| m.start() == 0))
    {
        return true;
    }

    layout
        .parcel_pattern
        .find(line)
        .is_some_and(|m| m.start() == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> RowLayout {
        RowLayout::new(
            r"\b\d{2}[\s-]+\d{4}[\s-]+\d[\s-]+\d{3}[\s-]+\d\b",
            r"\d{2}-\d{4}-\d-\d{3}-\d",
        )
        .unwrap()
        .with_record_start(r"^\d{3,5}\s{2,}")
        .unwrap()
        .with_continuation(true)
    }

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_owned).collect()
    }

    #[test]
    fn joins_continuations_until_next_record() {
        let text = lines(
            "SALE NO   PARCEL ID   OWNER   ADDRESS   AMOUNT\n\
             1001   16-0245-0-012-0   JONES MARY\n\
             \x20                    123 ELM ST MARIETTA 30060   $1,234.56\n\
             1002   16-0246-0-001-0   ROE RICHARD   9 PINE CT   $99.00\n\
             Page 1 of 3\n\
             1003   16-0300-0-044-0   LEE ANN\n\
             \n\
             stray trailing line",
        );

        let logical = logical_lines(&text, &layout());
        assert_eq!(
            logical,
            vec![
                "SALE NO   PARCEL ID   OWNER   ADDRESS   AMOUNT",
                "1001   16-0245-0-012-0   JONES MARY   123 ELM ST MARIETTA 30060   $1,234.56",
                "1002   16-0246-0-001-0   ROE RICHARD   9 PINE CT   $99.00",
                "Page 1 of 3",
                "1003   16-0300-0-044-0   LEE ANN",
                "stray trailing line",
            ]
        );
    }

    #[test]
    fn parcel_at_line_start_opens_a_record() {
        let text = lines("16-0245-0-012-0 JONES MARY\n123 ELM ST\n16-0246-0-001-0 ROE RICHARD");
        let logical = logical_lines(&text, &layout());
        assert_eq!(
            logical,
            vec![
                "16-0245-0-012-0 JONES MARY   123 ELM ST",
                "16-0246-0-001-0 ROE RICHARD",
            ]
        );
    }
}
