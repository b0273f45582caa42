//! OCR artifact correction.
//!
//! Tesseract output from scanned lien lists has stray control bytes,
//! ragged spacing, and letter/digit confusions inside numbers (`12O5`,
//! `1l5`). [`clean_ocr_text`] fixes those without touching words: a
//! letter is only replaced when both of its neighbours are digits.

/// Normalizes OCR output.
///
/// Line endings become `\n`, control characters are dropped (whitespace
/// controls become spaces), runs of spaces collapse to one, line ends are
/// trimmed, and `O`/`o` → `0`, `l`/`I` → `1` between digits. A `|`
/// between digits is kept, since it may be a cell boundary.
///
/// Applying the function twice gives the same result as applying it once.
#[must_use]
pub fn clean_ocr_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(clean_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_line(line: &str) -> String {
    let spaced: String = line
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some(' ')
            } else if c.is_control() {
                None
            } else {
                Some(c)
            }
        })
        .collect();
    let collapsed = spaced.split(' ').filter(|t| !t.is_empty()).collect::<Vec<_>>().join(" ");

    fix_digit_context(&collapsed)
}

/// Replaces digit look-alikes whose corrected left neighbour and original
/// right neighbour are both ASCII digits.
fn fix_digit_context(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len());

    for (i, &c) in chars.iter().enumerate() {
        let replacement = match c {
            'O' | 'o' => Some('0'),
            'l' | 'I' => Some('1'),
            _ => None,
        };

        let fixed = replacement.filter(|_| {
            out.last().is_some_and(char::is_ascii_digit)
                && chars.get(i + 1).is_some_and(char::is_ascii_digit)
        });

        out.push(fixed.unwrap_or(c));
    }

    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixes_letters_between_digits_only() {
        assert_eq!(clean_ocr_text("$1,2O5.OO"), "$1,205.OO");
        assert_eq!(clean_ocr_text("1l5 Oak Ave"), "115 Oak Ave");
        assert_eq!(clean_ocr_text("1O2O3"), "10203");
        assert_eq!(clean_ocr_text("Lot l2 Block I"), "Lot l2 Block I");
    }

    #[test]
    fn keeps_pipes_between_digits() {
        assert_eq!(clean_ocr_text("12|34"), "12|34");
        assert_eq!(clean_ocr_text("$1O|2O5"), "$1O|205");
    }

    #[test]
    fn normalizes_line_endings_controls_and_spacing() {
        let raw = "14-0184  \t SMITH\u{0007} JOHN  \r\n\r100   MAIN ST\r";
        assert_eq!(clean_ocr_text(raw), "14-0184 SMITH JOHN\n\n100 MAIN ST\n");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "1O|2 and 1OI2",
            "  12 O 5\t\t77l8 \r\n|O| 9o9o9  ",
            "Parcel 14-O184-OOO8-0O2-7  $1,2O5.OO\u{000c}",
            "",
            "\r\r\n",
        ];

        for sample in samples {
            let once = clean_ocr_text(sample);
            assert_eq!(clean_ocr_text(&once), once, "not idempotent for {sample:?}");
        }
    }
}
