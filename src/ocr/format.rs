//! Plate text normalization, character correction and format validation.

use once_cell::sync::Lazy;
use regex::RegexSet;

/// Characters the OCR backend is allowed to emit.
pub const PLATE_ALLOWLIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Leading positions expected to hold letters.
const LETTER_PREFIX_LEN: usize = 3;

static PLATE_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"^[A-Z]{3}[0-9]{3}$",      // ABC123
        r"^[A-Z]{3}[0-9]{2}[A-Z]$", // ABC12D
        r"^[A-Z]{2}[0-9]{3}[A-Z]$", // AB123C
        r"^[0-9]{3}[A-Z]{3}$",      // 123ABC
    ])
    .expect("plate patterns are valid regexes")
});

fn digit_to_letter(c: char) -> char {
    match c {
        '0' => 'O',
        '1' => 'I',
        '2' => 'Z',
        '3' => 'B',
        '4' => 'A',
        '5' => 'S',
        '6' => 'G',
        '8' => 'B',
        other => other,
    }
}

fn letter_to_digit(c: char) -> char {
    match c {
        'O' | 'Q' => '0',
        'I' | 'L' => '1',
        'B' => '8',
        'S' => '5',
        'G' => '6',
        'Z' => '2',
        other => other,
    }
}

/// Uppercase and strip spaces, hyphens and periods.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.'))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Normalize and correct commonly confused characters by position.
///
/// The first three characters are pulled towards letters, the rest towards digits.
pub fn format_license(text: &str) -> String {
    normalize(text)
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if i < LETTER_PREFIX_LEN {
                digit_to_letter(c)
            } else {
                letter_to_digit(c)
            }
        })
        .collect()
}

/// Whether `text` matches one of the accepted plate shapes.
pub fn license_complies_format(text: &str) -> bool {
    let len = text.chars().count();
    (5..=7).contains(&len) && PLATE_PATTERNS.is_match(text)
}
