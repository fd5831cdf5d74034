//! Extraction of term, citizenship, GPA and GRE fields from the free-text
//! metadata cell that follows each decision row in a GradCafe scrape.

use crate::models::{Citizenship, GreScore, ParsedMeta};
use once_cell::sync::Lazy;
use regex::Regex;

static SHORT_TERM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[FSW]\d{2}$").expect("valid term regex"));
static LONG_TERM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Fall|Spring|Summer|Winter)\s+\d{4}$").expect("valid term regex")
});

// Every character that ends a line in a scraped cell, form feeds and the
// Unicode line and paragraph separators included
const LINE_BREAKS: [char; 10] = [
    '\n', '\r', '\x0b', '\x0c', '\x1c', '\x1d', '\x1e', '\u{85}', '\u{2028}', '\u{2029}',
];

/// Splits a multi-line cell into its non-empty trimmed lines
pub fn block_lines(text: &str) -> Vec<&str> {
    text.split(LINE_BREAKS)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

pub fn parse_block(text: &str) -> ParsedMeta {
    parse(&block_lines(text))
}

/// Single forward pass over the lines of one metadata block.
///
/// Each line is consumed by the first rule it satisfies, in the order
/// term, citizenship, GPA, GRE. Term keeps its first value; every other
/// field is overwritten by later matches. Lines matching no rule are skipped.
pub fn parse<S: AsRef<str>>(lines: &[S]) -> ParsedMeta {
    let mut meta = ParsedMeta::default();

    for line in lines.iter().map(|l| l.as_ref().trim()).filter(|l| !l.is_empty()) {
        if meta.term.is_none() && is_term(line) {
            meta.term = Some(line.to_string());
            continue;
        }

        if let Some(citizenship) = Citizenship::from_line(line) {
            meta.citizenship = Some(citizenship);
            continue;
        }

        if let Some(rest) = line.strip_prefix("GPA") {
            meta.gpa_raw = Some(rest.trim().to_string());
            continue;
        }

        if line.starts_with("GRE") {
            apply_gre_line(&mut meta, line);
        }
    }

    meta
}

pub fn is_term(line: &str) -> bool {
    SHORT_TERM.is_match(line) || LONG_TERM.is_match(line)
}

fn apply_gre_line(meta: &mut ParsedMeta, line: &str) {
    let parts: Vec<&str> = line.split_whitespace().collect();

    match parts.as_slice() {
        // "GRE 324": a total that fails to parse is dropped
        [_, value] => {
            if let Ok(total) = value.parse::<f64>() {
                meta.gre_total = Some(total);
            }
        }
        [_, tag, value, ..] => {
            let score = GreScore::from_token(value);
            match *tag {
                "Q" => meta.gre_quant = score,
                "V" => meta.gre_verbal = score,
                "AW" => meta.gre_analytical = score,
                _ => {}
            }
        }
        _ => {}
    }
}
