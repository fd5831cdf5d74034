use once_cell::sync::Lazy;
use regex::Regex;

static RANK_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)[–-](\d+)").expect("valid rank regex"));

/// Normalize an institution name into a join key: lowercase, keep only
/// `[a-z0-9]` and whitespace, collapse whitespace runs, trim.
pub fn normalize(name: &str) -> String {
    let kept: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a join-key cell that is already supposed to be clean
pub fn key_cell(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Convert a published rank cell into a number.
///
/// `"=2"` -> 2, `"201+"` -> 201, `"201-250"` or `"201–250"` -> 225.5,
/// plain digits as-is, anything else is `None`.
pub fn convert_rank(value: &str) -> Option<f64> {
    let mut value = value.trim();
    if let Some(rest) = value.strip_prefix('=') {
        value = rest;
    }

    if let Some(lower) = value.strip_suffix('+') {
        return lower.trim().parse::<u32>().ok().map(f64::from);
    }

    if let Some(caps) = RANK_RANGE.captures(value) {
        let low = caps[1].parse::<f64>().ok()?;
        let high = caps[2].parse::<f64>().ok()?;
        return Some((low + high) / 2.0);
    }

    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return value.parse::<u32>().ok().map(f64::from);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("Cal-Tech, Inc."), "caltech inc");
        assert_eq!(normalize("  Massachusetts   Institute of\tTechnology (MIT) "), "massachusetts institute of technology mit");
        assert_eq!(normalize("Université de Montréal"), "universit de montral");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "Cal-Tech, Inc.",
            "UC  Berkeley",
            "ETH Zurich - Swiss Federal Institute of Technology",
            " a\n\nb ",
            "~`!@#$%^&*()_+=-{}[]|\\:;\"'<>,.?/",
            "Carnegie Mellon University 2",
        ];

        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_normalize_printable_ascii_is_total() {
        let all: String = (0x20u8..0x7f).map(char::from).collect();
        let out = normalize(&all);
        assert_eq!(out, "0123456789abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn test_key_cell() {
        assert_eq!(key_cell("  Stanford University "), "stanford university");
    }

    #[test]
    fn test_convert_rank() {
        assert_eq!(convert_rank("=2"), Some(2.0));
        assert_eq!(convert_rank("201+"), Some(201.0));
        assert_eq!(convert_rank("201-250"), Some(225.5));
        assert_eq!(convert_rank("501–550"), Some(525.5));
        assert_eq!(convert_rank(" 17 "), Some(17.0));
        assert_eq!(convert_rank(""), None);
        assert_eq!(convert_rank("n/a"), None);
        assert_eq!(convert_rank("abc+"), None);
    }
}
