//! Recency keys derived from source file names.
//!
//! Source files are named with a leading `YYMM` or `YYYYMM` prefix
//! (`2512_hopping.json`, `202401-youtube.json`). The prefix becomes the
//! document's `dateCode`, which orders the corpus newest-first.

use std::sync::LazyLock;

use regex::Regex;

/// Matches the leading run of 4 to 6 ASCII digits.
static LEADING_DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{4,6})").expect("leading digits regex")
});

/// Derive a `YYYYMM` date code from a file name.
///
/// - 4 digits are read as `YYMM` and expanded with a `20` century prefix.
/// - 5 or 6 digits are used verbatim.
/// - No leading digits yields `0`.
pub fn date_code_from_name(file_name: &str) -> u32 {
    let Some(caps) = LEADING_DIGITS_RE.captures(file_name) else {
        return 0;
    };
    let digits = &caps[1];

    let expanded = if digits.len() == 4 {
        format!("20{digits}")
    } else {
        digits.to_string()
    };

    expanded.parse().unwrap_or(0)
}
