//! Dollar-bracket parsing.
//!
//! Disclosure forms report amounts as one of a fixed set of brackets rather
//! than exact figures. Free text is normalized (dash variants, spacing,
//! thousands separators) and snapped to the standard catalog when the bounds
//! match one; non-catalog ranges are kept with their parsed bounds.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::AmountRange;

/// Standard brackets used on House periodic transaction reports and annual
/// financial disclosures, smallest first.
pub const STANDARD_BRACKETS: &[(i64, Option<i64>, &str)] = &[
    (1, Some(1_000), "$1\u{2013}$1,000"),
    (1_001, Some(15_000), "$1,001\u{2013}$15,000"),
    (15_001, Some(50_000), "$15,001\u{2013}$50,000"),
    (50_001, Some(100_000), "$50,001\u{2013}$100,000"),
    (100_001, Some(250_000), "$100,001\u{2013}$250,000"),
    (250_001, Some(500_000), "$250,001\u{2013}$500,000"),
    (500_001, Some(1_000_000), "$500,001\u{2013}$1,000,000"),
    (1_000_001, Some(5_000_000), "$1,000,001\u{2013}$5,000,000"),
    (5_000_001, Some(25_000_000), "$5,000,001\u{2013}$25,000,000"),
    (25_000_001, Some(50_000_000), "$25,000,001\u{2013}$50,000,000"),
    (50_000_001, None, "Over $50,000,000"),
];

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*([\d,]+)\s*-\s*\$?\s*([\d,]+)").unwrap());

static OVER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)over\s+\$\s*([\d,]+)").unwrap());

/// Parse a bracket from document text, e.g. `"$1,001 - $15,000"` or
/// `"Over $50,000,000"`. Unicode dashes are accepted.
pub fn parse_amount_range(text: &str) -> Option<AmountRange> {
    let normalized: String = text
        .chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            other => other,
        })
        .collect();

    if let Some(caps) = RANGE_RE.captures(&normalized) {
        let min = parse_dollars(&caps[1])?;
        let max = parse_dollars(&caps[2])?;
        if max < min {
            return None;
        }
        return Some(snap_to_catalog(min, Some(max)));
    }

    if let Some(caps) = OVER_RE.captures(&normalized) {
        let floor = parse_dollars(&caps[1])?;
        // "Over $X" means the bracket starting just above X.
        return Some(snap_to_catalog(floor + 1, None));
    }

    None
}

/// Look up a catalog bracket by its exact bounds.
pub fn catalog_bracket(min: i64, max: Option<i64>) -> Option<AmountRange> {
    STANDARD_BRACKETS
        .iter()
        .find(|(b_min, b_max, _)| *b_min == min && *b_max == max)
        .map(|(b_min, b_max, label)| AmountRange::new(*b_min, *b_max, *label))
}

fn snap_to_catalog(min: i64, max: Option<i64>) -> AmountRange {
    if let Some(bracket) = catalog_bracket(min, max) {
        return bracket;
    }
    let label = match max {
        Some(max) => format!(
            "${}\u{2013}${}",
            group_thousands(min),
            group_thousands(max)
        ),
        None => format!("Over ${}", group_thousands(min - 1)),
    };
    AmountRange::new(min, max, label)
}

fn parse_dollars(s: &str) -> Option<i64> {
    s.replace(',', "").parse().ok()
}

fn group_thousands(n: i64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
