//! Extractor for periodic transaction reports (filing type "P").
//!
//! PTR text comes out of both extraction paths as loosely tabular lines,
//! one transaction per line. Ordered pattern rules recover the date, asset,
//! transaction type, amount bracket, and owner code from each candidate
//! line; per-record confidence is the fraction of those five fields that
//! matched.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::{amounts, base_record, FilingExtractor, ParseContext};
use crate::models::{OwnerCode, RecordKind, StructuredRecord, TransactionType};

static DATE_ISO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

static DATE_US_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(purchase|sale\s*\(\s*partial\s*\)|partial\s+sale|sale|exchange)\b")
        .unwrap()
});

static PAREN_TICKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([A-Za-z]{1,5})\)").unwrap());

// Bare tokens need three letters or more; one and two letter symbols are
// only accepted in parentheses, where state codes and owner codes cannot
// shadow them.
static BARE_TICKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Z]{3,5}\b").unwrap());

static OWNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(self|spouse|joint|dependent(?:\s+child)?|sp|jt|dc)\b").unwrap()
});

/// Uppercase tokens that look like tickers but are not.
const TICKER_STOPWORDS: &[&str] = &["SELF", "PTR", "LLC", "INC", "ETF", "IRA", "FUND"];

pub struct PtrExtractor;

impl PtrExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PtrExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FilingExtractor for PtrExtractor {
    fn codes(&self) -> &'static [&'static str] {
        &["P"]
    }

    fn parse(&self, ctx: &ParseContext) -> Vec<StructuredRecord> {
        let mut records = Vec::new();
        for line in ctx.text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(record) = parse_transaction_line(ctx, records.len(), line) {
                records.push(record);
            }
        }
        records
    }
}

/// A line is a candidate transaction when it names a transaction type and
/// carries at least one of a date or an amount bracket. Header rows name the
/// type column but carry neither.
fn parse_transaction_line(
    ctx: &ParseContext,
    index: usize,
    line: &str,
) -> Option<StructuredRecord> {
    let transaction_type = find_transaction_type(line)?;
    let date = find_date(line);
    let amount = amounts::parse_amount_range(line);
    if date.is_none() && amount.is_none() {
        return None;
    }

    let ticker = find_ticker(line);
    let owner = find_owner(line);

    let mut matched = 1usize; // transaction type
    if date.is_some() {
        matched += 1;
    }
    if amount.is_some() {
        matched += 1;
    }
    if ticker.is_some() {
        matched += 1;
    }
    if owner.is_some() {
        matched += 1;
    }

    let mut record = base_record(ctx, index, RecordKind::Transaction);
    record.owner = owner.unwrap_or(OwnerCode::Filer);
    record.ticker = ticker;
    record.transaction_type = Some(transaction_type);
    record.transaction_date = date;
    record.amount = amount;
    record.confidence = matched as f64 / 5.0;
    Some(record)
}

fn find_transaction_type(line: &str) -> Option<TransactionType> {
    let matched = TYPE_RE.find(line)?;
    let lowered = matched.as_str().to_ascii_lowercase();
    if lowered.starts_with("purchase") {
        Some(TransactionType::Purchase)
    } else if lowered.starts_with("exchange") {
        Some(TransactionType::Exchange)
    } else if lowered.contains("partial") {
        Some(TransactionType::PartialSale)
    } else {
        Some(TransactionType::Sale)
    }
}

pub(crate) fn find_date(line: &str) -> Option<NaiveDate> {
    if let Some(caps) = DATE_ISO_RE.captures(line) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if let Some(caps) = DATE_US_RE.captures(line) {
        let month = caps[1].parse().ok()?;
        let day = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    None
}

pub(crate) fn find_ticker(line: &str) -> Option<String> {
    if let Some(caps) = PAREN_TICKER_RE.captures(line) {
        return Some(caps[1].to_ascii_uppercase());
    }
    BARE_TICKER_RE
        .find_iter(line)
        .map(|m| m.as_str())
        .find(|token| !TICKER_STOPWORDS.contains(token))
        .map(str::to_string)
}

pub(crate) fn find_owner(line: &str) -> Option<OwnerCode> {
    OWNER_RE
        .find_iter(line)
        .find_map(|m| OwnerCode::from_text(m.as_str()))
}
