//! Extractor for annual financial disclosures and their variants (filing
//! types "O", "A", "C").
//!
//! Annual reports list asset holdings rather than transactions. Each
//! candidate line carries an amount bracket; the asset name is whatever
//! precedes the bracket once owner prefixes and ticker parentheses are
//! stripped. Expected fields per record: asset identifier, amount, owner.

use std::sync::LazyLock;

use regex::Regex;

use super::{amounts, base_record, ptr, FilingExtractor, ParseContext};
use crate::models::{OwnerCode, RecordKind, StructuredRecord};

static AMOUNT_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\$\s*[\d,]+|over\s+\$").unwrap());

static PAREN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());

static OWNER_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(self|sp|jt|dc)\b[\s:,.-]*").unwrap());

pub struct AnnualExtractor;

impl AnnualExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AnnualExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FilingExtractor for AnnualExtractor {
    fn codes(&self) -> &'static [&'static str] {
        &["O", "A", "C"]
    }

    fn parse(&self, ctx: &ParseContext) -> Vec<StructuredRecord> {
        let mut records = Vec::new();
        for line in ctx.text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(record) = parse_holding_line(ctx, records.len(), line) {
                records.push(record);
            }
        }
        records
    }
}

fn parse_holding_line(ctx: &ParseContext, index: usize, line: &str) -> Option<StructuredRecord> {
    let amount = amounts::parse_amount_range(line)?;

    let owner = find_owner_prefix(line).or_else(|| ptr::find_owner(line));
    let ticker = ptr::find_ticker(line);
    let asset_name = extract_asset_name(line);
    if ticker.is_none() && asset_name.is_none() {
        return None;
    }

    let mut matched = 2usize; // amount and the asset identifier
    if owner.is_some() {
        matched += 1;
    }

    let mut record = base_record(ctx, index, RecordKind::AssetHolding);
    record.owner = owner.unwrap_or(OwnerCode::Filer);
    record.ticker = ticker;
    record.asset_name = asset_name;
    record.amount = Some(amount);
    record.confidence = matched as f64 / 3.0;
    Some(record)
}

fn find_owner_prefix(line: &str) -> Option<OwnerCode> {
    let caps = OWNER_PREFIX_RE.captures(line)?;
    OwnerCode::from_text(caps.get(1)?.as_str())
}

/// The asset name is the text before the amount, minus the owner prefix and
/// any parenthesized ticker.
fn extract_asset_name(line: &str) -> Option<String> {
    let amount_start = AMOUNT_START_RE.find(line)?.start();
    let head = &line[..amount_start];
    let head = OWNER_PREFIX_RE.replace(head, "");
    let head = PAREN_RE.replace_all(&head, "");
    let name = head
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '-' | ':' | '.' | '|'))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
