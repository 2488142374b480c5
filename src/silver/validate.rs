//! Schema validation at the normalized-store boundary.
//!
//! Every structured record passes through here before it is committed.
//! Violations are collected and reported, never silently dropped; the raw
//! document stays untouched in the archive for a later re-attempt.

use crate::models::{RecordKind, StructuredRecord};

/// One validation failure on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationIssue {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Validate one record. An empty result means the record is admissible.
pub fn validate_record(record: &StructuredRecord) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if record.record_id.trim().is_empty() {
        issues.push(ValidationIssue::new("record_id", "must not be empty"));
    }
    if record.doc_id.trim().is_empty() {
        issues.push(ValidationIssue::new("doc_id", "must not be empty"));
    }
    if !(1990..=2100).contains(&record.year) {
        issues.push(ValidationIssue::new(
            "year",
            format!("{} outside plausible range", record.year),
        ));
    }
    if record.extraction_version < 1 {
        issues.push(ValidationIssue::new(
            "extraction_version",
            "must be at least 1",
        ));
    }
    if !(0.0..=1.0).contains(&record.confidence) {
        issues.push(ValidationIssue::new(
            "confidence",
            format!("{} outside [0, 1]", record.confidence),
        ));
    }

    if record.ticker.is_none() && record.asset_name.is_none() {
        issues.push(ValidationIssue::new(
            "ticker",
            "record identifies no asset (no ticker, no asset name)",
        ));
    }
    if let Some(ticker) = &record.ticker {
        if ticker.trim().is_empty() || ticker.len() > 10 {
            issues.push(ValidationIssue::new("ticker", "empty or implausibly long"));
        }
    }

    if let Some(amount) = &record.amount {
        if amount.min < 0 {
            issues.push(ValidationIssue::new("amount", "negative lower bound"));
        }
        if let Some(max) = amount.max {
            if max < amount.min {
                issues.push(ValidationIssue::new(
                    "amount",
                    format!("inverted range {} > {}", amount.min, max),
                ));
            }
        }
    }

    match record.kind {
        RecordKind::Transaction => {
            if record.transaction_type.is_none() {
                issues.push(ValidationIssue::new(
                    "transaction_type",
                    "required for transactions",
                ));
            }
        }
        RecordKind::AssetHolding => {
            if record.amount.is_none() {
                issues.push(ValidationIssue::new("amount", "required for holdings"));
            }
        }
    }

    issues
}
