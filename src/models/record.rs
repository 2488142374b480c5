//! Structured records parsed out of extracted document text.
//!
//! One record per meaningful sub-entity (a transaction line or an asset
//! holding). Records are immutable once written for a given extraction
//! version; at most one record set is active per (doc_id, extraction
//! version).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Who owns the reported asset or transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerCode {
    /// The filer themselves.
    Filer,
    Spouse,
    Dependent,
    Joint,
}

impl OwnerCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filer => "SELF",
            Self::Spouse => "SP",
            Self::Dependent => "DC",
            Self::Joint => "JT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "SELF" => Some(Self::Filer),
            "SP" => Some(Self::Spouse),
            "DC" => Some(Self::Dependent),
            "JT" => Some(Self::Joint),
            _ => None,
        }
    }

    /// Parse the looser spellings that appear in document text.
    pub fn from_text(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SELF" | "FILER" => Some(Self::Filer),
            "SP" | "SPOUSE" => Some(Self::Spouse),
            "DC" | "DEPENDENT" | "DEPENDENT CHILD" => Some(Self::Dependent),
            "JT" | "JOINT" => Some(Self::Joint),
            _ => None,
        }
    }
}

/// Reported transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    Sale,
    PartialSale,
    Exchange,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "Purchase",
            Self::Sale => "Sale",
            Self::PartialSale => "Sale (Partial)",
            Self::Exchange => "Exchange",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Purchase" => Some(Self::Purchase),
            "Sale" => Some(Self::Sale),
            "Sale (Partial)" => Some(Self::PartialSale),
            "Exchange" => Some(Self::Exchange),
            _ => None,
        }
    }
}

/// What kind of sub-entity a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Transaction,
    AssetHolding,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::AssetHolding => "asset_holding",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "transaction" => Some(Self::Transaction),
            "asset_holding" => Some(Self::AssetHolding),
            _ => None,
        }
    }
}

/// A dollar bracket as reported on disclosure forms.
///
/// `max` is `None` for the open-ended top bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: i64,
    pub max: Option<i64>,
    /// Label in the form's own punctuation, e.g. "$1,001–$15,000".
    pub label: String,
}

impl AmountRange {
    pub fn new(min: i64, max: Option<i64>, label: impl Into<String>) -> Self {
        Self {
            min,
            max,
            label: label.into(),
        }
    }

    /// Midpoint used for aggregate measures; the open top bracket uses its
    /// floor.
    pub fn midpoint(&self) -> i64 {
        match self.max {
            Some(max) => (self.min + max) / 2,
            None => self.min,
        }
    }
}

/// One parsed sub-entity of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRecord {
    /// Surrogate id, stable within a record set.
    pub record_id: String,
    pub doc_id: String,
    pub year: i32,
    /// Extraction version of the text this record was parsed from.
    pub extraction_version: i32,
    pub kind: RecordKind,
    pub owner: OwnerCode,
    pub ticker: Option<String>,
    pub asset_name: Option<String>,
    pub transaction_type: Option<TransactionType>,
    /// Transaction date for transactions, report date for holdings.
    pub transaction_date: Option<NaiveDate>,
    pub amount: Option<AmountRange>,
    /// Fraction of expected fields matched for this record, in [0, 1].
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl StructuredRecord {
    /// Business key of the asset this record references: the ticker when
    /// present, otherwise the normalized asset name.
    pub fn asset_key(&self) -> Option<String> {
        if let Some(ticker) = &self.ticker {
            return Some(ticker.to_ascii_uppercase());
        }
        self.asset_name.as_ref().map(|name| {
            name.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_ascii_lowercase()
        })
    }
}
