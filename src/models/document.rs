//! Document model: one row per PDF, keyed by (year, doc_id).
//!
//! The row is upserted by the extraction router on every attempt and by the
//! structured parser when it records its outcome. Rows are never deleted;
//! re-extraction under a bumped extraction version supersedes prior output
//! without rewriting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Extraction status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Pending,
    Success,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Method the extraction router chose for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Embedded text layer extracted directly.
    DirectText,
    /// Pages rendered, preprocessed, and run through OCR.
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectText => "direct_text",
            Self::Ocr => "ocr",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "direct_text" => Some(Self::DirectText),
            "ocr" => Some(Self::Ocr),
            _ => None,
        }
    }
}

/// Structured-parse status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Pending,
    Parsed,
    /// Filing-type code has no registered extractor. Not an error; the
    /// document is excluded from parsing rather than retried.
    UnsupportedType,
    Failed,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Parsed => "parsed",
            Self::UnsupportedType => "unsupported_type",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "parsed" => Some(Self::Parsed),
            "unsupported_type" => Some(Self::UnsupportedType),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One PDF's processing state, keyed by (year, doc_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub year: i32,
    /// SHA-256 of the raw PDF bytes.
    pub content_hash: String,
    pub byte_size: u64,
    pub page_count: Option<u32>,
    /// Whether classification found an embedded text layer.
    pub has_text_layer: Option<bool>,
    pub extraction_method: Option<ExtractionMethod>,
    pub extraction_status: ExtractionStatus,
    /// Version of the extraction logic that produced the current output.
    pub extraction_version: i32,
    /// Router confidence in [0, 1]; 0.0 when both paths failed.
    pub extraction_confidence: Option<f64>,
    /// Pointer to the gzip text blob; set only on success.
    pub text_blob_path: Option<PathBuf>,
    pub parse_status: ParseStatus,
    /// Records written for (doc_id, extraction_version) by the parser.
    pub parsed_record_count: Option<u32>,
    /// Fraction of expected fields the parser matched.
    pub parse_confidence: Option<f64>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Compute SHA-256 hash of content.
    pub fn compute_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }

    /// A fresh pending row for a newly archived PDF.
    pub fn pending(doc_id: &str, year: i32, content: &[u8], extraction_version: i32) -> Self {
        let now = Utc::now();
        Self {
            doc_id: doc_id.to_string(),
            year,
            content_hash: Self::compute_hash(content),
            byte_size: content.len() as u64,
            page_count: None,
            has_text_layer: None,
            extraction_method: None,
            extraction_status: ExtractionStatus::Pending,
            extraction_version,
            extraction_confidence: None,
            text_blob_path: None,
            parse_status: ParseStatus::Pending,
            parsed_record_count: None,
            parse_confidence: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when extraction already succeeded for this hash and version; a
    /// redelivered message for such a document is a no-op.
    pub fn is_extracted(&self, content_hash: &str, extraction_version: i32) -> bool {
        self.extraction_status == ExtractionStatus::Success
            && self.content_hash == content_hash
            && self.extraction_version == extraction_version
    }
}
