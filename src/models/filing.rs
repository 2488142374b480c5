//! Filing model: one row per disclosure document as declared in the yearly
//! source index. Created once per ingestion of a year's index and immutable
//! thereafter; superseded only by re-ingestion with a newer watermark.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Declared filing-type code from the source index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingType {
    /// Periodic transaction report.
    Ptr,
    /// Original annual report.
    Annual,
    /// Amendment to an annual report.
    Amendment,
    /// Candidate report.
    Candidate,
    /// Extension request.
    Extension,
    /// Termination report.
    Termination,
}

impl FilingType {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Ptr => "P",
            Self::Annual => "O",
            Self::Amendment => "A",
            Self::Candidate => "C",
            Self::Extension => "X",
            Self::Termination => "T",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "P" => Some(Self::Ptr),
            "O" => Some(Self::Annual),
            "A" => Some(Self::Amendment),
            "C" => Some(Self::Candidate),
            "X" => Some(Self::Extension),
            "T" => Some(Self::Termination),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ptr => "Periodic Transaction Report",
            Self::Annual => "Annual Report",
            Self::Amendment => "Amendment",
            Self::Candidate => "Candidate Report",
            Self::Extension => "Extension Request",
            Self::Termination => "Termination Report",
        }
    }
}

/// One disclosure filing as declared in the source index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filing {
    /// Document identifier assigned by the source.
    pub doc_id: String,
    /// Index year this filing was declared in.
    pub year: i32,
    pub last_name: String,
    pub first_name: String,
    pub suffix: Option<String>,
    /// Two-letter state code.
    pub state: Option<String>,
    /// District number within the state.
    pub district: Option<String>,
    /// Declared filing-type code, kept verbatim so unknown codes survive
    /// round-trips to the unsupported-type path.
    pub filing_type: String,
    pub filing_date: Option<NaiveDate>,
    /// When this filing row was ingested.
    pub ingested_at: DateTime<Utc>,
}

impl Filing {
    /// Business key identifying the filer across filings and years.
    ///
    /// Name plus state/district: member identifiers are not present in the
    /// source index, so the normalized identity is the stable key.
    pub fn member_key(&self) -> String {
        let mut key = format!(
            "{}|{}",
            normalize_name_part(&self.last_name),
            normalize_name_part(&self.first_name)
        );
        if let Some(state) = &self.state {
            key.push('|');
            key.push_str(&state.to_ascii_uppercase());
        }
        if let Some(district) = &self.district {
            key.push('|');
            key.push_str(district.trim());
        }
        key
    }

    /// Display name in "First Last" form.
    pub fn display_name(&self) -> String {
        let mut name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        if let Some(suffix) = &self.suffix {
            if !suffix.trim().is_empty() {
                name.push(' ');
                name.push_str(suffix.trim());
            }
        }
        name
    }

    pub fn filing_type(&self) -> Option<FilingType> {
        FilingType::from_code(&self.filing_type)
    }
}

fn normalize_name_part(part: &str) -> String {
    part.trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}
