//! Normalized store writer.
//!
//! All Silver-layer writes go through [`SilverWriter`], which validates
//! structured records before committing them and stores extracted text as
//! compressed blobs. Rejected records are returned to the caller with their
//! reasons instead of being dropped on the floor.

mod blobs;
pub mod validate;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use blobs::TextBlobStore;
pub use validate::{validate_record, ValidationIssue};

use crate::models::StructuredRecord;
use crate::repository::{RecordRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum SilverError {
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One rejected record and why.
#[derive(Debug, Clone)]
pub struct RejectedRecord {
    pub record_id: String,
    pub issues: Vec<ValidationIssue>,
}

/// Outcome of committing one document's record set.
#[derive(Debug, Clone)]
pub struct WriteReport {
    pub accepted: usize,
    pub rejected: Vec<RejectedRecord>,
}

impl WriteReport {
    pub fn all_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Gate for all writes into the normalized store.
pub struct SilverWriter {
    records: RecordRepository,
    blobs: TextBlobStore,
}

impl SilverWriter {
    pub fn new(db_path: &Path, silver_dir: impl Into<PathBuf>) -> Result<Self, SilverError> {
        Ok(Self {
            records: RecordRepository::new(db_path)?,
            blobs: TextBlobStore::new(silver_dir),
        })
    }

    pub fn blobs(&self) -> &TextBlobStore {
        &self.blobs
    }

    /// Store extracted text, returning the relative blob path for the
    /// Document row.
    pub fn write_text(
        &self,
        year: i32,
        doc_id: &str,
        extraction_version: i32,
        text: &str,
    ) -> Result<String, SilverError> {
        self.blobs.write(year, doc_id, extraction_version, text)
    }

    /// Validate and commit one document's structured records.
    ///
    /// Admissible records replace the existing set for (doc_id, extraction
    /// version) in one transaction; inadmissible ones are reported back and
    /// logged. Replaying the same input is a no-op in effect.
    pub fn write_records(
        &self,
        year: i32,
        doc_id: &str,
        extraction_version: i32,
        records: &[StructuredRecord],
    ) -> Result<WriteReport, SilverError> {
        let mut admissible = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();

        for record in records {
            let issues = validate_record(record);
            if issues.is_empty() {
                admissible.push(record.clone());
            } else {
                tracing::warn!(
                    record_id = %record.record_id,
                    doc_id,
                    "rejecting record: {}",
                    issues
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ")
                );
                rejected.push(RejectedRecord {
                    record_id: record.record_id.clone(),
                    issues,
                });
            }
        }

        let accepted = self
            .records
            .replace_set(year, doc_id, extraction_version, &admissible)?;

        Ok(WriteReport { accepted, rejected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AmountRange, OwnerCode, RecordKind, TransactionType};
    use chrono::{NaiveDate, Utc};
    use tempfile::tempdir;

    fn record(record_id: &str) -> StructuredRecord {
        StructuredRecord {
            record_id: record_id.to_string(),
            doc_id: "8221216".to_string(),
            year: 2025,
            extraction_version: 1,
            kind: RecordKind::Transaction,
            owner: OwnerCode::Filer,
            ticker: Some("AAPL".to_string()),
            asset_name: None,
            transaction_type: Some(TransactionType::Purchase),
            transaction_date: NaiveDate::from_ymd_opt(2025, 1, 10),
            amount: Some(AmountRange::new(1_001, Some(15_000), "$1,001\u{2013}$15,000")),
            confidence: 1.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_invalid_records_reported_not_written() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let writer = SilverWriter::new(&db_path, dir.path().join("silver")).unwrap();

        let good = record("r-good");
        let mut bad = record("r-bad");
        bad.transaction_type = None;

        let report = writer
            .write_records(2025, "8221216", 1, &[good, bad])
            .unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].record_id, "r-bad");

        let repo = RecordRepository::new(&db_path).unwrap();
        let stored = repo.get_set(2025, "8221216", 1).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].record_id, "r-good");
    }

    #[test]
    fn test_rewrite_same_set_does_not_duplicate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let writer = SilverWriter::new(&db_path, dir.path().join("silver")).unwrap();

        let records = [record("r-1"), record("r-2")];
        writer.write_records(2025, "8221216", 1, &records).unwrap();
        writer.write_records(2025, "8221216", 1, &records).unwrap();

        let repo = RecordRepository::new(&db_path).unwrap();
        assert_eq!(repo.get_set(2025, "8221216", 1).unwrap().len(), 2);
    }

    #[test]
    fn test_text_blob_written_through_writer() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let silver_dir = dir.path().join("silver");
        let writer = SilverWriter::new(&db_path, &silver_dir).unwrap();

        let rel = writer.write_text(2025, "8221216", 1, "hello").unwrap();
        assert_eq!(writer.blobs().read(&rel).unwrap(), "hello");
    }
}
