//! Structured-record repository.
//!
//! Record sets are replaced wholesale per (doc_id, extraction_version)
//! inside one transaction, which is what keeps redelivered parse work from
//! ever producing a duplicate set.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, Result};
use crate::models::{AmountRange, OwnerCode, RecordKind, StructuredRecord, TransactionType};

/// SQLite-backed repository for structured records.
pub struct RecordRepository {
    db_path: PathBuf,
}

impl RecordRepository {
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS structured_records (
                record_id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                extraction_version INTEGER NOT NULL,
                kind TEXT NOT NULL,
                owner TEXT NOT NULL,
                ticker TEXT,
                asset_name TEXT,
                transaction_type TEXT,
                transaction_date TEXT,
                amount_min INTEGER,
                amount_max INTEGER,
                amount_label TEXT,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_document
                ON structured_records(year, doc_id, extraction_version);
            CREATE INDEX IF NOT EXISTS idx_records_ticker
                ON structured_records(ticker);
            "#,
        )?;
        Ok(())
    }

    /// Replace the record set for (doc_id, extraction_version).
    ///
    /// Delete-then-insert in one transaction: rerunning the parser for the
    /// same version swaps in an equivalent set instead of appending to it.
    pub fn replace_set(
        &self,
        year: i32,
        doc_id: &str,
        extraction_version: i32,
        records: &[StructuredRecord],
    ) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM structured_records
             WHERE year = ? AND doc_id = ? AND extraction_version = ?",
            params![year, doc_id, extraction_version],
        )?;
        for record in records {
            tx.execute(
                r#"
                INSERT INTO structured_records (
                    record_id, doc_id, year, extraction_version, kind, owner,
                    ticker, asset_name, transaction_type, transaction_date,
                    amount_min, amount_max, amount_label, confidence, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
                params![
                    record.record_id,
                    record.doc_id,
                    record.year,
                    record.extraction_version,
                    record.kind.as_str(),
                    record.owner.as_str(),
                    record.ticker,
                    record.asset_name,
                    record.transaction_type.map(|t| t.as_str()),
                    record.transaction_date.map(|d| d.to_string()),
                    record.amount.as_ref().map(|a| a.min),
                    record.amount.as_ref().and_then(|a| a.max),
                    record.amount.as_ref().map(|a| a.label.clone()),
                    record.confidence,
                    record.created_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// The record set for a specific (doc_id, extraction_version).
    pub fn get_set(
        &self,
        year: i32,
        doc_id: &str,
        extraction_version: i32,
    ) -> Result<Vec<StructuredRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM structured_records
            WHERE year = ? AND doc_id = ? AND extraction_version = ?
            ORDER BY record_id
            "#,
        )?;
        let records = stmt
            .query_map(params![year, doc_id, extraction_version], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Active records for a year: those whose extraction version matches
    /// their document's current version, for successfully extracted docs.
    /// This is the Silver snapshot the dimensional build reads.
    pub fn list_active_for_year(&self, year: i32) -> Result<Vec<StructuredRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT r.* FROM structured_records r
            JOIN documents d
              ON d.year = r.year
             AND d.doc_id = r.doc_id
             AND d.extraction_version = r.extraction_version
            WHERE r.year = ? AND d.extraction_status = 'success'
            ORDER BY r.doc_id, r.record_id
            "#,
        )?;
        let records = stmt
            .query_map(params![year], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn count_for_year(&self, year: i32) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM structured_records WHERE year = ?",
            params![year],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<StructuredRecord> {
    let kind: String = row.get("kind")?;
    let owner: String = row.get("owner")?;
    let txn_type: Option<String> = row.get("transaction_type")?;
    let txn_date: Option<String> = row.get("transaction_date")?;
    let amount_min: Option<i64> = row.get("amount_min")?;
    let amount_label: Option<String> = row.get("amount_label")?;
    let created_at: String = row.get("created_at")?;

    let amount = match (amount_min, amount_label) {
        (Some(min), Some(label)) => Some(AmountRange {
            min,
            max: row.get("amount_max")?,
            label,
        }),
        _ => None,
    };

    Ok(StructuredRecord {
        record_id: row.get("record_id")?,
        doc_id: row.get("doc_id")?,
        year: row.get("year")?,
        extraction_version: row.get("extraction_version")?,
        kind: RecordKind::from_str(&kind).unwrap_or(RecordKind::Transaction),
        owner: OwnerCode::from_str(&owner).unwrap_or(OwnerCode::Filer),
        ticker: row.get("ticker")?,
        asset_name: row.get("asset_name")?,
        transaction_type: txn_type.as_deref().and_then(TransactionType::from_str),
        transaction_date: txn_date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        amount,
        confidence: row.get("confidence")?,
        created_at: parse_datetime(&created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::repository::{DocumentRepository, ExtractionOutcomeUpdate};
    use crate::models::{ExtractionMethod, ExtractionStatus};
    use chrono::Utc;
    use tempfile::tempdir;

    fn record(record_id: &str, doc_id: &str, version: i32) -> StructuredRecord {
        StructuredRecord {
            record_id: record_id.to_string(),
            doc_id: doc_id.to_string(),
            year: 2025,
            extraction_version: version,
            kind: RecordKind::Transaction,
            owner: OwnerCode::Filer,
            ticker: Some("AAPL".to_string()),
            asset_name: Some("Apple Inc".to_string()),
            transaction_type: Some(TransactionType::Purchase),
            transaction_date: NaiveDate::from_ymd_opt(2025, 1, 10),
            amount: Some(AmountRange::new(1_001, Some(15_000), "$1,001\u{2013}$15,000")),
            confidence: 1.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_replace_set_round_trip() {
        let dir = tempdir().unwrap();
        let repo = RecordRepository::new(&dir.path().join("test.db")).unwrap();

        let records = vec![record("r1", "8221216", 1), record("r2", "8221216", 1)];
        repo.replace_set(2025, "8221216", 1, &records).unwrap();

        let loaded = repo.get_set(2025, "8221216", 1).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].ticker.as_deref(), Some("AAPL"));
        assert_eq!(
            loaded[0].amount.as_ref().unwrap().label,
            "$1,001\u{2013}$15,000"
        );
        assert_eq!(
            loaded[0].transaction_date,
            NaiveDate::from_ymd_opt(2025, 1, 10)
        );
    }

    #[test]
    fn test_replace_set_never_duplicates() {
        let dir = tempdir().unwrap();
        let repo = RecordRepository::new(&dir.path().join("test.db")).unwrap();

        let records = vec![record("r1", "8221216", 1)];
        repo.replace_set(2025, "8221216", 1, &records).unwrap();
        // Redelivered parse work replaces, never appends
        repo.replace_set(2025, "8221216", 1, &records).unwrap();
        assert_eq!(repo.count_for_year(2025).unwrap(), 1);
    }

    #[test]
    fn test_active_set_follows_document_version() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("test.db");
        let records = RecordRepository::new(&db).unwrap();
        let docs = DocumentRepository::new(&db).unwrap();

        let doc = Document::pending("8221216", 2025, b"pdf", 1);
        docs.ensure_pending(&doc).unwrap();
        docs.apply_extraction(&ExtractionOutcomeUpdate {
            doc_id: "8221216".to_string(),
            year: 2025,
            content_hash: doc.content_hash.clone(),
            byte_size: 3,
            page_count: Some(1),
            has_text_layer: Some(true),
            method: Some(ExtractionMethod::DirectText),
            status: ExtractionStatus::Success,
            extraction_version: 2,
            confidence: Some(1.0),
            text_blob_path: None,
            error_detail: None,
        })
        .unwrap();

        records
            .replace_set(2025, "8221216", 1, &[record("old", "8221216", 1)])
            .unwrap();
        records
            .replace_set(2025, "8221216", 2, &[record("new", "8221216", 2)])
            .unwrap();

        // Only the set matching the document's current extraction version
        // is active.
        let active = records.list_active_for_year(2025).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].record_id, "new");
    }
}
