//! Filing repository: the index of declared disclosures per year.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_datetime, Result};
use crate::models::Filing;

/// SQLite-backed repository for filing rows.
pub struct FilingRepository {
    db_path: PathBuf,
}

impl FilingRepository {
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
            CREATE TABLE IF NOT EXISTS filings (
                doc_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                last_name TEXT NOT NULL,
                first_name TEXT NOT NULL,
                suffix TEXT,
                state TEXT,
                district TEXT,
                filing_type TEXT NOT NULL,
                filing_date TEXT,
                ingested_at TEXT NOT NULL,
                PRIMARY KEY (year, doc_id)
            );

            -- Ingestion watermark per year: the fetch time of the newest
            -- index applied. Re-ingestion only supersedes with a newer one.
            CREATE TABLE IF NOT EXISTS ingest_watermarks (
                year INTEGER PRIMARY KEY,
                source_url TEXT,
                fetched_at TEXT NOT NULL,
                filing_count INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_filings_year
                ON filings(year);
            CREATE INDEX IF NOT EXISTS idx_filings_type
                ON filings(filing_type);
            "#,
        )?;
        Ok(())
    }

    /// Upsert one filing. Identical re-ingestion is a no-op by value.
    pub fn upsert(&self, filing: &Filing) -> Result<()> {
        let conn = self.connect()?;
        self.upsert_with_conn(&conn, filing)
    }

    /// Upsert a batch inside one transaction. Returns rows written.
    pub fn upsert_batch(&self, filings: &[Filing]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for filing in filings {
            self.upsert_with_conn(&tx, filing)?;
        }
        tx.commit()?;
        Ok(filings.len())
    }

    fn upsert_with_conn(&self, conn: &Connection, filing: &Filing) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO filings (
                doc_id, year, last_name, first_name, suffix, state, district,
                filing_type, filing_date, ingested_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(year, doc_id) DO UPDATE SET
                last_name = excluded.last_name,
                first_name = excluded.first_name,
                suffix = excluded.suffix,
                state = excluded.state,
                district = excluded.district,
                filing_type = excluded.filing_type,
                filing_date = excluded.filing_date,
                ingested_at = excluded.ingested_at
            "#,
            params![
                filing.doc_id,
                filing.year,
                filing.last_name,
                filing.first_name,
                filing.suffix,
                filing.state,
                filing.district,
                filing.filing_type,
                filing.filing_date.map(|d| d.to_string()),
                filing.ingested_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, year: i32, doc_id: &str) -> Result<Option<Filing>> {
        let conn = self.connect()?;
        let filing = conn
            .query_row(
                "SELECT * FROM filings WHERE year = ? AND doc_id = ?",
                params![year, doc_id],
                row_to_filing,
            )
            .optional()?;
        Ok(filing)
    }

    pub fn list_by_year(&self, year: i32) -> Result<Vec<Filing>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM filings WHERE year = ? ORDER BY doc_id")?;
        let filings = stmt
            .query_map(params![year], row_to_filing)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(filings)
    }

    /// All filings, ordered deterministically. Used by the dimensional build
    /// to derive member/filing-type snapshots.
    pub fn list_all(&self) -> Result<Vec<Filing>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM filings ORDER BY year, doc_id")?;
        let filings = stmt
            .query_map([], row_to_filing)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(filings)
    }

    pub fn count_by_year(&self, year: i32) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM filings WHERE year = ?",
            params![year],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Record that a year's index has been applied.
    pub fn set_ingest_watermark(
        &self,
        year: i32,
        source_url: Option<&str>,
        fetched_at: chrono::DateTime<Utc>,
        filing_count: u64,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO ingest_watermarks (year, source_url, fetched_at, filing_count, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(year) DO UPDATE SET
                source_url = excluded.source_url,
                fetched_at = excluded.fetched_at,
                filing_count = excluded.filing_count,
                updated_at = excluded.updated_at
            "#,
            params![
                year,
                source_url,
                fetched_at.to_rfc3339(),
                filing_count as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch time of the index currently applied for a year, if any.
    pub fn ingest_watermark(&self, year: i32) -> Result<Option<chrono::DateTime<Utc>>> {
        let conn = self.connect()?;
        let fetched: Option<String> = conn
            .query_row(
                "SELECT fetched_at FROM ingest_watermarks WHERE year = ?",
                params![year],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fetched.map(|s| parse_datetime(&s)))
    }
}

fn row_to_filing(row: &Row<'_>) -> rusqlite::Result<Filing> {
    let filing_date: Option<String> = row.get("filing_date")?;
    let ingested_at: String = row.get("ingested_at")?;
    Ok(Filing {
        doc_id: row.get("doc_id")?,
        year: row.get("year")?,
        last_name: row.get("last_name")?,
        first_name: row.get("first_name")?,
        suffix: row.get("suffix")?,
        state: row.get("state")?,
        district: row.get("district")?,
        filing_type: row.get("filing_type")?,
        filing_date: filing_date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        ingested_at: parse_datetime(&ingested_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(doc_id: &str) -> Filing {
        Filing {
            doc_id: doc_id.to_string(),
            year: 2025,
            last_name: "Doe".to_string(),
            first_name: "Jane".to_string(),
            suffix: None,
            state: Some("CA".to_string()),
            district: Some("12".to_string()),
            filing_type: "P".to_string(),
            filing_date: NaiveDate::from_ymd_opt(2025, 1, 12),
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let dir = tempdir().unwrap();
        let repo = FilingRepository::new(&dir.path().join("test.db")).unwrap();

        repo.upsert(&sample("8221216")).unwrap();
        let filing = repo.get(2025, "8221216").unwrap().unwrap();
        assert_eq!(filing.last_name, "Doe");
        assert_eq!(filing.filing_date, NaiveDate::from_ymd_opt(2025, 1, 12));
        assert!(repo.get(2025, "999").unwrap().is_none());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let dir = tempdir().unwrap();
        let repo = FilingRepository::new(&dir.path().join("test.db")).unwrap();

        let filing = sample("8221216");
        repo.upsert(&filing).unwrap();
        repo.upsert(&filing).unwrap();
        assert_eq!(repo.count_by_year(2025).unwrap(), 1);
    }

    #[test]
    fn test_ingest_watermark() {
        let dir = tempdir().unwrap();
        let repo = FilingRepository::new(&dir.path().join("test.db")).unwrap();
        assert!(repo.ingest_watermark(2025).unwrap().is_none());

        let fetched = Utc::now();
        repo.set_ingest_watermark(2025, Some("https://example.org/2025FD.zip"), fetched, 10)
            .unwrap();
        let stored = repo.ingest_watermark(2025).unwrap().unwrap();
        assert_eq!(stored.timestamp(), fetched.timestamp());
    }
}
