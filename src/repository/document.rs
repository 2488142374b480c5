//! Document repository: per-PDF processing state, keyed by (year, doc_id).
//!
//! Every mutation is an upsert on the business key so queue redeliveries
//! and concurrent workers are safe; "already processed" is a query over
//! (extraction_status, extraction_version, content_hash), never a side flag.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_datetime, Result};
use crate::models::{Document, ExtractionMethod, ExtractionStatus, ParseStatus};

/// Outcome of one extraction attempt, applied as a single upsert.
#[derive(Debug, Clone)]
pub struct ExtractionOutcomeUpdate {
    pub doc_id: String,
    pub year: i32,
    pub content_hash: String,
    pub byte_size: u64,
    pub page_count: Option<u32>,
    pub has_text_layer: Option<bool>,
    pub method: Option<ExtractionMethod>,
    pub status: ExtractionStatus,
    pub extraction_version: i32,
    pub confidence: Option<f64>,
    pub text_blob_path: Option<PathBuf>,
    pub error_detail: Option<String>,
}

/// Outcome of a structured-parse pass for a document.
#[derive(Debug, Clone)]
pub struct ParseOutcomeUpdate {
    pub doc_id: String,
    pub year: i32,
    pub status: ParseStatus,
    pub record_count: Option<u32>,
    pub confidence: Option<f64>,
    pub error_detail: Option<String>,
}

/// Per-status document counts for a year.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub success: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.success + self.failed
    }
}

/// SQLite-backed repository for document rows.
pub struct DocumentRepository {
    db_path: PathBuf,
}

impl DocumentRepository {
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
            CREATE TABLE IF NOT EXISTS documents (
                doc_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                byte_size INTEGER NOT NULL,
                page_count INTEGER,
                has_text_layer INTEGER,
                extraction_method TEXT,
                extraction_status TEXT NOT NULL DEFAULT 'pending',
                extraction_version INTEGER NOT NULL,
                extraction_confidence REAL,
                text_blob_path TEXT,
                parse_status TEXT NOT NULL DEFAULT 'pending',
                parsed_record_count INTEGER,
                parse_confidence REAL,
                error_detail TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (year, doc_id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_extraction_status
                ON documents(year, extraction_status);
            CREATE INDEX IF NOT EXISTS idx_documents_parse_status
                ON documents(parse_status);
            CREATE INDEX IF NOT EXISTS idx_documents_hash
                ON documents(content_hash);
            "#,
        )?;
        Ok(())
    }

    /// Ensure a pending row exists for a newly archived PDF.
    ///
    /// If the row exists with the same content hash, this is a no-op; a
    /// different hash resets the row to pending (source document changed).
    pub fn ensure_pending(&self, doc: &Document) -> Result<bool> {
        let conn = self.connect()?;
        let existing = self.get_with_conn(&conn, doc.year, &doc.doc_id)?;

        if let Some(existing) = &existing {
            if existing.content_hash == doc.content_hash {
                return Ok(false);
            }
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO documents (
                doc_id, year, content_hash, byte_size, extraction_status,
                extraction_version, parse_status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 'pending', ?5, 'pending', ?6, ?6)
            ON CONFLICT(year, doc_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                byte_size = excluded.byte_size,
                extraction_status = 'pending',
                extraction_version = excluded.extraction_version,
                extraction_confidence = NULL,
                extraction_method = NULL,
                text_blob_path = NULL,
                parse_status = 'pending',
                parsed_record_count = NULL,
                parse_confidence = NULL,
                error_detail = NULL,
                updated_at = excluded.updated_at
            "#,
            params![
                doc.doc_id,
                doc.year,
                doc.content_hash,
                doc.byte_size as i64,
                doc.extraction_version,
                now,
            ],
        )?;
        Ok(true)
    }

    /// Apply the outcome of an extraction attempt.
    pub fn apply_extraction(&self, update: &ExtractionOutcomeUpdate) -> Result<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO documents (
                doc_id, year, content_hash, byte_size, page_count,
                has_text_layer, extraction_method, extraction_status,
                extraction_version, extraction_confidence, text_blob_path,
                parse_status, error_detail, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'pending', ?12, ?13, ?13)
            ON CONFLICT(year, doc_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                byte_size = excluded.byte_size,
                page_count = excluded.page_count,
                has_text_layer = excluded.has_text_layer,
                extraction_method = excluded.extraction_method,
                extraction_status = excluded.extraction_status,
                extraction_version = excluded.extraction_version,
                extraction_confidence = excluded.extraction_confidence,
                text_blob_path = excluded.text_blob_path,
                error_detail = excluded.error_detail,
                updated_at = excluded.updated_at
            "#,
            params![
                update.doc_id,
                update.year,
                update.content_hash,
                update.byte_size as i64,
                update.page_count,
                update.has_text_layer.map(|b| b as i32),
                update.method.map(|m| m.as_str()),
                update.status.as_str(),
                update.extraction_version,
                update.confidence,
                update
                    .text_blob_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                update.error_detail,
                now,
            ],
        )?;
        Ok(())
    }

    /// Record the structured parser's outcome for a document.
    pub fn apply_parse(&self, update: &ParseOutcomeUpdate) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            UPDATE documents SET
                parse_status = ?3,
                parsed_record_count = ?4,
                parse_confidence = ?5,
                error_detail = COALESCE(?6, error_detail),
                updated_at = ?7
            WHERE year = ?1 AND doc_id = ?2
            "#,
            params![
                update.year,
                update.doc_id,
                update.status.as_str(),
                update.record_count,
                update.confidence,
                update.error_detail,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, year: i32, doc_id: &str) -> Result<Option<Document>> {
        let conn = self.connect()?;
        self.get_with_conn(&conn, year, doc_id)
    }

    fn get_with_conn(
        &self,
        conn: &Connection,
        year: i32,
        doc_id: &str,
    ) -> Result<Option<Document>> {
        let doc = conn
            .query_row(
                "SELECT * FROM documents WHERE year = ? AND doc_id = ?",
                params![year, doc_id],
                row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    /// Documents whose text extracted successfully but whose structured
    /// parse has not happened yet. The parser refuses to run on anything
    /// else, which is what enforces extract-before-parse ordering.
    pub fn list_parseable(&self, limit: Option<usize>) -> Result<Vec<Document>> {
        let conn = self.connect()?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM documents
            WHERE extraction_status = 'success' AND parse_status = 'pending'
            ORDER BY year, doc_id
            LIMIT ?
            "#,
        )?;
        let docs = stmt
            .query_map(params![limit], row_to_document)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    /// Successfully extracted documents for a year, for the dimensional
    /// build and its integrity gate.
    pub fn list_extracted(&self, year: i32) -> Result<Vec<Document>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM documents
            WHERE year = ? AND extraction_status = 'success'
            ORDER BY doc_id
            "#,
        )?;
        let docs = stmt
            .query_map(params![year], row_to_document)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    pub fn status_counts(&self, year: i32) -> Result<StatusCounts> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT extraction_status, COUNT(*) FROM documents WHERE year = ? GROUP BY extraction_status",
        )?;
        let mut counts = StatusCounts::default();
        let rows = stmt.query_map(params![year], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "pending" => counts.pending = count as u64,
                "success" => counts.success = count as u64,
                "failed" => counts.failed = count as u64,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// True when no document for the year is still pending at the given
    /// extraction version. Drives the extraction watermark.
    pub fn year_extraction_complete(&self, year: i32, extraction_version: i32) -> Result<bool> {
        let conn = self.connect()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE year = ?",
            params![year],
            |row| row.get(0),
        )?;
        if total == 0 {
            return Ok(false);
        }
        let unfinished: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM documents
            WHERE year = ?
              AND (extraction_status = 'pending' OR extraction_version < ?)
            "#,
            params![year, extraction_version],
            |row| row.get(0),
        )?;
        Ok(unfinished == 0)
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let method: Option<String> = row.get("extraction_method")?;
    let status: String = row.get("extraction_status")?;
    let parse_status: String = row.get("parse_status")?;
    let blob: Option<String> = row.get("text_blob_path")?;
    let byte_size: i64 = row.get("byte_size")?;
    let has_text_layer: Option<i32> = row.get("has_text_layer")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Document {
        doc_id: row.get("doc_id")?,
        year: row.get("year")?,
        content_hash: row.get("content_hash")?,
        byte_size: byte_size as u64,
        page_count: row.get("page_count")?,
        has_text_layer: has_text_layer.map(|v| v != 0),
        extraction_method: method.as_deref().and_then(ExtractionMethod::from_str),
        extraction_status: ExtractionStatus::from_str(&status)
            .unwrap_or(ExtractionStatus::Pending),
        extraction_version: row.get("extraction_version")?,
        extraction_confidence: row.get("extraction_confidence")?,
        text_blob_path: blob.map(PathBuf::from),
        parse_status: ParseStatus::from_str(&parse_status).unwrap_or(ParseStatus::Pending),
        parsed_record_count: row.get("parsed_record_count")?,
        parse_confidence: row.get("parse_confidence")?,
        error_detail: row.get("error_detail")?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn repo() -> (tempfile::TempDir, DocumentRepository) {
        let dir = tempdir().unwrap();
        let repo = DocumentRepository::new(&dir.path().join("test.db")).unwrap();
        (dir, repo)
    }

    fn success_update(doc_id: &str, hash: &str, version: i32) -> ExtractionOutcomeUpdate {
        ExtractionOutcomeUpdate {
            doc_id: doc_id.to_string(),
            year: 2025,
            content_hash: hash.to_string(),
            byte_size: 1024,
            page_count: Some(2),
            has_text_layer: Some(true),
            method: Some(ExtractionMethod::DirectText),
            status: ExtractionStatus::Success,
            extraction_version: version,
            confidence: Some(1.0),
            text_blob_path: Some(PathBuf::from("/blobs/2025/x.txt.gz")),
            error_detail: None,
        }
    }

    #[test]
    fn test_ensure_pending_same_hash_is_noop() {
        let (_dir, repo) = repo();
        let doc = Document::pending("8221216", 2025, b"%PDF", 1);
        assert!(repo.ensure_pending(&doc).unwrap());
        assert!(!repo.ensure_pending(&doc).unwrap());
    }

    #[test]
    fn test_ensure_pending_new_hash_resets() {
        let (_dir, repo) = repo();
        let doc = Document::pending("8221216", 2025, b"%PDF v1", 1);
        repo.ensure_pending(&doc).unwrap();
        repo.apply_extraction(&success_update("8221216", &doc.content_hash, 1))
            .unwrap();

        let changed = Document::pending("8221216", 2025, b"%PDF v2", 1);
        assert!(repo.ensure_pending(&changed).unwrap());
        let row = repo.get(2025, "8221216").unwrap().unwrap();
        assert_eq!(row.extraction_status, ExtractionStatus::Pending);
        assert!(row.text_blob_path.is_none());
    }

    #[test]
    fn test_apply_extraction_idempotent_row() {
        let (_dir, repo) = repo();
        let update = success_update("8221216", "abc123", 1);
        repo.apply_extraction(&update).unwrap();
        let first = repo.get(2025, "8221216").unwrap().unwrap();

        repo.apply_extraction(&update).unwrap();
        let second = repo.get(2025, "8221216").unwrap().unwrap();

        // No duplicate rows, identical business content
        assert_eq!(second.content_hash, first.content_hash);
        assert_eq!(second.extraction_status, first.extraction_status);
        assert_eq!(second.text_blob_path, first.text_blob_path);
        assert_eq!(repo.status_counts(2025).unwrap().total(), 1);
    }

    #[test]
    fn test_parse_outcome_and_ordering_gate() {
        let (_dir, repo) = repo();
        let doc = Document::pending("1", 2025, b"pdf", 1);
        repo.ensure_pending(&doc).unwrap();

        // Still pending extraction: not parseable
        assert!(repo.list_parseable(None).unwrap().is_empty());

        repo.apply_extraction(&success_update("1", &doc.content_hash, 1))
            .unwrap();
        assert_eq!(repo.list_parseable(None).unwrap().len(), 1);

        repo.apply_parse(&ParseOutcomeUpdate {
            doc_id: "1".to_string(),
            year: 2025,
            status: ParseStatus::Parsed,
            record_count: Some(3),
            confidence: Some(0.8),
            error_detail: None,
        })
        .unwrap();
        assert!(repo.list_parseable(None).unwrap().is_empty());
        let row = repo.get(2025, "1").unwrap().unwrap();
        assert_eq!(row.parse_status, ParseStatus::Parsed);
        assert_eq!(row.parsed_record_count, Some(3));
    }

    #[test]
    fn test_year_extraction_complete() {
        let (_dir, repo) = repo();
        assert!(!repo.year_extraction_complete(2025, 1).unwrap());

        let doc = Document::pending("1", 2025, b"pdf", 1);
        repo.ensure_pending(&doc).unwrap();
        assert!(!repo.year_extraction_complete(2025, 1).unwrap());

        repo.apply_extraction(&success_update("1", &doc.content_hash, 1))
            .unwrap();
        assert!(repo.year_extraction_complete(2025, 1).unwrap());
        // A version bump reopens the year
        assert!(!repo.year_extraction_complete(2025, 2).unwrap());
    }
}
