//! Structured-parse pass.
//!
//! Pull-based rather than queue-driven: the parser asks the document
//! repository for rows with extraction_status = success and parse_status =
//! pending, which is what enforces extract-before-parse ordering. One bad
//! document records a failure and never blocks the rest.

use crate::config::Settings;
use crate::parsing::{ExtractorRegistry, ParseContext, ParseOutcome};
use crate::repository::{DocumentRepository, FilingRepository, ParseOutcomeUpdate};
use crate::silver::SilverWriter;

use crate::models::ParseStatus;

#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub parsed: usize,
    pub unsupported: usize,
    pub failed: usize,
    pub records_written: usize,
    pub records_rejected: usize,
}

pub struct ParseService {
    documents: DocumentRepository,
    filings: FilingRepository,
    silver: SilverWriter,
    registry: ExtractorRegistry,
}

impl ParseService {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let db_path = settings.database_path();
        Ok(Self {
            documents: DocumentRepository::new(&db_path)?,
            filings: FilingRepository::new(&db_path)?,
            silver: SilverWriter::new(&db_path, settings.silver_dir())?,
            registry: ExtractorRegistry::with_standard_extractors(),
        })
    }

    /// Parse every parseable document, up to `limit`.
    pub fn run(&self, limit: Option<usize>) -> anyhow::Result<ParseReport> {
        let mut report = ParseReport::default();

        for doc in self.documents.list_parseable(limit)? {
            match self.parse_one(&doc) {
                Ok(DocOutcome::Parsed { written, rejected }) => {
                    report.parsed += 1;
                    report.records_written += written;
                    report.records_rejected += rejected;
                }
                Ok(DocOutcome::Unsupported) => report.unsupported += 1,
                Err(e) => {
                    report.failed += 1;
                    let error = format!("{e:#}");
                    tracing::warn!(doc_id = %doc.doc_id, year = doc.year, "parse failed: {error}");
                    self.documents.apply_parse(&ParseOutcomeUpdate {
                        doc_id: doc.doc_id.clone(),
                        year: doc.year,
                        status: ParseStatus::Failed,
                        record_count: None,
                        confidence: None,
                        error_detail: Some(error),
                    })?;
                }
            }
        }

        tracing::info!(
            parsed = report.parsed,
            unsupported = report.unsupported,
            failed = report.failed,
            records = report.records_written,
            "parse pass complete"
        );
        Ok(report)
    }

    fn parse_one(&self, doc: &crate::models::Document) -> anyhow::Result<DocOutcome> {
        let filing = self
            .filings
            .get(doc.year, &doc.doc_id)?
            .ok_or_else(|| anyhow::anyhow!("no filing row for document {}", doc.doc_id))?;

        let blob_path = doc
            .text_blob_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("extracted document has no text blob path"))?;
        let text = self.silver.blobs().read(&blob_path.to_string_lossy())?;

        let ctx = ParseContext {
            doc_id: &doc.doc_id,
            year: doc.year,
            extraction_version: doc.extraction_version,
            text: &text,
        };

        match self.registry.parse(&filing.filing_type, &ctx) {
            ParseOutcome::Unsupported => {
                // Distinct terminal status, not an error: extensions and
                // termination reports have no extractor by design.
                self.documents.apply_parse(&ParseOutcomeUpdate {
                    doc_id: doc.doc_id.clone(),
                    year: doc.year,
                    status: ParseStatus::UnsupportedType,
                    record_count: Some(0),
                    confidence: None,
                    error_detail: None,
                })?;
                Ok(DocOutcome::Unsupported)
            }
            ParseOutcome::Parsed {
                records,
                confidence,
            } => {
                let write_report = self.silver.write_records(
                    doc.year,
                    &doc.doc_id,
                    doc.extraction_version,
                    &records,
                )?;

                self.documents.apply_parse(&ParseOutcomeUpdate {
                    doc_id: doc.doc_id.clone(),
                    year: doc.year,
                    status: ParseStatus::Parsed,
                    record_count: Some(write_report.accepted as u32),
                    confidence: Some(confidence),
                    error_detail: None,
                })?;

                Ok(DocOutcome::Parsed {
                    written: write_report.accepted,
                    rejected: write_report.rejected.len(),
                })
            }
        }
    }
}

enum DocOutcome {
    Parsed { written: usize, rejected: usize },
    Unsupported,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, ExtractionMethod, ExtractionStatus, Filing};
    use crate::repository::ExtractionOutcomeUpdate;
    use crate::silver::TextBlobStore;
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn setup(dir: &std::path::Path) -> (crate::config::Settings, ParseService) {
        let settings = crate::config::Settings::default().with_data_dir(dir);
        settings.ensure_directories().unwrap();
        let service = ParseService::new(&settings).unwrap();
        (settings, service)
    }

    fn seed_document(
        settings: &crate::config::Settings,
        doc_id: &str,
        filing_type: &str,
        text: &str,
    ) {
        let db_path = settings.database_path();
        let filings = FilingRepository::new(&db_path).unwrap();
        filings
            .upsert(&Filing {
                doc_id: doc_id.to_string(),
                year: 2025,
                last_name: "Doe".to_string(),
                first_name: "Jane".to_string(),
                suffix: None,
                state: Some("CA".to_string()),
                district: Some("12".to_string()),
                filing_type: filing_type.to_string(),
                filing_date: None,
                ingested_at: Utc::now(),
            })
            .unwrap();

        let blobs = TextBlobStore::new(settings.silver_dir());
        let rel = blobs.write(2025, doc_id, 1, text).unwrap();

        let documents = DocumentRepository::new(&db_path).unwrap();
        let doc = Document::pending(doc_id, 2025, text.as_bytes(), 1);
        documents.ensure_pending(&doc).unwrap();
        documents
            .apply_extraction(&ExtractionOutcomeUpdate {
                doc_id: doc_id.to_string(),
                year: 2025,
                content_hash: doc.content_hash.clone(),
                byte_size: text.len() as u64,
                page_count: Some(1),
                has_text_layer: Some(true),
                method: Some(ExtractionMethod::DirectText),
                status: ExtractionStatus::Success,
                extraction_version: 1,
                confidence: Some(1.0),
                text_blob_path: Some(PathBuf::from(rel)),
                error_detail: None,
            })
            .unwrap();
    }

    #[test]
    fn test_parse_pass_writes_records() {
        let dir = tempdir().unwrap();
        let (settings, service) = setup(dir.path());
        seed_document(
            &settings,
            "8221216",
            "P",
            "2025-01-10, AAPL, Purchase, $1,001 - $15,000, Self\n",
        );

        let report = service.run(None).unwrap();
        assert_eq!(report.parsed, 1);
        assert_eq!(report.records_written, 1);

        let records = crate::repository::RecordRepository::new(&settings.database_path())
            .unwrap()
            .get_set(2025, "8221216", 1)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ticker.as_deref(), Some("AAPL"));
    }

    #[test]
    fn test_unsupported_filing_type_is_terminal_not_failed() {
        let dir = tempdir().unwrap();
        let (settings, service) = setup(dir.path());
        seed_document(&settings, "9000001", "X", "extension request text");

        let report = service.run(None).unwrap();
        assert_eq!(report.unsupported, 1);
        assert_eq!(report.failed, 0);

        let doc = DocumentRepository::new(&settings.database_path())
            .unwrap()
            .get(2025, "9000001")
            .unwrap()
            .unwrap();
        assert_eq!(doc.parse_status, ParseStatus::UnsupportedType);
        assert_eq!(doc.parsed_record_count, Some(0));

        // Terminal: a second pass does not pick it up again
        let report = service.run(None).unwrap();
        assert_eq!(report.unsupported, 0);
    }

    #[test]
    fn test_rerun_after_parse_is_noop() {
        let dir = tempdir().unwrap();
        let (settings, service) = setup(dir.path());
        seed_document(
            &settings,
            "8221216",
            "P",
            "2025-01-10, AAPL, Purchase, $1,001 - $15,000, Self\n",
        );

        service.run(None).unwrap();
        let report = service.run(None).unwrap();
        assert_eq!(report.parsed, 0);
        assert_eq!(report.records_written, 0);
    }
}
