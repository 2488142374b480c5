//! Bundle ingestion: yearly source archive into the raw tier.
//!
//! One pass per (year, bundle): archive the bundle itself, parse its index
//! into Filing rows, store each listed PDF byte-faithfully with a
//! provenance sidecar, and enqueue extraction work for every new or changed
//! document. Re-running over the same bundle is a no-op except for
//! documents whose bytes changed.

use std::path::Path;

use anyhow::Context;
use chrono::Utc;

use crate::archive::{parse_index, RawStore, SourceBundle, StoreOutcome};
use crate::config::Settings;
use crate::models::Document;
use crate::queue::{QueueConfig, WorkQueue};
use crate::repository::{DocumentRepository, FilingRepository};

/// What one ingestion pass did.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub filings_indexed: usize,
    pub index_errors: usize,
    pub pdfs_stored: usize,
    pub pdfs_unchanged: usize,
    pub pdfs_superseded: usize,
    pub pdfs_missing: usize,
    pub enqueued: usize,
}

pub struct IngestService {
    raw: RawStore,
    filings: FilingRepository,
    documents: DocumentRepository,
    queue: WorkQueue,
    extraction_version: i32,
}

impl IngestService {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let db_path = settings.database_path();
        Ok(Self {
            raw: RawStore::new(&settings.raw_dir()),
            filings: FilingRepository::new(&db_path)?,
            documents: DocumentRepository::new(&db_path)?,
            queue: WorkQueue::new(&db_path, QueueConfig::from(&settings.queue))?,
            extraction_version: settings.extraction.version,
        })
    }

    /// Ingest one year's bundle from a local path.
    pub fn ingest_bundle(
        &self,
        year: i32,
        bundle_path: &Path,
        source_url: Option<&str>,
    ) -> anyhow::Result<IngestReport> {
        let fetched_at = Utc::now();
        self.raw
            .store_bundle(year, bundle_path, source_url, fetched_at)
            .with_context(|| format!("archiving bundle {}", bundle_path.display()))?;

        let mut bundle = SourceBundle::open(bundle_path)
            .with_context(|| format!("opening bundle {}", bundle_path.display()))?;
        let index = bundle.read_index().context("reading bundle index")?;
        let (entries, errors) = parse_index(&index, year)?;

        for error in &errors {
            tracing::warn!(year, "malformed index line: {error}");
        }

        let filings: Vec<_> = entries.into_iter().map(|e| e.into_filing()).collect();
        let mut report = IngestReport {
            filings_indexed: self.filings.upsert_batch(&filings)?,
            index_errors: errors.len(),
            ..Default::default()
        };
        self.filings
            .set_ingest_watermark(year, source_url, fetched_at, filings.len() as u64)?;

        for filing in &filings {
            let Some(content) = bundle.pdf_bytes(&filing.doc_id)? else {
                tracing::warn!(doc_id = %filing.doc_id, year, "PDF listed in index but absent from bundle");
                report.pdfs_missing += 1;
                continue;
            };

            let outcome = self
                .raw
                .store_pdf(year, &filing.doc_id, &content, source_url, fetched_at)?;
            match outcome {
                StoreOutcome::Created => report.pdfs_stored += 1,
                StoreOutcome::Unchanged => report.pdfs_unchanged += 1,
                StoreOutcome::Superseded => report.pdfs_superseded += 1,
            }

            let doc = Document::pending(&filing.doc_id, year, &content, self.extraction_version);
            let changed = self.documents.ensure_pending(&doc)?;
            if changed {
                self.queue.enqueue(&filing.doc_id, year)?;
                report.enqueued += 1;
            }
        }

        tracing::info!(
            year,
            filings = report.filings_indexed,
            stored = report.pdfs_stored,
            unchanged = report.pdfs_unchanged,
            enqueued = report.enqueued,
            "bundle ingested"
        );
        Ok(report)
    }
}

impl From<&crate::config::QueueSettings> for QueueConfig {
    fn from(settings: &crate::config::QueueSettings) -> Self {
        Self {
            lease: std::time::Duration::from_secs(settings.lease_seconds),
            max_attempts: settings.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_bundle(path: &Path, index: &str, pdfs: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        writer.start_file("2025FD.txt", options).unwrap();
        writer.write_all(index.as_bytes()).unwrap();
        for (doc_id, content) in pdfs {
            writer
                .start_file(format!("{doc_id}.pdf"), options)
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    const INDEX: &str = "Prefix\tLast\tFirst\tSuffix\tFilingType\tStateDst\tYear\tFilingDate\tDocID\n\
        \tDoe\tJane\t\tP\tCA12\t2025\t1/12/2025\t8221216\n\
        \tSmith\tJohn\t\tP\tNY03\t2025\t1/15/2025\t8221300\n";

    fn service(data_dir: &Path) -> IngestService {
        let settings = Settings::default().with_data_dir(data_dir);
        settings.ensure_directories().unwrap();
        IngestService::new(&settings).unwrap()
    }

    #[test]
    fn test_ingest_stores_and_enqueues() {
        let dir = tempdir().unwrap();
        let bundle_path = dir.path().join("2025.zip");
        write_bundle(&bundle_path, INDEX, &[("8221216", b"%PDF-1"), ("8221300", b"%PDF-2")]);

        let svc = service(dir.path());
        let report = svc.ingest_bundle(2025, &bundle_path, None).unwrap();
        assert_eq!(report.filings_indexed, 2);
        assert_eq!(report.pdfs_stored, 2);
        assert_eq!(report.enqueued, 2);
        assert_eq!(svc.queue.depth().unwrap(), 2);
        assert!(svc.raw.pdf_path(2025, "8221216").is_file());
    }

    #[test]
    fn test_reingest_unchanged_is_noop() {
        let dir = tempdir().unwrap();
        let bundle_path = dir.path().join("2025.zip");
        write_bundle(&bundle_path, INDEX, &[("8221216", b"%PDF-1"), ("8221300", b"%PDF-2")]);

        let svc = service(dir.path());
        svc.ingest_bundle(2025, &bundle_path, None).unwrap();
        let report = svc.ingest_bundle(2025, &bundle_path, None).unwrap();
        assert_eq!(report.pdfs_stored, 0);
        assert_eq!(report.pdfs_unchanged, 2);
        assert_eq!(report.enqueued, 0);
        assert_eq!(svc.queue.depth().unwrap(), 2, "original work still queued");
    }

    #[test]
    fn test_changed_pdf_reenqueues() {
        let dir = tempdir().unwrap();
        let bundle_path = dir.path().join("2025.zip");
        write_bundle(&bundle_path, INDEX, &[("8221216", b"%PDF-1")]);

        let svc = service(dir.path());
        let report = svc.ingest_bundle(2025, &bundle_path, None).unwrap();
        assert_eq!(report.pdfs_missing, 1);

        // Drain the queue so re-enqueue is observable
        while let Some(leased) = svc.queue.receive().unwrap() {
            svc.queue.ack(&leased).unwrap();
        }

        write_bundle(&bundle_path, INDEX, &[("8221216", b"%PDF-1 revised")]);
        let report = svc.ingest_bundle(2025, &bundle_path, None).unwrap();
        assert_eq!(report.pdfs_superseded, 1);
        assert_eq!(report.enqueued, 1);
    }
}
