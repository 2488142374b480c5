//! End-to-end pipeline test: bundle ingest through star-schema build.
//!
//! Extraction is recorded through the repository directly so the test runs
//! without poppler and tesseract installed; the router itself is covered by
//! its own tool-gated tests.

use std::io::Write;
use std::path::{Path, PathBuf};

use disclose::config::Settings;
use disclose::gold::GoldStore;
use disclose::models::{Document, ExtractionMethod, ExtractionStatus, ParseStatus};
use disclose::queue::{QueueConfig, WorkQueue};
use disclose::repository::{DocumentRepository, ExtractionOutcomeUpdate, RecordRepository};
use disclose::services::{BuildService, IngestService, ParseService};
use disclose::silver::TextBlobStore;
use zip::write::SimpleFileOptions;

const INDEX: &str = "Prefix\tLast\tFirst\tSuffix\tFilingType\tStateDst\tYear\tFilingDate\tDocID\n\
    \tDoe\tJane\t\tP\tCA12\t2025\t1/12/2025\t8221216\n\
    \tSmith\tJohn\t\tX\tNY03\t2025\t1/15/2025\t8221300\n";

const PTR_TEXT: &str = "Periodic Transaction Report\n\
    2025-01-10, AAPL, Purchase, $1,001 - $15,000, Self\n";

fn write_bundle(path: &Path, pdfs: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    writer.start_file("2025FD.txt", options).unwrap();
    writer.write_all(INDEX.as_bytes()).unwrap();
    for (doc_id, content) in pdfs {
        writer
            .start_file(format!("{doc_id}.pdf"), options)
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

/// Stand in for the extract stage: drain the queue, store the given text as
/// the extraction output for each document, and record success.
fn extract_as(settings: &Settings, texts: &[(&str, &str)]) {
    let db_path = settings.database_path();
    let documents = DocumentRepository::new(&db_path).unwrap();
    let blobs = TextBlobStore::new(settings.silver_dir());
    let queue = WorkQueue::new(&db_path, QueueConfig::default()).unwrap();

    while let Some(leased) = queue.receive().unwrap() {
        let doc_id = leased.message.document_id.clone();
        let year = leased.message.year;
        let text = texts
            .iter()
            .find(|(id, _)| *id == doc_id)
            .map(|(_, text)| *text)
            .unwrap_or("");

        let existing = documents.get(year, &doc_id).unwrap().unwrap();
        let rel = blobs.write(year, &doc_id, 1, text).unwrap();
        documents
            .apply_extraction(&ExtractionOutcomeUpdate {
                doc_id: doc_id.clone(),
                year,
                content_hash: existing.content_hash,
                byte_size: existing.byte_size,
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
        queue.ack(&leased).unwrap();
    }
}

#[test]
fn test_bundle_to_star_schema() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::default().with_data_dir(dir.path());
    settings.ensure_directories().unwrap();

    let bundle_path = dir.path().join("2025.zip");
    write_bundle(
        &bundle_path,
        &[("8221216", b"%PDF ptr"), ("8221300", b"%PDF ext")],
    );

    // Ingest
    let ingest = IngestService::new(&settings).unwrap();
    let report = ingest
        .ingest_bundle(2025, &bundle_path, Some("https://example.gov/2025FD.zip"))
        .unwrap();
    assert_eq!(report.filings_indexed, 2);
    assert_eq!(report.enqueued, 2);

    // Raw archive is byte-faithful
    let db_path = settings.database_path();
    let stored = std::fs::read(settings.raw_dir().join("2025").join("8221216.pdf")).unwrap();
    assert_eq!(stored, b"%PDF ptr");

    // Extract (simulated) and parse
    extract_as(
        &settings,
        &[("8221216", PTR_TEXT), ("8221300", "extension request")],
    );
    let parse = ParseService::new(&settings).unwrap();
    let report = parse.run(None).unwrap();
    assert_eq!(report.parsed, 1);
    assert_eq!(report.unsupported, 1, "extension filing has no extractor");
    assert_eq!(report.records_written, 1);

    let documents = DocumentRepository::new(&db_path).unwrap();
    let ptr_doc = documents.get(2025, "8221216").unwrap().unwrap();
    assert_eq!(ptr_doc.parse_status, ParseStatus::Parsed);
    let ext_doc = documents.get(2025, "8221300").unwrap().unwrap();
    assert_eq!(ext_doc.parse_status, ParseStatus::UnsupportedType);

    // The parsed record carries the line's fields
    let records = RecordRepository::new(&db_path)
        .unwrap()
        .get_set(2025, "8221216", 1)
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.ticker.as_deref(), Some("AAPL"));
    assert_eq!(record.owner.as_str(), "SELF");
    let amount = record.amount.as_ref().unwrap();
    assert_eq!(amount.min, 1_001);
    assert_eq!(amount.max, Some(15_000));
    assert_eq!(amount.label, "$1,001\u{2013}$15,000");

    // Build the star schema
    let build = BuildService::new(&settings).unwrap();
    let report = build.build_year(2025, false).unwrap();
    assert_eq!(report.facts.transactions, 1);

    // The fact row joins to current dimension rows
    let gold = GoldStore::new(&db_path).unwrap();
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let (ticker, member_key, is_current): (String, String, i64) = conn
        .query_row(
            r#"
            SELECT a.ticker, m.member_key, m.is_current
            FROM fact_transactions f
            JOIN dim_assets a ON a.asset_sk = f.asset_sk
            JOIN dim_members m ON m.member_sk = f.member_sk
            WHERE f.record_id = '8221216-v1-0000'
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(ticker, "AAPL");
    assert_eq!(member_key, "doe|jane|CA|12");
    assert_eq!(is_current, 1);

    assert!(gold.watermark("build", 2025).unwrap().is_some());
}

#[test]
fn test_reingest_and_rebuild_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::default().with_data_dir(dir.path());
    settings.ensure_directories().unwrap();

    let bundle_path = dir.path().join("2025.zip");
    write_bundle(&bundle_path, &[("8221216", b"%PDF ptr")]);

    let ingest = IngestService::new(&settings).unwrap();
    ingest.ingest_bundle(2025, &bundle_path, None).unwrap();
    extract_as(&settings, &[("8221216", PTR_TEXT)]);
    ParseService::new(&settings).unwrap().run(None).unwrap();

    let build = BuildService::new(&settings).unwrap();
    build.build_year(2025, false).unwrap();

    // Re-running every stage changes nothing
    let report = ingest.ingest_bundle(2025, &bundle_path, None).unwrap();
    assert_eq!(report.enqueued, 0);
    let report = ParseService::new(&settings).unwrap().run(None).unwrap();
    assert_eq!(report.parsed, 0);
    build.build_year(2025, false).unwrap();

    let conn = rusqlite::Connection::open(settings.database_path()).unwrap();
    let facts: i64 = conn
        .query_row("SELECT COUNT(*) FROM fact_transactions", [], |r| r.get(0))
        .unwrap();
    assert_eq!(facts, 1);
    let current_members: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM dim_members WHERE is_current = 1",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(current_members, 1);
}

#[test]
fn test_changed_source_reextracts_under_same_ids() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::default().with_data_dir(dir.path());
    settings.ensure_directories().unwrap();

    let bundle_path = dir.path().join("2025.zip");
    write_bundle(&bundle_path, &[("8221216", b"%PDF ptr v1")]);

    let ingest = IngestService::new(&settings).unwrap();
    ingest.ingest_bundle(2025, &bundle_path, None).unwrap();
    extract_as(&settings, &[("8221216", PTR_TEXT)]);
    ParseService::new(&settings).unwrap().run(None).unwrap();

    // Amended filing replaces the PDF under the same doc_id
    write_bundle(&bundle_path, &[("8221216", b"%PDF ptr v2")]);
    let report = ingest.ingest_bundle(2025, &bundle_path, None).unwrap();
    assert_eq!(report.pdfs_superseded, 1);
    assert_eq!(report.enqueued, 1);

    let amended = "Periodic Transaction Report\n\
        2025-01-10, AAPL, Purchase, $1,001 - $15,000, Self\n\
        2025-02-03, MSFT, Sale, $15,001 - $50,000, SP\n";
    extract_as(&settings, &[("8221216", amended)]);
    let report = ParseService::new(&settings).unwrap().run(None).unwrap();
    assert_eq!(report.parsed, 1);

    // The record set was replaced, not appended
    let records = RecordRepository::new(&settings.database_path())
        .unwrap()
        .get_set(2025, "8221216", 1)
        .unwrap();
    assert_eq!(records.len(), 2);

    // Prior version's raw bytes are preserved alongside the new ones
    let old_hash = Document::compute_hash(b"%PDF ptr v1");
    let preserved = settings
        .raw_dir()
        .join("2025")
        .join(format!("8221216-{}.pdf", &old_hash[..8]));
    assert_eq!(std::fs::read(preserved).unwrap(), b"%PDF ptr v1");

    let current = std::fs::read(settings.raw_dir().join("2025").join("8221216.pdf")).unwrap();
    assert_eq!(current, b"%PDF ptr v2");
}

#[test]
fn test_countable_chars_counts_visible_text() {
    // Counts extractable characters the same way the router does when
    // deciding between the direct and OCR paths.
    assert_eq!(disclose::extraction::countable_chars("AAPL  Purchase\n"), 12);
    assert_eq!(disclose::extraction::countable_chars(" \n\t"), 0);
}
