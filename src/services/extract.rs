//! Extraction worker fan-out.
//!
//! Stateless workers pull document messages off the shared queue and run
//! each through the extraction router end-to-end. All writes are upserts on
//! (year, doc_id), so lease expiry and redelivery are safe. Separated from
//! UI concerns - emits events for progress tracking.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::archive::RawStore;
use crate::config::Settings;
use crate::extraction::{ExtractionError, ExtractionRouter, RouterConfig};
use crate::gold::GoldStore;
use crate::models::{Document, ExtractionStatus};
use crate::queue::{LeasedMessage, QueueConfig, WorkQueue};
use crate::repository::{DocumentRepository, ExtractionOutcomeUpdate};
use crate::silver::SilverWriter;

/// Progress events for the CLI layer.
#[derive(Debug, Clone)]
pub enum ExtractEvent {
    Started {
        doc_id: String,
        year: i32,
        attempt: u32,
    },
    Completed {
        doc_id: String,
        method: &'static str,
        confidence: f64,
    },
    Skipped {
        doc_id: String,
    },
    Failed {
        doc_id: String,
        error: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ExtractResult {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Years whose extraction watermark advanced during this run.
    pub watermarked_years: Vec<i32>,
}

pub struct ExtractService {
    settings: Settings,
}

impl ExtractService {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Drain the queue with `workers` parallel consumers.
    ///
    /// Returns once the queue reports empty for every worker. Each worker
    /// owns its own connections; the queue's leases are the only
    /// coordination between them.
    pub async fn process(
        &self,
        workers: usize,
        event_tx: mpsc::Sender<ExtractEvent>,
    ) -> anyhow::Result<ExtractResult> {
        let succeeded = Arc::new(AtomicUsize::new(0));
        let skipped = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let years: Arc<Mutex<HashSet<i32>>> = Arc::new(Mutex::new(HashSet::new()));

        let mut handles = Vec::with_capacity(workers.max(1));
        for worker_id in 0..workers.max(1) {
            let settings = self.settings.clone();
            let succeeded = succeeded.clone();
            let skipped = skipped.clone();
            let failed = failed.clone();
            let years = years.clone();
            let event_tx = event_tx.clone();

            handles.push(tokio::task::spawn_blocking(move || {
                let worker = match ExtractWorker::new(&settings) {
                    Ok(worker) => worker,
                    Err(e) => {
                        tracing::error!(worker_id, "worker setup failed: {e:#}");
                        return;
                    }
                };
                loop {
                    let leased = match worker.queue.receive() {
                        Ok(Some(leased)) => leased,
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(worker_id, "queue receive failed: {e}");
                            break;
                        }
                    };
                    let _ = event_tx.blocking_send(ExtractEvent::Started {
                        doc_id: leased.message.document_id.clone(),
                        year: leased.message.year,
                        attempt: leased.message.attempt_count,
                    });

                    match worker.process_one(&leased) {
                        Ok(Outcome::Extracted { method, confidence }) => {
                            succeeded.fetch_add(1, Ordering::Relaxed);
                            years.lock().unwrap().insert(leased.message.year);
                            let _ = event_tx.blocking_send(ExtractEvent::Completed {
                                doc_id: leased.message.document_id.clone(),
                                method,
                                confidence,
                            });
                        }
                        Ok(Outcome::AlreadyDone) => {
                            skipped.fetch_add(1, Ordering::Relaxed);
                            years.lock().unwrap().insert(leased.message.year);
                            let _ = event_tx.blocking_send(ExtractEvent::Skipped {
                                doc_id: leased.message.document_id.clone(),
                            });
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            let error = format!("{e:#}");
                            if let Err(e) = worker.queue.fail(&leased, &error) {
                                tracing::error!(worker_id, "failed to report failure: {e}");
                            }
                            let _ = event_tx.blocking_send(ExtractEvent::Failed {
                                doc_id: leased.message.document_id.clone(),
                                error,
                            });
                        }
                    }
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let mut result = ExtractResult {
            succeeded: succeeded.load(Ordering::Relaxed),
            skipped: skipped.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            watermarked_years: Vec::new(),
        };

        result.watermarked_years = self.advance_watermarks(&years.lock().unwrap())?;
        Ok(result)
    }

    /// Record the extraction watermark for every touched year whose
    /// documents are all settled at the current version. The dimensional
    /// build reads this marker instead of guessing readiness.
    fn advance_watermarks(&self, years: &HashSet<i32>) -> anyhow::Result<Vec<i32>> {
        let version = self.settings.extraction.version;
        let documents = DocumentRepository::new(&self.settings.database_path())?;
        let gold = GoldStore::new(&self.settings.database_path())?;

        let mut marked = Vec::new();
        let mut sorted: Vec<i32> = years.iter().copied().collect();
        sorted.sort_unstable();
        for year in sorted {
            if documents.year_extraction_complete(year, version)? {
                gold.set_watermark("extraction", year, version)?;
                tracing::info!(year, version, "extraction watermark set");
                marked.push(year);
            }
        }
        Ok(marked)
    }
}

enum Outcome {
    Extracted {
        method: &'static str,
        confidence: f64,
    },
    AlreadyDone,
}

/// One worker's connections and tooling.
struct ExtractWorker {
    raw: RawStore,
    documents: DocumentRepository,
    silver: SilverWriter,
    queue: WorkQueue,
    router: ExtractionRouter,
    extraction_version: i32,
}

impl ExtractWorker {
    fn new(settings: &Settings) -> anyhow::Result<Self> {
        let db_path = settings.database_path();
        Ok(Self {
            raw: RawStore::new(&settings.raw_dir()),
            documents: DocumentRepository::new(&db_path)?,
            silver: SilverWriter::new(&db_path, settings.silver_dir())?,
            queue: WorkQueue::new(&db_path, QueueConfig::from(&settings.queue))?,
            router: ExtractionRouter::new(RouterConfig::from(&settings.extraction)),
            extraction_version: settings.extraction.version,
        })
    }

    /// Process one leased message end-to-end, acknowledging on success.
    ///
    /// An error leaves the lease for the caller to fail, which makes the
    /// message redeliverable up to the attempt cap.
    fn process_one(&self, leased: &LeasedMessage) -> anyhow::Result<Outcome> {
        let doc_id = &leased.message.document_id;
        let year = leased.message.year;

        let pdf_path = self.raw.pdf_path(year, doc_id);
        let content = self.raw.read_pdf(year, doc_id)?;
        let content_hash = Document::compute_hash(&content);

        // Redelivery of finished work is a no-op.
        if let Some(existing) = self.documents.get(year, doc_id)? {
            if existing.is_extracted(&content_hash, self.extraction_version) {
                self.queue.ack(leased)?;
                return Ok(Outcome::AlreadyDone);
            }
        }

        match self.router.extract(&pdf_path) {
            Ok(extracted) => {
                let blob_path =
                    self.silver
                        .write_text(year, doc_id, self.extraction_version, &extracted.text)?;
                self.documents.apply_extraction(&ExtractionOutcomeUpdate {
                    doc_id: doc_id.clone(),
                    year,
                    content_hash,
                    byte_size: content.len() as u64,
                    page_count: Some(extracted.page_count),
                    has_text_layer: Some(extracted.has_text_layer),
                    method: Some(extracted.method),
                    status: ExtractionStatus::Success,
                    extraction_version: self.extraction_version,
                    confidence: Some(extracted.confidence),
                    text_blob_path: Some(blob_path.into()),
                    error_detail: None,
                })?;
                self.queue.ack(leased)?;
                Ok(Outcome::Extracted {
                    method: extracted.method.as_str(),
                    confidence: extracted.confidence,
                })
            }
            Err(
                e @ (ExtractionError::CorruptPdf(_)
                | ExtractionError::ExtractionFailed(_)
                | ExtractionError::Preprocess(_)),
            ) => {
                // Content failure: record it on the row, then let the queue
                // decide between redelivery and dead-lettering.
                self.documents.apply_extraction(&ExtractionOutcomeUpdate {
                    doc_id: doc_id.clone(),
                    year,
                    content_hash,
                    byte_size: content.len() as u64,
                    page_count: None,
                    has_text_layer: None,
                    method: None,
                    status: ExtractionStatus::Failed,
                    extraction_version: self.extraction_version,
                    confidence: Some(0.0),
                    text_blob_path: None,
                    error_detail: Some(e.to_string()),
                })?;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_from_settings() {
        let settings = crate::config::QueueSettings {
            lease_seconds: 17,
            max_attempts: 2,
        };
        let config = QueueConfig::from(&settings);
        assert_eq!(config.lease, std::time::Duration::from_secs(17));
        assert_eq!(config.max_attempts, 2);
    }
}
