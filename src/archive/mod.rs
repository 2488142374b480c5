//! Raw (Bronze) archive: byte-faithful storage of source bundles and
//! per-document originals.
//!
//! Object paths are a pure function of (year, doc_id), so they are computed,
//! never looked up. Every object carries a provenance sidecar (source URL,
//! fetch time, content hash, size). Objects are never destroyed: when a
//! re-ingested document's bytes differ, the prior object is kept under a
//! hash-suffixed name before the derived path is rewritten.

mod bundle;
mod index;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bundle::SourceBundle;
pub use index::{parse_index, IndexEntry, IndexError};

use crate::models::Document;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sidecar error: {0}")]
    Sidecar(#[from] serde_json::Error),

    #[error("bundle error: {0}")]
    Bundle(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Provenance metadata stored next to each raw object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub source_url: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub sha256: String,
    pub byte_size: u64,
    pub stored_at: DateTime<Utc>,
}

/// Outcome of storing one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Object written for the first time.
    Created,
    /// Identical bytes already present; nothing written.
    Unchanged,
    /// Different bytes replaced the derived path; the prior object was
    /// preserved under a hash-suffixed name.
    Superseded,
}

/// Content-addressable raw store rooted at a directory.
pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Derived path of a document's PDF: `{root}/{year}/{doc_id}.pdf`.
    pub fn pdf_path(&self, year: i32, doc_id: &str) -> PathBuf {
        self.root.join(year.to_string()).join(format!("{doc_id}.pdf"))
    }

    /// Derived path of a document's provenance sidecar.
    pub fn sidecar_path(&self, year: i32, doc_id: &str) -> PathBuf {
        self.root
            .join(year.to_string())
            .join(format!("{doc_id}.json"))
    }

    /// Derived path for an ingested source bundle.
    pub fn bundle_path(&self, year: i32, file_name: &str) -> PathBuf {
        self.root.join("bundles").join(year.to_string()).join(file_name)
    }

    /// Store one document's bytes plus its provenance sidecar.
    pub fn store_pdf(
        &self,
        year: i32,
        doc_id: &str,
        content: &[u8],
        source_url: Option<&str>,
        fetched_at: DateTime<Utc>,
    ) -> Result<StoreOutcome> {
        let path = self.pdf_path(year, doc_id);
        let hash = Document::compute_hash(content);

        let outcome = if path.exists() {
            let existing = fs::read(&path)?;
            if Document::compute_hash(&existing) == hash {
                return Ok(StoreOutcome::Unchanged);
            }
            // Preserve the superseded object byte-for-byte
            let old_hash = Document::compute_hash(&existing);
            let preserved = path.with_file_name(format!("{doc_id}-{}.pdf", &old_hash[..8]));
            fs::rename(&path, &preserved)?;
            StoreOutcome::Superseded
        } else {
            StoreOutcome::Created
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;

        let provenance = Provenance {
            source_url: source_url.map(str::to_string),
            fetched_at,
            sha256: hash,
            byte_size: content.len() as u64,
            stored_at: Utc::now(),
        };
        fs::write(
            self.sidecar_path(year, doc_id),
            serde_json::to_vec_pretty(&provenance)?,
        )?;

        Ok(outcome)
    }

    /// Copy a source bundle into the archive with its own sidecar.
    pub fn store_bundle(
        &self,
        year: i32,
        bundle: &Path,
        source_url: Option<&str>,
        fetched_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let file_name = bundle
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{year}.zip"));
        let dest = self.bundle_path(year, &file_name);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = fs::read(bundle)?;
        fs::write(&dest, &content)?;

        let provenance = Provenance {
            source_url: source_url.map(str::to_string),
            fetched_at,
            sha256: Document::compute_hash(&content),
            byte_size: content.len() as u64,
            stored_at: Utc::now(),
        };
        fs::write(
            dest.with_extension("json"),
            serde_json::to_vec_pretty(&provenance)?,
        )?;

        Ok(dest)
    }

    /// Read a document's raw bytes back.
    pub fn read_pdf(&self, year: i32, doc_id: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.pdf_path(year, doc_id))?)
    }

    /// Read a document's provenance sidecar.
    pub fn read_provenance(&self, year: i32, doc_id: &str) -> Result<Provenance> {
        let raw = fs::read(self.sidecar_path(year, doc_id))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
