//! Extracted-text blob storage.
//!
//! One gzip-compressed text file per (document, extraction version) at a
//! path computed from the key, never looked up. Re-extraction at the same
//! version overwrites in place, which keeps the blob byte-identical for
//! identical text.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::SilverError;

/// Gzip text blobs under the silver root.
pub struct TextBlobStore {
    root: PathBuf,
}

impl TextBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path relative to the silver root, as recorded on the Document row.
    pub fn relative_path(year: i32, doc_id: &str, extraction_version: i32) -> String {
        format!("text/{year}/{doc_id}.v{extraction_version}.txt.gz")
    }

    pub fn blob_path(&self, year: i32, doc_id: &str, extraction_version: i32) -> PathBuf {
        self.root
            .join(Self::relative_path(year, doc_id, extraction_version))
    }

    /// Write the extracted text, returning the relative path for the
    /// Document row.
    pub fn write(
        &self,
        year: i32,
        doc_id: &str,
        extraction_version: i32,
        text: &str,
    ) -> Result<String, SilverError> {
        let path = self.blob_path(year, doc_id, extraction_version);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(text.as_bytes())?;
        encoder.finish()?;

        Ok(Self::relative_path(year, doc_id, extraction_version))
    }

    /// Read a blob back by its relative path.
    pub fn read(&self, relative_path: &str) -> Result<String, SilverError> {
        self.read_abs(&self.root.join(relative_path))
    }

    pub fn read_for(
        &self,
        year: i32,
        doc_id: &str,
        extraction_version: i32,
    ) -> Result<String, SilverError> {
        self.read_abs(&self.blob_path(year, doc_id, extraction_version))
    }

    fn read_abs(&self, path: &Path) -> Result<String, SilverError> {
        let file = File::open(path)?;
        let mut decoder = GzDecoder::new(file);
        let mut text = String::new();
        decoder.read_to_string(&mut text)?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let store = TextBlobStore::new(dir.path());

        let text = "2025-01-10, AAPL, Purchase, $1,001 - $15,000, Self\n";
        let rel = store.write(2025, "8221216", 1, text).unwrap();
        assert_eq!(rel, "text/2025/8221216.v1.txt.gz");

        assert_eq!(store.read(&rel).unwrap(), text);
        assert_eq!(store.read_for(2025, "8221216", 1).unwrap(), text);
    }

    #[test]
    fn test_rewrite_same_version_is_byte_identical() {
        let dir = tempdir().unwrap();
        let store = TextBlobStore::new(dir.path());

        store.write(2025, "8221216", 1, "same text").unwrap();
        let first = fs::read(store.blob_path(2025, "8221216", 1)).unwrap();
        store.write(2025, "8221216", 1, "same text").unwrap();
        let second = fs::read(store.blob_path(2025, "8221216", 1)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_blob_is_an_error() {
        let dir = tempdir().unwrap();
        let store = TextBlobStore::new(dir.path());
        assert!(store.read("text/2025/nope.v1.txt.gz").is_err());
    }
}
