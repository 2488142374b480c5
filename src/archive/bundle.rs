//! Yearly source bundle reading.
//!
//! A bundle is a zip archive holding one index file (tab-separated, name
//! ending in `.txt`) plus the per-document PDFs named `{doc_id}.pdf`,
//! possibly under a subdirectory.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use super::{ArchiveError, Result};

/// An opened yearly bundle.
pub struct SourceBundle {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl SourceBundle {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file)?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the index file (first `.txt` entry).
    pub fn read_index(&mut self) -> Result<String> {
        let name = self
            .entry_names()
            .into_iter()
            .find(|n| n.to_ascii_lowercase().ends_with(".txt"))
            .ok_or(ArchiveError::Bundle(zip::result::ZipError::FileNotFound))?;
        let mut entry = self.archive.by_name(&name)?;
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        Ok(content)
    }

    /// Read one document's PDF bytes, matching `{doc_id}.pdf` at any depth.
    pub fn pdf_bytes(&mut self, doc_id: &str) -> Result<Option<Vec<u8>>> {
        let wanted = format!("{doc_id}.pdf");
        let name = self.entry_names().into_iter().find(|n| {
            n.rsplit('/')
                .next()
                .map(|base| base.eq_ignore_ascii_case(&wanted))
                .unwrap_or(false)
        });
        let Some(name) = name else {
            return Ok(None);
        };
        let mut entry = self.archive.by_name(&name)?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    /// Document ids of every PDF present in the bundle.
    pub fn pdf_doc_ids(&self) -> Vec<String> {
        self.entry_names()
            .into_iter()
            .filter_map(|n| {
                let base = n.rsplit('/').next()?;
                base.to_ascii_lowercase()
                    .strip_suffix(".pdf")
                    .map(|_| base[..base.len() - 4].to_string())
            })
            .collect()
    }

    fn entry_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }
}
