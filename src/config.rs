//! Configuration management for the disclosure pipeline.
//!
//! Settings load from a `disclose.toml` file (explicit path, working
//! directory, or the user config directory, in that order), with every
//! section optional and defaulted. Relative paths resolve against the data
//! directory so a settings file can be checked in next to the data it
//! describes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default settings file name.
pub const SETTINGS_FILE: &str = "disclose.toml";

/// Default database file name inside the data directory.
pub const DATABASE_FILE: &str = "disclose.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Extraction router settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Version of the extraction logic. Bump (and re-enqueue) to force a
    /// reprocessing pass; prior output stays keyed to the old version.
    pub version: i32,
    /// How many pages from the start of the PDF to sample when classifying.
    pub sample_pages: u32,
    /// Embedded characters across the sampled prefix required to classify a
    /// PDF as text-bearing.
    pub text_char_threshold: usize,
    /// Non-whitespace characters of direct-text output below which direct
    /// extraction confidence is scaled down from 1.0.
    pub min_direct_chars: usize,
    /// Render resolution for the OCR path.
    pub ocr_dpi: u32,
    /// Tesseract language setting.
    pub tesseract_lang: String,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            version: 1,
            sample_pages: 3,
            text_char_threshold: 100,
            min_direct_chars: 200,
            ocr_dpi: 300,
            tesseract_lang: "eng".to_string(),
        }
    }
}

/// Work queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Seconds a received message stays invisible before it becomes
    /// redeliverable.
    pub lease_seconds: u64,
    /// Delivery attempts before a message is dead-lettered.
    pub max_attempts: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            lease_seconds: 300,
            max_attempts: 5,
        }
    }
}

/// Dimensional build settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoldSettings {
    /// Rolling windows (in days) for trending aggregates.
    pub windows: Vec<u32>,
}

impl Default for GoldSettings {
    fn default() -> Self {
        Self {
            windows: vec![7, 30, 90],
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory for the database, raw archive, and text blobs.
    pub data_dir: PathBuf,
    /// Default number of extraction workers.
    pub workers: usize,
    pub extraction: ExtractionSettings,
    pub queue: QueueSettings,
    pub gold: GoldSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./disclose-data"),
            workers: 4,
            extraction: ExtractionSettings::default(),
            queue: QueueSettings::default(),
            gold: GoldSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, trying an explicit path, then the working directory,
    /// then the user config directory. Missing files fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let cwd_candidate = PathBuf::from(SETTINGS_FILE);
        if cwd_candidate.exists() {
            return Self::from_file(&cwd_candidate);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let candidate = config_dir.join("disclose").join(SETTINGS_FILE);
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Load settings from a specific TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings =
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.data_dir = expand_path(&settings.data_dir);
        Ok(settings)
    }

    /// Override the data directory (CLI `--target`).
    pub fn with_data_dir(mut self, data_dir: &Path) -> Self {
        self.data_dir = expand_path(data_dir);
        self
    }

    /// Path to the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Root of the raw (Bronze) archive.
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    /// Root of the normalized (Silver) text blobs.
    pub fn silver_dir(&self) -> PathBuf {
        self.data_dir.join("silver")
    }

    /// Create the directory layout if missing.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [self.data_dir.clone(), self.raw_dir(), self.silver_dir()] {
            fs::create_dir_all(&dir).map_err(|source| ConfigError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Expand `~` and environment variables in a configured path.
fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}
