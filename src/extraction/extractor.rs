//! External PDF tool wrappers: pdftotext, pdfinfo, pdftoppm.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Map a failure to launch `tool` onto the right error variant.
fn spawn_error(err: std::io::Error, tool: &str) -> ExtractionError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ExtractionError::ToolNotFound(tool.to_string())
    } else {
        ExtractionError::Io(err)
    }
}

/// Run a tool to completion and capture its stdout; a nonzero exit becomes
/// an extraction failure carrying the tool's stderr.
fn capture_stdout(
    cmd: &mut Command,
    tool: &str,
    context: &str,
) -> Result<String, ExtractionError> {
    let output = cmd.output().map_err(|e| spawn_error(e, tool))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractionError::ExtractionFailed(format!(
            "{context}: {}",
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("corrupt or unreadable PDF: {0}")]
    CorruptPdf(String),

    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("preprocessing failed: {0}")]
    Preprocess(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Thin wrappers over the Poppler tools.
#[derive(Debug, Clone, Default)]
pub struct PdfToolkit;

impl PdfToolkit {
    /// Page count from pdfinfo; errors on PDFs pdfinfo cannot open.
    pub fn page_count(&self, pdf_path: &Path) -> Result<u32, ExtractionError> {
        let stdout = capture_stdout(
            Command::new("pdfinfo").arg(pdf_path),
            "pdfinfo (install poppler-utils)",
            "pdfinfo failed",
        )
        .map_err(|e| match e {
            ExtractionError::ExtractionFailed(msg) => ExtractionError::CorruptPdf(msg),
            other => other,
        })?;

        for line in stdout.lines() {
            if line.starts_with("Pages:") {
                if let Some(count) = line.split_whitespace().nth(1).and_then(|s| s.parse().ok()) {
                    return Ok(count);
                }
            }
        }
        Err(ExtractionError::CorruptPdf(
            "pdfinfo reported no page count".to_string(),
        ))
    }

    /// Embedded text of a single page via pdftotext.
    pub fn page_text(&self, pdf_path: &Path, page: u32) -> Result<String, ExtractionError> {
        let page_str = page.to_string();
        capture_stdout(
            Command::new("pdftotext")
                .args(["-layout", "-enc", "UTF-8", "-f", &page_str, "-l", &page_str])
                .arg(pdf_path)
                .arg("-"), // Output to stdout
            "pdftotext (install poppler-utils)",
            &format!("pdftotext failed on page {}", page),
        )
    }

    /// Embedded text of the whole document via pdftotext.
    pub fn full_text(&self, pdf_path: &Path) -> Result<String, ExtractionError> {
        capture_stdout(
            Command::new("pdftotext")
                .args(["-layout", "-enc", "UTF-8"])
                .arg(pdf_path)
                .arg("-"),
            "pdftotext (install poppler-utils)",
            "pdftotext failed",
        )
    }

    /// Render one page to a PNG under `output_dir` at the given DPI.
    pub fn render_page(
        &self,
        pdf_path: &Path,
        page: u32,
        dpi: u32,
        output_dir: &Path,
    ) -> Result<PathBuf, ExtractionError> {
        let page_str = page.to_string();
        let dpi_str = dpi.to_string();
        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &dpi_str, "-f", &page_str, "-l", &page_str])
            .arg(pdf_path)
            .arg(output_dir.join("page"))
            .status()
            .map_err(|e| spawn_error(e, "pdftoppm (install poppler-utils)"))?;
        if !status.success() {
            return Err(ExtractionError::ExtractionFailed(format!(
                "pdftoppm failed to render page {}",
                page
            )));
        }

        find_page_image(output_dir, page).ok_or_else(|| {
            ExtractionError::ExtractionFailed(format!("no image rendered for page {}", page))
        })
    }

    /// Check if required tools are available.
    pub fn check_tools() -> Vec<(String, bool)> {
        ["pdftotext", "pdftoppm", "pdfinfo", "tesseract"]
            .iter()
            .map(|tool| (tool.to_string(), which::which(tool).is_ok()))
            .collect()
    }

    /// True when every tool the router needs is on PATH.
    pub fn tools_available() -> bool {
        Self::check_tools().iter().all(|(_, ok)| *ok)
    }
}

/// Find the image file pdftoppm produced for a page.
/// pdftoppm pads the page number: page-01.png, page-001.png, ...
pub(crate) fn find_page_image(dir: &Path, page: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let filename = format!("page-{:0width$}.png", page, width = digits);
        let path = dir.join(&filename);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Count the characters that matter for classification.
pub fn countable_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tools_lists_all() {
        let tools = PdfToolkit::check_tools();
        assert_eq!(tools.len(), 4);
    }

    #[test]
    fn test_countable_chars_ignores_whitespace() {
        assert_eq!(countable_chars("a b\tc\nd"), 4);
        assert_eq!(countable_chars(" \n\t "), 0);
    }

    #[test]
    fn test_find_page_image_padding() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page-003.png"), b"png").unwrap();
        let found = find_page_image(dir.path(), 3).unwrap();
        assert!(found.ends_with("page-003.png"));
        assert!(find_page_image(dir.path(), 4).is_none());
    }
}
