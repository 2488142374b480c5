//! Tesseract OCR backend with engine-reported confidence.
//!
//! Runs Tesseract in TSV mode so the page text and the per-word confidence
//! values come from a single invocation; the page confidence is the mean
//! word confidence scaled to [0, 1].

use std::path::Path;
use std::process::Command;

use super::extractor::ExtractionError;

/// One OCR'd page.
#[derive(Debug, Clone)]
pub struct OcrPage {
    pub text: String,
    /// Mean word confidence in [0, 1].
    pub confidence: f64,
}

/// Tesseract runner.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    language: String,
}

impl TesseractOcr {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }

    /// OCR a single page image.
    pub fn recognize(&self, image_path: &Path) -> Result<OcrPage, ExtractionError> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language, "tsv"])
            .output();

        let tsv = match output {
            Ok(output) => {
                if output.status.success() {
                    String::from_utf8_lossy(&output.stdout).to_string()
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(ExtractionError::ExtractionFailed(format!(
                        "tesseract failed: {}",
                        stderr
                    )));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractionError::ToolNotFound(
                    "tesseract (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => return Err(ExtractionError::Io(e)),
        };

        Ok(parse_tsv(&tsv))
    }
}

/// Rebuild page text and mean confidence from Tesseract's TSV output.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Word rows are level 5 with a
/// non-negative confidence.
pub(crate) fn parse_tsv(tsv: &str) -> OcrPage {
    let mut text = String::new();
    let mut confidences: Vec<f64> = Vec::new();
    let mut current_line: Option<(u32, u32, u32)> = None;

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        let level: u32 = fields[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let block: u32 = fields[2].parse().unwrap_or(0);
        let par: u32 = fields[3].parse().unwrap_or(0);
        let line: u32 = fields[4].parse().unwrap_or(0);
        let conf: f64 = fields[10].parse().unwrap_or(-1.0);
        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        let line_key = (block, par, line);
        match current_line {
            Some(key) if key == line_key => text.push(' '),
            Some(_) => text.push('\n'),
            None => {}
        }
        current_line = Some(line_key);
        text.push_str(word);

        if conf >= 0.0 {
            confidences.push(conf / 100.0);
        }
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    OcrPage { text, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word_row(block: u32, line: u32, word: u32, conf: f64, text: &str) -> String {
        format!("5\t1\t{block}\t1\t{line}\t{word}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn test_parse_tsv_reconstructs_lines() {
        let tsv = [
            HEADER.to_string(),
            // Non-word rows are skipped
            "4\t1\t1\t1\t1\t0\t0\t0\t10\t10\t-1\t".to_string(),
            word_row(1, 1, 1, 96.0, "Hello"),
            word_row(1, 1, 2, 90.0, "world"),
            word_row(1, 2, 1, 80.0, "again"),
        ]
        .join("\n");

        let page = parse_tsv(&tsv);
        assert_eq!(page.text, "Hello world\nagain");
        assert!((page.confidence - 0.8866).abs() < 0.001);
    }

    #[test]
    fn test_parse_tsv_empty_page() {
        let page = parse_tsv(HEADER);
        assert_eq!(page.text, "");
        assert_eq!(page.confidence, 0.0);
    }

    #[test]
    fn test_parse_tsv_ignores_negative_confidence() {
        let tsv = [HEADER.to_string(), word_row(1, 1, 1, -1.0, "ghost")].join("\n");
        let page = parse_tsv(&tsv);
        assert_eq!(page.text, "ghost");
        assert_eq!(page.confidence, 0.0);
    }
}
