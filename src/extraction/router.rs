//! Extraction router: classify each PDF as text-bearing or image-only and
//! dispatch to the matching extractor.
//!
//! Classification samples a bounded prefix of pages and counts extractable
//! embedded characters. Confidence policy: 1.0 for direct extraction above
//! the length floor (scaled below it), engine-reported confidence for OCR,
//! and a hard failure with a reason when both paths error.

use std::path::Path;

use tempfile::TempDir;

use super::extractor::{countable_chars, ExtractionError, PdfToolkit};
use super::ocr::TesseractOcr;
use super::preprocess;
use crate::config::ExtractionSettings;
use crate::models::ExtractionMethod;

/// Outcome of page-prefix sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfClass {
    TextBearing { sampled_chars: usize },
    ImageOnly { sampled_chars: usize },
}

impl PdfClass {
    pub fn has_text_layer(&self) -> bool {
        matches!(self, Self::TextBearing { .. })
    }
}

/// Normalized extraction output.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub method: ExtractionMethod,
    /// In [0, 1].
    pub confidence: f64,
    pub page_count: u32,
    pub has_text_layer: bool,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub sample_pages: u32,
    pub text_char_threshold: usize,
    pub min_direct_chars: usize,
    pub ocr_dpi: u32,
    pub tesseract_lang: String,
}

impl From<&ExtractionSettings> for RouterConfig {
    fn from(settings: &ExtractionSettings) -> Self {
        Self {
            sample_pages: settings.sample_pages,
            text_char_threshold: settings.text_char_threshold,
            min_direct_chars: settings.min_direct_chars,
            ocr_dpi: settings.ocr_dpi,
            tesseract_lang: settings.tesseract_lang.clone(),
        }
    }
}

/// Per-document extraction router.
pub struct ExtractionRouter {
    toolkit: PdfToolkit,
    ocr: TesseractOcr,
    config: RouterConfig,
}

impl ExtractionRouter {
    pub fn new(config: RouterConfig) -> Self {
        let ocr = TesseractOcr::new(&config.tesseract_lang);
        Self {
            toolkit: PdfToolkit,
            ocr,
            config,
        }
    }

    /// Classify a PDF by sampling embedded text from its page prefix.
    pub fn classify(&self, pdf_path: &Path, page_count: u32) -> PdfClass {
        let pages_to_sample = self.config.sample_pages.min(page_count).max(1);
        let mut sampled_chars = 0usize;

        for page in 1..=pages_to_sample {
            match self.toolkit.page_text(pdf_path, page) {
                Ok(text) => sampled_chars += countable_chars(&text),
                Err(e) => {
                    tracing::debug!(page, "page sampling failed: {e}");
                }
            }
            if sampled_chars >= self.config.text_char_threshold {
                break;
            }
        }

        if sampled_chars >= self.config.text_char_threshold {
            PdfClass::TextBearing { sampled_chars }
        } else {
            PdfClass::ImageOnly { sampled_chars }
        }
    }

    /// Extract text from one PDF end to end.
    ///
    /// Text-bearing documents that fail the direct path fall through to the
    /// OCR path; an error from this function means both paths failed (or the
    /// PDF itself is unreadable) and the document should be marked failed.
    pub fn extract(&self, pdf_path: &Path) -> Result<ExtractedText, ExtractionError> {
        let page_count = self.toolkit.page_count(pdf_path)?;
        let class = self.classify(pdf_path, page_count);

        if class.has_text_layer() {
            match self.extract_direct(pdf_path, page_count) {
                Ok(extracted) => return Ok(extracted),
                Err(e) => {
                    tracing::warn!("direct extraction failed, trying OCR: {e}");
                }
            }
        }

        self.extract_ocr(pdf_path, page_count, class.has_text_layer())
    }

    fn extract_direct(
        &self,
        pdf_path: &Path,
        page_count: u32,
    ) -> Result<ExtractedText, ExtractionError> {
        let text = self.toolkit.full_text(pdf_path)?;
        let chars = countable_chars(&text);
        if chars == 0 {
            return Err(ExtractionError::ExtractionFailed(
                "direct extraction produced no text".to_string(),
            ));
        }

        let confidence = if chars >= self.config.min_direct_chars {
            1.0
        } else {
            chars as f64 / self.config.min_direct_chars as f64
        };

        Ok(ExtractedText {
            text,
            method: ExtractionMethod::DirectText,
            confidence,
            page_count,
            has_text_layer: true,
        })
    }

    fn extract_ocr(
        &self,
        pdf_path: &Path,
        page_count: u32,
        has_text_layer: bool,
    ) -> Result<ExtractedText, ExtractionError> {
        let temp_dir = TempDir::new()?;
        let mut page_texts: Vec<String> = Vec::with_capacity(page_count as usize);
        let mut confidences: Vec<f64> = Vec::new();
        let mut last_error: Option<ExtractionError> = None;

        for page in 1..=page_count {
            match self.ocr_page(pdf_path, page, temp_dir.path()) {
                Ok((text, confidence)) => {
                    page_texts.push(text);
                    confidences.push(confidence);
                }
                Err(e) => {
                    tracing::warn!(page, "OCR failed for page: {e}");
                    last_error = Some(e);
                }
            }
        }

        if page_texts.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                ExtractionError::ExtractionFailed("no pages could be OCR'd".to_string())
            }));
        }

        let confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;
        Ok(ExtractedText {
            text: page_texts.join("\n\n"),
            method: ExtractionMethod::Ocr,
            confidence,
            page_count,
            has_text_layer,
        })
    }

    /// Render, preprocess, and recognize a single page.
    fn ocr_page(
        &self,
        pdf_path: &Path,
        page: u32,
        scratch: &Path,
    ) -> Result<(String, f64), ExtractionError> {
        let rendered = self
            .toolkit
            .render_page(pdf_path, page, self.config.ocr_dpi, scratch)?;

        let image = image::open(&rendered)
            .map_err(|e| ExtractionError::Preprocess(format!("cannot load page image: {e}")))?;
        let cleaned = preprocess::preprocess(&image);

        let cleaned_path = scratch.join(format!("clean-{page}.png"));
        cleaned
            .save(&cleaned_path)
            .map_err(|e| ExtractionError::Preprocess(format!("cannot save page image: {e}")))?;

        let ocr_page = self.ocr.recognize(&cleaned_path)?;
        Ok((ocr_page.text, ocr_page.confidence))
    }
}
