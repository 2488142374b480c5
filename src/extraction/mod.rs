//! Text extraction from disclosure PDFs.
//!
//! Two paths share one entry point: documents with an embedded text layer go
//! through poppler's `pdftotext`, image-only scans go through a render,
//! preprocess, Tesseract pipeline. The [`ExtractionRouter`] decides per
//! document by sampling a bounded page prefix.

mod extractor;
mod ocr;
pub mod preprocess;
mod router;

pub use extractor::{countable_chars, ExtractionError, PdfToolkit};
pub use ocr::{OcrPage, TesseractOcr};
pub use router::{ExtractedText, ExtractionRouter, PdfClass, RouterConfig};
