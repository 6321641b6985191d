//! PDF text extraction: a text layer first, Tesseract OCR when the text layer
//! has nothing to offer.

mod extractor;
mod layer;
mod ocr;
mod pdf;
mod tools;

pub use extractor::TextExtractor;
pub use layer::{LopdfTextLayer, PdftotextLayer, TextLayer};
pub use ocr::{OcrEngine, TesseractOcr, DEFAULT_DPI};
pub use pdf::PdfHandle;
pub use tools::check_tools;
