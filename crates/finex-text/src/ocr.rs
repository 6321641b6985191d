use finex_core::error::Result;

use crate::pdf::PdfHandle;
use crate::tools;

pub const DEFAULT_DPI: u32 = 300;

/// Fallback strategy: recognise the text of one rendered page.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;
    fn recognize_page(&self, pdf: &PdfHandle, page: u32) -> Result<String>;
}

/// Tesseract over pdftoppm bitmaps.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    language: String,
    dpi: u32,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            language: "por".to_string(),
            dpi: DEFAULT_DPI,
        }
    }
}

impl TesseractOcr {
    pub fn new(language: &str, dpi: u32) -> Self {
        Self {
            language: language.to_string(),
            dpi,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }
}

impl OcrEngine for TesseractOcr {
    fn name(&self) -> &'static str {
        tools::TESSERACT
    }

    fn recognize_page(&self, pdf: &PdfHandle, page: u32) -> Result<String> {
        tracing::debug!(document = %pdf.name(), page, dpi = self.dpi, lang = %self.language, "Running OCR on page");
        tools::ocr_page(pdf.path()?, page, self.dpi, &self.language)
    }
}
