use std::path::{Path, PathBuf};

use tempfile::TempDir;

use finex_core::config::{TextConfig, TextLayerKind};
use finex_core::document::{Document, ExtractedText, ExtractionMethod, PageText};
use finex_core::error::{FinexError, Result};

use crate::layer::{LopdfTextLayer, PdftotextLayer, TextLayer};
use crate::ocr::{OcrEngine, TesseractOcr};
use crate::pdf::PdfHandle;
use crate::tools;

/// Text extraction with an OCR fallback.
///
/// The text layer is tried first for every selected page. When it fails, or
/// when everything it returns is whitespace, each selected page is OCR'd
/// instead. Either the full text of the selection comes back or an error does.
///
/// Methods are never mixed within a document: a scanned page inside a text
/// document stays empty, and is reported by [`ExtractedText::blank_pages`]
/// and a warning.
pub struct TextExtractor {
    layer: Box<dyn TextLayer>,
    ocr: Box<dyn OcrEngine>,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(Box::new(LopdfTextLayer), Box::new(TesseractOcr::default()))
    }
}

impl TextExtractor {
    pub fn new(layer: Box<dyn TextLayer>, ocr: Box<dyn OcrEngine>) -> Self {
        Self { layer, ocr }
    }

    pub fn from_config(config: &TextConfig) -> Self {
        let layer: Box<dyn TextLayer> = match config.layer {
            TextLayerKind::Lopdf => Box::new(LopdfTextLayer),
            TextLayerKind::Pdftotext => Box::new(PdftotextLayer),
        };
        let ocr = TesseractOcr::new(&config.ocr_language, config.ocr_dpi);
        Self::new(layer, Box::new(ocr))
    }

    /// Text of every page.
    pub fn extract(&self, document: &Document) -> Result<ExtractedText> {
        self.extract_pages(document, None)
    }

    /// Text of the first `limit` pages (all pages when `None`). A limit past the
    /// end of the document is clamped to the page count.
    pub fn extract_pages(&self, document: &Document, limit: Option<u32>) -> Result<ExtractedText> {
        let pdf = PdfHandle::open(document)?;
        let last = match limit {
            None => pdf.page_count(),
            Some(0) => {
                return Err(FinexError::PageIndex {
                    requested: 0,
                    page_count: pdf.page_count(),
                })
            }
            Some(n) => n.min(pdf.page_count()),
        };
        let pages: Vec<u32> = (1..=last).collect();
        self.run(&pdf, &pages)
    }

    /// Text of a single 1-based page.
    pub fn extract_page(&self, document: &Document, page: u32) -> Result<ExtractedText> {
        let pdf = PdfHandle::open(document)?;
        pdf.check_page(page)?;
        self.run(&pdf, &[page])
    }

    pub fn page_count(&self, document: &Document) -> Result<u32> {
        Ok(PdfHandle::open(document)?.page_count())
    }

    /// Render `page` at `dpi` and write it to `output` as PNG.
    pub fn export_page_image(
        &self,
        document: &Document,
        page: u32,
        dpi: u32,
        output: &Path,
    ) -> Result<PathBuf> {
        let pdf = PdfHandle::open(document)?;
        pdf.check_page(page)?;
        let temp = TempDir::new()?;
        let image = tools::render_page_png(pdf.path()?, page, dpi, temp.path())?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&image, output)?;
        tracing::info!(document = %pdf.name(), page, dpi, output = %output.display(), "Exported page image");
        Ok(output.to_path_buf())
    }

    fn run(&self, pdf: &PdfHandle, pages: &[u32]) -> Result<ExtractedText> {
        let primary = self.collect(pdf, pages, |page| self.layer.page_text(pdf, page));

        let primary_outcome = match primary {
            Ok(texts) if !is_blank(&texts) => {
                let text = self.assemble(pdf, texts, ExtractionMethod::TextLayer, self.layer.name());
                let blank = text.blank_pages();
                if !blank.is_empty() {
                    tracing::warn!(
                        document = %pdf.name(),
                        pages = ?blank,
                        "Pages without selectable text were left empty"
                    );
                }
                tracing::info!(
                    document = %pdf.name(),
                    pages = pages.len(),
                    backend = self.layer.name(),
                    "Extracted text layer"
                );
                return Ok(text);
            }
            Ok(_) => "no selectable text".to_string(),
            Err(e) => e.to_string(),
        };

        tracing::info!(
            document = %pdf.name(),
            backend = self.layer.name(),
            reason = %primary_outcome,
            "Text layer unusable, falling back to OCR"
        );

        let ocr_outcome = match self.collect(pdf, pages, |page| self.ocr.recognize_page(pdf, page)) {
            Ok(texts) if !is_blank(&texts) => {
                tracing::info!(
                    document = %pdf.name(),
                    pages = pages.len(),
                    backend = self.ocr.name(),
                    "Extracted text with OCR"
                );
                return Ok(self.assemble(pdf, texts, ExtractionMethod::Ocr, self.ocr.name()));
            }
            Ok(_) => "OCR found no text".to_string(),
            Err(e) => e.to_string(),
        };

        Err(FinexError::unreadable(
            pdf.name(),
            format!(
                "{}: {primary_outcome}; {}: {ocr_outcome}",
                self.layer.name(),
                self.ocr.name()
            ),
        ))
    }

    fn collect(
        &self,
        pdf: &PdfHandle,
        pages: &[u32],
        read: impl Fn(u32) -> Result<String>,
    ) -> Result<Vec<PageText>> {
        pages
            .iter()
            .map(|&number| {
                read(number).map(|text| PageText { number, text }).map_err(|e| {
                    tracing::warn!(document = %pdf.name(), page = number, error = %e, "Page extraction failed");
                    e
                })
            })
            .collect()
    }

    fn assemble(
        &self,
        pdf: &PdfHandle,
        pages: Vec<PageText>,
        method: ExtractionMethod,
        backend: &str,
    ) -> ExtractedText {
        ExtractedText {
            source: pdf.name().to_string(),
            page_count: pdf.page_count(),
            pages,
            method,
            backend: backend.to_string(),
        }
    }
}

fn is_blank(pages: &[PageText]) -> bool {
    pages.iter().all(|p| p.text.trim().is_empty())
}
