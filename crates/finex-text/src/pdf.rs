use std::io::Write;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tempfile::NamedTempFile;

use finex_core::document::{Document, DocumentSource};
use finex_core::error::{FinexError, Result};

use crate::tools;

/// An opened PDF: parsed with lopdf when possible, with a page count either way.
pub struct PdfHandle {
    name: String,
    source: DocumentSource,
    parsed: Option<lopdf::Document>,
    page_count: u32,
    spill: OnceLock<NamedTempFile>,
}

impl PdfHandle {
    /// Open `document`. Fails with `DocumentUnreadable` when neither lopdf nor
    /// pdfinfo can make sense of it.
    pub fn open(document: &Document) -> Result<Self> {
        let name = document.name();
        let bytes: Arc<[u8]> = match &document.source {
            DocumentSource::Path(path) => std::fs::read(path)
                .map_err(|e| FinexError::unreadable(&name, format!("cannot read {}: {e}", path.display())))?
                .into(),
            DocumentSource::Bytes { data, .. } => data.clone(),
        };

        let mut handle = Self {
            name: name.clone(),
            source: document.source.clone(),
            parsed: None,
            page_count: 0,
            spill: OnceLock::new(),
        };

        match lopdf::Document::load_mem(&bytes) {
            Ok(doc) => {
                handle.page_count = doc.get_pages().len() as u32;
                handle.parsed = Some(doc);
            }
            Err(parse_err) => {
                tracing::debug!(document = %name, error = %parse_err, "lopdf could not parse document, asking pdfinfo");
                let path = handle
                    .path()
                    .map_err(|e| FinexError::unreadable(&name, format!("lopdf: {parse_err}; {e}")))?;
                let count = tools::pdfinfo_page_count(path).map_err(|info_err| {
                    FinexError::unreadable(&name, format!("lopdf: {parse_err}; pdfinfo: {info_err}"))
                })?;
                handle.page_count = count;
            }
        }

        if handle.page_count == 0 {
            return Err(FinexError::unreadable(&name, "document has no pages"));
        }

        tracing::debug!(document = %name, pages = handle.page_count, parsed = handle.parsed.is_some(), "Opened PDF");
        Ok(handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn lopdf(&self) -> Option<&lopdf::Document> {
        self.parsed.as_ref()
    }

    /// Check a 1-based page number against the document.
    pub fn check_page(&self, page: u32) -> Result<()> {
        if page == 0 || page > self.page_count {
            return Err(FinexError::PageIndex {
                requested: page,
                page_count: self.page_count,
            });
        }
        Ok(())
    }

    /// A filesystem path for external tools. In-memory documents are spilled to
    /// a temporary file on first use, removed when the handle drops.
    pub fn path(&self) -> Result<&Path> {
        let data = match &self.source {
            DocumentSource::Path(path) => return Ok(path),
            DocumentSource::Bytes { data, .. } => data,
        };
        if self.spill.get().is_none() {
            let mut file = tempfile::Builder::new()
                .prefix("finex-")
                .suffix(".pdf")
                .tempfile()?;
            file.write_all(data)?;
            file.flush()?;
            let _ = self.spill.set(file);
        }
        self.spill
            .get()
            .map(NamedTempFile::path)
            .ok_or_else(|| FinexError::Internal("temporary PDF copy vanished".into()))
    }
}
