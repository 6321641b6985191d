use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Where a PDF comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes { name: String, data: Arc<[u8]> },
}

/// An input PDF. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: DocumentSource,
}

impl Document {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: DocumentSource::Path(path.into()),
        }
    }

    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            source: DocumentSource::Bytes {
                name: name.into(),
                data: data.into(),
            },
        }
    }

    /// Display name used in logs and errors.
    pub fn name(&self) -> String {
        match &self.source {
            DocumentSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            DocumentSource::Bytes { name, .. } => name.clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            DocumentSource::Path(path) => Some(path),
            DocumentSource::Bytes { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Selectable text read from the PDF content streams.
    TextLayer,
    /// Page bitmaps run through OCR.
    Ocr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
}

/// Text derived from a [`Document`], one entry per selected page in page order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub source: String,
    pub page_count: u32,
    pub pages: Vec<PageText>,
    pub method: ExtractionMethod,
    /// Name of the text layer or OCR engine that produced the pages.
    pub backend: String,
}

impl ExtractedText {
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }

    /// Numbers of selected pages with no text, e.g. scans inside a text document.
    pub fn blank_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .filter(|p| p.text.trim().is_empty())
            .map(|p| p.number)
            .collect()
    }

    /// Non-whitespace characters across all pages.
    pub fn char_count(&self) -> usize {
        self.pages
            .iter()
            .map(|p| p.text.chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pages: &[&str]) -> ExtractedText {
        ExtractedText {
            source: "sample.pdf".into(),
            page_count: pages.len() as u32,
            pages: pages
                .iter()
                .enumerate()
                .map(|(i, t)| PageText {
                    number: i as u32 + 1,
                    text: t.to_string(),
                })
                .collect(),
            method: ExtractionMethod::TextLayer,
            backend: "lopdf".into(),
        }
    }

    #[test]
    fn text_joins_pages_in_order() {
        let text = sample(&["Balanço", "Ativo Circulante: 1.000.000"]);
        assert_eq!(text.text(), "Balanço\nAtivo Circulante: 1.000.000");
        assert!(!text.is_blank());
    }

    #[test]
    fn blank_pages_lists_empty_page_numbers() {
        let text = sample(&["Balanço", " \n", "DRE", ""]);
        assert_eq!(text.blank_pages(), vec![2, 4]);
        assert!(sample(&["x"]).blank_pages().is_empty());
    }

    #[test]
    fn whitespace_pages_are_blank() {
        let text = sample(&["  \n", "\t"]);
        assert!(text.is_blank());
        assert_eq!(text.char_count(), 0);
    }

    #[test]
    fn document_names() {
        assert_eq!(Document::from_path("/data/rominor.pdf").name(), "rominor.pdf");
        let doc = Document::from_bytes("upload.pdf", vec![1u8, 2, 3]);
        assert_eq!(doc.name(), "upload.pdf");
        assert!(doc.path().is_none());
    }
}
