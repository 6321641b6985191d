//! Fixtures shared by the integration tests: generated PDFs, a counting OCR
//! engine and canned model answers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream};

use finex_core::error::Result;
use finex_text::{OcrEngine, PdfHandle};

/// Build a PDF with one page per entry. Each non-empty entry becomes a single
/// line of Courier text; an empty entry yields a page with no text at all,
/// like a scanned page.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let pages = pages
        .iter()
        .map(|text| {
            if text.is_empty() {
                Vec::new()
            } else {
                text_block(&[Operation::new("Tj", vec![Object::string_literal(*text)])])
            }
        })
        .collect();
    pdf_with_operations(pages)
}

/// Wrap `body` in a text object positioned at the top left in 12pt Courier.
pub fn text_block(body: &[Operation]) -> Vec<Operation> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
    ];
    operations.extend_from_slice(body);
    operations.push(Operation::new("ET", vec![]));
    operations
}

/// Build a PDF with one page per content stream. The font `F1` is Courier.
pub fn pdf_with_operations(pages: Vec<Vec<Operation>>) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize PDF");
    bytes
}

/// OCR stand-in that returns `text` for every page and counts its calls.
pub struct CountingOcr {
    text: String,
    calls: Arc<AtomicUsize>,
}

impl CountingOcr {
    pub fn new(text: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                text: text.to_string(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl OcrEngine for CountingOcr {
    fn name(&self) -> &'static str {
        "counting-ocr"
    }

    fn recognize_page(&self, _pdf: &PdfHandle, page: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} (page {page})", self.text))
    }
}

/// A complete answer for the built-in financial statement schema.
pub fn financial_statement_answer() -> serde_json::Value {
    serde_json::json!({
        "empresa": "Rominor Empreendimentos Imobiliarios S.A.",
        "unidade_monetaria": "R$ mil",
        "ativo_circulante": ["Ativo Circulante: 1.000.000"],
        "ativo_nao_circulante": ["Imobilizado: 350.000"],
        "passivo_circulante": ["Fornecedores: 120.000"],
        "passivo_nao_circulante": ["Emprestimos: 80.000"],
        "patrimonio_liquido": ["Capital Social: 500.000"],
        "demonstracao_do_resultado": ["Receita Liquida: 2.300.000"],
        "datas": ["31/12/2023", "31/12/2022"]
    })
}
