use std::process::Command;

use lopdf::content::{Content, Operation};
use lopdf::Object;

use finex_core::error::{FinexError, Result};

use crate::pdf::PdfHandle;
use crate::tools::{self, PDFTOTEXT};

/// Primary strategy: read the selectable text of one page.
pub trait TextLayer: Send + Sync {
    fn name(&self) -> &'static str;
    fn page_text(&self, pdf: &PdfHandle, page: u32) -> Result<String>;
}

/// In-process extraction from the PDF content streams.
///
/// Text positioning operators become whitespace: a vertical move starts a new
/// line and a horizontal move or a wide `TJ` gap becomes a space, so statement
/// rows keep their label and value apart. Strings are decoded as single-byte
/// text; when that disagrees with lopdf's own font-aware decoding (composite
/// fonts, custom encodings) lopdf's text is returned unchanged.
#[derive(Debug, Default)]
pub struct LopdfTextLayer;

impl TextLayer for LopdfTextLayer {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn page_text(&self, pdf: &PdfHandle, page: u32) -> Result<String> {
        let doc = pdf
            .lopdf()
            .ok_or_else(|| lopdf_error(format!("{} could not be parsed in-process", pdf.name())))?;
        let decoded = doc
            .extract_text(&[page])
            .map_err(|e| lopdf_error(format!("page {page}: {e}")))?;

        let Some(page_id) = doc.get_pages().get(&page).copied() else {
            return Ok(decoded);
        };
        let operations = match doc
            .get_page_content(page_id)
            .and_then(|bytes| Content::decode(&bytes))
        {
            Ok(content) => content.operations,
            Err(e) => {
                tracing::debug!(document = %pdf.name(), page, error = %e, "Content stream not decodable, keeping lopdf text");
                return Ok(decoded);
            }
        };

        let laid_out = layout_text(&operations);
        if without_whitespace(&laid_out) == without_whitespace(&decoded) {
            Ok(laid_out)
        } else {
            tracing::debug!(document = %pdf.name(), page, "Layout text differs from font-aware decoding, keeping lopdf text");
            Ok(decoded)
        }
    }
}

fn lopdf_error(message: String) -> FinexError {
    FinexError::Tool {
        tool: "lopdf".into(),
        message,
    }
}

/// `TJ` adjustments below this (thousandths of an em) read as a word gap.
const TJ_GAP: f32 = -200.0;

#[derive(Clone, Copy, PartialEq)]
enum Break {
    None,
    Space,
    Line,
}

/// Walk text-showing operators, turning position changes into whitespace.
pub(crate) fn layout_text(operations: &[Operation]) -> String {
    let mut out = String::new();
    let mut pending = Break::None;
    let mut line_y: Option<f32> = None;

    for op in operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "Td" | "TD" => {
                let ty = operands.get(1).and_then(number).unwrap_or(0.0);
                let tx = operands.first().and_then(number).unwrap_or(0.0);
                if ty != 0.0 {
                    pending = Break::Line;
                } else if tx != 0.0 {
                    pending = pending.max_with(Break::Space);
                }
            }
            "Tm" => {
                let y = operands.get(5).and_then(number);
                pending = match (line_y, y) {
                    (Some(prev), Some(y)) if prev == y => pending.max_with(Break::Space),
                    _ => Break::Line,
                };
                line_y = y;
            }
            "T*" => pending = Break::Line,
            "Tj" => push_strings(&mut out, &mut pending, operands),
            "'" | "\"" => {
                pending = Break::Line;
                if let Some(last) = operands.last() {
                    push_strings(&mut out, &mut pending, std::slice::from_ref(last));
                }
            }
            "TJ" => {
                for item in operands.iter().flat_map(|o| match o {
                    Object::Array(items) => items.as_slice(),
                    other => std::slice::from_ref(other),
                }) {
                    match item {
                        Object::String(..) => push_strings(&mut out, &mut pending, std::slice::from_ref(item)),
                        other => {
                            if number(other).is_some_and(|gap| gap < TJ_GAP) {
                                pending = pending.max_with(Break::Space);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

impl Break {
    fn max_with(self, other: Break) -> Break {
        match (self, other) {
            (Break::Line, _) | (_, Break::Line) => Break::Line,
            (Break::Space, _) | (_, Break::Space) => Break::Space,
            _ => Break::None,
        }
    }
}

fn push_strings(out: &mut String, pending: &mut Break, operands: &[Object]) {
    for operand in operands {
        let Object::String(bytes, _) = operand else {
            continue;
        };
        if bytes.is_empty() {
            continue;
        }
        if !out.is_empty() {
            match *pending {
                Break::Line if !out.ends_with('\n') => out.push('\n'),
                Break::Space if !out.ends_with(char::is_whitespace) => out.push(' '),
                _ => {}
            }
        }
        *pending = Break::None;
        out.extend(bytes.iter().map(|&b| char::from(b)));
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn without_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Poppler `pdftotext -layout`, which keeps column alignment of statement tables.
#[derive(Debug, Default)]
pub struct PdftotextLayer;

impl TextLayer for PdftotextLayer {
    fn name(&self) -> &'static str {
        PDFTOTEXT
    }

    fn page_text(&self, pdf: &PdfHandle, page: u32) -> Result<String> {
        let page_arg = page.to_string();
        let output = Command::new(PDFTOTEXT)
            .args(["-layout", "-enc", "UTF-8", "-f", &page_arg, "-l", &page_arg])
            .arg(pdf.path()?)
            .arg("-")
            .output();
        tools::command_stdout(output, PDFTOTEXT, &format!("pdftotext failed on page {page}"))
    }
}
