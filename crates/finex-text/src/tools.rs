//! Poppler and Tesseract command-line helpers.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};

use tempfile::TempDir;

use finex_core::error::{FinexError, Result};

pub const PDFTOTEXT: &str = "pdftotext";
pub const PDFTOPPM: &str = "pdftoppm";
pub const PDFINFO: &str = "pdfinfo";
pub const TESSERACT: &str = "tesseract";

/// Stdout of a finished command, or the matching error.
pub(crate) fn command_stdout(result: io::Result<Output>, tool: &str, context: &str) -> Result<String> {
    match result {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => Err(FinexError::Tool {
            tool: tool.to_string(),
            message: format!("{context}: {}", String::from_utf8_lossy(&output.stderr).trim()),
        }),
        Err(e) => Err(spawn_error(e, tool)),
    }
}

pub(crate) fn command_status(result: io::Result<ExitStatus>, tool: &str, context: &str) -> Result<()> {
    match result {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(FinexError::Tool {
            tool: tool.to_string(),
            message: format!("{context} ({status})"),
        }),
        Err(e) => Err(spawn_error(e, tool)),
    }
}

fn spawn_error(e: io::Error, tool: &str) -> FinexError {
    if e.kind() == io::ErrorKind::NotFound {
        FinexError::Tool {
            tool: tool.to_string(),
            message: "not found on PATH (install poppler-utils / tesseract-ocr)".to_string(),
        }
    } else {
        FinexError::Io(e)
    }
}

/// Page count as reported by `pdfinfo`.
pub(crate) fn pdfinfo_page_count(pdf: &Path) -> Result<u32> {
    let output = Command::new(PDFINFO).arg(pdf).output();
    let stdout = command_stdout(output, PDFINFO, "pdfinfo failed")?;
    parse_pdfinfo_pages(&stdout).ok_or_else(|| FinexError::Tool {
        tool: PDFINFO.to_string(),
        message: "no `Pages:` line in pdfinfo output".to_string(),
    })
}

fn parse_pdfinfo_pages(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|n| n.parse().ok())
}

/// Render one page to PNG inside `dir`, returning the image path.
pub(crate) fn render_page_png(pdf: &Path, page: u32, dpi: u32, dir: &Path) -> Result<PathBuf> {
    let page_arg = page.to_string();
    let dpi_arg = dpi.to_string();
    let status = Command::new(PDFTOPPM)
        .args(["-png", "-r", &dpi_arg, "-f", &page_arg, "-l", &page_arg])
        .arg(pdf)
        .arg(dir.join("page"))
        .status();
    command_status(status, PDFTOPPM, &format!("pdftoppm failed on page {page}"))?;

    find_page_image(dir, page).ok_or_else(|| FinexError::Tool {
        tool: PDFTOPPM.to_string(),
        message: format!("no image generated for page {page}"),
    })
}

/// pdftoppm zero-pads page numbers to the width of the document's page count.
fn find_page_image(dir: &Path, page: u32) -> Option<PathBuf> {
    (1..=6)
        .map(|width| dir.join(format!("page-{page:0width$}.png")))
        .find(|path| path.exists())
}

/// Render `page` and run Tesseract over the bitmap.
pub(crate) fn ocr_page(pdf: &Path, page: u32, dpi: u32, language: &str) -> Result<String> {
    let temp = TempDir::new()?;
    let image = render_page_png(pdf, page, dpi, temp.path())?;
    let output = Command::new(TESSERACT)
        .arg(&image)
        .arg("stdout")
        .args(["-l", language])
        .output();
    command_stdout(output, TESSERACT, &format!("tesseract failed on page {page}"))
}

/// Which external tools are on PATH.
pub fn check_tools() -> Vec<(&'static str, bool)> {
    [PDFTOTEXT, PDFTOPPM, PDFINFO, TESSERACT]
        .into_iter()
        .map(|tool| (tool, which::which(tool).is_ok()))
        .collect()
}
