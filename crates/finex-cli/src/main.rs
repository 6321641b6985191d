use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use finex_core::{AppConfig, Document, FieldSchema};
use finex_pipeline::DocumentPipeline;
use finex_text::TextExtractor;

#[derive(Parser)]
#[command(name = "finex", version, about = "Extract structured fields from financial statement PDFs")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and print the extracted fields
    Extract {
        #[arg(required = true)]
        pdfs: Vec<PathBuf>,
        /// Only read the first N pages of each document
        #[arg(long)]
        pages: Option<u32>,
        /// Print results as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Print the extracted text of a document
    Text {
        pdf: PathBuf,
        /// A single 1-based page
        #[arg(long, conflicts_with = "pages")]
        page: Option<u32>,
        /// Only the first N pages
        #[arg(long)]
        pages: Option<u32>,
    },
    /// Render a page to a PNG file
    Render {
        pdf: PathBuf,
        #[arg(long)]
        page: u32,
        #[arg(long, short)]
        output: PathBuf,
        #[arg(long, default_value_t = finex_text::DEFAULT_DPI)]
        dpi: u32,
    },
    /// Print the JSON Schema sent to the model
    Schema,
    /// Report which external PDF/OCR tools are installed
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "finex=debug" } else { "finex=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::from_env();

    match cli.command {
        Command::Extract { pdfs, pages, json } => extract(&config, pdfs, pages, json).await,
        Command::Text { pdf, page, pages } => {
            let extractor = TextExtractor::from_config(&config.text);
            let document = Document::from_path(pdf);
            let text = tokio::task::spawn_blocking(move || match page {
                Some(page) => extractor.extract_page(&document, page),
                None => extractor.extract_pages(&document, pages),
            })
            .await??;
            tracing::info!(method = ?text.method, backend = %text.backend, pages = text.pages.len(), "Text extracted");
            println!("{}", text.text());
            Ok(())
        }
        Command::Render {
            pdf,
            page,
            output,
            dpi,
        } => {
            let extractor = TextExtractor::from_config(&config.text);
            let written = extractor.export_page_image(&Document::from_path(pdf), page, dpi, &output)?;
            println!("{}", written.display());
            Ok(())
        }
        Command::Schema => {
            let schema = match &config.schema_path {
                Some(path) => FieldSchema::from_toml_file(path)
                    .with_context(|| format!("loading schema from {}", path.display()))?,
                None => FieldSchema::financial_statement(),
            };
            println!("{}", serde_json::to_string_pretty(&schema.to_json_schema())?);
            Ok(())
        }
        Command::Tools => {
            for (tool, available) in finex_text::check_tools() {
                println!("{tool}: {}", if available { "found" } else { "missing" });
            }
            Ok(())
        }
    }
}

async fn extract(config: &AppConfig, pdfs: Vec<PathBuf>, pages: Option<u32>, json: bool) -> anyhow::Result<()> {
    let pipeline = DocumentPipeline::from_config(config)
        .context("configuring pipeline")?
        .with_page_limit(pages);
    let documents: Vec<Document> = pdfs.into_iter().map(Document::from_path).collect();

    let mut failed = 0;
    for (name, outcome) in pipeline.run_batch(&documents).await {
        match outcome {
            Ok(result) if json => {
                let line = serde_json::json!({ "source": name, "fields": result.to_json() });
                println!("{line}");
            }
            Ok(result) => {
                println!("== {name} ({:?}, {})", result.method, result.model);
                println!("{}", serde_json::to_string_pretty(&result.to_json())?);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{name}: {e}");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} documents failed", documents.len());
    }
    Ok(())
}
