use std::sync::Arc;

use serde::Serialize;

use finex_core::config::AppConfig;
use finex_core::document::{Document, ExtractedText, ExtractionMethod};
use finex_core::error::{FinexError, Result};
use finex_core::extraction::{ExtractionResult, FieldExtractor};
use finex_core::prompt::Instructions;
use finex_core::record::LogLevel;
use finex_core::schema::FieldSchema;
use finex_extraction::LlmFieldExtractor;
use finex_text::TextExtractor;

use crate::logger::{JsonlFileSink, ResultLogger};

#[derive(Debug, Serialize)]
struct TextExtracted<'a> {
    source: &'a str,
    method: ExtractionMethod,
    backend: &'a str,
    pages: usize,
    page_count: u32,
    chars: usize,
}

#[derive(Debug, Serialize)]
struct FieldExtraction<'a> {
    id: uuid::Uuid,
    source: &'a str,
    schema: &'a str,
    method: ExtractionMethod,
    model: &'a str,
    fields: serde_json::Value,
}

impl<'a> From<&'a ExtractionResult> for FieldExtraction<'a> {
    fn from(result: &'a ExtractionResult) -> Self {
        Self {
            id: result.id,
            source: &result.source,
            schema: &result.schema,
            method: result.method,
            model: &result.model,
            fields: result.to_json(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResultType<'a> {
    result_type: &'static str,
    schema: &'a str,
    fields: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct PipelineFailed<'a> {
    source: &'a str,
    error: String,
}

/// Text extraction → field extraction → result logging for one document at a time.
pub struct DocumentPipeline {
    extractor: Arc<TextExtractor>,
    agent: Arc<dyn FieldExtractor>,
    schema: Arc<FieldSchema>,
    instructions: Arc<Instructions>,
    logger: ResultLogger,
    page_limit: Option<u32>,
}

impl DocumentPipeline {
    pub fn new(
        extractor: Arc<TextExtractor>,
        agent: Arc<dyn FieldExtractor>,
        schema: Arc<FieldSchema>,
        instructions: Arc<Instructions>,
        logger: ResultLogger,
    ) -> Self {
        Self {
            extractor,
            agent,
            schema,
            instructions,
            logger,
            page_limit: None,
        }
    }

    /// Wire the production components from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let schema = match &config.schema_path {
            Some(path) => FieldSchema::from_toml_file(path)?,
            None => FieldSchema::financial_statement(),
        };
        let instructions = match &config.prompts_path {
            Some(path) => Instructions::from_toml_file(path)?,
            None => Instructions::default(),
        };
        let mut logger = ResultLogger::new();
        if let Some(path) = &config.log_sink {
            logger = logger.with_sink(Arc::new(JsonlFileSink::new(path)));
        }

        tracing::info!(
            schema = schema.name(),
            fields = schema.fields().len(),
            model = %config.provider.model,
            text_layer = ?config.text.layer,
            "Pipeline configured"
        );

        Ok(Self::new(
            Arc::new(TextExtractor::from_config(&config.text)),
            Arc::new(LlmFieldExtractor::from_config(&config.provider)?),
            Arc::new(schema),
            Arc::new(instructions),
            logger,
        ))
    }

    pub fn with_page_limit(mut self, limit: Option<u32>) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Text extraction only, off the async runtime's worker threads.
    pub async fn extract_text(&self, document: &Document) -> Result<ExtractedText> {
        let extractor = self.extractor.clone();
        let document = document.clone();
        let limit = self.page_limit;
        tokio::task::spawn_blocking(move || extractor.extract_pages(&document, limit))
            .await
            .map_err(|e| FinexError::Internal(format!("text extraction task failed: {e}")))?
    }

    pub async fn run(&self, document: &Document) -> Result<ExtractionResult> {
        let name = document.name();
        match self.run_stages(document).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::error!(document = %name, error = %e, "Pipeline failed");
                self.logger.record(
                    "pipeline_failed",
                    &PipelineFailed {
                        source: &name,
                        error: e.to_string(),
                    },
                    LogLevel::Info,
                );
                Err(e)
            }
        }
    }

    async fn run_stages(&self, document: &Document) -> Result<ExtractionResult> {
        let text = self.extract_text(document).await?;
        self.logger.record(
            "text_extracted",
            &TextExtracted {
                source: &text.source,
                method: text.method,
                backend: &text.backend,
                pages: text.pages.len(),
                page_count: text.page_count,
                chars: text.char_count(),
            },
            LogLevel::Info,
        );

        let result = self
            .agent
            .extract_fields(&text, &self.schema, &self.instructions)
            .await?;

        self.logger.record(
            "field_extraction",
            &FieldExtraction::from(&result),
            LogLevel::Notice,
        );
        self.logger.record(
            "field_extraction.type",
            &ResultType {
                result_type: std::any::type_name::<ExtractionResult>(),
                schema: &result.schema,
                fields: result.field_names(),
            },
            LogLevel::Info,
        );

        Ok(result)
    }

    /// Run each document independently, in order. A failure is reported for its
    /// document and does not stop the rest.
    pub async fn run_batch(&self, documents: &[Document]) -> Vec<(String, Result<ExtractionResult>)> {
        tracing::info!(count = documents.len(), "Starting batch");
        let mut outcomes = Vec::with_capacity(documents.len());
        for document in documents {
            let outcome = self.run(document).await;
            outcomes.push((document.name(), outcome));
        }

        let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(
                succeeded = outcomes.len() - failed,
                failed,
                "Batch completed with failures"
            );
        } else {
            tracing::info!(count = outcomes.len(), "Batch completed");
        }
        outcomes
    }
}
