use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use finex_core::config::ProviderConfig;
use finex_core::document::ExtractedText;
use finex_core::error::{FieldViolation, FinexError, Result, SchemaViolations};
use finex_core::extraction::{ExtractionResult, FieldExtractor};
use finex_core::prompt::Instructions;
use finex_core::schema::FieldSchema;

use crate::openai::OpenAiChatProvider;
use crate::provider::{ChatProvider, ExtractionRequest, ModelSettings};

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Maps document text onto a [`FieldSchema`] through a chat model.
///
/// Holds only read-only configuration; each call builds its own
/// [`ExtractionRequest`].
pub struct LlmFieldExtractor {
    provider: Arc<dyn ChatProvider>,
    settings: ModelSettings,
    max_retries: u32,
    backoff_base: Duration,
}

impl LlmFieldExtractor {
    pub fn new(provider: Arc<dyn ChatProvider>, settings: ModelSettings) -> Self {
        Self {
            provider,
            settings,
            max_retries: 0,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let provider = Arc::new(OpenAiChatProvider::new(config)?);
        Ok(Self::new(provider, ModelSettings::from_config(config))
            .with_backoff(config.max_retries, DEFAULT_BACKOFF_BASE))
    }

    /// Retry rate-limited and timed-out calls up to `max_retries` times,
    /// doubling the delay from `base` each attempt, up to 30 seconds.
    pub fn with_backoff(mut self, max_retries: u32, base: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff_base = base;
        self
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    async fn complete_with_backoff(&self, request: &ExtractionRequest) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.provider.complete(request).await {
                Err(FinexError::Provider(e)) if e.kind.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        provider = self.provider.name(),
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient provider error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    }

    /// Parse the model's answer into JSON, tolerating markdown code fences.
    fn parse_model_output(raw: &str) -> Result<serde_json::Value> {
        let cleaned = raw.trim();
        let cleaned = if cleaned.starts_with("```") {
            let start = cleaned.find('{').unwrap_or(0);
            let end = cleaned.rfind('}').map(|i| i + 1).unwrap_or(cleaned.len());
            &cleaned[start..end.max(start)]
        } else {
            cleaned
        };

        serde_json::from_str(cleaned).map_err(|e| {
            tracing::error!(raw = %cleaned, error = %e, "Model output is not valid JSON");
            FinexError::SchemaValidation(SchemaViolations(vec![FieldViolation::NotJson {
                message: e.to_string(),
            }]))
        })
    }
}

#[async_trait]
impl FieldExtractor for LlmFieldExtractor {
    async fn extract_fields(
        &self,
        text: &ExtractedText,
        schema: &FieldSchema,
        instructions: &Instructions,
    ) -> Result<ExtractionResult> {
        if text.is_blank() {
            return Err(FinexError::unreadable(
                &text.source,
                "no text to extract fields from",
            ));
        }

        tracing::info!(
            source = %text.source,
            schema = schema.name(),
            model = %self.settings.model,
            chars = text.char_count(),
            "Starting field extraction"
        );

        let request = ExtractionRequest::build(text, schema, instructions, &self.settings);
        let raw = self.complete_with_backoff(&request).await?;
        let payload = Self::parse_model_output(&raw)?;

        let result = ExtractionResult::from_payload(schema, &payload, text, &self.settings.model)
            .map_err(|e| {
                if let Some(violations) = e.violations() {
                    tracing::warn!(
                        source = %text.source,
                        violations = violations.len(),
                        error = %e,
                        "Model output failed schema validation"
                    );
                }
                e
            })?;

        tracing::info!(
            source = %text.source,
            fields = result.fields.len(),
            "Field extraction complete"
        );
        Ok(result)
    }
}
