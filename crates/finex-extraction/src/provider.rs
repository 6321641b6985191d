use async_trait::async_trait;
use serde::Serialize;

use finex_core::config::ProviderConfig;
use finex_core::document::ExtractedText;
use finex_core::error::Result;
use finex_core::prompt::Instructions;
use finex_core::schema::FieldSchema;

/// Model parameters that do not change between calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelSettings {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            max_tokens: 4096,
        }
    }
}

/// Everything sent for one extraction call, built right before the call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRequest {
    pub source: String,
    pub model: String,
    pub system: String,
    pub user: String,
    pub schema_name: String,
    pub json_schema: serde_json::Value,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ExtractionRequest {
    pub fn build(
        text: &ExtractedText,
        schema: &FieldSchema,
        instructions: &Instructions,
        settings: &ModelSettings,
    ) -> Self {
        let (system, user) = instructions.render(&text.text());
        Self {
            source: text.source.clone(),
            model: settings.model.clone(),
            system,
            user,
            schema_name: schema.name().to_string(),
            json_schema: schema.to_json_schema(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// A chat model that answers with a JSON document matching the request schema.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Raw text of the model's answer.
    async fn complete(&self, request: &ExtractionRequest) -> Result<String>;
}
