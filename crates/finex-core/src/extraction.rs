use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{ExtractedText, ExtractionMethod};
use crate::error::{FieldViolation, FinexError, Result, SchemaViolations};
use crate::prompt::Instructions;
use crate::schema::{FieldSchema, FieldValue};

/// Schema-validated values the model derived from one document's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub id: Uuid,
    pub schema: String,
    pub source: String,
    pub method: ExtractionMethod,
    pub model: String,
    /// Field values in schema order.
    pub fields: Vec<(String, FieldValue)>,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// Validate `payload` against `schema` and wrap the values.
    pub fn from_payload(
        schema: &FieldSchema,
        payload: &serde_json::Value,
        text: &ExtractedText,
        model: &str,
    ) -> Result<Self> {
        let fields = schema.validate(payload)?;
        Ok(Self {
            id: Uuid::new_v4(),
            schema: schema.name().to_string(),
            source: text.source.clone(),
            method: text.method,
            model: model.to_string(),
            fields,
            extracted_at: Utc::now(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Field values as a JSON object, for logging and output.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    FieldValue::Text(s) => serde_json::Value::String(s.clone()),
                    FieldValue::TextList(items) => serde_json::Value::Array(
                        items.iter().cloned().map(serde_json::Value::String).collect(),
                    ),
                };
                (k.clone(), value)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract_fields(
        &self,
        text: &ExtractedText,
        schema: &FieldSchema,
        instructions: &Instructions,
    ) -> Result<ExtractionResult>;
}

/// Typed view over a result produced with [`FieldSchema::financial_statement`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialStatement {
    pub empresa: String,
    pub unidade_monetaria: String,
    pub ativo_circulante: Vec<String>,
    pub ativo_nao_circulante: Vec<String>,
    pub passivo_circulante: Vec<String>,
    pub passivo_nao_circulante: Vec<String>,
    pub patrimonio_liquido: Vec<String>,
    pub demonstracao_do_resultado: Vec<String>,
    pub datas: Vec<String>,
}

impl TryFrom<&ExtractionResult> for FinancialStatement {
    type Error = FinexError;

    fn try_from(result: &ExtractionResult) -> Result<Self> {
        serde_json::from_value(result.to_json()).map_err(|e| {
            FinexError::SchemaValidation(SchemaViolations(vec![FieldViolation::NotJson {
                message: format!("result does not match the financial statement shape: {e}"),
            }]))
        })
    }
}
