use std::path::Path;

use serde::Deserialize;

use crate::error::{FinexError, Result};

/// Placeholder replaced by the extracted document text.
pub const TEXT_PLACEHOLDER: &str = "{text}";

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a financial analyst extracting data from Brazilian financial statements (balanço patrimonial and demonstração do resultado).

Read the document text and fill every field of the requested schema:
- Copy line items exactly as they appear, one entry per line item, keeping the label and all of its values (e.g. "Ativo Circulante: 1.000.000 | 950.000").
- Keep the original Portuguese labels and number formatting. Do not convert units.
- "datas" lists the reporting dates of the value columns, in the order they appear.
- If a section is absent from the document, return an empty list for it.
- Do not invent values that are not in the text."#;

pub const DEFAULT_USER_PROMPT: &str = r#"Extract the requested fields from the financial statement below.

Document text:
{text}"#;

/// System and user templates sent with every extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    pub system: String,
    pub user: String,
}

impl Default for Instructions {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            user: DEFAULT_USER_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PromptsFile {
    field_extraction: PromptSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PromptSection {
    system: Option<String>,
    /// `field_extraction.field_extraction` is the older name of the user template.
    #[serde(alias = "field_extraction")]
    user: Option<String>,
}

impl Instructions {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Load the `[field_extraction]` table of a prompts file. Missing keys keep the defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: PromptsFile = toml::from_str(source)
            .map_err(|e| FinexError::Config(format!("invalid prompts file: {e}")))?;
        let defaults = Self::default();
        let instructions = Self {
            system: file.field_extraction.system.unwrap_or(defaults.system),
            user: file.field_extraction.user.unwrap_or(defaults.user),
        };
        if !instructions.system.contains(TEXT_PLACEHOLDER)
            && !instructions.user.contains(TEXT_PLACEHOLDER)
        {
            return Err(FinexError::Config(format!(
                "prompts file must reference {TEXT_PLACEHOLDER} in the system or user prompt"
            )));
        }
        Ok(instructions)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Substitute `text` into both templates, returning `(system, user)`.
    pub fn render(&self, text: &str) -> (String, String) {
        (
            self.system.replace(TEXT_PLACEHOLDER, text),
            self.user.replace(TEXT_PLACEHOLDER, text),
        )
    }
}
