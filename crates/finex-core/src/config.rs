use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FinexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Azure,
    OpenAi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextLayerKind {
    Lopdf,
    Pdftotext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub api_version: String,
    pub endpoint: String,
    /// Model name, or deployment name for Azure.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextConfig {
    pub layer: TextLayerKind,
    pub ocr_language: String,
    pub ocr_dpi: u32,
}

/// Process-wide settings. Built once at startup and only read afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub text: TextConfig,
    pub log_sink: Option<PathBuf>,
    pub prompts_path: Option<PathBuf>,
    pub schema_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from a variable lookup. Values that do not parse fall back to
    /// their defaults with a warning.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let (config, invalid) = Self::read_vars(var);
        for entry in &invalid {
            tracing::warn!(
                variable = entry.variable,
                value = %entry.value,
                fallback = %entry.fallback,
                "Ignoring invalid configuration value"
            );
        }
        config
    }

    fn read_vars(lookup: impl Fn(&str) -> Option<String>) -> (Self, Vec<InvalidVar>) {
        let mut vars = VarReader {
            lookup,
            invalid: Vec::new(),
        };

        let kind = vars.choice(
            "FINEX_PROVIDER",
            &[("azure", ProviderKind::Azure), ("openai", ProviderKind::OpenAi)],
            ProviderKind::Azure,
        );
        let (api_key, endpoint) = match kind {
            ProviderKind::Azure => (
                vars.get("AZURE_OPENAI_API_KEY").unwrap_or_default(),
                vars.get("AZURE_ENDPOINT").unwrap_or_default(),
            ),
            ProviderKind::OpenAi => (
                vars.get("OPENAI_API_KEY").unwrap_or_default(),
                vars.get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".into()),
            ),
        };

        let config = Self {
            provider: ProviderConfig {
                kind,
                api_key,
                api_version: vars
                    .get("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|| "2024-08-01-preview".into()),
                endpoint,
                model: vars.get("FINEX_MODEL").unwrap_or_else(|| "gpt-4o".into()),
                temperature: vars.parsed("FINEX_TEMPERATURE", 0.0),
                max_tokens: vars.parsed("FINEX_MAX_TOKENS", 4096),
                timeout_secs: vars.parsed("FINEX_TIMEOUT_SECS", 120),
                max_retries: vars.parsed("FINEX_MAX_RETRIES", 0),
            },
            text: TextConfig {
                layer: vars.choice(
                    "FINEX_TEXT_LAYER",
                    &[("lopdf", TextLayerKind::Lopdf), ("pdftotext", TextLayerKind::Pdftotext)],
                    TextLayerKind::Lopdf,
                ),
                ocr_language: vars.get("FINEX_OCR_LANG").unwrap_or_else(|| "por".into()),
                ocr_dpi: vars.parsed("FINEX_OCR_DPI", 300),
            },
            log_sink: vars.get("FINEX_LOG_SINK").map(PathBuf::from),
            prompts_path: vars.get("FINEX_PROMPTS").map(PathBuf::from),
            schema_path: vars.get("FINEX_SCHEMA").map(PathBuf::from),
        };
        (config, vars.invalid)
    }

    /// Check the provider settings needed before any model call.
    pub fn validate(&self) -> Result<()> {
        let p = &self.provider;
        if p.api_key.is_empty() {
            let key = match p.kind {
                ProviderKind::Azure => "AZURE_OPENAI_API_KEY",
                ProviderKind::OpenAi => "OPENAI_API_KEY",
            };
            return Err(FinexError::Config(format!("{key} is not set")));
        }
        if p.endpoint.is_empty() {
            return Err(FinexError::Config("AZURE_ENDPOINT is not set".into()));
        }
        Url::parse(&p.endpoint)
            .map_err(|e| FinexError::Config(format!("invalid endpoint `{}`: {e}", p.endpoint)))?;
        if !(0.0..=2.0).contains(&p.temperature) {
            return Err(FinexError::Config(format!(
                "temperature {} outside 0.0..=2.0",
                p.temperature
            )));
        }
        if p.timeout_secs == 0 {
            return Err(FinexError::Config("FINEX_TIMEOUT_SECS must be positive".into()));
        }
        if self.text.ocr_dpi == 0 {
            return Err(FinexError::Config("FINEX_OCR_DPI must be positive".into()));
        }
        Ok(())
    }
}

// ── Variable parsing ──

#[derive(Debug, Clone, PartialEq)]
struct InvalidVar {
    variable: &'static str,
    value: String,
    fallback: String,
}

struct VarReader<F> {
    lookup: F,
    invalid: Vec<InvalidVar>,
}

impl<F: Fn(&str) -> Option<String>> VarReader<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T: FromStr + Display>(&mut self, key: &'static str, default: T) -> T {
        let Some(raw) = self.get(key) else {
            return default;
        };
        match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                self.invalid.push(InvalidVar {
                    variable: key,
                    value: raw,
                    fallback: default.to_string(),
                });
                default
            }
        }
    }

    fn choice<T: Copy + PartialEq>(&mut self, key: &'static str, options: &[(&str, T)], default: T) -> T {
        let Some(raw) = self.get(key) else {
            return default;
        };
        let wanted = raw.trim().to_ascii_lowercase();
        if let Some((_, value)) = options.iter().find(|(name, _)| *name == wanted) {
            return *value;
        }
        let fallback = options
            .iter()
            .find(|(_, value)| *value == default)
            .map(|(name, _)| name.to_string())
            .unwrap_or_default();
        self.invalid.push(InvalidVar {
            variable: key,
            value: raw,
            fallback,
        });
        default
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_favour_deterministic_azure() {
        let cfg = config(&[]);
        assert_eq!(cfg.provider.kind, ProviderKind::Azure);
        assert_eq!(cfg.provider.temperature, 0.0);
        assert_eq!(cfg.provider.max_retries, 0);
        assert_eq!(cfg.text.layer, TextLayerKind::Lopdf);
        assert_eq!(cfg.text.ocr_language, "por");
        assert_eq!(cfg.text.ocr_dpi, 300);
        assert!(cfg.log_sink.is_none());
    }

    #[test]
    fn azure_settings_are_read() {
        let cfg = config(&[
            ("AZURE_OPENAI_API_KEY", "secret"),
            ("AZURE_OPENAI_API_VERSION", "2024-10-21"),
            ("AZURE_ENDPOINT", "https://example.openai.azure.com"),
            ("FINEX_MODEL", "gpt-4o-mini"),
            ("FINEX_TIMEOUT_SECS", "30"),
            ("FINEX_TEXT_LAYER", "pdftotext"),
        ]);
        assert_eq!(cfg.provider.api_key, "secret");
        assert_eq!(cfg.provider.api_version, "2024-10-21");
        assert_eq!(cfg.provider.model, "gpt-4o-mini");
        assert_eq!(cfg.provider.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.text.layer, TextLayerKind::Pdftotext);
        cfg.validate().unwrap();
    }

    #[test]
    fn openai_has_default_endpoint() {
        let cfg = config(&[("FINEX_PROVIDER", "openai"), ("OPENAI_API_KEY", "sk-test")]);
        assert_eq!(cfg.provider.kind, ProviderKind::OpenAi);
        assert_eq!(cfg.provider.endpoint, "https://api.openai.com/v1");
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_reports_missing_credentials() {
        let err = config(&[("AZURE_ENDPOINT", "https://example.openai.azure.com")])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("AZURE_OPENAI_API_KEY"));

        let err = config(&[("AZURE_OPENAI_API_KEY", "k"), ("AZURE_ENDPOINT", "not a url")])
            .validate()
            .unwrap_err();
        assert!(matches!(err, FinexError::Config(_)));
    }

    #[test]
    fn unparseable_values_fall_back_and_are_reported() {
        let (cfg, invalid) = AppConfig::read_vars(|key| match key {
            "FINEX_PROVIDER" => Some("azur".into()),
            "FINEX_TEMPERATURE" => Some("0,2".into()),
            "FINEX_MAX_RETRIES" => Some("3".into()),
            _ => None,
        });
        assert_eq!(cfg.provider.kind, ProviderKind::Azure);
        assert_eq!(cfg.provider.temperature, 0.0);
        assert_eq!(cfg.provider.max_retries, 3);
        assert_eq!(
            invalid,
            vec![
                InvalidVar {
                    variable: "FINEX_PROVIDER",
                    value: "azur".into(),
                    fallback: "azure".into(),
                },
                InvalidVar {
                    variable: "FINEX_TEMPERATURE",
                    value: "0,2".into(),
                    fallback: "0".into(),
                },
            ]
        );
    }

    #[test]
    fn choices_are_case_insensitive() {
        let (cfg, invalid) = AppConfig::read_vars(|key| match key {
            "FINEX_PROVIDER" => Some("OpenAI".into()),
            "FINEX_TEXT_LAYER" => Some(" pdftotext ".into()),
            _ => None,
        });
        assert_eq!(cfg.provider.kind, ProviderKind::OpenAi);
        assert_eq!(cfg.text.layer, TextLayerKind::Pdftotext);
        assert!(invalid.is_empty());
    }
}
