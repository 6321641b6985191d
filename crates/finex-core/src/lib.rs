pub mod config;
pub mod document;
pub mod error;
pub mod extraction;
pub mod prompt;
pub mod record;
pub mod schema;

pub use config::{AppConfig, ProviderConfig, ProviderKind, TextConfig, TextLayerKind};
pub use document::{Document, DocumentSource, ExtractedText, ExtractionMethod, PageText};
pub use error::{
    FieldViolation, FinexError, ProviderError, ProviderErrorKind, Result, SchemaViolations,
};
pub use extraction::{ExtractionResult, FieldExtractor, FinancialStatement};
pub use prompt::Instructions;
pub use record::{LogLevel, LogRecord};
pub use schema::{FieldSchema, FieldSpec, FieldType, FieldValue};
