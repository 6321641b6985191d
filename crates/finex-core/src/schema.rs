use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{FieldViolation, FinexError, Result, SchemaViolations};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// A single string.
    Text,
    /// An ordered sequence of strings.
    TextList,
}

impl FieldType {
    fn describe(self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::TextList => "array of strings",
        }
    }

    fn json_schema(self) -> Value {
        match self {
            Self::Text => json!({ "type": "string" }),
            Self::TextList => json!({ "type": "array", "items": { "type": "string" } }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            description: Some(description.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    TextList(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::TextList(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::TextList(items) => Some(items),
            Self::Text(_) => None,
        }
    }
}

/// Ordered set of required fields the model must fill.
///
/// There is no mutating API: build one at startup and share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FinexError::Config("schema name must not be empty".into()));
        }
        if fields.is_empty() {
            return Err(FinexError::Config(format!("schema `{name}` declares no fields")));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(FinexError::Config(format!(
                    "schema `{name}` has a field with an empty name"
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(FinexError::Config(format!(
                    "schema `{name}` declares `{}` more than once",
                    field.name
                )));
            }
        }
        Ok(Self { name, fields })
    }

    /// Balance sheet and income statement fields for Brazilian financial statements.
    pub fn financial_statement() -> Self {
        use FieldType::{Text, TextList};
        Self {
            name: "financial_statement".to_string(),
            fields: vec![
                FieldSpec::new("empresa", Text, "Company name as printed on the statement"),
                FieldSpec::new(
                    "unidade_monetaria",
                    Text,
                    "Monetary unit the figures are expressed in, e.g. R$ mil",
                ),
                FieldSpec::new(
                    "ativo_circulante",
                    TextList,
                    "Current assets lines, one entry per line item with its values",
                ),
                FieldSpec::new(
                    "ativo_nao_circulante",
                    TextList,
                    "Non-current assets lines, one entry per line item with its values",
                ),
                FieldSpec::new(
                    "passivo_circulante",
                    TextList,
                    "Current liabilities lines, one entry per line item with its values",
                ),
                FieldSpec::new(
                    "passivo_nao_circulante",
                    TextList,
                    "Non-current liabilities lines, one entry per line item with its values",
                ),
                FieldSpec::new(
                    "patrimonio_liquido",
                    TextList,
                    "Shareholders' equity lines, one entry per line item with its values",
                ),
                FieldSpec::new(
                    "demonstracao_do_resultado",
                    TextList,
                    "Income statement lines, one entry per line item with its values",
                ),
                FieldSpec::new("datas", TextList, "Reporting dates of the columns"),
            ],
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let raw: SchemaFile = toml::from_str(source)
            .map_err(|e| FinexError::Config(format!("invalid schema file: {e}")))?;
        Self::new(raw.name, raw.fields)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// JSON Schema handed to the provider as the structured-output contract.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for field in &self.fields {
            let mut prop = field.field_type.json_schema();
            if let (Some(desc), Some(obj)) = (&field.description, prop.as_object_mut()) {
                obj.insert("description".into(), Value::String(desc.clone()));
            }
            properties.insert(field.name.clone(), prop);
        }
        let required: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Check a model payload against the schema, collecting every violation.
    pub fn validate(&self, payload: &Value) -> Result<Vec<(String, FieldValue)>> {
        let Some(object) = payload.as_object() else {
            return Err(FinexError::SchemaValidation(SchemaViolations(vec![
                FieldViolation::NotAnObject {
                    found: json_kind(payload).to_string(),
                },
            ])));
        };

        let mut violations = Vec::new();
        let mut values = Vec::with_capacity(self.fields.len());

        for spec in &self.fields {
            match object.get(&spec.name) {
                None => violations.push(FieldViolation::Missing {
                    field: spec.name.clone(),
                }),
                Some(value) => match coerce(spec.field_type, value) {
                    Some(v) => values.push((spec.name.clone(), v)),
                    None => violations.push(FieldViolation::TypeMismatch {
                        field: spec.name.clone(),
                        expected: spec.field_type.describe().to_string(),
                        found: describe_found(value),
                    }),
                },
            }
        }

        for key in object.keys() {
            if self.field(key).is_none() {
                violations.push(FieldViolation::Unexpected { field: key.clone() });
            }
        }

        if violations.is_empty() {
            Ok(values)
        } else {
            Err(FinexError::SchemaValidation(SchemaViolations(violations)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    name: String,
    #[serde(default)]
    fields: Vec<FieldSpec>,
}

fn coerce(field_type: FieldType, value: &Value) -> Option<FieldValue> {
    match (field_type, value) {
        (FieldType::Text, Value::String(s)) => Some(FieldValue::Text(s.clone())),
        (FieldType::TextList, Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(FieldValue::TextList),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe_found(value: &Value) -> String {
    match value {
        Value::Array(items) => match items.iter().find(|i| !i.is_string()) {
            Some(bad) => format!("array containing {}", json_kind(bad)),
            None => "array".to_string(),
        },
        other => json_kind(other).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_payload() -> Value {
        json!({
            "empresa": "Rominor Comércio S.A.",
            "unidade_monetaria": "R$ mil",
            "ativo_circulante": ["Ativo Circulante: 1.000.000"],
            "ativo_nao_circulante": [],
            "passivo_circulante": ["Fornecedores: 120.000"],
            "passivo_nao_circulante": [],
            "patrimonio_liquido": ["Capital Social: 500.000"],
            "demonstracao_do_resultado": ["Receita Líquida: 2.300.000"],
            "datas": ["31/12/2023", "31/12/2022"]
        })
    }

    #[test]
    fn financial_statement_declares_nine_fields_in_order() {
        let schema = FieldSchema::financial_statement();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "empresa",
                "unidade_monetaria",
                "ativo_circulante",
                "ativo_nao_circulante",
                "passivo_circulante",
                "passivo_nao_circulante",
                "patrimonio_liquido",
                "demonstracao_do_resultado",
                "datas",
            ]
        );
        assert_eq!(schema.field("empresa").unwrap().field_type, FieldType::Text);
        assert_eq!(schema.field("datas").unwrap().field_type, FieldType::TextList);
    }

    #[test]
    fn validate_accepts_complete_payload() {
        let schema = FieldSchema::financial_statement();
        let values = schema.validate(&complete_payload()).unwrap();
        assert_eq!(values.len(), 9);
        assert_eq!(values[0].0, "empresa");
        assert_eq!(values[0].1.as_text(), Some("Rominor Comércio S.A."));
        assert_eq!(
            values[2].1.as_list().unwrap(),
            &["Ativo Circulante: 1.000.000".to_string()]
        );
    }

    #[test]
    fn validate_lists_exactly_the_missing_fields() {
        let schema = FieldSchema::financial_statement();
        let mut payload = complete_payload();
        let obj = payload.as_object_mut().unwrap();
        obj.remove("empresa");
        obj.remove("datas");

        let err = schema.validate(&payload).unwrap_err();
        match err {
            FinexError::SchemaValidation(v) => {
                assert_eq!(v.missing_fields(), vec!["empresa", "datas"]);
                assert_eq!(v.0.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_reports_every_type_mismatch() {
        let schema = FieldSchema::financial_statement();
        let mut payload = complete_payload();
        let obj = payload.as_object_mut().unwrap();
        obj.insert("empresa".into(), json!(["not", "a", "string"]));
        obj.insert("datas".into(), json!("31/12/2023"));
        obj.insert("ativo_circulante".into(), json!(["ok", 42]));

        let err = schema.validate(&payload).unwrap_err();
        let violations = err.violations().unwrap();
        let fields: Vec<&str> = violations.iter().filter_map(|v| v.field()).collect();
        assert_eq!(fields, vec!["empresa", "ativo_circulante", "datas"]);
        assert!(violations.contains(&FieldViolation::TypeMismatch {
            field: "ativo_circulante".into(),
            expected: "array of strings".into(),
            found: "array containing number".into(),
        }));
    }

    #[test]
    fn validate_flags_undeclared_fields_and_non_objects() {
        let schema = FieldSchema::financial_statement();
        let mut payload = complete_payload();
        payload
            .as_object_mut()
            .unwrap()
            .insert("comentario".into(), json!("extra"));
        let err = schema.validate(&payload).unwrap_err();
        assert_eq!(
            err.violations().unwrap(),
            &[FieldViolation::Unexpected {
                field: "comentario".into()
            }]
        );

        let err = schema.validate(&json!(["empresa"])).unwrap_err();
        assert_eq!(
            err.violations().unwrap(),
            &[FieldViolation::NotAnObject {
                found: "array".into()
            }]
        );
    }

    #[test]
    fn json_schema_requires_all_fields() {
        let schema = FieldSchema::financial_statement();
        let js = schema.to_json_schema();
        assert_eq!(js["type"], "object");
        assert_eq!(js["additionalProperties"], false);
        assert_eq!(js["required"].as_array().unwrap().len(), 9);
        assert_eq!(js["properties"]["datas"]["type"], "array");
        assert_eq!(js["properties"]["empresa"]["type"], "string");
    }

    #[test]
    fn schema_from_toml() {
        let schema = FieldSchema::from_toml_str(
            r#"
            name = "income_statement"

            [[fields]]
            name = "empresa"
            type = "text"

            [[fields]]
            name = "receitas"
            type = "text_list"
            description = "Revenue lines"
            "#,
        )
        .unwrap();
        assert_eq!(schema.name(), "income_statement");
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.fields()[1].field_type, FieldType::TextList);
    }

    #[test]
    fn schema_rejects_duplicate_fields() {
        let err = FieldSchema::from_toml_str(
            r#"
            name = "dup"
            [[fields]]
            name = "empresa"
            type = "text"
            [[fields]]
            name = "empresa"
            type = "text_list"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FinexError::Config(_)));
    }
}
