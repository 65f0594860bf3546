//! JSON-schema validation of tool requests and responses.
//!
//! Each tool has one schema document in the schemas directory, named
//! `<tool_name>.json`, with `properties.request` and `properties.response`
//! sub-schemas. Validation walks the schema recursively and stops at the
//! first violation, mapping it to a specific error code; `format` keywords
//! (uri, uuid, date-time) are enforced, not advisory.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::{ErrorCode, McpError};

/// What a schema walk found wrong, before error-code mapping.
struct Violation {
    code: ErrorCode,
    /// Dotted path from the data root ("options.retries"); empty at root.
    path: String,
    message: String,
    value: Value,
}

impl Violation {
    fn new(code: ErrorCode, path: &str, message: impl Into<String>, value: &Value) -> Self {
        Self {
            code,
            path: path.to_string(),
            message: message.into(),
            value: value.clone(),
        }
    }
}

/// Validates tool payloads against per-tool schema documents.
pub struct SchemaValidator {
    schemas_dir: PathBuf,
    schemas: RwLock<HashMap<String, Value>>,
}

impl SchemaValidator {
    /// Load all `*.json` documents from the schemas directory. A missing
    /// directory is logged and leaves the validator empty; individual
    /// unparseable files are skipped.
    pub async fn load(schemas_dir: impl Into<PathBuf>) -> Self {
        let validator = Self {
            schemas_dir: schemas_dir.into(),
            schemas: RwLock::new(HashMap::new()),
        };
        validator.reload_schemas().await;
        validator
    }

    /// Drop every loaded schema and re-read the directory.
    pub async fn reload_schemas(&self) {
        let mut loaded = HashMap::new();

        let mut entries = match tokio::fs::read_dir(&self.schemas_dir).await {
            Ok(entries) => entries,
            Err(_) => {
                warn!(dir = %self.schemas_dir.display(), "schemas directory not found");
                *self.schemas.write().await = loaded;
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                    Ok(schema) => {
                        info!(schema = name, "loaded schema");
                        loaded.insert(name.to_string(), schema);
                    }
                    Err(e) => error!(schema = name, "invalid schema document: {e}"),
                },
                Err(e) => error!(path = %path.display(), "failed to read schema: {e}"),
            }
        }

        *self.schemas.write().await = loaded;
    }

    /// Validate a tool request payload. `Ok(())` means valid.
    pub async fn validate_request(
        &self,
        tool_name: &str,
        request: &Value,
    ) -> Result<(), McpError> {
        self.validate_section(tool_name, request, "request").await
    }

    /// Validate a tool response payload. `Ok(())` means valid.
    pub async fn validate_response(
        &self,
        tool_name: &str,
        response: &Value,
    ) -> Result<(), McpError> {
        self.validate_section(tool_name, response, "response").await
    }

    async fn validate_section(
        &self,
        tool_name: &str,
        data: &Value,
        section: &str,
    ) -> Result<(), McpError> {
        let schemas = self.schemas.read().await;
        let Some(schema) = schemas.get(tool_name) else {
            return Err(McpError::validation(
                ErrorCode::SchemaValidationFailed,
                format!("No schema found for tool: {tool_name}"),
                Some("tool_name"),
            )
            .with_detail("field_value", tool_name));
        };

        let sub_schema = schema
            .get("properties")
            .and_then(|p| p.get(section))
            .filter(|s| s.as_object().is_some_and(|o| !o.is_empty()));
        let Some(sub_schema) = sub_schema else {
            return Err(McpError::validation(
                ErrorCode::SchemaValidationFailed,
                format!("No {section} schema found for tool: {tool_name}"),
                Some(&format!("{section}_schema")),
            ));
        };

        match check_value(data, sub_schema, "") {
            Ok(()) => Ok(()),
            Err(violation) => {
                let field_name = if violation.path.is_empty() {
                    section.to_string()
                } else {
                    violation.path.clone()
                };
                Err(McpError::validation(
                    violation.code,
                    format!("Validation failed for {field_name}: {}", violation.message),
                    Some(&field_name),
                )
                .with_detail("field_path", violation.path)
                .with_detail("validation_message", violation.message)
                .with_detail("invalid_value", violation.value))
            }
        }
    }

    pub async fn get_schema(&self, tool_name: &str) -> Option<Value> {
        self.schemas.read().await.get(tool_name).cloned()
    }

    pub async fn list_schemas(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Recursive schema walk, stopping at the first violation.
fn check_value(value: &Value, schema: &Value, path: &str) -> Result<(), Violation> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(value, expected) {
            return Err(Violation::new(
                ErrorCode::InvalidFieldType,
                path,
                format!("expected type '{expected}', got '{}'", type_name(value)),
                value,
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array)
        && !allowed.contains(value)
    {
        return Err(Violation::new(
            ErrorCode::InvalidEnumValue,
            path,
            format!("value is not one of the allowed values: {allowed:?}"),
            value,
        ));
    }

    match value {
        Value::String(s) => check_string(s, schema, path, value)?,
        Value::Number(_) => check_number(value, schema, path)?,
        Value::Array(items) => check_array(items, schema, path, value)?,
        Value::Object(fields) => check_object(fields, schema, path, value)?,
        _ => {}
    }

    Ok(())
}

fn check_string(s: &str, schema: &Value, path: &str, value: &Value) -> Result<(), Violation> {
    let length = s.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64)
        && length < min
    {
        return Err(Violation::new(
            ErrorCode::ParameterOutOfRange,
            path,
            format!("string is shorter than minLength {min}"),
            value,
        ));
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64)
        && length > max
    {
        return Err(Violation::new(
            ErrorCode::ParameterOutOfRange,
            path,
            format!("string is longer than maxLength {max}"),
            value,
        ));
    }

    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        match regex::Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(s) {
                    return Err(Violation::new(
                        ErrorCode::InvalidRegexPattern,
                        path,
                        format!("value does not match pattern '{pattern}'"),
                        value,
                    ));
                }
            }
            Err(e) => {
                return Err(Violation::new(
                    ErrorCode::SchemaValidationFailed,
                    path,
                    format!("schema pattern '{pattern}' is not a valid regex: {e}"),
                    value,
                ));
            }
        }
    }

    if let Some(format) = schema.get("format").and_then(Value::as_str) {
        let (valid, code) = match format {
            "uri" => (url::Url::parse(s).is_ok(), ErrorCode::InvalidUrlFormat),
            "uuid" => (
                uuid::Uuid::parse_str(s).is_ok(),
                ErrorCode::InvalidUuidFormat,
            ),
            "date-time" => (
                chrono::DateTime::parse_from_rfc3339(s).is_ok(),
                ErrorCode::InvalidDateFormat,
            ),
            // Unknown formats are not enforced.
            _ => (true, ErrorCode::InvalidFieldValue),
        };
        if !valid {
            return Err(Violation::new(
                code,
                path,
                format!("value is not a valid {format}"),
                value,
            ));
        }
    }

    Ok(())
}

fn check_number(value: &Value, schema: &Value, path: &str) -> Result<(), Violation> {
    let Some(n) = value.as_f64() else {
        return Ok(());
    };
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
        && n < min
    {
        return Err(Violation::new(
            ErrorCode::ParameterOutOfRange,
            path,
            format!("value is less than minimum {min}"),
            value,
        ));
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
        && n > max
    {
        return Err(Violation::new(
            ErrorCode::ParameterOutOfRange,
            path,
            format!("value is greater than maximum {max}"),
            value,
        ));
    }
    Ok(())
}

fn check_array(
    items: &[Value],
    schema: &Value,
    path: &str,
    value: &Value,
) -> Result<(), Violation> {
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64)
        && (items.len() as u64) < min
    {
        return Err(Violation::new(
            ErrorCode::InvalidArraySize,
            path,
            format!("array has fewer than minItems {min}"),
            value,
        ));
    }
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64)
        && (items.len() as u64) > max
    {
        return Err(Violation::new(
            ErrorCode::InvalidArraySize,
            path,
            format!("array has more than maxItems {max}"),
            value,
        ));
    }

    if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter().enumerate() {
            let child_path = join_path(path, &i.to_string());
            check_value(item, item_schema, &child_path)?;
        }
    }
    Ok(())
}

fn check_object(
    fields: &Map<String, Value>,
    schema: &Value,
    path: &str,
    value: &Value,
) -> Result<(), Violation> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                return Err(Violation::new(
                    ErrorCode::MissingRequiredField,
                    path,
                    format!("'{name}' is a required property"),
                    value,
                ));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in properties {
            if let Some(field_value) = fields.get(name) {
                let child_path = join_path(path, name);
                check_value(field_value, prop_schema, &child_path)?;
            }
        }
    }
    Ok(())
}

fn join_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.as_f64().is_some_and(|n| n.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
