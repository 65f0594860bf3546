//! Shared error taxonomy for the tool registry and element repository.
//!
//! Every failure that crosses the registry boundary is expressed as an
//! [`McpError`]: a string-coded error (`"E002"`, `"E401"`, ...) with a
//! category, a human message, and optional structured details. The code set
//! is a closed enum; category and HTTP status are derived through exhaustive
//! matches so a new code cannot silently fall through to a default.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Value};

/// Coarse error classification, serialized in snake_case on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    Timeout,
    ExternalService,
    InternalError,
    RateLimit,
    Configuration,
}

/// Closed set of error codes.
///
/// The string forms ("E001".."E915") are the wire values consumed by
/// clients; the ranges group codes by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation (E0xx)
    InvalidRequestFormat,
    MissingRequiredField,
    InvalidFieldValue,
    InvalidFieldType,
    FieldLengthExceeded,
    InvalidEnumValue,
    InvalidRegexPattern,
    SchemaValidationFailed,
    InvalidJsonFormat,
    InvalidUrlFormat,
    InvalidUuidFormat,
    InvalidDateFormat,
    ParameterOutOfRange,
    ConflictingParameters,
    InvalidArraySize,

    // Authentication / authorization (E1xx)
    MissingAuthToken,
    InvalidAuthToken,
    ExpiredAuthToken,
    InsufficientPermissions,
    AccountSuspended,
    InvalidApiKey,

    // Not found (E2xx)
    ToolNotFound,
    ElementNotFound,
    ResourceNotFound,
    EndpointNotFound,
    SessionNotFound,

    // Conflict (E3xx)
    ElementAlreadyExists,
    ResourceConflict,
    ConcurrentModification,
    DuplicateRequest,

    // Timeout (E4xx)
    ToolExecutionTimeout,
    ElementWaitTimeout,
    NetworkTimeout,

    // External service (E5xx)
    ElementRepositoryUnavailable,
    ExecutionServiceUnavailable,
    CacheUnavailable,

    // Rate limiting (E6xx)
    RateLimitExceeded,
    QuotaExceeded,
    ConcurrentLimitExceeded,

    // Configuration (E7xx)
    InvalidConfiguration,
    MissingConfiguration,

    // Internal (E8xx)
    UnexpectedError,
    FileSystemError,
    SerializationError,
    DeserializationError,
}

impl ErrorCode {
    /// The string-coded wire value for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequestFormat => "E001",
            Self::MissingRequiredField => "E002",
            Self::InvalidFieldValue => "E003",
            Self::InvalidFieldType => "E004",
            Self::FieldLengthExceeded => "E005",
            Self::InvalidEnumValue => "E006",
            Self::InvalidRegexPattern => "E007",
            Self::SchemaValidationFailed => "E008",
            Self::InvalidJsonFormat => "E009",
            Self::InvalidUrlFormat => "E010",
            Self::InvalidUuidFormat => "E011",
            Self::InvalidDateFormat => "E012",
            Self::ParameterOutOfRange => "E013",
            Self::ConflictingParameters => "E014",
            Self::InvalidArraySize => "E015",
            Self::MissingAuthToken => "E101",
            Self::InvalidAuthToken => "E102",
            Self::ExpiredAuthToken => "E103",
            Self::InsufficientPermissions => "E104",
            Self::AccountSuspended => "E105",
            Self::InvalidApiKey => "E106",
            Self::ToolNotFound => "E201",
            Self::ElementNotFound => "E202",
            Self::ResourceNotFound => "E203",
            Self::EndpointNotFound => "E204",
            Self::SessionNotFound => "E206",
            Self::ElementAlreadyExists => "E301",
            Self::ResourceConflict => "E302",
            Self::ConcurrentModification => "E303",
            Self::DuplicateRequest => "E304",
            Self::ToolExecutionTimeout => "E401",
            Self::ElementWaitTimeout => "E402",
            Self::NetworkTimeout => "E404",
            Self::ElementRepositoryUnavailable => "E501",
            Self::ExecutionServiceUnavailable => "E503",
            Self::CacheUnavailable => "E505",
            Self::RateLimitExceeded => "E601",
            Self::QuotaExceeded => "E602",
            Self::ConcurrentLimitExceeded => "E603",
            Self::InvalidConfiguration => "E701",
            Self::MissingConfiguration => "E702",
            Self::UnexpectedError => "E801",
            Self::FileSystemError => "E803",
            Self::SerializationError => "E806",
            Self::DeserializationError => "E807",
        }
    }

    /// Category this code belongs to.
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::InvalidRequestFormat
            | Self::MissingRequiredField
            | Self::InvalidFieldValue
            | Self::InvalidFieldType
            | Self::FieldLengthExceeded
            | Self::InvalidEnumValue
            | Self::InvalidRegexPattern
            | Self::SchemaValidationFailed
            | Self::InvalidJsonFormat
            | Self::InvalidUrlFormat
            | Self::InvalidUuidFormat
            | Self::InvalidDateFormat
            | Self::ParameterOutOfRange
            | Self::ConflictingParameters
            | Self::InvalidArraySize => ErrorCategory::Validation,
            Self::MissingAuthToken
            | Self::InvalidAuthToken
            | Self::ExpiredAuthToken
            | Self::InvalidApiKey => ErrorCategory::Authentication,
            Self::InsufficientPermissions | Self::AccountSuspended => {
                ErrorCategory::Authorization
            }
            Self::ToolNotFound
            | Self::ElementNotFound
            | Self::ResourceNotFound
            | Self::EndpointNotFound
            | Self::SessionNotFound => ErrorCategory::NotFound,
            Self::ElementAlreadyExists
            | Self::ResourceConflict
            | Self::ConcurrentModification
            | Self::DuplicateRequest => ErrorCategory::Conflict,
            Self::ToolExecutionTimeout | Self::ElementWaitTimeout | Self::NetworkTimeout => {
                ErrorCategory::Timeout
            }
            Self::ElementRepositoryUnavailable
            | Self::ExecutionServiceUnavailable
            | Self::CacheUnavailable => ErrorCategory::ExternalService,
            Self::RateLimitExceeded | Self::QuotaExceeded | Self::ConcurrentLimitExceeded => {
                ErrorCategory::RateLimit
            }
            Self::InvalidConfiguration | Self::MissingConfiguration => {
                ErrorCategory::Configuration
            }
            Self::UnexpectedError
            | Self::FileSystemError
            | Self::SerializationError
            | Self::DeserializationError => ErrorCategory::InternalError,
        }
    }

    /// Fixed HTTP status for this code. Exhaustive on purpose: a new code
    /// without a status is a compile error, not a silent 500.
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidRequestFormat
            | Self::MissingRequiredField
            | Self::InvalidFieldValue
            | Self::InvalidFieldType
            | Self::FieldLengthExceeded
            | Self::InvalidEnumValue
            | Self::InvalidRegexPattern
            | Self::SchemaValidationFailed
            | Self::InvalidJsonFormat
            | Self::InvalidUrlFormat
            | Self::InvalidUuidFormat
            | Self::InvalidDateFormat
            | Self::ParameterOutOfRange
            | Self::ConflictingParameters
            | Self::InvalidArraySize => 400,
            Self::MissingAuthToken
            | Self::InvalidAuthToken
            | Self::ExpiredAuthToken
            | Self::InvalidApiKey => 401,
            Self::InsufficientPermissions | Self::AccountSuspended => 403,
            Self::ToolNotFound
            | Self::ElementNotFound
            | Self::ResourceNotFound
            | Self::EndpointNotFound
            | Self::SessionNotFound => 404,
            Self::ToolExecutionTimeout | Self::ElementWaitTimeout | Self::NetworkTimeout => 408,
            Self::ElementAlreadyExists
            | Self::ResourceConflict
            | Self::ConcurrentModification
            | Self::DuplicateRequest => 409,
            Self::RateLimitExceeded | Self::QuotaExceeded | Self::ConcurrentLimitExceeded => 429,
            Self::ElementRepositoryUnavailable | Self::ExecutionServiceUnavailable => 502,
            Self::CacheUnavailable => 503,
            Self::InvalidConfiguration
            | Self::MissingConfiguration
            | Self::UnexpectedError
            | Self::FileSystemError
            | Self::SerializationError
            | Self::DeserializationError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Structured error value surfaced past the registry boundary.
#[derive(Debug, Clone)]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Map<String, Value>>,
    pub context: Option<Map<String, Value>>,
    /// Suggested client backoff in seconds.
    pub retry_after: Option<u64>,
    pub help_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl McpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            context: None,
            retry_after: None,
            help_url: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach one key to the details map.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn with_help_url(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }

    /// Validation failure, optionally naming the offending field.
    pub fn validation(code: ErrorCode, message: impl Into<String>, field: Option<&str>) -> Self {
        let err = Self::new(code, message);
        match field {
            Some(name) => err.with_detail("field_name", name),
            None => err,
        }
    }

    pub fn not_found(code: ErrorCode, message: impl Into<String>, resource: &str) -> Self {
        Self::new(code, message).with_detail("resource_id", resource)
    }

    pub fn conflict(code: ErrorCode, message: impl Into<String>, resource: &str) -> Self {
        Self::new(code, message).with_detail("resource_id", resource)
    }

    /// Timeout failure; clients may retry after 5 seconds by default.
    pub fn timeout(code: ErrorCode, message: impl Into<String>, timeout_ms: u64) -> Self {
        Self::new(code, message)
            .with_detail("timeout_ms", timeout_ms)
            .with_retry_after(5)
    }

    pub fn external_service(code: ErrorCode, message: impl Into<String>, service: &str) -> Self {
        Self::new(code, message)
            .with_detail("service_name", service)
            .with_retry_after(10)
    }

    pub fn rate_limit(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message).with_retry_after(60)
    }

    pub fn internal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Wire form: `code`, `message`, `category`, `timestamp`, plus the
    /// optional fields when present.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({
                "code": self.code.as_str(),
                "message": self.message,
            })
        })
    }
}

impl Serialize for McpError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("code", self.code.as_str())?;
        map.serialize_entry("message", &self.message)?;
        map.serialize_entry("category", &self.category())?;
        map.serialize_entry("timestamp", &self.timestamp.to_rfc3339())?;
        if let Some(details) = &self.details {
            map.serialize_entry("details", details)?;
        }
        if let Some(context) = &self.context {
            map.serialize_entry("context", context)?;
        }
        if let Some(retry_after) = self.retry_after {
            map.serialize_entry("retry_after", &retry_after)?;
        }
        if let Some(help_url) = &self.help_url {
            map.serialize_entry("help_url", help_url)?;
        }
        map.end()
    }
}

impl std::fmt::Display for McpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for McpError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_strings() {
        assert_eq!(ErrorCode::MissingRequiredField.as_str(), "E002");
        assert_eq!(ErrorCode::ToolNotFound.as_str(), "E201");
        assert_eq!(ErrorCode::ToolExecutionTimeout.as_str(), "E401");
        assert_eq!(ErrorCode::UnexpectedError.as_str(), "E801");
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            ErrorCode::InvalidEnumValue.category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            ErrorCode::ElementAlreadyExists.category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            ErrorCode::ToolExecutionTimeout.category(),
            ErrorCategory::Timeout
        );
        assert_eq!(
            ErrorCode::FileSystemError.category(),
            ErrorCategory::InternalError
        );
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorCode::MissingRequiredField.http_status(), 400);
        assert_eq!(ErrorCode::MissingAuthToken.http_status(), 401);
        assert_eq!(ErrorCode::InsufficientPermissions.http_status(), 403);
        assert_eq!(ErrorCode::ElementNotFound.http_status(), 404);
        assert_eq!(ErrorCode::ToolExecutionTimeout.http_status(), 408);
        assert_eq!(ErrorCode::ElementAlreadyExists.http_status(), 409);
        assert_eq!(ErrorCode::RateLimitExceeded.http_status(), 429);
        assert_eq!(ErrorCode::ElementRepositoryUnavailable.http_status(), 502);
        assert_eq!(ErrorCode::CacheUnavailable.http_status(), 503);
        assert_eq!(ErrorCode::UnexpectedError.http_status(), 500);
    }

    #[test]
    fn test_wire_form_required_fields() {
        let err = McpError::new(ErrorCode::ToolNotFound, "Tool 'x' is not registered");
        let value = err.to_value();

        assert_eq!(value["code"], "E201");
        assert_eq!(value["category"], "not_found");
        assert_eq!(value["message"], "Tool 'x' is not registered");
        assert!(value["timestamp"].is_string());
        assert!(value.get("details").is_none());
        assert!(value.get("retry_after").is_none());
    }

    #[test]
    fn test_wire_form_optional_fields() {
        let err = McpError::timeout(
            ErrorCode::ToolExecutionTimeout,
            "Tool 'run_action' timed out after 30000ms",
            30_000,
        )
        .with_context("tool_name", "run_action");
        let value = err.to_value();

        assert_eq!(value["details"]["timeout_ms"], 30_000);
        assert_eq!(value["context"]["tool_name"], "run_action");
        assert_eq!(value["retry_after"], 5);
    }

    #[test]
    fn test_factory_retry_defaults() {
        assert_eq!(
            McpError::external_service(
                ErrorCode::ElementRepositoryUnavailable,
                "repo down",
                "element-repository",
            )
            .retry_after,
            Some(10)
        );
        assert_eq!(
            McpError::rate_limit(ErrorCode::RateLimitExceeded, "slow down").retry_after,
            Some(60)
        );
    }

    #[test]
    fn test_validation_factory_names_field() {
        let err = McpError::validation(
            ErrorCode::MissingRequiredField,
            "Validation failed for element_name: required field missing",
            Some("element_name"),
        );
        assert_eq!(err.to_value()["details"]["field_name"], "element_name");
    }
}
