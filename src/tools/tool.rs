//! Tool trait and shared helpers for tool implementations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::{ErrorCode, McpError};
use crate::repository::RepositoryError;

/// Functional grouping used for discovery and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Execution,
    ElementRepository,
    Policy,
    Analytics,
    Workflow,
    Testing,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Execution => "execution",
            Self::ElementRepository => "element_repository",
            Self::Policy => "policy",
            Self::Analytics => "analytics",
            Self::Workflow => "workflow",
            Self::Testing => "testing",
        };
        f.write_str(name)
    }
}

/// Descriptive metadata attached to every registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub version: String,
    /// Hard wall-clock budget for one invocation.
    pub timeout_ms: u64,
    pub requires_auth: bool,
    pub dependencies: Vec<String>,
    pub tags: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

impl ToolMetadata {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            version: "1.0.0".to_string(),
            timeout_ms: 30_000,
            requires_auth: true,
            dependencies: Vec::new(),
            tags: Vec::new(),
            registered_at: Utc::now(),
        }
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn requires_auth(mut self, required: bool) -> Self {
        self.requires_auth = required;
        self
    }

    pub fn dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// Failures a tool body can raise.
///
/// These stay internal; the registry converts them to [`McpError`] at the
/// dispatch boundary via [`ToolError::to_mcp_error`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ToolError {
    /// Map an internal tool failure onto the wire error taxonomy.
    pub fn to_mcp_error(&self, tool_name: &str) -> McpError {
        let err = match self {
            Self::InvalidParameters(msg) => {
                McpError::validation(ErrorCode::InvalidFieldValue, msg.clone(), None)
            }
            Self::Repository(RepositoryError::AlreadyExists(name)) => {
                McpError::conflict(ErrorCode::ElementAlreadyExists, self.to_string(), name)
            }
            Self::Repository(RepositoryError::DoesNotExist(name)) => {
                McpError::not_found(ErrorCode::ElementNotFound, self.to_string(), name)
            }
            Self::ExecutionFailed(msg) => McpError::internal(
                ErrorCode::UnexpectedError,
                format!("Tool '{tool_name}' failed unexpectedly"),
            )
            .with_detail("error", msg.clone()),
        };
        err.with_context("tool_name", tool_name)
    }
}

/// One invocable tool. Implementations must be cheap to share behind an
/// `Arc` and safe to invoke concurrently.
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    /// Execute the tool against already-validated parameters.
    async fn invoke(&self, params: Value) -> Result<Value, ToolError>;
}

/// Adapter running a synchronous tool body on the blocking pool, so a
/// CPU-bound or blocking implementation cannot stall the scheduler. The
/// registry's timeout still applies to the whole invocation.
///
/// Built-in tools are all async; this is the escape hatch for embedders
/// registering a sync body (an existing parser, a checksum, a filesystem
/// scan) without hand-writing a [`Tool`] impl:
///
/// ```
/// use serde_json::{Value, json};
/// use uivault::tools::tool::require_str;
/// use uivault::tools::{BlockingTool, Tool, ToolCategory, ToolError, ToolMetadata};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), ToolError> {
/// let fingerprint = BlockingTool::new(
///     ToolMetadata::new(
///         "selector_fingerprint",
///         "Stable digest of a CSS selector",
///         ToolCategory::Testing,
///     )
///     .timeout_ms(5_000)
///     .requires_auth(false),
///     |params: Value| {
///         let selector = require_str(&params, "selector")?;
///         let digest = selector
///             .bytes()
///             .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
///         Ok(json!({"selector": selector, "digest": digest}))
///     },
/// );
///
/// let result = fingerprint.invoke(json!({"selector": "#login-btn"})).await?;
/// assert_eq!(result["selector"], "#login-btn");
/// # Ok(())
/// # }
/// ```
pub struct BlockingTool<F> {
    metadata: ToolMetadata,
    body: Arc<F>,
}

impl<F> BlockingTool<F>
where
    F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
{
    pub fn new(metadata: ToolMetadata, body: F) -> Self {
        Self {
            metadata,
            body: Arc::new(body),
        }
    }
}

#[async_trait]
impl<F> Tool for BlockingTool<F>
where
    F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
{
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, params: Value) -> Result<Value, ToolError> {
        let body = self.body.clone();
        tokio::task::spawn_blocking(move || body(params))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("blocking task panicked: {e}")))?
    }
}

/// Pull a required string parameter out of a JSON object.
pub fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing string parameter '{key}'")))
}

/// Pull a required parameter of any shape out of a JSON object.
pub fn require_param<'a>(params: &'a Value, key: &str) -> Result<&'a Value, ToolError> {
    params
        .get(key)
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing parameter '{key}'")))
}

/// Optional string parameter; absent and non-string both read as `None`.
pub fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub fn optional_bool(params: &Value, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}

pub fn optional_u64(params: &Value, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_defaults() {
        let meta = ToolMetadata::new("run_action", "Execute a UI action", ToolCategory::Execution);
        assert_eq!(meta.version, "1.0.0");
        assert_eq!(meta.timeout_ms, 30_000);
        assert!(meta.requires_auth);
        assert!(meta.dependencies.is_empty());
    }

    #[test]
    fn test_metadata_builder() {
        let meta = ToolMetadata::new("analytics_log", "Log an event", ToolCategory::Analytics)
            .timeout_ms(2_000)
            .requires_auth(false)
            .tags(&["analytics", "logging"]);
        assert_eq!(meta.timeout_ms, 2_000);
        assert!(!meta.requires_auth);
        assert_eq!(meta.tags, vec!["analytics", "logging"]);
    }

    #[test]
    fn test_param_helpers() {
        let params = json!({"element_name": "login_button", "count": 3, "flag": true});

        assert_eq!(require_str(&params, "element_name").unwrap(), "login_button");
        assert!(require_str(&params, "count").is_err());
        assert!(require_str(&params, "missing").is_err());
        assert!(require_param(&params, "count").is_ok());
        assert_eq!(optional_str(&params, "missing"), None);
        assert_eq!(optional_bool(&params, "flag"), Some(true));
        assert_eq!(optional_u64(&params, "count"), Some(3));
    }

    #[tokio::test]
    async fn test_blocking_tool_runs_off_scheduler() {
        let tool = BlockingTool::new(
            ToolMetadata::new("checksum", "Hash a payload", ToolCategory::Testing),
            |params: Value| {
                let data = require_str(&params, "data")?;
                Ok(json!({"length": data.len()}))
            },
        );

        let result = tool.invoke(json!({"data": "abcdef"})).await.unwrap();
        assert_eq!(result["length"], 6);

        let err = tool.invoke(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[test]
    fn test_error_mapping() {
        let err = ToolError::Repository(RepositoryError::AlreadyExists("btn".to_string()))
            .to_mcp_error("create_element");
        assert_eq!(err.code, ErrorCode::ElementAlreadyExists);
        assert!(err.message.contains("already exists"));
        assert_eq!(
            err.context.as_ref().unwrap()["tool_name"],
            json!("create_element")
        );

        let err = ToolError::Repository(RepositoryError::DoesNotExist("btn".to_string()))
            .to_mcp_error("get_element");
        assert_eq!(err.code, ErrorCode::ElementNotFound);
        assert!(err.message.contains("does not exist"));

        let err = ToolError::ExecutionFailed("boom".to_string()).to_mcp_error("run_action");
        assert_eq!(err.code, ErrorCode::UnexpectedError);
        assert_eq!(err.details.as_ref().unwrap()["error"], json!("boom"));

        let err = ToolError::InvalidParameters("bad".to_string()).to_mcp_error("run_action");
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
    }
}
