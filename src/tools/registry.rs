//! Tool registration and dispatch.
//!
//! `call_tool` is the single dispatch path: existence check, request
//! validation, timed execution, diagnostic response validation, error
//! normalization. Validation failures surface before a tool body ever runs;
//! everything a caller sees is a [`McpError`], never a raw panic or a bare
//! tool error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::{ErrorCode, McpError};
use crate::repository::ElementRepository;
use crate::tools::builtin::{
    AddElementVersionTool, AnalyticsLogTool, ApproveElementVersionTool, BulkGenerateLocatorsTool,
    CreateElementTool, GetElementTool, GetRepositoryStatsTool, RunActionTool, SearchElementsTool,
};
use crate::tools::schema::SchemaValidator;
use crate::tools::tool::{Tool, ToolCategory, ToolMetadata};

#[derive(Default)]
struct RegistryInner {
    tools: HashMap<String, Arc<dyn Tool>>,
    categories: HashMap<ToolCategory, Vec<String>>,
    initialized: bool,
}

/// Registry of invocable tools, keyed by name with a category index.
pub struct ToolRegistry {
    validator: Arc<SchemaValidator>,
    repository: Arc<ElementRepository>,
    inner: RwLock<RegistryInner>,
}

impl ToolRegistry {
    pub fn new(validator: Arc<SchemaValidator>, repository: Arc<ElementRepository>) -> Self {
        Self {
            validator,
            repository,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register the built-in tool set. Idempotent: a second call is a no-op.
    pub async fn initialize(&self) {
        {
            let inner = self.inner.read().await;
            if inner.initialized {
                warn!("tool registry already initialized, ignoring second initialize()");
                return;
            }
        }

        self.register_tool(Arc::new(RunActionTool::new())).await;
        self.register_tool(Arc::new(GetElementTool::new(self.repository.clone())))
            .await;
        self.register_tool(Arc::new(BulkGenerateLocatorsTool::new())).await;
        self.register_tool(Arc::new(CreateElementTool::new(self.repository.clone())))
            .await;
        self.register_tool(Arc::new(AddElementVersionTool::new(self.repository.clone())))
            .await;
        self.register_tool(Arc::new(ApproveElementVersionTool::new(
            self.repository.clone(),
        )))
        .await;
        self.register_tool(Arc::new(SearchElementsTool::new(self.repository.clone())))
            .await;
        self.register_tool(Arc::new(GetRepositoryStatsTool::new(self.repository.clone())))
            .await;
        self.register_tool(Arc::new(AnalyticsLogTool::new())).await;

        let mut inner = self.inner.write().await;
        inner.initialized = true;
        info!(tools = inner.tools.len(), "tool registry initialized");
    }

    /// Register a tool. Re-registering a name overwrites the previous entry.
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) {
        let metadata = tool.metadata().clone();
        let mut inner = self.inner.write().await;

        if let Some(previous) = inner.tools.insert(metadata.name.clone(), tool) {
            warn!(tool = %metadata.name, "overwriting previously registered tool");
            let old_category = previous.metadata().category;
            if let Some(names) = inner.categories.get_mut(&old_category) {
                names.retain(|n| n != &metadata.name);
            }
        }
        inner
            .categories
            .entry(metadata.category)
            .or_default()
            .push(metadata.name.clone());
        info!(tool = %metadata.name, category = %metadata.category, "registered tool");
    }

    /// Remove a tool. Fails with TOOL_NOT_FOUND for unknown names.
    pub async fn unregister_tool(&self, name: &str) -> Result<(), McpError> {
        let mut inner = self.inner.write().await;
        let Some(tool) = inner.tools.remove(name) else {
            return Err(tool_not_found(name));
        };
        let category = tool.metadata().category;
        if let Some(names) = inner.categories.get_mut(&category) {
            names.retain(|n| n != name);
        }
        info!(tool = name, "unregistered tool");
        Ok(())
    }

    pub async fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.inner.read().await.tools.get(name).cloned()
    }

    pub async fn get_metadata(&self, name: &str) -> Option<ToolMetadata> {
        self.inner
            .read()
            .await
            .tools
            .get(name)
            .map(|t| t.metadata().clone())
    }

    /// Tool names, optionally restricted to one category, sorted.
    pub async fn list_tools(&self, category: Option<ToolCategory>) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = match category {
            Some(category) => inner.categories.get(&category).cloned().unwrap_or_default(),
            None => inner.tools.keys().cloned().collect(),
        };
        names.sort();
        names
    }

    /// Categories that currently have at least one tool.
    pub async fn list_categories(&self) -> Vec<ToolCategory> {
        let inner = self.inner.read().await;
        inner
            .categories
            .iter()
            .filter(|(_, names)| !names.is_empty())
            .map(|(category, _)| *category)
            .collect()
    }

    /// Full metadata plus declared request/response schemas for one tool.
    pub async fn get_tool_info(&self, name: &str) -> Option<Value> {
        let metadata = self.get_metadata(name).await?;
        let schema = self.validator.get_schema(name).await;
        let (input_schema, output_schema) = match &schema {
            Some(doc) => (
                doc.get("properties").and_then(|p| p.get("request")).cloned(),
                doc.get("properties").and_then(|p| p.get("response")).cloned(),
            ),
            None => (None, None),
        };

        Some(json!({
            "name": metadata.name,
            "description": metadata.description,
            "category": metadata.category,
            "version": metadata.version,
            "timeout_ms": metadata.timeout_ms,
            "requires_auth": metadata.requires_auth,
            "input_schema": input_schema,
            "output_schema": output_schema,
            "dependencies": metadata.dependencies,
            "tags": metadata.tags,
            "registered_at": metadata.registered_at.to_rfc3339(),
        }))
    }

    /// Case-insensitive substring search over name, description and tags.
    pub async fn search_tools(&self, query: &str) -> Vec<String> {
        let needle = query.to_lowercase();
        let inner = self.inner.read().await;
        let mut matches: Vec<String> = inner
            .tools
            .values()
            .map(|t| t.metadata())
            .filter(|m| {
                m.name.to_lowercase().contains(&needle)
                    || m.description.to_lowercase().contains(&needle)
                    || m.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
            })
            .map(|m| m.name.clone())
            .collect();
        matches.sort();
        matches
    }

    /// Dispatch one tool invocation.
    ///
    /// Request validation runs only when the caller supplied a non-empty
    /// parameter object; response validation is diagnostic (logged, never
    /// fails the call).
    pub async fn call_tool(&self, name: &str, params: Value) -> Result<Value, McpError> {
        let Some(tool) = self.get_tool(name).await else {
            return Err(tool_not_found(name));
        };
        let metadata = tool.metadata();

        let has_params = params.as_object().is_some_and(|o| !o.is_empty());
        if has_params {
            self.validator.validate_request(name, &params).await?;
        }

        let timeout_ms = metadata.timeout_ms;
        let outcome =
            tokio::time::timeout(Duration::from_millis(timeout_ms), tool.invoke(params)).await;

        let result = match outcome {
            Err(_) => {
                return Err(McpError::timeout(
                    ErrorCode::ToolExecutionTimeout,
                    format!("Tool '{name}' timed out after {timeout_ms}ms"),
                    timeout_ms,
                )
                .with_context("tool_name", name));
            }
            Ok(Err(tool_err)) => {
                error!(tool = name, "tool invocation failed: {tool_err}");
                return Err(tool_err.to_mcp_error(name));
            }
            Ok(Ok(result)) => result,
        };

        if let Err(e) = self.validator.validate_response(name, &result).await {
            warn!(tool = name, "response failed schema validation: {e}");
        }

        Ok(result)
    }

    /// Drop every registered tool and reset the initialized flag.
    pub async fn cleanup(&self) {
        let mut inner = self.inner.write().await;
        inner.tools.clear();
        inner.categories.clear();
        inner.initialized = false;
        info!("tool registry cleaned up");
    }

    pub async fn get_registry_stats(&self) -> Value {
        let inner = self.inner.read().await;
        let categories: serde_json::Map<String, Value> = inner
            .categories
            .iter()
            .map(|(category, names)| (category.to_string(), json!(names.len())))
            .collect();

        json!({
            "total_tools": inner.tools.len(),
            "categories": categories,
            "initialized": inner.initialized,
        })
    }
}

fn tool_not_found(name: &str) -> McpError {
    McpError::not_found(
        ErrorCode::ToolNotFound,
        format!("Tool '{name}' is not registered"),
        name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::tools::tool::{ToolError, ToolMetadata};
    use async_trait::async_trait;

    struct SleepyTool {
        metadata: ToolMetadata,
        sleep: Duration,
    }

    impl SleepyTool {
        fn new(timeout_ms: u64, sleep: Duration) -> Self {
            Self {
                metadata: ToolMetadata::new("sleepy", "Sleeps", ToolCategory::Testing)
                    .timeout_ms(timeout_ms),
                sleep,
            }
        }
    }

    #[async_trait]
    impl Tool for SleepyTool {
        fn metadata(&self) -> &ToolMetadata {
            &self.metadata
        }

        async fn invoke(&self, _params: Value) -> Result<Value, ToolError> {
            tokio::time::sleep(self.sleep).await;
            Ok(json!({"slept": true}))
        }
    }

    struct FailingTool {
        metadata: ToolMetadata,
    }

    #[async_trait]
    impl Tool for FailingTool {
        fn metadata(&self) -> &ToolMetadata {
            &self.metadata
        }

        async fn invoke(&self, _params: Value) -> Result<Value, ToolError> {
            Err(ToolError::ExecutionFailed("database exploded".to_string()))
        }
    }

    fn run_action_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "request": {
                    "type": "object",
                    "required": ["element_name", "action_type"],
                    "properties": {
                        "element_name": {"type": "string", "minLength": 1},
                        "action_type": {
                            "type": "string",
                            "enum": ["click", "type", "select", "hover", "scroll", "wait", "clear", "submit"]
                        }
                    }
                },
                "response": {
                    "type": "object",
                    "required": ["status"],
                    "properties": {"status": {"type": "string"}}
                }
            }
        })
    }

    async fn test_registry() -> (ToolRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let schemas_dir = dir.path().join("schemas");
        std::fs::create_dir(&schemas_dir).unwrap();
        std::fs::write(
            schemas_dir.join("run_action.json"),
            serde_json::to_vec(&run_action_schema()).unwrap(),
        )
        .unwrap();

        let validator = Arc::new(SchemaValidator::load(schemas_dir).await);
        let repository = Arc::new(ElementRepository::new(RepositoryConfig {
            storage_path: dir.path().join("element_storage.json"),
            ..RepositoryConfig::default()
        }));
        repository.initialize().await;

        let registry = ToolRegistry::new(validator, repository);
        registry.initialize().await;
        (registry, dir)
    }

    #[tokio::test]
    async fn test_initialize_registers_builtin_set() {
        let (registry, _dir) = test_registry().await;

        let tools = registry.list_tools(None).await;
        assert_eq!(tools.len(), 9);
        for name in [
            "run_action",
            "get_element",
            "bulk_generate_locators",
            "create_element",
            "add_element_version",
            "approve_element_version",
            "search_elements",
            "get_repository_stats",
            "analytics_log",
        ] {
            assert!(tools.contains(&name.to_string()), "missing {name}");
        }

        let stats = registry.get_registry_stats().await;
        assert_eq!(stats["total_tools"], 9);
        assert_eq!(stats["initialized"], true);
        assert_eq!(stats["categories"]["element_repository"], 5);

        // Second initialize is a no-op.
        registry.initialize().await;
        assert_eq!(registry.list_tools(None).await.len(), 9);
    }

    #[tokio::test]
    async fn test_call_tool_happy_path() {
        let (registry, _dir) = test_registry().await;

        let result = registry
            .call_tool(
                "run_action",
                json!({"element_name": "login_button", "action_type": "click"}),
            )
            .await
            .unwrap();
        assert_eq!(result["status"], "success");
        assert_eq!(result["selector_used"], "#login_button");
    }

    #[tokio::test]
    async fn test_call_tool_unknown_name() {
        let (registry, _dir) = test_registry().await;

        let err = registry.call_tool("nope", json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolNotFound);
        assert!(err.message.contains("is not registered"));
    }

    #[tokio::test]
    async fn test_validation_runs_before_tool_body() {
        let (registry, _dir) = test_registry().await;

        let err = registry
            .call_tool(
                "run_action",
                json!({"element_name": "x", "action_type": "invalid_enum_value"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidEnumValue);
    }

    #[tokio::test]
    async fn test_empty_params_skip_request_validation() {
        let (registry, _dir) = test_registry().await;

        // get_repository_stats has no schema document in this fixture; an
        // empty parameter object bypasses request validation entirely.
        let result = registry.call_tool("get_repository_stats", json!({})).await.unwrap();
        assert_eq!(result["total_elements"], 0);
    }

    #[tokio::test]
    async fn test_nonempty_params_without_schema_fail() {
        let (registry, _dir) = test_registry().await;

        let err = registry
            .call_tool("get_element", json!({"element_name": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaValidationFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_execution_timeout() {
        let (registry, _dir) = test_registry().await;
        registry
            .register_tool(Arc::new(SleepyTool::new(50, Duration::from_secs(60))))
            .await;

        let err = registry.call_tool("sleepy", json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolExecutionTimeout);
        assert!(err.message.contains("timed out after 50ms"));
        assert_eq!(err.retry_after, Some(5));
        assert_eq!(err.details.as_ref().unwrap()["timeout_ms"], 50);
    }

    #[tokio::test]
    async fn test_tool_failure_normalized_to_unexpected_error() {
        let (registry, _dir) = test_registry().await;
        registry
            .register_tool(Arc::new(FailingTool {
                metadata: ToolMetadata::new("failing", "Always fails", ToolCategory::Testing),
            }))
            .await;

        let err = registry.call_tool("failing", json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedError);
        assert_eq!(
            err.details.as_ref().unwrap()["error"],
            json!("database exploded")
        );
    }

    #[tokio::test]
    async fn test_unregister_and_reregister() {
        let (registry, _dir) = test_registry().await;

        registry.unregister_tool("analytics_log").await.unwrap();
        assert!(registry.get_tool("analytics_log").await.is_none());
        assert_eq!(registry.list_tools(None).await.len(), 8);

        let err = registry.unregister_tool("analytics_log").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolNotFound);

        // Overwriting keeps the category index consistent.
        registry.register_tool(Arc::new(RunActionTool::new())).await;
        let execution = registry.list_tools(Some(ToolCategory::Execution)).await;
        assert_eq!(execution, vec!["run_action"]);
    }

    #[tokio::test]
    async fn test_search_and_info() {
        let (registry, _dir) = test_registry().await;

        let hits = registry.search_tools("element").await;
        assert!(hits.contains(&"get_element".to_string()));
        assert!(hits.contains(&"create_element".to_string()));
        assert!(!hits.contains(&"analytics_log".to_string()));

        // Tag search.
        let hits = registry.search_tools("metrics").await;
        assert!(hits.contains(&"analytics_log".to_string()));

        let info = registry.get_tool_info("run_action").await.unwrap();
        assert_eq!(info["name"], "run_action");
        assert_eq!(info["timeout_ms"], 45_000);
        assert!(info["input_schema"]["required"].is_array());
        assert!(registry.get_tool_info("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_resets_registry() {
        let (registry, _dir) = test_registry().await;

        registry.cleanup().await;
        assert!(registry.list_tools(None).await.is_empty());
        let stats = registry.get_registry_stats().await;
        assert_eq!(stats["initialized"], false);

        // Re-initialization works after cleanup.
        registry.initialize().await;
        assert_eq!(registry.list_tools(None).await.len(), 9);
    }
}
