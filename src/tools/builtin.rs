//! Built-in tool set registered at initialization.
//!
//! The execution and analytics tools are stubs with stable response shapes
//! (downstream consumers validate against them); the element-repository
//! tools delegate to the shared [`ElementRepository`] instance.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::repository::ElementRepository;
use crate::repository::types::NewLocator;
use crate::tools::tool::{
    Tool, ToolCategory, ToolError, ToolMetadata, optional_bool, optional_str, optional_u64,
    require_param, require_str,
};

/// Build a [`NewLocator`] from the common locator parameter set.
fn locator_from_params(params: &Value) -> Result<NewLocator, ToolError> {
    let mut locator = NewLocator::new(require_str(params, "css_selector")?);
    if let Some(xpath) = optional_str(params, "xpath_selector") {
        locator = locator.xpath(xpath);
    }
    if let Some(alternatives) = params.get("alternatives").and_then(Value::as_array) {
        locator = locator.alternatives(
            alternatives
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        );
    }
    if let Some(creator) = optional_str(params, "created_by") {
        locator = locator.created_by(creator);
    }
    if let Some(reasoning) = optional_str(params, "ai_reasoning") {
        locator = locator.reasoning(reasoning);
    }
    if let Some(score) = params.get("confidence_score").and_then(Value::as_f64) {
        locator = locator.confidence(score);
    }
    Ok(locator)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::ExecutionFailed(e.to_string()))
}

/// Stub executor for single UI actions.
pub struct RunActionTool {
    metadata: ToolMetadata,
}

impl RunActionTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new(
                "run_action",
                "Execute a single test action with self-healing capabilities",
                ToolCategory::Execution,
            )
            .timeout_ms(45_000)
            .tags(&["execution", "testing", "core"]),
        }
    }
}

impl Default for RunActionTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for RunActionTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, params: Value) -> Result<Value, ToolError> {
        let element_name = require_str(&params, "element_name")?;
        let action_type = require_str(&params, "action_type")?;

        Ok(json!({
            "status": "success",
            "execution_time_ms": 1250,
            "selector_used": format!("#{element_name}"),
            "message": format!("Executed {action_type} on {element_name}"),
        }))
    }
}

/// Repository-backed element lookup.
pub struct GetElementTool {
    metadata: ToolMetadata,
    repository: Arc<ElementRepository>,
}

impl GetElementTool {
    pub fn new(repository: Arc<ElementRepository>) -> Self {
        Self {
            metadata: ToolMetadata::new(
                "get_element",
                "Retrieve element locator from repository",
                ToolCategory::ElementRepository,
            )
            .timeout_ms(5_000)
            .tags(&["element", "repository", "core"]),
            repository,
        }
    }
}

#[async_trait]
impl Tool for GetElementTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, params: Value) -> Result<Value, ToolError> {
        let element_name = require_str(&params, "element_name")?;
        let include_inactive = optional_bool(&params, "include_inactive").unwrap_or(false);

        match self.repository.get_element(element_name, include_inactive).await {
            Some(record) => Ok(json!({"found": true, "element": to_json(&record)?})),
            None => Ok(json!({"found": false, "element": null})),
        }
    }
}

/// Stub bulk locator generation.
pub struct BulkGenerateLocatorsTool {
    metadata: ToolMetadata,
}

impl BulkGenerateLocatorsTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new(
                "bulk_generate_locators",
                "Generate multiple element locators using AI",
                ToolCategory::ElementRepository,
            )
            .timeout_ms(60_000)
            .tags(&["element", "ai", "generation"]),
        }
    }
}

impl Default for BulkGenerateLocatorsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BulkGenerateLocatorsTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, params: Value) -> Result<Value, ToolError> {
        let names = require_param(&params, "element_names")?
            .as_array()
            .ok_or_else(|| {
                ToolError::InvalidParameters("'element_names' must be an array".to_string())
            })?;

        let locators: Vec<Value> = names
            .iter()
            .filter_map(Value::as_str)
            .map(|name| {
                json!({
                    "element_name": name,
                    "selector": format!("#{name}"),
                    "confidence": 0.87,
                    "ai_reasoning": format!("Primary element with ID matching {name}"),
                })
            })
            .collect();

        Ok(json!({
            "locators": locators,
            "batch_confidence": 0.87,
            "review_required": false,
            "estimated_review_time_minutes": 5,
        }))
    }
}

/// Stub analytics sink.
pub struct AnalyticsLogTool {
    metadata: ToolMetadata,
}

impl AnalyticsLogTool {
    pub fn new() -> Self {
        Self {
            metadata: ToolMetadata::new(
                "analytics_log",
                "Record execution metrics and performance data",
                ToolCategory::Analytics,
            )
            .timeout_ms(2_000)
            .tags(&["analytics", "metrics", "logging"]),
        }
    }
}

impl Default for AnalyticsLogTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AnalyticsLogTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, params: Value) -> Result<Value, ToolError> {
        let event_type = require_str(&params, "event_type")?;
        info!(event_type, "analytics event recorded");

        Ok(json!({
            "logged": true,
            "event_id": format!("evt_{}", Uuid::new_v4()),
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

/// Repository-backed element creation.
pub struct CreateElementTool {
    metadata: ToolMetadata,
    repository: Arc<ElementRepository>,
}

impl CreateElementTool {
    pub fn new(repository: Arc<ElementRepository>) -> Self {
        Self {
            metadata: ToolMetadata::new(
                "create_element",
                "Create a new element locator in the repository",
                ToolCategory::ElementRepository,
            )
            .timeout_ms(5_000)
            .tags(&["element", "repository", "core"]),
            repository,
        }
    }
}

#[async_trait]
impl Tool for CreateElementTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, params: Value) -> Result<Value, ToolError> {
        let element_name = require_str(&params, "element_name")?;
        let locator = locator_from_params(&params)?;

        let record = self.repository.create_element(element_name, locator).await?;
        Ok(json!({"created": true, "element": to_json(&record)?}))
    }
}

/// Repository-backed version addition.
pub struct AddElementVersionTool {
    metadata: ToolMetadata,
    repository: Arc<ElementRepository>,
}

impl AddElementVersionTool {
    pub fn new(repository: Arc<ElementRepository>) -> Self {
        Self {
            metadata: ToolMetadata::new(
                "add_element_version",
                "Add a new locator version to an existing element",
                ToolCategory::ElementRepository,
            )
            .timeout_ms(5_000)
            .tags(&["element", "repository", "versioning"]),
            repository,
        }
    }
}

#[async_trait]
impl Tool for AddElementVersionTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, params: Value) -> Result<Value, ToolError> {
        let element_name = require_str(&params, "element_name")?;
        let locator = locator_from_params(&params)?;

        let version = self.repository.add_version(element_name, locator).await?;
        Ok(json!({"added": true, "version": to_json(&version)?}))
    }
}

/// Repository-backed approval.
pub struct ApproveElementVersionTool {
    metadata: ToolMetadata,
    repository: Arc<ElementRepository>,
}

impl ApproveElementVersionTool {
    pub fn new(repository: Arc<ElementRepository>) -> Self {
        Self {
            metadata: ToolMetadata::new(
                "approve_element_version",
                "Approve a pending locator version and activate it",
                ToolCategory::Workflow,
            )
            .timeout_ms(5_000)
            .tags(&["element", "workflow", "approval"]),
            repository,
        }
    }
}

#[async_trait]
impl Tool for ApproveElementVersionTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, params: Value) -> Result<Value, ToolError> {
        let element_name = require_str(&params, "element_name")?;
        let version = optional_u64(&params, "version").ok_or_else(|| {
            ToolError::InvalidParameters("missing integer parameter 'version'".to_string())
        })?;
        let approver = require_str(&params, "approver")?;

        let approved = self
            .repository
            .approve_version(element_name, version as u32, approver)
            .await;
        Ok(json!({"approved": approved}))
    }
}

/// Repository-backed search.
pub struct SearchElementsTool {
    metadata: ToolMetadata,
    repository: Arc<ElementRepository>,
}

impl SearchElementsTool {
    pub fn new(repository: Arc<ElementRepository>) -> Self {
        Self {
            metadata: ToolMetadata::new(
                "search_elements",
                "Search element locators by name or selector",
                ToolCategory::ElementRepository,
            )
            .timeout_ms(5_000)
            .tags(&["element", "repository", "search"]),
            repository,
        }
    }
}

#[async_trait]
impl Tool for SearchElementsTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, params: Value) -> Result<Value, ToolError> {
        let query = require_str(&params, "query")?;
        let limit = optional_u64(&params, "limit").unwrap_or(50) as usize;

        let results = self.repository.search_elements(query, limit).await;
        Ok(json!({"results": to_json(&results)?, "count": results.len()}))
    }
}

/// Repository statistics report.
pub struct GetRepositoryStatsTool {
    metadata: ToolMetadata,
    repository: Arc<ElementRepository>,
}

impl GetRepositoryStatsTool {
    pub fn new(repository: Arc<ElementRepository>) -> Self {
        Self {
            metadata: ToolMetadata::new(
                "get_repository_stats",
                "Report element repository and cache statistics",
                ToolCategory::Analytics,
            )
            .timeout_ms(5_000)
            .tags(&["repository", "analytics", "stats"]),
            repository,
        }
    }
}

#[async_trait]
impl Tool for GetRepositoryStatsTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, _params: Value) -> Result<Value, ToolError> {
        let stats = self.repository.get_stats().await;
        to_json(&stats)
    }
}
