//! Server facade over the tool registry.
//!
//! Owns process lifecycle (start/stop), request/error counters, the static
//! bearer-token check, and the response envelope callers consume. Transport
//! is out of scope: an HTTP layer calls [`McpServer::handle_tool_call`] and
//! friends and serializes the returned JSON as-is.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

use crate::config::{AuthConfig, Config};
use crate::error::{ErrorCode, McpError};
use crate::repository::ElementRepository;
use crate::tools::registry::ToolRegistry;
use crate::tools::schema::SchemaValidator;
use crate::tools::tool::ToolCategory;

#[derive(Default)]
struct ServerState {
    running: bool,
    started_at: Option<Instant>,
    request_count: u64,
    error_count: u64,
}

/// Facade wiring the repository, schema validator and registry together.
pub struct McpServer {
    auth: AuthConfig,
    repository: Arc<ElementRepository>,
    registry: Arc<ToolRegistry>,
    state: Mutex<ServerState>,
}

impl McpServer {
    /// Build the full component stack from configuration. Nothing is
    /// initialized until [`start`](Self::start).
    pub async fn new(config: Config) -> Self {
        let repository = Arc::new(ElementRepository::new(config.repository));
        let validator = Arc::new(SchemaValidator::load(config.registry.schemas_dir).await);
        let registry = Arc::new(ToolRegistry::new(validator, repository.clone()));

        Self {
            auth: config.registry.auth,
            repository,
            registry,
            state: Mutex::new(ServerState::default()),
        }
    }

    /// Initialize the repository and registry and reset the counters.
    /// Starting an already running server is a logged no-op.
    pub async fn start(&self) {
        if self.lock_state().running {
            warn!("server is already running");
            return;
        }

        info!("starting MCP server");
        self.repository.initialize().await;
        self.registry.initialize().await;

        let mut state = self.lock_state();
        state.running = true;
        state.started_at = Some(Instant::now());
        state.request_count = 0;
        state.error_count = 0;
        drop(state);
        info!("MCP server started");
    }

    /// Tear down the registry and flush the repository. Stopping a stopped
    /// server is a logged no-op.
    pub async fn stop(&self) {
        if !self.lock_state().running {
            warn!("server is not running");
            return;
        }

        info!("stopping MCP server");
        self.registry.cleanup().await;
        self.repository.cleanup().await;
        self.lock_state().running = false;
        info!("MCP server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().running
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.lock_state()
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Dispatch one tool call and wrap the outcome in the response envelope.
    ///
    /// Success: `{status, result, execution_time_ms, tool_name, timestamp}`.
    /// Failure: `{status, error, tool_name, timestamp}` with the structured
    /// error as `error`. Failures never propagate as `Err`.
    pub async fn handle_tool_call(
        &self,
        tool_name: &str,
        parameters: Value,
        auth_token: Option<&str>,
    ) -> Value {
        self.lock_state().request_count += 1;

        if let Some(metadata) = self.registry.get_metadata(tool_name).await
            && metadata.requires_auth
            && self.auth.required
            && let Err(err) = self.check_auth(auth_token)
        {
            return self.error_envelope(tool_name, err);
        }

        let start = Instant::now();
        match self.registry.call_tool(tool_name, parameters).await {
            Ok(result) => json!({
                "status": "success",
                "result": result,
                "execution_time_ms": start.elapsed().as_millis() as u64,
                "tool_name": tool_name,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
            Err(err) => self.error_envelope(tool_name, err),
        }
    }

    pub async fn list_tools(&self, category: Option<ToolCategory>) -> Value {
        let tools = self.registry.list_tools(category).await;
        json!({
            "status": "success",
            "tools": tools,
            "count": tools.len(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    pub async fn get_tool_info(&self, tool_name: &str) -> Value {
        match self.registry.get_tool_info(tool_name).await {
            Some(info) => json!({
                "status": "success",
                "tool": info,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
            None => self.error_envelope(
                tool_name,
                McpError::not_found(
                    ErrorCode::ToolNotFound,
                    format!("Tool '{tool_name}' is not registered"),
                    tool_name,
                ),
            ),
        }
    }

    pub async fn search_tools(&self, query: &str) -> Value {
        let matches = self.registry.search_tools(query).await;
        json!({
            "status": "success",
            "query": query,
            "matches": matches,
            "count": matches.len(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Comprehensive status report for operators.
    pub async fn get_server_status(&self) -> Value {
        let registry_stats = self.registry.get_registry_stats().await;
        let repository_stats = self.repository.get_stats().await;
        let state = self.lock_state();

        json!({
            "status": if state.running { "running" } else { "stopped" },
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": state.started_at.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0),
            "request_count": state.request_count,
            "error_count": state.error_count,
            "error_rate": state.error_count as f64 / state.request_count.max(1) as f64,
            "tools": registry_stats,
            "repository": repository_stats,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Minimal liveness payload for health checks.
    pub fn get_health_status(&self) -> Value {
        json!({
            "status": if self.is_running() { "healthy" } else { "unhealthy" },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Constant-time comparison of the supplied token against the
    /// configured one.
    fn check_auth(&self, token: Option<&str>) -> Result<(), McpError> {
        let Some(expected) = &self.auth.token else {
            // Auth required but no token configured: reject everything.
            return Err(McpError::new(
                ErrorCode::MissingAuthToken,
                "Authentication is required but no token is configured",
            ));
        };
        let Some(token) = token else {
            return Err(McpError::new(
                ErrorCode::MissingAuthToken,
                "Authentication token is required",
            ));
        };
        if token.as_bytes().ct_eq(expected.as_bytes()).into() {
            Ok(())
        } else {
            Err(McpError::new(
                ErrorCode::InvalidAuthToken,
                "Authentication token is invalid",
            ))
        }
    }

    fn error_envelope(&self, tool_name: &str, err: McpError) -> Value {
        self.lock_state().error_count += 1;
        error!(tool = tool_name, "tool call failed: {err}");
        json!({
            "status": "error",
            "error": err.to_value(),
            "tool_name": tool_name,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
