//! Core of an MCP-style tool-registry service for a test-automation
//! platform: a versioned element-locator repository (TTL/LRU cache,
//! approval workflow, usage statistics) behind a schema-validated,
//! timeout-bounded tool dispatch layer.
//!
//! Transport is out of scope. An embedding HTTP service constructs a
//! [`server::McpServer`] from [`config::Config`], calls `start()`, and
//! forwards tool calls to `handle_tool_call`.

pub mod config;
pub mod error;
pub mod repository;
pub mod server;
pub mod tools;

pub use config::Config;
pub use error::{ErrorCategory, ErrorCode, McpError};
pub use repository::{ElementRepository, RepositoryError, RepositoryStats};
pub use server::McpServer;
pub use tools::{SchemaValidator, Tool, ToolCategory, ToolError, ToolMetadata, ToolRegistry};
