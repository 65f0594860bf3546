//! Tool layer: trait, schema validation, registration and dispatch.

pub mod builtin;
pub mod registry;
pub mod schema;
pub mod tool;

pub use registry::ToolRegistry;
pub use schema::SchemaValidator;
pub use tool::{BlockingTool, Tool, ToolCategory, ToolError, ToolMetadata};
