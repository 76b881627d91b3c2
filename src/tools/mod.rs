//! Tool system for the flow runtime
//!
//! This module provides:
//! - `Tool` trait - Interface every callable tool implements
//! - `ToolRegistry` - Immutable catalog of definitions and classifications
//! - `ToolExecutor` - Per-turn dispatcher with audit records
//! - `HandoffTool` - Wrapper for caller-supplied handoff and barrier handlers
//! - `common` - Built-in tools (terminal, file, browser, search, memory)

mod executor;
mod registry;
mod schema;
mod tool;

/// Built-in tools
pub mod common;

// Core exports
pub use executor::{ExecutorSettings, ToolExecutor};
pub use registry::{names, ToolRegistry};
pub use schema::{ToolDefinition, ToolInputSchema};
pub use tool::{
    summarize_handler, tool_handler, AgentLogScope, HandoffTool, SummarizeHandler, Tool,
    ToolHandler,
};

// Re-export common tools for convenience
pub use common::{BrowserTool, MemoryTool, SearchEngine, SearchLogScope, SearchTool, TerminalTool};
