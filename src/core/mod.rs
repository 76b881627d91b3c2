//! Core types for the flow tools runtime
//!
//! - `AgentContext` / `ExecContext` - Attribution and cancellation passed to tools
//! - `AgentType` - Agent roles
//! - `FlowError` - Error types

pub mod context;
pub mod error;

pub use context::{AgentContext, AgentType, ExecContext};
pub use error::{FlowError, FlowResult};
