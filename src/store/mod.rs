//! Persistence boundary
//!
//! The runtime writes to a transactional store through these traits:
//! - `ToolCallStore` - Audit records of tool invocations
//! - `ContainerStore` - Per-flow sandbox container records
//! - Log sinks (`MessageLogProvider`, `TerminalLogProvider`, ...) - append-only
//!   structured logs that return the id of the created entry
//!
//! `InMemoryStore` implements all of them.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AgentType, FlowResult};

pub use memory::InMemoryStore;

// ============================================================================
// Tool calls
// ============================================================================

/// Lifecycle state of a persisted tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Running,
    Finished,
    Failed,
}

impl ToolCallStatus {
    /// Whether no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, ToolCallStatus::Finished | ToolCallStatus::Failed)
    }
}

/// Audit record of one tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: i64,
    /// Identifier assigned by the reasoning model
    pub call_id: String,
    pub name: String,
    pub args: Value,
    pub status: ToolCallStatus,
    pub result: String,
    pub flow_id: i64,
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a tool call record in `running` state
#[derive(Debug, Clone, PartialEq)]
pub struct NewToolCall {
    pub call_id: String,
    pub name: String,
    pub args: Value,
    pub flow_id: i64,
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
}

/// Storage of tool call audit records
///
/// Every record created by `create_toolcall` receives exactly one of
/// `finish_toolcall` or `fail_toolcall`.
#[async_trait]
pub trait ToolCallStore: Send + Sync {
    async fn create_toolcall(&self, call: NewToolCall) -> FlowResult<ToolCall>;

    async fn finish_toolcall(&self, id: i64, result: &str) -> FlowResult<ToolCall>;

    async fn fail_toolcall(&self, id: i64, error: &str) -> FlowResult<ToolCall>;
}

// ============================================================================
// Containers
// ============================================================================

/// Lifecycle state of a sandbox container record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Starting,
    Running,
    Stopped,
    Failed,
}

/// Persisted handle of a flow's sandbox container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: i64,
    pub flow_id: i64,
    pub name: String,
    pub image: String,
    /// Id assigned by the container runtime, once spawned
    pub local_id: Option<String>,
    pub status: ContainerStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a container record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContainer {
    pub flow_id: i64,
    pub name: String,
    pub image: String,
}

/// Storage of container records; at most one primary record per flow
#[async_trait]
pub trait ContainerStore: Send + Sync {
    async fn get_primary_container(&self, flow_id: i64) -> FlowResult<Option<ContainerRecord>>;

    async fn create_container(&self, container: NewContainer) -> FlowResult<ContainerRecord>;

    async fn update_container(
        &self,
        id: i64,
        status: ContainerStatus,
        local_id: Option<&str>,
    ) -> FlowResult<ContainerRecord>;

    async fn delete_container(&self, id: i64) -> FlowResult<()>;
}

/// Everything a flow tools executor persists
pub trait FlowStore: ToolCallStore + ContainerStore {}

impl<T: ToolCallStore + ContainerStore> FlowStore for T {}

// ============================================================================
// Log sinks
// ============================================================================

/// Category a message log entry is rendered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgLogType {
    Terminal,
    File,
    Browser,
    Search,
    Advice,
    Ask,
    Done,
    Thoughts,
}

/// How a tool result should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    Plain,
    Markdown,
    Terminal,
}

/// Human-readable narration of a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: i64,
    pub flow_id: i64,
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub msg_type: MsgLogType,
    pub message: String,
    pub result: String,
    pub result_format: ResultFormat,
}

/// Input for a message log entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessageLog {
    pub flow_id: i64,
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub msg_type: MsgLogType,
    pub message: String,
}

#[async_trait]
pub trait MessageLogProvider: Send + Sync {
    async fn put_msg(&self, entry: NewMessageLog) -> FlowResult<i64>;

    async fn update_msg_result(&self, id: i64, result: &str, format: ResultFormat) -> FlowResult<()>;
}

/// Terminal stream a log entry was captured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStream {
    Stdin,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalLog {
    pub flow_id: i64,
    pub container_id: i64,
    pub stream: TerminalStream,
    pub text: String,
}

#[async_trait]
pub trait TerminalLogProvider: Send + Sync {
    async fn put_terminal_log(&self, entry: TerminalLog) -> FlowResult<i64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotLog {
    pub flow_id: i64,
    pub name: String,
    pub url: String,
}

#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    async fn put_screenshot(&self, entry: ScreenshotLog) -> FlowResult<i64>;
}

/// Record of one role handing a task to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLog {
    pub flow_id: i64,
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub initiator: AgentType,
    pub executor: AgentType,
    pub task: String,
    pub result: String,
}

#[async_trait]
pub trait AgentLogProvider: Send + Sync {
    async fn put_agent_log(&self, entry: AgentLog) -> FlowResult<i64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchLog {
    pub flow_id: i64,
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub initiator: AgentType,
    pub executor: AgentType,
    pub engine: String,
    pub query: String,
    pub result: String,
}

#[async_trait]
pub trait SearchLogProvider: Send + Sync {
    async fn put_search_log(&self, entry: SearchLog) -> FlowResult<i64>;
}

/// Direction of a vector store access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreAction {
    Retrieve,
    Store,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreLog {
    pub flow_id: i64,
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub initiator: AgentType,
    pub executor: AgentType,
    /// Serialized metadata filter
    pub filter: String,
    pub query: String,
    pub action: VectorStoreAction,
    pub result: String,
}

#[async_trait]
pub trait VectorStoreLogProvider: Send + Sync {
    async fn put_vector_store_log(&self, entry: VectorStoreLog) -> FlowResult<i64>;
}
