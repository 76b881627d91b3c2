//! In-memory implementation of every persistence trait
//!
//! Useful for tests, demos and single-process deployments that do not need
//! the audit trail to survive a restart.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::*;
use crate::core::{FlowError, FlowResult};

#[derive(Default)]
struct StoreState {
    next_id: i64,
    toolcalls: BTreeMap<i64, ToolCall>,
    containers: BTreeMap<i64, ContainerRecord>,
    messages: BTreeMap<i64, MessageLog>,
    terminal: Vec<TerminalLog>,
    screenshots: Vec<ScreenshotLog>,
    agents: Vec<AgentLog>,
    searches: Vec<SearchLog>,
    vector: Vec<VectorStoreLog>,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store backed by ordered maps
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> FlowResult<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| FlowError::store("in-memory store lock poisoned"))
    }

    fn snapshot<T: Clone>(&self, f: impl FnOnce(&StoreState) -> Vec<T>) -> Vec<T> {
        match self.state.lock() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// All tool calls in creation order
    pub fn toolcalls(&self) -> Vec<ToolCall> {
        self.snapshot(|s| s.toolcalls.values().cloned().collect())
    }

    /// All container records, deleted ones excluded
    pub fn containers(&self) -> Vec<ContainerRecord> {
        self.snapshot(|s| s.containers.values().cloned().collect())
    }

    pub fn message_logs(&self) -> Vec<MessageLog> {
        self.snapshot(|s| s.messages.values().cloned().collect())
    }

    pub fn terminal_logs(&self) -> Vec<TerminalLog> {
        self.snapshot(|s| s.terminal.clone())
    }

    pub fn screenshots(&self) -> Vec<ScreenshotLog> {
        self.snapshot(|s| s.screenshots.clone())
    }

    pub fn agent_logs(&self) -> Vec<AgentLog> {
        self.snapshot(|s| s.agents.clone())
    }

    pub fn search_logs(&self) -> Vec<SearchLog> {
        self.snapshot(|s| s.searches.clone())
    }

    pub fn vector_store_logs(&self) -> Vec<VectorStoreLog> {
        self.snapshot(|s| s.vector.clone())
    }

    fn complete_toolcall(&self, id: i64, status: ToolCallStatus, result: &str) -> FlowResult<ToolCall> {
        let mut state = self.lock()?;
        let call = state
            .toolcalls
            .get_mut(&id)
            .ok_or_else(|| FlowError::store(format!("toolcall {} not found", id)))?;

        if call.status.is_terminal() {
            return Err(FlowError::store(format!(
                "toolcall {} is already {:?}",
                id, call.status
            )));
        }

        call.status = status;
        call.result = result.to_string();
        call.updated_at = Utc::now();
        Ok(call.clone())
    }
}

#[async_trait]
impl ToolCallStore for InMemoryStore {
    async fn create_toolcall(&self, call: NewToolCall) -> FlowResult<ToolCall> {
        let mut state = self.lock()?;
        let id = state.next_id();
        let now = Utc::now();
        let record = ToolCall {
            id,
            call_id: call.call_id,
            name: call.name,
            args: call.args,
            status: ToolCallStatus::Running,
            result: String::new(),
            flow_id: call.flow_id,
            task_id: call.task_id,
            subtask_id: call.subtask_id,
            created_at: now,
            updated_at: now,
        };
        state.toolcalls.insert(id, record.clone());
        Ok(record)
    }

    async fn finish_toolcall(&self, id: i64, result: &str) -> FlowResult<ToolCall> {
        self.complete_toolcall(id, ToolCallStatus::Finished, result)
    }

    async fn fail_toolcall(&self, id: i64, error: &str) -> FlowResult<ToolCall> {
        self.complete_toolcall(id, ToolCallStatus::Failed, error)
    }
}

#[async_trait]
impl ContainerStore for InMemoryStore {
    async fn get_primary_container(&self, flow_id: i64) -> FlowResult<Option<ContainerRecord>> {
        let state = self.lock()?;
        Ok(state
            .containers
            .values()
            .find(|c| c.flow_id == flow_id)
            .cloned())
    }

    async fn create_container(&self, container: NewContainer) -> FlowResult<ContainerRecord> {
        let mut state = self.lock()?;
        if state.containers.values().any(|c| c.flow_id == container.flow_id) {
            return Err(FlowError::store(format!(
                "flow {} already has a primary container",
                container.flow_id
            )));
        }

        let id = state.next_id();
        let record = ContainerRecord {
            id,
            flow_id: container.flow_id,
            name: container.name,
            image: container.image,
            local_id: None,
            status: ContainerStatus::Starting,
            created_at: Utc::now(),
        };
        state.containers.insert(id, record.clone());
        Ok(record)
    }

    async fn update_container(
        &self,
        id: i64,
        status: ContainerStatus,
        local_id: Option<&str>,
    ) -> FlowResult<ContainerRecord> {
        let mut state = self.lock()?;
        let record = state
            .containers
            .get_mut(&id)
            .ok_or_else(|| FlowError::store(format!("container {} not found", id)))?;
        record.status = status;
        if let Some(local_id) = local_id {
            record.local_id = Some(local_id.to_string());
        }
        Ok(record.clone())
    }

    async fn delete_container(&self, id: i64) -> FlowResult<()> {
        let mut state = self.lock()?;
        state
            .containers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| FlowError::store(format!("container {} not found", id)))
    }
}

#[async_trait]
impl MessageLogProvider for InMemoryStore {
    async fn put_msg(&self, entry: NewMessageLog) -> FlowResult<i64> {
        let mut state = self.lock()?;
        let id = state.next_id();
        state.messages.insert(
            id,
            MessageLog {
                id,
                flow_id: entry.flow_id,
                task_id: entry.task_id,
                subtask_id: entry.subtask_id,
                msg_type: entry.msg_type,
                message: entry.message,
                result: String::new(),
                result_format: ResultFormat::Plain,
            },
        );
        Ok(id)
    }

    async fn update_msg_result(&self, id: i64, result: &str, format: ResultFormat) -> FlowResult<()> {
        let mut state = self.lock()?;
        let msg = state
            .messages
            .get_mut(&id)
            .ok_or_else(|| FlowError::store(format!("message log {} not found", id)))?;
        msg.result = result.to_string();
        msg.result_format = format;
        Ok(())
    }
}

#[async_trait]
impl TerminalLogProvider for InMemoryStore {
    async fn put_terminal_log(&self, entry: TerminalLog) -> FlowResult<i64> {
        let mut state = self.lock()?;
        let id = state.next_id();
        state.terminal.push(entry);
        Ok(id)
    }
}

#[async_trait]
impl ScreenshotProvider for InMemoryStore {
    async fn put_screenshot(&self, entry: ScreenshotLog) -> FlowResult<i64> {
        let mut state = self.lock()?;
        let id = state.next_id();
        state.screenshots.push(entry);
        Ok(id)
    }
}

#[async_trait]
impl AgentLogProvider for InMemoryStore {
    async fn put_agent_log(&self, entry: AgentLog) -> FlowResult<i64> {
        let mut state = self.lock()?;
        let id = state.next_id();
        state.agents.push(entry);
        Ok(id)
    }
}

#[async_trait]
impl SearchLogProvider for InMemoryStore {
    async fn put_search_log(&self, entry: SearchLog) -> FlowResult<i64> {
        let mut state = self.lock()?;
        let id = state.next_id();
        state.searches.push(entry);
        Ok(id)
    }
}

#[async_trait]
impl VectorStoreLogProvider for InMemoryStore {
    async fn put_vector_store_log(&self, entry: VectorStoreLog) -> FlowResult<i64> {
        let mut state = self.lock()?;
        let id = state.next_id();
        state.vector.push(entry);
        Ok(id)
    }
}
