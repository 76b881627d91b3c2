//! Per-turn tool executor
//!
//! A `ToolExecutor` is bound to one flow (and optionally a task/subtask) and
//! to one role's curated tool set. The reasoning loop asks it for the tool
//! list, hands it the model's chosen call and learns from
//! `is_barrier_function` whether the turn is over.
//!
//! Every dispatched call leaves a `ToolCall` audit record that ends in
//! exactly one of `finished` or `failed`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::registry::ToolRegistry;
use super::schema::ToolDefinition;
use super::tool::{SummarizeHandler, Tool};
use crate::config::FlowToolsConfig;
use crate::core::{ExecContext, FlowError, FlowResult};
use crate::store::{MessageLogProvider, NewMessageLog, NewToolCall, ResultFormat, ToolCallStore};
use crate::vector::{keys, DocType, Document, TextSplitter, VectorStore};

/// Size and chunking knobs of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Results above this many bytes are summarized when possible
    pub summarize_threshold: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ExecutorSettings {
    pub fn from_config(config: &FlowToolsConfig) -> Self {
        Self {
            summarize_threshold: config.summarize_threshold,
            chunk_size: config.memory.chunk_size,
            chunk_overlap: config.memory.chunk_overlap,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_config(&FlowToolsConfig::default())
    }
}

/// Tool executor for one role within one flow
pub struct ToolExecutor {
    flow_id: i64,
    task_id: Option<i64>,
    subtask_id: Option<i64>,

    definitions: Vec<ToolDefinition>,
    handlers: HashMap<String, Arc<dyn Tool>>,
    barriers: HashSet<String>,
    summarizer: Option<SummarizeHandler>,

    registry: Arc<ToolRegistry>,
    store: Arc<dyn ToolCallStore>,
    messages: Option<Arc<dyn MessageLogProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    settings: ExecutorSettings,
}

impl ToolExecutor {
    pub fn new(flow_id: i64, registry: Arc<ToolRegistry>, store: Arc<dyn ToolCallStore>) -> Self {
        Self {
            flow_id,
            task_id: None,
            subtask_id: None,
            definitions: Vec::new(),
            handlers: HashMap::new(),
            barriers: HashSet::new(),
            summarizer: None,
            registry,
            store,
            messages: None,
            vector_store: None,
            settings: ExecutorSettings::default(),
        }
    }

    pub fn with_task(mut self, task_id: Option<i64>, subtask_id: Option<i64>) -> Self {
        self.task_id = task_id;
        self.subtask_id = subtask_id;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Option<SummarizeHandler>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_message_log(mut self, messages: Option<Arc<dyn MessageLogProvider>>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_vector_store(mut self, vector_store: Option<Arc<dyn VectorStore>>) -> Self {
        self.vector_store = vector_store;
        self
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Bind a catalog tool to its handler
    pub fn add_tool(&mut self, name: &str, tool: Arc<dyn Tool>) -> FlowResult<()> {
        let definition = self
            .registry
            .definition(name)
            .cloned()
            .ok_or_else(|| FlowError::UnknownTool(name.to_string()))?;
        self.add_definition(definition, tool);
        Ok(())
    }

    /// Bind a catalog tool that ends the agent's turn
    pub fn add_barrier(&mut self, name: &str, tool: Arc<dyn Tool>) -> FlowResult<()> {
        self.add_tool(name, tool)?;
        self.barriers.insert(name.to_string());
        Ok(())
    }

    /// Bind a tool described outside the catalog
    pub fn add_definition(&mut self, definition: ToolDefinition, tool: Arc<dyn Tool>) {
        self.definitions.retain(|d| d.name != definition.name);
        self.handlers.insert(definition.name.clone(), tool);
        self.definitions.push(definition);
    }

    /// Mark an already bound tool as a barrier
    pub fn mark_barrier(&mut self, name: &str) {
        self.barriers.insert(name.to_string());
    }

    /// Tool definitions advertised to the model
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    pub fn is_barrier_function(&self, name: &str) -> bool {
        self.barriers.contains(name)
    }

    pub fn barrier_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.barriers.iter().cloned().collect();
        names.sort();
        names
    }

    /// Definition of `name`, own tools first, then the shared catalog
    pub fn tool_schema(&self, name: &str) -> Option<ToolDefinition> {
        self.definitions
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .or_else(|| self.registry.definition(name).cloned())
    }

    pub fn flow_id(&self) -> i64 {
        self.flow_id
    }

    /// Execute one tool call chosen by the model
    ///
    /// Returns the text handed back to the model. Unknown tools and
    /// malformed arguments produce a corrective text without an audit
    /// record; infrastructure failures propagate after the record is
    /// marked failed.
    pub async fn execute(
        &self,
        ctx: &ExecContext,
        call_id: &str,
        name: &str,
        args: &str,
    ) -> FlowResult<String> {
        let Some(handler) = self.handlers.get(name) else {
            tracing::warn!("[ToolExecutor] Flow {}: unknown tool '{}'", self.flow_id, name);
            return Ok(format!("function {} not found", name));
        };

        let args: Value = match serde_json::from_str(args) {
            Ok(args) => args,
            Err(e) => {
                tracing::debug!("[ToolExecutor] Unparseable arguments for '{}': {}", name, e);
                return Ok(format!(
                    "failed to parse arguments of function {}: {}; send a valid JSON object and try again",
                    name, e
                ));
            }
        };
        if let Some(definition) = self.tool_schema(name) {
            if let Err(reason) = definition.validate_args(&args) {
                tracing::debug!("[ToolExecutor] Invalid arguments for '{}': {}", name, reason);
                return Ok(format!(
                    "invalid arguments of function {}: {}; fix them and try again",
                    name, reason
                ));
            }
        }

        let call = self
            .store
            .create_toolcall(NewToolCall {
                call_id: call_id.to_string(),
                name: name.to_string(),
                args: args.clone(),
                flow_id: self.flow_id,
                task_id: self.task_id,
                subtask_id: self.subtask_id,
            })
            .await?;

        let msg_id = self.put_message(name, &args).await;

        tracing::info!("[ToolExecutor] Executing tool '{}' (call {})", name, call_id);

        let mut result = match handler.handle(ctx, name, &args).await {
            Ok(result) => result,
            Err(e) if e.is_invalid_arguments() => {
                let text = format!("{}; fix the arguments and call the function again", e);
                self.store.fail_toolcall(call.id, &text).await?;
                self.update_message(msg_id, &text, ResultFormat::Plain).await;
                return Ok(text);
            }
            Err(e) => {
                tracing::error!("[ToolExecutor] Tool '{}' failed: {}", name, e);
                self.fail_call(call.id, &e).await;
                return Err(e);
            }
        };

        let mut format = self.registry.result_format(name);

        if self.registry.is_summarizable(name) && result.len() > self.settings.summarize_threshold {
            if let Some(summarizer) = &self.summarizer {
                match summarizer(ctx.clone(), result.clone()).await {
                    Ok(summary) => {
                        tracing::debug!(
                            "[ToolExecutor] Summarized '{}' result from {} to {} bytes",
                            name,
                            result.len(),
                            summary.len()
                        );
                        result = summary;
                        format = ResultFormat::Markdown;
                    }
                    Err(e) => {
                        tracing::warn!("[ToolExecutor] Summarizer failed for '{}': {}", name, e);
                        result = truncate(&result, self.settings.summarize_threshold);
                    }
                }
            }
        }

        if self.registry.is_storable(name) {
            if let Some(vector_store) = &self.vector_store {
                if let Err(e) = self.store_result(vector_store.as_ref(), name, &args, &result).await {
                    tracing::error!("[ToolExecutor] Failed to store '{}' result: {}", name, e);
                    self.fail_call(call.id, &e).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.store.finish_toolcall(call.id, &result).await {
            tracing::error!("[ToolExecutor] Failed to finish toolcall {}: {}", call.id, e);
            self.fail_call(call.id, &e).await;
            return Err(e);
        }
        self.update_message(msg_id, &result, format).await;

        Ok(result)
    }

    async fn fail_call(&self, id: i64, error: &FlowError) {
        if let Err(e) = self.store.fail_toolcall(id, &error.to_string()).await {
            tracing::error!("[ToolExecutor] Failed to mark toolcall {} failed: {}", id, e);
        }
    }

    async fn put_message(&self, name: &str, args: &Value) -> Option<i64> {
        let messages = self.messages.as_ref()?;
        let message = args.get("message").and_then(Value::as_str)?;
        if message.is_empty() {
            return None;
        }

        let entry = NewMessageLog {
            flow_id: self.flow_id,
            task_id: self.task_id,
            subtask_id: self.subtask_id,
            msg_type: self.registry.message_type(name),
            message: message.to_string(),
        };
        match messages.put_msg(entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("[ToolExecutor] Failed to write message log: {}", e);
                None
            }
        }
    }

    async fn update_message(&self, id: Option<i64>, result: &str, format: ResultFormat) {
        let (Some(id), Some(messages)) = (id, &self.messages) else {
            return;
        };
        if let Err(e) = messages.update_msg_result(id, result, format).await {
            tracing::warn!("[ToolExecutor] Failed to update message log {}: {}", id, e);
        }
    }

    async fn store_result(
        &self,
        vector_store: &dyn VectorStore,
        name: &str,
        args: &Value,
        result: &str,
    ) -> FlowResult<()> {
        let pretty_args = serde_json::to_string_pretty(args)?;
        let text = format!(
            "### Incoming arguments\n\n```json\n{}\n```\n\n#### Tool result\n\n{}",
            pretty_args, result
        );

        let splitter = TextSplitter::new(self.settings.chunk_size, self.settings.chunk_overlap);
        let chunks = splitter.split(&text);
        let total_size = text.len();

        let docs: Vec<Document> = chunks
            .into_iter()
            .map(|chunk| {
                let mut metadata = Map::new();
                metadata.insert(keys::DOC_TYPE.into(), DocType::Memory.as_str().into());
                metadata.insert(keys::FLOW_ID.into(), self.flow_id.into());
                if let Some(task_id) = self.task_id {
                    metadata.insert(keys::TASK_ID.into(), task_id.into());
                }
                if let Some(subtask_id) = self.subtask_id {
                    metadata.insert(keys::SUBTASK_ID.into(), subtask_id.into());
                }
                metadata.insert(keys::TOOL_NAME.into(), name.into());
                metadata.insert(keys::PART_SIZE.into(), chunk.len().into());
                metadata.insert(keys::TOTAL_SIZE.into(), total_size.into());
                Document::new(chunk, metadata)
            })
            .collect();

        let count = docs.len();
        vector_store.add_documents(docs).await?;
        tracing::debug!("[ToolExecutor] Stored {} memory chunks for '{}'", count, name);
        Ok(())
    }
}

/// Cut `text` to at most `limit` bytes on a char boundary
fn truncate(text: &str, limit: usize) -> String {
    let mut end = limit.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n\n... (output truncated)", &text[..end])
}
