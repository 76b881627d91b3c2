//! Tool trait definition
//!
//! Every callable tool, builtin or caller-supplied, implements this trait so
//! the executor can dispatch by name without knowing what sits behind it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::core::{AgentContext, AgentType, ExecContext, FlowResult};
use crate::store::{AgentLog, AgentLogProvider};

/// Trait for tools that an agent can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute the tool
    ///
    /// `name` is the tool name the call was dispatched under, so one value
    /// can serve several tools (terminal + file, search + store).
    /// Argument decode failures are returned as `FlowError::InvalidArguments`;
    /// tool-domain failures are returned as text.
    async fn handle(&self, ctx: &ExecContext, name: &str, args: &Value) -> FlowResult<String>;

    /// Whether the tool's backing capability is configured
    ///
    /// Must not perform I/O.
    fn is_available(&self) -> bool {
        true
    }
}

/// Caller-supplied async handler for handoff, barrier and custom tools
pub type ToolHandler =
    Arc<dyn Fn(ExecContext, String, Value) -> BoxFuture<'static, FlowResult<String>> + Send + Sync>;

/// Caller-supplied summarizer for oversized results
pub type SummarizeHandler =
    Arc<dyn Fn(ExecContext, String) -> BoxFuture<'static, FlowResult<String>> + Send + Sync>;

/// Box an async closure into a `ToolHandler`
pub fn tool_handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(ExecContext, String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FlowResult<String>> + Send + 'static,
{
    Arc::new(move |ctx, name, args| f(ctx, name, args).boxed())
}

/// Box an async closure into a `SummarizeHandler`
pub fn summarize_handler<F, Fut>(f: F) -> SummarizeHandler
where
    F: Fn(ExecContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FlowResult<String>> + Send + 'static,
{
    Arc::new(move |ctx, text| f(ctx, text).boxed())
}

/// Where agent-log entries for a handoff are written
#[derive(Clone)]
pub struct AgentLogScope {
    pub sink: Arc<dyn AgentLogProvider>,
    pub flow_id: i64,
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
}

/// Wraps a caller-supplied handler in the `Tool` contract
///
/// A handoff delegates work to another role: the target role is pushed onto
/// the agent context before the handler runs, and when a log scope is set the
/// delegation is recorded as an agent log. Barriers and custom tools use the
/// same wrapper without a target role.
pub struct HandoffTool {
    target: Option<AgentType>,
    handler: ToolHandler,
    log: Option<AgentLogScope>,
}

impl HandoffTool {
    /// Handoff to `target`
    pub fn new(target: AgentType, handler: ToolHandler) -> Self {
        Self {
            target: Some(target),
            handler,
            log: None,
        }
    }

    /// Plain wrapper, no role push and no agent log
    pub fn passthrough(handler: ToolHandler) -> Self {
        Self {
            target: None,
            handler,
            log: None,
        }
    }

    pub fn with_agent_log(mut self, log: Option<AgentLogScope>) -> Self {
        self.log = log;
        self
    }

    fn task_text(args: &Value) -> String {
        ["question", "input", "message"]
            .iter()
            .find_map(|key| args.get(key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| args.to_string())
    }
}

#[async_trait]
impl Tool for HandoffTool {
    async fn handle(&self, ctx: &ExecContext, name: &str, args: &Value) -> FlowResult<String> {
        let inner = match self.target {
            Some(target) => AgentContext::push(ctx, target),
            None => ctx.clone(),
        };

        let result = (self.handler)(inner, name.to_string(), args.clone()).await?;

        if let (Some(target), Some(log)) = (self.target, &self.log) {
            let initiator = AgentContext::read(ctx)
                .map(|a| a.current_agent_type)
                .unwrap_or(AgentType::Primary);
            let entry = AgentLog {
                flow_id: log.flow_id,
                task_id: log.task_id,
                subtask_id: log.subtask_id,
                initiator,
                executor: target,
                task: Self::task_text(args),
                result: result.clone(),
            };
            if let Err(e) = log.sink.put_agent_log(entry).await {
                tracing::warn!("[HandoffTool] Failed to write agent log for '{}': {}", name, e);
            }
        }

        Ok(result)
    }
}
