//! Execution context passed to tools

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

// ============================================================================
// AgentType - Named agent personas
// ============================================================================

/// Agent role that owns a tool catalog or appears in attribution logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Primary,
    Adviser,
    Coder,
    Installer,
    Pentester,
    Searcher,
    Generator,
    Memorist,
    Enricher,
    Reporter,
    Summarizer,
    Custom,
}

impl AgentType {
    /// Stable lowercase name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Primary => "primary",
            AgentType::Adviser => "adviser",
            AgentType::Coder => "coder",
            AgentType::Installer => "installer",
            AgentType::Pentester => "pentester",
            AgentType::Searcher => "searcher",
            AgentType::Generator => "generator",
            AgentType::Memorist => "memorist",
            AgentType::Enricher => "enricher",
            AgentType::Reporter => "reporter",
            AgentType::Summarizer => "summarizer",
            AgentType::Custom => "custom",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// AgentContext - Attribution pair
// ============================================================================

/// Who asked and who answers within a chain of nested tool calls
///
/// Only read by loggers. Never consulted for dispatch or authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentContext {
    /// Role that handed off to the current one
    pub parent_agent_type: AgentType,
    /// Role currently executing
    pub current_agent_type: AgentType,
}

impl AgentContext {
    /// Derive a context where `agent` is the current role
    ///
    /// The first push sets both parent and current to `agent`; later pushes
    /// shift the previous current role into the parent slot.
    pub fn push(ctx: &ExecContext, agent: AgentType) -> ExecContext {
        let agent_ctx = match ctx.agent {
            None => AgentContext {
                parent_agent_type: agent,
                current_agent_type: agent,
            },
            Some(prev) => AgentContext {
                parent_agent_type: prev.current_agent_type,
                current_agent_type: agent,
            },
        };

        ExecContext {
            agent: Some(agent_ctx),
            cancel: ctx.cancel.clone(),
        }
    }

    /// Read the attribution pair, if any role has been pushed
    pub fn read(ctx: &ExecContext) -> Option<AgentContext> {
        ctx.agent
    }
}

// ============================================================================
// ExecContext - Value threaded through every tool invocation
// ============================================================================

/// Cancellable execution context handed to every tool handler
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    agent: Option<AgentContext>,
    cancel: CancellationToken,
}

impl ExecContext {
    /// Create a root context with no agent attribution
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root context bound to an existing cancellation token
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { agent: None, cancel }
    }

    /// Create a root context already attributed to `agent`
    pub fn for_agent(agent: AgentType) -> Self {
        AgentContext::push(&Self::new(), agent)
    }

    /// Cancellation token shared by all contexts derived from this one
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Request cancellation for this context and all derived ones
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
