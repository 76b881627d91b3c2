//! Runtime error types

use thiserror::Error;

/// Errors that can occur in the flow tools runtime
///
/// Only infrastructure failures travel as `FlowError`. Tool-domain failures
/// (a failing command, an empty search) are returned to the agent as text.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Tool arguments could not be decoded into the tool's input type
    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// A tool was dispatched to a handler that does not serve it
    #[error("tool '{0}' is not handled here")]
    UnknownTool(String),

    /// A role executor was requested without one of its required handlers
    #[error("missing required handler '{handler}' for {role} executor")]
    MissingHandler { role: String, handler: String },

    /// Persistence layer failure
    #[error("store error: {0}")]
    Store(String),

    /// Container runtime failure
    #[error("container error: {0}")]
    Container(String),

    /// Vector store failure
    #[error("vector store error: {0}")]
    VectorStore(String),

    /// Release finished but some steps failed
    #[error("flow {flow_id} released partially: {}", errors.join("; "))]
    PartialRelease { flow_id: i64, errors: Vec<String> },

    /// Command execution deadline passed before the output stream ended
    #[error("command timed out after {secs}s")]
    Timeout { secs: u64, partial: String },

    /// Operation cancelled through the execution context
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP transport failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Handler-returned failure
    #[error("{0}")]
    Other(String),
}

impl FlowError {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        FlowError::Other(msg.into())
    }

    /// Create an invalid arguments error
    pub fn invalid_args(tool: impl Into<String>, reason: impl ToString) -> Self {
        FlowError::InvalidArguments {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        FlowError::Store(msg.into())
    }

    /// Create a container error
    pub fn container(msg: impl Into<String>) -> Self {
        FlowError::Container(msg.into())
    }

    /// Create a vector store error
    pub fn vector_store(msg: impl Into<String>) -> Self {
        FlowError::VectorStore(msg.into())
    }

    /// Whether the agent can recover from this error by fixing its arguments
    pub fn is_invalid_arguments(&self) -> bool {
        matches!(self, FlowError::InvalidArguments { .. })
    }
}

/// Result type alias for runtime operations
pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlowError::invalid_args("terminal", "missing field `input`");
        assert_eq!(
            err.to_string(),
            "invalid arguments for tool 'terminal': missing field `input`"
        );

        let err = FlowError::MissingHandler {
            role: "coder".into(),
            handler: "advice".into(),
        };
        assert_eq!(err.to_string(), "missing required handler 'advice' for coder executor");
    }

    #[test]
    fn test_partial_release_lists_every_step() {
        let err = FlowError::PartialRelease {
            flow_id: 7,
            errors: vec!["close vector store: boom".into(), "delete container: gone".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("flow 7"));
        assert!(msg.contains("boom"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FlowError = io_err.into();
        assert!(matches!(err, FlowError::Io(_)));
        assert!(!err.is_invalid_arguments());
    }
}
