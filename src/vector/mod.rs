//! Vector store boundary
//!
//! Long-term memory documents are chunks of text with flat JSON metadata,
//! appended to a similarity-searchable store and retrieved by
//! similarity + exact metadata match.
//!
//! - `VectorStore` - add/search/close capability set
//! - `InMemoryVectorStore` - embedding-backed implementation
//! - `EmbeddingProvider` / `HashEmbeddingProvider` - text embeddings
//! - `TextSplitter` - recursive character splitter used before storing

mod embeddings;
mod memory;
mod splitter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::FlowResult;

pub use embeddings::{Embedding, EmbeddingProvider, HashEmbeddingProvider};
pub use memory::InMemoryVectorStore;
pub use splitter::TextSplitter;

/// Metadata keys shared by every long-term-memory document
pub mod keys {
    pub const DOC_TYPE: &str = "doc_type";
    pub const FLOW_ID: &str = "flow_id";
    pub const TASK_ID: &str = "task_id";
    pub const SUBTASK_ID: &str = "subtask_id";
    pub const TOOL_NAME: &str = "tool_name";
    pub const PART_SIZE: &str = "part_size";
    pub const TOTAL_SIZE: &str = "total_size";
    pub const QUESTION: &str = "question";
    pub const GUIDE_TYPE: &str = "guide_type";
    pub const CODE_LANG: &str = "code_lang";
    pub const ANSWER_TYPE: &str = "answer_type";
    pub const DESCRIPTION: &str = "description";
}

/// Kind of long-term-memory document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Memory,
    Guide,
    Code,
    Answer,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Memory => "memory",
            DocType::Guide => "guide",
            DocType::Code => "code",
            DocType::Answer => "answer",
        }
    }
}

/// A chunk of text with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Parameters of a similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum number of hits
    pub limit: usize,
    /// Hits scoring below this are dropped
    pub score_threshold: f32,
    /// Every key must match the document metadata exactly
    pub filters: Map<String, Value>,
}

impl SearchOptions {
    pub fn new(limit: usize, score_threshold: f32) -> Self {
        Self {
            limit,
            score_threshold,
            filters: Map::new(),
        }
    }

    /// Add an exact-match metadata filter
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }
}

/// Embedding-backed similarity store
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Append documents, returning their ids
    async fn add_documents(&self, docs: Vec<Document>) -> FlowResult<Vec<String>>;

    /// Similarity search bounded by `opts`
    async fn similarity_search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> FlowResult<Vec<ScoredDocument>>;

    /// Release the underlying connection
    async fn close(&self) -> FlowResult<()> {
        Ok(())
    }
}
