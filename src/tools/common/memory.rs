//! Vector memory tools
//!
//! - `search_in_memory` - earlier tool results of this flow
//! - `search_guide` / `store_guide` - reusable how-to guides
//! - `search_code` / `store_code` - reusable code samples
//! - `search_answer` / `store_answer` - reusable answers
//!
//! Guides, code and answers are shared across flows; memory search is
//! scoped to the flow and, when asked, narrowed to a task or subtask.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::super::registry::names;
use super::super::tool::Tool;
use crate::config::MemoryConfig;
use crate::core::{AgentContext, ExecContext, FlowError, FlowResult};
use crate::store::{VectorStoreAction, VectorStoreLog, VectorStoreLogProvider};
use crate::vector::{keys, DocType, Document, ScoredDocument, SearchOptions, TextSplitter, VectorStore};

#[derive(Debug, Deserialize)]
struct MemorySearch {
    question: String,
    #[serde(default)]
    task_id: Option<i64>,
    #[serde(default)]
    subtask_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TypedSearch {
    question: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct CodeSearch {
    question: String,
    lang: String,
}

#[derive(Debug, Deserialize)]
struct GuideStore {
    guide: String,
    question: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct CodeStore {
    code: String,
    question: String,
    lang: String,
    explanation: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct AnswerStore {
    answer: String,
    question: String,
    #[serde(rename = "type")]
    kind: String,
}

fn decode<T: serde::de::DeserializeOwned>(name: &str, args: &Value) -> FlowResult<T> {
    serde_json::from_value(args.clone()).map_err(|e| FlowError::invalid_args(name, e))
}

/// Search and store tools over the long-term memory store
pub struct MemoryTool {
    flow_id: i64,
    task_id: Option<i64>,
    subtask_id: Option<i64>,
    store: Option<Arc<dyn VectorStore>>,
    config: MemoryConfig,
    log: Option<Arc<dyn VectorStoreLogProvider>>,
}

impl MemoryTool {
    pub fn new(flow_id: i64, store: Option<Arc<dyn VectorStore>>, config: MemoryConfig) -> Self {
        Self {
            flow_id,
            task_id: None,
            subtask_id: None,
            store,
            config,
            log: None,
        }
    }

    pub fn with_task(mut self, task_id: Option<i64>, subtask_id: Option<i64>) -> Self {
        self.task_id = task_id;
        self.subtask_id = subtask_id;
        self
    }

    pub fn with_memory_log(mut self, log: Option<Arc<dyn VectorStoreLogProvider>>) -> Self {
        self.log = log;
        self
    }

    fn store(&self) -> FlowResult<&Arc<dyn VectorStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| FlowError::vector_store("vector store is not configured"))
    }

    fn options(&self) -> SearchOptions {
        SearchOptions::new(self.config.result_limit, self.config.score_threshold)
    }

    async fn search(
        &self,
        ctx: &ExecContext,
        query: &str,
        opts: &SearchOptions,
    ) -> FlowResult<Vec<ScoredDocument>> {
        let store = self.store()?;
        let docs = store.similarity_search(query, opts).await.map_err(|e| {
            tracing::error!("[MemoryTool] Similarity search failed: {}", e);
            e
        })?;

        let summary = if docs.is_empty() {
            "nothing found".to_string()
        } else {
            format_documents(&docs)
        };
        self.write_log(ctx, VectorStoreAction::Retrieve, &opts.filters, query, &summary)
            .await;
        Ok(docs)
    }

    async fn store_documents(
        &self,
        ctx: &ExecContext,
        doc_type: DocType,
        content: &str,
        query: &str,
        extra: Map<String, Value>,
    ) -> FlowResult<usize> {
        let store = self.store()?;
        let splitter = TextSplitter::new(self.config.chunk_size, self.config.chunk_overlap);

        let mut base = extra;
        base.insert(keys::DOC_TYPE.into(), doc_type.as_str().into());
        base.insert(keys::FLOW_ID.into(), self.flow_id.into());
        if let Some(task_id) = self.task_id {
            base.insert(keys::TASK_ID.into(), task_id.into());
        }
        if let Some(subtask_id) = self.subtask_id {
            base.insert(keys::SUBTASK_ID.into(), subtask_id.into());
        }

        let docs: Vec<Document> = splitter
            .split(content)
            .into_iter()
            .map(|chunk| {
                let mut metadata = base.clone();
                metadata.insert(keys::PART_SIZE.into(), chunk.len().into());
                metadata.insert(keys::TOTAL_SIZE.into(), content.len().into());
                Document::new(chunk, metadata)
            })
            .collect();
        let count = docs.len();

        store.add_documents(docs).await.map_err(|e| {
            tracing::error!("[MemoryTool] Failed to store {} documents: {}", doc_type.as_str(), e);
            e
        })?;

        self.write_log(ctx, VectorStoreAction::Store, &base, query, content).await;
        Ok(count)
    }

    async fn write_log(
        &self,
        ctx: &ExecContext,
        action: VectorStoreAction,
        filter: &Map<String, Value>,
        query: &str,
        result: &str,
    ) {
        let (Some(log), Some(agent)) = (&self.log, AgentContext::read(ctx)) else {
            return;
        };
        let entry = VectorStoreLog {
            flow_id: self.flow_id,
            task_id: self.task_id,
            subtask_id: self.subtask_id,
            initiator: agent.parent_agent_type,
            executor: agent.current_agent_type,
            filter: Value::Object(filter.clone()).to_string(),
            query: query.to_string(),
            action,
            result: result.to_string(),
        };
        if let Err(e) = log.put_vector_store_log(entry).await {
            tracing::warn!("[MemoryTool] Failed to write memory log: {}", e);
        }
    }

    async fn search_in_memory(&self, ctx: &ExecContext, input: MemorySearch) -> FlowResult<String> {
        let scoped = self
            .options()
            .with_filter(keys::DOC_TYPE, DocType::Memory.as_str())
            .with_filter(keys::FLOW_ID, self.flow_id);

        let mut narrowed = scoped.clone();
        if let Some(task_id) = input.task_id {
            narrowed = narrowed.with_filter(keys::TASK_ID, task_id);
        }
        if let Some(subtask_id) = input.subtask_id {
            narrowed = narrowed.with_filter(keys::SUBTASK_ID, subtask_id);
        }

        let mut docs = self.search(ctx, &input.question, &narrowed).await?;
        if docs.is_empty() && (input.task_id.is_some() || input.subtask_id.is_some()) {
            tracing::debug!("[MemoryTool] No task-scoped hits, retrying with flow scope");
            docs = self.search(ctx, &input.question, &scoped).await?;
        }

        if docs.is_empty() {
            tracing::debug!("[MemoryTool] Nothing found in memory for '{}'", input.question);
            return Ok("nothing found in memory for this question".to_string());
        }
        Ok(format_documents(&docs))
    }

    async fn search_typed(
        &self,
        ctx: &ExecContext,
        doc_type: DocType,
        tag: &str,
        value: &str,
        question: &str,
    ) -> FlowResult<String> {
        let opts = self
            .options()
            .with_filter(keys::DOC_TYPE, doc_type.as_str())
            .with_filter(tag, value);

        let docs = self.search(ctx, question, &opts).await?;
        if docs.is_empty() {
            tracing::debug!("[MemoryTool] No {} found for '{}'", doc_type.as_str(), question);
            return Ok(format!("nothing found in {} store for this question", doc_type.as_str()));
        }
        Ok(format_documents(&docs))
    }
}

fn format_documents(docs: &[ScoredDocument]) -> String {
    docs.iter()
        .enumerate()
        .map(|(i, hit)| {
            let meta = &hit.document.metadata;
            let mut header = format!("# Document {} (match score {:.2})", i + 1, hit.score);
            for key in [
                keys::TOOL_NAME,
                keys::QUESTION,
                keys::GUIDE_TYPE,
                keys::CODE_LANG,
                keys::ANSWER_TYPE,
                keys::DESCRIPTION,
                keys::TASK_ID,
                keys::SUBTASK_ID,
            ] {
                if let Some(value) = meta.get(key) {
                    let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                    header.push_str(&format!("\n- {}: {}", key, value));
                }
            }
            format!("{}\n\n{}", header, hit.document.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn tags<const N: usize>(pairs: [(&str, &str); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::from(v)))
        .collect()
}

#[async_trait]
impl Tool for MemoryTool {
    async fn handle(&self, ctx: &ExecContext, name: &str, args: &Value) -> FlowResult<String> {
        match name {
            names::SEARCH_IN_MEMORY => {
                let input: MemorySearch = decode(name, args)?;
                self.search_in_memory(ctx, input).await
            }
            names::SEARCH_GUIDE => {
                let input: TypedSearch = decode(name, args)?;
                self.search_typed(ctx, DocType::Guide, keys::GUIDE_TYPE, &input.kind, input.question.as_str())
                    .await
            }
            names::SEARCH_CODE => {
                let input: CodeSearch = decode(name, args)?;
                self.search_typed(ctx, DocType::Code, keys::CODE_LANG, &input.lang, input.question.as_str())
                    .await
            }
            names::SEARCH_ANSWER => {
                let input: TypedSearch = decode(name, args)?;
                self.search_typed(ctx, DocType::Answer, keys::ANSWER_TYPE, &input.kind, input.question.as_str())
                    .await
            }
            names::STORE_GUIDE => {
                let input: GuideStore = decode(name, args)?;
                let meta = tags([(keys::QUESTION, input.question.as_str()), (keys::GUIDE_TYPE, input.kind.as_str())]);
                let content = format!("# {}\n\n{}", input.question, input.guide);
                self.store_documents(ctx, DocType::Guide, &content, &input.question, meta)
                    .await?;
                Ok("guide stored successfully".to_string())
            }
            names::STORE_CODE => {
                let input: CodeStore = decode(name, args)?;
                let meta = tags([
                    (keys::QUESTION, input.question.as_str()),
                    (keys::CODE_LANG, input.lang.as_str()),
                    (keys::DESCRIPTION, input.description.as_str()),
                ]);
                let content = format!(
                    "# {}\n\n{}\n\n```{}\n{}\n```",
                    input.question, input.explanation, input.lang, input.code
                );
                self.store_documents(ctx, DocType::Code, &content, &input.question, meta)
                    .await?;
                Ok("code sample stored successfully".to_string())
            }
            names::STORE_ANSWER => {
                let input: AnswerStore = decode(name, args)?;
                let meta = tags([(keys::QUESTION, input.question.as_str()), (keys::ANSWER_TYPE, input.kind.as_str())]);
                let content = format!("# {}\n\n{}", input.question, input.answer);
                self.store_documents(ctx, DocType::Answer, &content, &input.question, meta)
                    .await?;
                Ok("answer stored successfully".to_string())
            }
            other => Err(FlowError::UnknownTool(other.to_string())),
        }
    }

    fn is_available(&self) -> bool {
        self.store.is_some()
    }
}
