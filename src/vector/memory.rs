//! In-memory vector store

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Document, Embedding, EmbeddingProvider, ScoredDocument, SearchOptions, VectorStore};
use crate::core::{FlowError, FlowResult};

struct StoredDocument {
    id: String,
    document: Document,
    embedding: Embedding,
}

/// Brute-force cosine similarity over embedded documents
pub struct InMemoryVectorStore {
    embedder: Arc<dyn EmbeddingProvider>,
    docs: RwLock<Vec<StoredDocument>>,
    closed: RwLock<bool>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            docs: RwLock::new(Vec::new()),
            closed: RwLock::new(false),
        }
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    /// Copies of every stored document in insertion order
    pub async fn documents(&self) -> Vec<Document> {
        self.docs
            .read()
            .await
            .iter()
            .map(|d| d.document.clone())
            .collect()
    }

    pub async fn is_closed(&self) -> bool {
        *self.closed.read().await
    }

    async fn ensure_open(&self) -> FlowResult<()> {
        if *self.closed.read().await {
            return Err(FlowError::vector_store("vector store connection is closed"));
        }
        Ok(())
    }
}

fn matches_filters(metadata: &Map<String, Value>, filters: &Map<String, Value>) -> bool {
    filters
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_documents(&self, docs: Vec<Document>) -> FlowResult<Vec<String>> {
        self.ensure_open().await?;

        let mut stored = Vec::with_capacity(docs.len());
        for document in docs {
            let embedding = self.embedder.embed(&document.content).await?;
            stored.push(StoredDocument {
                id: Uuid::new_v4().to_string(),
                document,
                embedding,
            });
        }

        let ids = stored.iter().map(|d| d.id.clone()).collect();
        self.docs.write().await.extend(stored);
        Ok(ids)
    }

    async fn similarity_search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> FlowResult<Vec<ScoredDocument>> {
        self.ensure_open().await?;

        let query_embedding = self.embedder.embed(query).await?;
        let docs = self.docs.read().await;

        let mut hits = Vec::new();
        for stored in docs.iter() {
            if !matches_filters(&stored.document.metadata, &opts.filters) {
                continue;
            }
            let score = query_embedding.cosine_similarity(&stored.embedding)?;
            if score >= opts.score_threshold {
                hits.push(ScoredDocument {
                    document: stored.document.clone(),
                    score,
                });
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(opts.limit);
        Ok(hits)
    }

    async fn close(&self) -> FlowResult<()> {
        *self.closed.write().await = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::HashEmbeddingProvider;
    use serde_json::json;

    fn doc(content: &str, flow_id: i64, doc_type: &str) -> Document {
        let mut metadata = Map::new();
        metadata.insert("flow_id".into(), json!(flow_id));
        metadata.insert("doc_type".into(), json!(doc_type));
        Document::new(content, metadata)
    }

    fn store() -> InMemoryVectorStore {
        InMemoryVectorStore::new(Arc::new(HashEmbeddingProvider::default()))
    }

    #[tokio::test]
    async fn test_search_applies_filters_and_limit() {
        let store = store();
        store
            .add_documents(vec![
                doc("nmap scan of the target host", 1, "memory"),
                doc("nmap scan results for port 22", 1, "memory"),
                doc("nmap scan in another flow", 2, "memory"),
                doc("nmap guide", 1, "guide"),
            ])
            .await
            .unwrap();

        let opts = SearchOptions::new(10, 0.1)
            .with_filter("flow_id", 1)
            .with_filter("doc_type", "memory");
        let hits = store.similarity_search("nmap scan", &opts).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.document.metadata["flow_id"] == json!(1)));
        assert!(hits[0].score >= hits[1].score);

        let limited = SearchOptions { limit: 1, ..opts };
        assert_eq!(store.similarity_search("nmap scan", &limited).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_threshold_drops_unrelated() {
        let store = store();
        store
            .add_documents(vec![doc("completely unrelated words", 1, "memory")])
            .await
            .unwrap();
        let opts = SearchOptions::new(3, 0.6);
        assert!(store.similarity_search("nmap", &opts).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_store_rejects_access() {
        let store = store();
        store.close().await.unwrap();
        assert!(store.is_closed().await);
        assert!(store.add_documents(vec![doc("x", 1, "memory")]).await.is_err());
    }
}
