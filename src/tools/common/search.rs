//! Web search engine tools: Google Custom Search, Tavily, Traversaal
//!
//! Provider failures come back as text so the agent can pick another engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::super::tool::Tool;
use crate::config::SearchConfig;
use crate::core::{AgentContext, ExecContext, FlowError, FlowResult};
use crate::store::{SearchLog, SearchLogProvider};

const MAX_RESULTS: u32 = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Supported engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    Google,
    Tavily,
    Traversaal,
}

impl SearchEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::Google => "google",
            SearchEngine::Tavily => "tavily",
            SearchEngine::Traversaal => "traversaal",
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            SearchEngine::Google => "https://www.googleapis.com/customsearch/v1",
            SearchEngine::Tavily => "https://api.tavily.com/search",
            SearchEngine::Traversaal => "https://api-ares.traversaal.ai/live/predict",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    max_results: Option<u32>,
}

// ============================================================================
// Provider responses
// ============================================================================

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct TraversaalResponse {
    data: TraversaalData,
}

#[derive(Debug, Deserialize)]
struct TraversaalData {
    #[serde(default)]
    response_text: String,
    #[serde(default)]
    web_url: Vec<String>,
}

/// Attribution of search log entries
#[derive(Clone)]
pub struct SearchLogScope {
    pub sink: Arc<dyn SearchLogProvider>,
    pub flow_id: i64,
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
}

/// One search engine exposed as a tool
pub struct SearchTool {
    engine: SearchEngine,
    config: SearchConfig,
    endpoint: String,
    client: Client,
    log: Option<SearchLogScope>,
}

impl SearchTool {
    pub fn new(engine: SearchEngine, config: SearchConfig) -> FlowResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            engine,
            config,
            endpoint: engine.default_endpoint().to_string(),
            client,
            log: None,
        })
    }

    /// Point the client at another endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_search_log(mut self, log: Option<SearchLogScope>) -> Self {
        self.log = log;
        self
    }

    pub fn engine(&self) -> SearchEngine {
        self.engine
    }

    async fn google(&self, query: &str, limit: u32) -> FlowResult<String> {
        let (Some(key), Some(cx)) = (&self.config.google_api_key, &self.config.google_cx) else {
            return Err(FlowError::InvalidConfig("google search is not configured".into()));
        };
        let num = limit.to_string();
        let response: GoogleResponse = self
            .client
            .get(&self.endpoint)
            .query(&[("key", key.as_str()), ("cx", cx.as_str()), ("q", query), ("num", num.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.items.is_empty() {
            return Ok(String::new());
        }
        Ok(response
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("# {}. {}\n\n## URL\n{}\n\n## Snippet\n{}", i + 1, item.title, item.link, item.snippet))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    async fn tavily(&self, query: &str, limit: u32) -> FlowResult<String> {
        let Some(key) = &self.config.tavily_api_key else {
            return Err(FlowError::InvalidConfig("tavily search is not configured".into()));
        };
        let response: TavilyResponse = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "api_key": key,
                "query": query,
                "max_results": limit,
                "search_depth": "basic",
                "include_answer": true,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut sections = Vec::new();
        if let Some(answer) = response.answer.filter(|a| !a.trim().is_empty()) {
            sections.push(format!("# Answer\n\n{}", answer));
        }
        for (i, r) in response.results.iter().enumerate() {
            sections.push(format!(
                "# {}. {}\n\n## URL\n{}\n\n## Score\n{:.2}\n\n## Content\n{}",
                i + 1,
                r.title,
                r.url,
                r.score,
                r.content
            ));
        }
        Ok(sections.join("\n\n"))
    }

    async fn traversaal(&self, query: &str) -> FlowResult<String> {
        let Some(key) = &self.config.traversaal_api_key else {
            return Err(FlowError::InvalidConfig("traversaal search is not configured".into()));
        };
        let response: TraversaalResponse = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", key)
            .json(&json!({ "query": [query] }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let data = response.data;
        if data.response_text.trim().is_empty() {
            return Ok(String::new());
        }
        let mut text = format!("# Answer\n\n{}", data.response_text);
        if !data.web_url.is_empty() {
            text.push_str("\n\n# Links\n\n");
            text.push_str(
                &data
                    .web_url
                    .iter()
                    .map(|u| format!("- {}", u))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }
        Ok(text)
    }

    async fn write_log(&self, ctx: &ExecContext, query: &str, result: &str) {
        let (Some(log), Some(agent)) = (&self.log, AgentContext::read(ctx)) else {
            return;
        };
        let entry = SearchLog {
            flow_id: log.flow_id,
            task_id: log.task_id,
            subtask_id: log.subtask_id,
            initiator: agent.parent_agent_type,
            executor: agent.current_agent_type,
            engine: self.engine.as_str().to_string(),
            query: query.to_string(),
            result: result.to_string(),
        };
        if let Err(e) = log.sink.put_search_log(entry).await {
            tracing::warn!("[SearchTool] Failed to write search log: {}", e);
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    async fn handle(&self, ctx: &ExecContext, name: &str, args: &Value) -> FlowResult<String> {
        let input: SearchInput =
            serde_json::from_value(args.clone()).map_err(|e| FlowError::invalid_args(name, e))?;
        let limit = input.max_results.unwrap_or(5).clamp(1, MAX_RESULTS);

        tracing::info!(
            "[SearchTool] {} query '{}' (max {})",
            self.engine.as_str(),
            input.query,
            limit
        );

        let outcome = match self.engine {
            SearchEngine::Google => self.google(&input.query, limit).await,
            SearchEngine::Tavily => self.tavily(&input.query, limit).await,
            SearchEngine::Traversaal => self.traversaal(&input.query).await,
        };

        let result = match outcome {
            Ok(text) if text.trim().is_empty() => {
                format!("no results found for '{}' in {}", input.query, self.engine.as_str())
            }
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("[SearchTool] {} search failed: {}", self.engine.as_str(), e);
                format!("failed to search in {}: {}", self.engine.as_str(), e)
            }
        };

        self.write_log(ctx, &input.query, &result).await;
        Ok(result)
    }

    fn is_available(&self) -> bool {
        match self.engine {
            SearchEngine::Google => {
                self.config.google_api_key.is_some() && self.config.google_cx.is_some()
            }
            SearchEngine::Tavily => self.config.tavily_api_key.is_some(),
            SearchEngine::Traversaal => self.config.traversaal_api_key.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentType;
    use crate::store::InMemoryStore;
    use crate::testing::serve_http;

    fn keys() -> SearchConfig {
        SearchConfig {
            google_api_key: Some("g-key".into()),
            google_cx: Some("cx".into()),
            tavily_api_key: Some("t-key".into()),
            traversaal_api_key: Some("tr-key".into()),
        }
    }

    #[tokio::test]
    async fn test_google_results_and_log() {
        let body = json!({"items": [{"title": "Nmap", "link": "https://nmap.org", "snippet": "Network scanner"}]});
        let (base, requests) = serve_http(vec![("/", body.to_string().into_bytes())]).await;
        let store = Arc::new(InMemoryStore::new());
        let tool = SearchTool::new(SearchEngine::Google, keys())
            .unwrap()
            .with_endpoint(base)
            .with_search_log(Some(SearchLogScope {
                sink: store.clone(),
                flow_id: 1,
                task_id: None,
                subtask_id: None,
            }));

        let ctx = AgentContext::push(&ExecContext::for_agent(AgentType::Pentester), AgentType::Searcher);
        let result = tool
            .handle(&ctx, "google", &json!({"query": "nmap", "max_results": 50}))
            .await
            .unwrap();
        assert!(result.contains("# 1. Nmap"));
        assert!(result.contains("https://nmap.org"));
        assert!(requests.lock().unwrap()[0].contains("num=10"));

        let logs = store.search_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].engine, "google");
        assert_eq!(logs[0].initiator, AgentType::Pentester);
        assert_eq!(logs[0].executor, AgentType::Searcher);
    }

    #[tokio::test]
    async fn test_tavily_answer_first() {
        let body = json!({
            "answer": "Use nmap -sV",
            "results": [{"title": "Guide", "url": "https://x.io", "content": "details", "score": 0.9}]
        });
        let (base, requests) = serve_http(vec![("/", body.to_string().into_bytes())]).await;
        let tool = SearchTool::new(SearchEngine::Tavily, keys()).unwrap().with_endpoint(base);

        let result = tool
            .handle(&ExecContext::new(), "tavily", &json!({"query": "scan versions", "max_results": 3}))
            .await
            .unwrap();
        assert!(result.starts_with("# Answer\n\nUse nmap -sV"));
        assert!(result.contains("## Score\n0.90"));
        assert!(requests.lock().unwrap()[0].contains("\"max_results\":3"));
    }

    #[tokio::test]
    async fn test_traversaal_and_provider_failure() {
        let body = json!({"data": {"response_text": "It is 42", "web_url": ["https://a.io"]}});
        let (base, _) = serve_http(vec![("/ok", body.to_string().into_bytes())]).await;

        let tool = SearchTool::new(SearchEngine::Traversaal, keys())
            .unwrap()
            .with_endpoint(format!("{}/ok", base));
        let result = tool
            .handle(&ExecContext::new(), "traversaal", &json!({"query": "answer", "max_results": 1}))
            .await
            .unwrap();
        assert!(result.contains("It is 42"));
        assert!(result.contains("- https://a.io"));

        let failing = SearchTool::new(SearchEngine::Traversaal, keys())
            .unwrap()
            .with_endpoint(format!("{}/missing", base));
        let result = failing
            .handle(&ExecContext::new(), "traversaal", &json!({"query": "answer", "max_results": 1}))
            .await
            .unwrap();
        assert!(result.starts_with("failed to search in traversaal"));
    }

    #[test]
    fn test_availability_follows_keys() {
        let google = SearchTool::new(SearchEngine::Google, SearchConfig {
            google_api_key: Some("k".into()),
            ..SearchConfig::default()
        })
        .unwrap();
        assert!(!google.is_available());
        assert!(SearchTool::new(SearchEngine::Tavily, keys()).unwrap().is_available());
        assert!(!SearchTool::new(SearchEngine::Traversaal, SearchConfig::default())
            .unwrap()
            .is_available());
    }
}
