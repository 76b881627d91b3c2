//! Role executor factories
//!
//! Each role gets a curated catalog: barrier tools that end its turn,
//! handoffs to other roles, builtin environment tools and optional tools
//! that are bound only when enabled and available.

use std::sync::Arc;

use super::executor::FlowToolsExecutor;
use crate::config::OptionalToolsConfig;
use crate::core::{AgentType, FlowError, FlowResult};
use crate::tools::{
    names, AgentLogScope, BrowserTool, ExecutorSettings, HandoffTool, MemoryTool, SearchEngine,
    SearchLogScope, SearchTool, SummarizeHandler, TerminalTool, Tool, ToolDefinition,
    ToolExecutor, ToolHandler,
};

// ============================================================================
// Role configs
// ============================================================================

#[derive(Clone, Default)]
pub struct PrimaryExecutorConfig {
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub done: Option<ToolHandler>,
    /// Optional; `ask` is offered only when set
    pub ask: Option<ToolHandler>,
    pub adviser: Option<ToolHandler>,
    pub coder: Option<ToolHandler>,
    pub installer: Option<ToolHandler>,
    pub memorist: Option<ToolHandler>,
    pub pentester: Option<ToolHandler>,
    pub searcher: Option<ToolHandler>,
    pub summarizer: Option<SummarizeHandler>,
}

#[derive(Clone, Default)]
pub struct InstallerExecutorConfig {
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub maintenance_result: Option<ToolHandler>,
    pub adviser: Option<ToolHandler>,
    pub memorist: Option<ToolHandler>,
    pub searcher: Option<ToolHandler>,
    pub summarizer: Option<SummarizeHandler>,
}

#[derive(Clone, Default)]
pub struct CoderExecutorConfig {
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub code_result: Option<ToolHandler>,
    pub adviser: Option<ToolHandler>,
    pub installer: Option<ToolHandler>,
    pub memorist: Option<ToolHandler>,
    pub searcher: Option<ToolHandler>,
    pub summarizer: Option<SummarizeHandler>,
}

#[derive(Clone, Default)]
pub struct PentesterExecutorConfig {
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub hack_result: Option<ToolHandler>,
    pub adviser: Option<ToolHandler>,
    pub coder: Option<ToolHandler>,
    pub installer: Option<ToolHandler>,
    pub memorist: Option<ToolHandler>,
    pub searcher: Option<ToolHandler>,
    pub summarizer: Option<SummarizeHandler>,
}

#[derive(Clone, Default)]
pub struct SearcherExecutorConfig {
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub search_result: Option<ToolHandler>,
    pub adviser: Option<ToolHandler>,
    pub memorist: Option<ToolHandler>,
    pub summarizer: Option<SummarizeHandler>,
}

#[derive(Clone, Default)]
pub struct GeneratorExecutorConfig {
    pub task_id: Option<i64>,
    pub subtask_list: Option<ToolHandler>,
    pub memorist: Option<ToolHandler>,
    pub searcher: Option<ToolHandler>,
}

#[derive(Clone, Default)]
pub struct MemoristExecutorConfig {
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub memorist_result: Option<ToolHandler>,
    pub summarizer: Option<SummarizeHandler>,
}

#[derive(Clone, Default)]
pub struct EnricherExecutorConfig {
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub enricher_result: Option<ToolHandler>,
    pub memorist: Option<ToolHandler>,
    pub searcher: Option<ToolHandler>,
    pub summarizer: Option<SummarizeHandler>,
}

#[derive(Clone, Default)]
pub struct ReporterExecutorConfig {
    pub task_id: Option<i64>,
    pub report_result: Option<ToolHandler>,
}

/// Caller-defined function for a custom executor
#[derive(Clone)]
pub struct CustomFunction {
    pub definition: ToolDefinition,
    pub handler: ToolHandler,
    /// Whether calling it ends the turn
    pub barrier: bool,
}

/// Executor made of catalog builtins plus caller-defined functions
#[derive(Clone, Default)]
pub struct CustomExecutorConfig {
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    /// Catalog names of environment, search and memory tools to bind
    pub builtin: Vec<String>,
    pub functions: Vec<CustomFunction>,
    pub summarizer: Option<SummarizeHandler>,
}

fn require(role: AgentType, handler: &'static str, value: &Option<ToolHandler>) -> FlowResult<ToolHandler> {
    value.clone().ok_or_else(|| FlowError::MissingHandler {
        role: role.as_str().to_string(),
        handler: handler.to_string(),
    })
}

// ============================================================================
// Assembly
// ============================================================================

/// Assembles one role's executor
struct RoleBuilder<'a> {
    flow: &'a FlowToolsExecutor,
    task_id: Option<i64>,
    subtask_id: Option<i64>,
    executor: ToolExecutor,
}

impl<'a> RoleBuilder<'a> {
    fn new(
        flow: &'a FlowToolsExecutor,
        task_id: Option<i64>,
        subtask_id: Option<i64>,
        summarizer: Option<SummarizeHandler>,
    ) -> Self {
        let executor = ToolExecutor::new(flow.flow_id, flow.registry.clone(), flow.toolcalls.clone())
            .with_task(task_id, subtask_id)
            .with_summarizer(summarizer)
            .with_message_log(flow.sinks.message_log.clone())
            .with_vector_store(flow.vector_store.clone())
            .with_settings(ExecutorSettings::from_config(&flow.config));
        Self {
            flow,
            task_id,
            subtask_id,
            executor,
        }
    }

    fn agent_log(&self) -> Option<AgentLogScope> {
        self.flow.sinks.agent_log.clone().map(|sink| AgentLogScope {
            sink,
            flow_id: self.flow.flow_id,
            task_id: self.task_id,
            subtask_id: self.subtask_id,
        })
    }

    fn barrier(mut self, name: &str, handler: ToolHandler) -> FlowResult<Self> {
        self.executor
            .add_barrier(name, Arc::new(HandoffTool::passthrough(handler)))?;
        Ok(self)
    }

    fn handoff(mut self, name: &str, target: AgentType, handler: ToolHandler) -> FlowResult<Self> {
        let tool = HandoffTool::new(target, handler).with_agent_log(self.agent_log());
        self.executor.add_tool(name, Arc::new(tool))?;
        Ok(self)
    }

    fn terminal_tool(&self) -> FlowResult<TerminalTool> {
        Ok(TerminalTool::new(
            self.flow.flow_id,
            self.flow.primary.clone(),
            self.flow.runtime.clone(),
            self.flow.config.terminal.clone(),
        )
        .with_terminal_log(self.flow.sinks.terminal_log.clone()))
    }

    fn browser_tool(&self) -> FlowResult<BrowserTool> {
        Ok(BrowserTool::new(
            self.flow.flow_id,
            self.flow.config.data_dir.clone(),
            self.flow.config.scraper.clone(),
        )?
        .with_screenshots(self.flow.sinks.screenshot.clone()))
    }

    fn search_tool(&self, engine: SearchEngine) -> FlowResult<SearchTool> {
        let log = self.flow.sinks.search_log.clone().map(|sink| SearchLogScope {
            sink,
            flow_id: self.flow.flow_id,
            task_id: self.task_id,
            subtask_id: self.subtask_id,
        });
        Ok(SearchTool::new(engine, self.flow.config.search.clone())?.with_search_log(log))
    }

    fn memory_tool(&self) -> MemoryTool {
        MemoryTool::new(
            self.flow.flow_id,
            self.flow.vector_store.clone(),
            self.flow.config.memory.clone(),
        )
        .with_task(self.task_id, self.subtask_id)
        .with_memory_log(self.flow.sinks.vector_store_log.clone())
    }

    /// `terminal` and `file`, always bound
    fn environment(mut self) -> FlowResult<Self> {
        let terminal: Arc<dyn Tool> = Arc::new(self.terminal_tool()?);
        self.executor.add_tool(names::TERMINAL, terminal.clone())?;
        self.executor.add_tool(names::FILE, terminal)?;
        Ok(self)
    }

    fn optional(mut self, name: &str, tool: Arc<dyn Tool>, enabled: bool) -> FlowResult<Self> {
        if enabled && tool.is_available() {
            self.executor.add_tool(name, tool)?;
        } else {
            tracing::debug!(
                "[FlowToolsExecutor] Flow {}: tool {} not offered (enabled: {})",
                self.flow.flow_id,
                name,
                enabled
            );
        }
        Ok(self)
    }

    fn browser(self, opts: &OptionalToolsConfig) -> FlowResult<Self> {
        let tool = Arc::new(self.browser_tool()?);
        self.optional(names::BROWSER, tool, opts.browser)
    }

    fn search_engines(mut self, opts: &OptionalToolsConfig) -> FlowResult<Self> {
        for (name, engine) in [
            (names::GOOGLE, SearchEngine::Google),
            (names::TAVILY, SearchEngine::Tavily),
            (names::TRAVERSAAL, SearchEngine::Traversaal),
        ] {
            let tool = Arc::new(self.search_tool(engine)?);
            self = self.optional(name, tool, opts.search_engines)?;
        }
        Ok(self)
    }

    fn memory(mut self, opts: &OptionalToolsConfig, tool_names: &[&str]) -> FlowResult<Self> {
        let tool: Arc<dyn Tool> = Arc::new(self.memory_tool());
        for name in tool_names {
            self = self.optional(name, tool.clone(), opts.vector_memory)?;
        }
        Ok(self)
    }

    /// Resolve a catalog builtin for a custom executor
    fn builtin(mut self, name: &str) -> FlowResult<Self> {
        let tool: Arc<dyn Tool> = match name {
            names::TERMINAL | names::FILE => Arc::new(self.terminal_tool()?),
            names::BROWSER => Arc::new(self.browser_tool()?),
            names::GOOGLE => Arc::new(self.search_tool(SearchEngine::Google)?),
            names::TAVILY => Arc::new(self.search_tool(SearchEngine::Tavily)?),
            names::TRAVERSAAL => Arc::new(self.search_tool(SearchEngine::Traversaal)?),
            names::SEARCH_IN_MEMORY
            | names::SEARCH_GUIDE
            | names::STORE_GUIDE
            | names::SEARCH_CODE
            | names::STORE_CODE
            | names::SEARCH_ANSWER
            | names::STORE_ANSWER => Arc::new(self.memory_tool()),
            other => return Err(FlowError::UnknownTool(other.to_string())),
        };
        if tool.is_available() {
            self.executor.add_tool(name, tool)?;
        }
        Ok(self)
    }

    fn build(self) -> ToolExecutor {
        self.executor
    }
}

// ============================================================================
// Factories
// ============================================================================

impl FlowToolsExecutor {
    pub fn get_primary_executor(&self, cfg: PrimaryExecutorConfig) -> FlowResult<ToolExecutor> {
        let role = AgentType::Primary;
        let mut builder = RoleBuilder::new(self, cfg.task_id, cfg.subtask_id, cfg.summarizer)
            .barrier(names::DONE, require(role, names::DONE, &cfg.done)?)?;
        if let Some(ask) = cfg.ask {
            builder = builder.barrier(names::ASK, ask)?;
        }
        Ok(builder
            .handoff(names::ADVICE, AgentType::Adviser, require(role, names::ADVICE, &cfg.adviser)?)?
            .handoff(names::CODER, AgentType::Coder, require(role, names::CODER, &cfg.coder)?)?
            .handoff(
                names::MAINTENANCE,
                AgentType::Installer,
                require(role, names::MAINTENANCE, &cfg.installer)?,
            )?
            .handoff(names::MEMORIST, AgentType::Memorist, require(role, names::MEMORIST, &cfg.memorist)?)?
            .handoff(
                names::PENTESTER,
                AgentType::Pentester,
                require(role, names::PENTESTER, &cfg.pentester)?,
            )?
            .handoff(names::SEARCH, AgentType::Searcher, require(role, names::SEARCH, &cfg.searcher)?)?
            .build())
    }

    pub fn get_installer_executor(&self, cfg: InstallerExecutorConfig) -> FlowResult<ToolExecutor> {
        let role = AgentType::Installer;
        let opts = &self.config.roles.installer;
        Ok(RoleBuilder::new(self, cfg.task_id, cfg.subtask_id, cfg.summarizer)
            .barrier(
                names::MAINTENANCE_RESULT,
                require(role, names::MAINTENANCE_RESULT, &cfg.maintenance_result)?,
            )?
            .handoff(names::ADVICE, AgentType::Adviser, require(role, names::ADVICE, &cfg.adviser)?)?
            .handoff(names::MEMORIST, AgentType::Memorist, require(role, names::MEMORIST, &cfg.memorist)?)?
            .handoff(names::SEARCH, AgentType::Searcher, require(role, names::SEARCH, &cfg.searcher)?)?
            .environment()?
            .browser(opts)?
            .memory(opts, &[names::SEARCH_GUIDE, names::STORE_GUIDE])?
            .build())
    }

    pub fn get_coder_executor(&self, cfg: CoderExecutorConfig) -> FlowResult<ToolExecutor> {
        let role = AgentType::Coder;
        let opts = &self.config.roles.coder;
        Ok(RoleBuilder::new(self, cfg.task_id, cfg.subtask_id, cfg.summarizer)
            .barrier(names::CODE_RESULT, require(role, names::CODE_RESULT, &cfg.code_result)?)?
            .handoff(names::ADVICE, AgentType::Adviser, require(role, names::ADVICE, &cfg.adviser)?)?
            .handoff(
                names::MAINTENANCE,
                AgentType::Installer,
                require(role, names::MAINTENANCE, &cfg.installer)?,
            )?
            .handoff(names::MEMORIST, AgentType::Memorist, require(role, names::MEMORIST, &cfg.memorist)?)?
            .handoff(names::SEARCH, AgentType::Searcher, require(role, names::SEARCH, &cfg.searcher)?)?
            .environment()?
            .browser(opts)?
            .memory(opts, &[names::SEARCH_CODE, names::STORE_CODE])?
            .build())
    }

    pub fn get_pentester_executor(&self, cfg: PentesterExecutorConfig) -> FlowResult<ToolExecutor> {
        let role = AgentType::Pentester;
        let opts = &self.config.roles.pentester;
        Ok(RoleBuilder::new(self, cfg.task_id, cfg.subtask_id, cfg.summarizer)
            .barrier(names::HACK_RESULT, require(role, names::HACK_RESULT, &cfg.hack_result)?)?
            .handoff(names::ADVICE, AgentType::Adviser, require(role, names::ADVICE, &cfg.adviser)?)?
            .handoff(names::CODER, AgentType::Coder, require(role, names::CODER, &cfg.coder)?)?
            .handoff(
                names::MAINTENANCE,
                AgentType::Installer,
                require(role, names::MAINTENANCE, &cfg.installer)?,
            )?
            .handoff(names::MEMORIST, AgentType::Memorist, require(role, names::MEMORIST, &cfg.memorist)?)?
            .handoff(names::SEARCH, AgentType::Searcher, require(role, names::SEARCH, &cfg.searcher)?)?
            .environment()?
            .browser(opts)?
            .memory(opts, &[names::SEARCH_GUIDE, names::STORE_GUIDE])?
            .build())
    }

    pub fn get_searcher_executor(&self, cfg: SearcherExecutorConfig) -> FlowResult<ToolExecutor> {
        let role = AgentType::Searcher;
        let opts = &self.config.roles.searcher;
        Ok(RoleBuilder::new(self, cfg.task_id, cfg.subtask_id, cfg.summarizer)
            .barrier(names::SEARCH_RESULT, require(role, names::SEARCH_RESULT, &cfg.search_result)?)?
            .handoff(names::ADVICE, AgentType::Adviser, require(role, names::ADVICE, &cfg.adviser)?)?
            .handoff(names::MEMORIST, AgentType::Memorist, require(role, names::MEMORIST, &cfg.memorist)?)?
            .browser(opts)?
            .search_engines(opts)?
            .memory(opts, &[names::SEARCH_ANSWER, names::STORE_ANSWER])?
            .build())
    }

    pub fn get_generator_executor(&self, cfg: GeneratorExecutorConfig) -> FlowResult<ToolExecutor> {
        let role = AgentType::Generator;
        let opts = &self.config.roles.generator;
        Ok(RoleBuilder::new(self, cfg.task_id, None, None)
            .barrier(names::SUBTASK_LIST, require(role, names::SUBTASK_LIST, &cfg.subtask_list)?)?
            .handoff(names::MEMORIST, AgentType::Memorist, require(role, names::MEMORIST, &cfg.memorist)?)?
            .handoff(names::SEARCH, AgentType::Searcher, require(role, names::SEARCH, &cfg.searcher)?)?
            .environment()?
            .browser(opts)?
            .build())
    }

    pub fn get_memorist_executor(&self, cfg: MemoristExecutorConfig) -> FlowResult<ToolExecutor> {
        let role = AgentType::Memorist;
        let opts = &self.config.roles.memorist;
        Ok(RoleBuilder::new(self, cfg.task_id, cfg.subtask_id, cfg.summarizer)
            .barrier(
                names::MEMORIST_RESULT,
                require(role, names::MEMORIST_RESULT, &cfg.memorist_result)?,
            )?
            .environment()?
            .memory(opts, &[names::SEARCH_IN_MEMORY])?
            .build())
    }

    pub fn get_enricher_executor(&self, cfg: EnricherExecutorConfig) -> FlowResult<ToolExecutor> {
        let role = AgentType::Enricher;
        let opts = &self.config.roles.enricher;
        Ok(RoleBuilder::new(self, cfg.task_id, cfg.subtask_id, cfg.summarizer)
            .barrier(
                names::ENRICHER_RESULT,
                require(role, names::ENRICHER_RESULT, &cfg.enricher_result)?,
            )?
            .handoff(names::MEMORIST, AgentType::Memorist, require(role, names::MEMORIST, &cfg.memorist)?)?
            .handoff(names::SEARCH, AgentType::Searcher, require(role, names::SEARCH, &cfg.searcher)?)?
            .environment()?
            .browser(opts)?
            .build())
    }

    pub fn get_reporter_executor(&self, cfg: ReporterExecutorConfig) -> FlowResult<ToolExecutor> {
        let role = AgentType::Reporter;
        Ok(RoleBuilder::new(self, cfg.task_id, None, None)
            .barrier(names::REPORT_RESULT, require(role, names::REPORT_RESULT, &cfg.report_result)?)?
            .build())
    }

    pub fn get_custom_executor(&self, cfg: CustomExecutorConfig) -> FlowResult<ToolExecutor> {
        let mut builder = RoleBuilder::new(self, cfg.task_id, cfg.subtask_id, cfg.summarizer);
        for name in &cfg.builtin {
            builder = builder.builtin(name)?;
        }

        let mut executor = builder.build();
        for function in cfg.functions {
            let name = function.definition.name.clone();
            executor.add_definition(function.definition, Arc::new(HandoffTool::passthrough(function.handler)));
            if function.barrier {
                executor.mark_barrier(&name);
            }
        }
        Ok(executor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlowToolsConfig, SearchConfig};
    use crate::core::ExecContext;
    use crate::store::{InMemoryStore, ResultFormat, ToolCallStatus};
    use crate::testing::FakeContainerRuntime;
    use crate::tools::{summarize_handler, tool_handler, ToolInputSchema};
    use crate::vector::{HashEmbeddingProvider, InMemoryVectorStore, VectorStore};
    use serde_json::json;

    fn echo(reply: &'static str) -> Option<ToolHandler> {
        Some(tool_handler(move |_ctx, _name, _args| async move { Ok(reply.to_string()) }))
    }

    fn tool_names(executor: &ToolExecutor) -> Vec<String> {
        let mut names: Vec<String> = executor.list_tools().into_iter().map(|d| d.name).collect();
        names.sort();
        names
    }

    fn flow_with(config: FlowToolsConfig) -> (FlowToolsExecutor, Arc<InMemoryStore>, Arc<FakeContainerRuntime>) {
        let store = Arc::new(InMemoryStore::new());
        let runtime = Arc::new(FakeContainerRuntime::new());
        let mut flow = FlowToolsExecutor::new(7, config, store.clone()).with_container_runtime(runtime.clone());
        flow.set_agent_log_provider(store.clone());
        flow.set_msg_log_provider(store.clone());
        (flow, store, runtime)
    }

    #[tokio::test]
    async fn test_reporter_barrier() {
        let (flow, store, _) = flow_with(FlowToolsConfig::default());
        let executor = flow
            .get_reporter_executor(ReporterExecutorConfig {
                task_id: Some(1),
                report_result: echo("report accepted"),
            })
            .unwrap();

        assert_eq!(tool_names(&executor), vec!["report_result"]);
        assert!(executor.is_barrier_function("report_result"));
        assert_eq!(executor.barrier_names(), vec!["report_result"]);

        let result = executor
            .execute(
                &ExecContext::new(),
                "call-1",
                "report_result",
                r#"{"success": true, "result": "all done", "message": "final report"}"#,
            )
            .await
            .unwrap();
        assert_eq!(result, "report accepted");

        let calls = store.toolcalls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].status, ToolCallStatus::Finished);
        assert_eq!(calls[0].task_id, Some(1));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_without_audit_record() {
        let (flow, store, _) = flow_with(FlowToolsConfig::default());
        let executor = flow
            .get_reporter_executor(ReporterExecutorConfig {
                task_id: None,
                report_result: echo("ok"),
            })
            .unwrap();

        let result = executor
            .execute(&ExecContext::new(), "call-1", "terminal", r#"{"input": "ls"}"#)
            .await
            .unwrap();
        assert_eq!(result, "function terminal not found");
        assert!(store.toolcalls().is_empty());
    }

    #[test]
    fn test_missing_handler() {
        let (flow, _, _) = flow_with(FlowToolsConfig::default());
        let err = flow
            .get_coder_executor(CoderExecutorConfig {
                code_result: echo("ok"),
                adviser: echo("ok"),
                memorist: echo("ok"),
                searcher: echo("ok"),
                ..Default::default()
            })
            .err()
            .unwrap();
        match err {
            FlowError::MissingHandler { role, handler } => {
                assert_eq!(role, "coder");
                assert_eq!(handler, "maintenance");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_primary_offers_ask_only_when_supplied() {
        let (flow, _, _) = flow_with(FlowToolsConfig::default());
        let cfg = PrimaryExecutorConfig {
            done: echo("done"),
            adviser: echo("ok"),
            coder: echo("ok"),
            installer: echo("ok"),
            memorist: echo("ok"),
            pentester: echo("ok"),
            searcher: echo("ok"),
            ..Default::default()
        };

        let executor = flow.get_primary_executor(cfg.clone()).unwrap();
        assert_eq!(
            tool_names(&executor),
            vec!["advice", "coder", "done", "maintenance", "memorist", "pentester", "search"]
        );
        assert_eq!(executor.barrier_names(), vec!["done"]);

        let executor = flow
            .get_primary_executor(PrimaryExecutorConfig { ask: echo("?"), ..cfg })
            .unwrap();
        assert_eq!(executor.barrier_names(), vec!["ask", "done"]);
    }

    #[test]
    fn test_searcher_availability_gating() {
        let search = SearchConfig {
            tavily_api_key: Some("tvly-key".into()),
            ..Default::default()
        };
        let (flow, _, _) = flow_with(FlowToolsConfig::default().with_search(search));
        let cfg = SearcherExecutorConfig {
            search_result: echo("ok"),
            adviser: echo("ok"),
            memorist: echo("ok"),
            ..Default::default()
        };

        // No scraper, no vector store, only tavily credentials
        let executor = flow.get_searcher_executor(cfg.clone()).unwrap();
        assert_eq!(tool_names(&executor), vec!["advice", "memorist", "search_result", "tavily"]);

        let vector: Arc<dyn VectorStore> =
            Arc::new(InMemoryVectorStore::new(Arc::new(HashEmbeddingProvider::default())));
        let flow = flow.with_vector_store(vector);
        let executor = flow.get_searcher_executor(cfg).unwrap();
        assert_eq!(
            tool_names(&executor),
            vec!["advice", "memorist", "search_answer", "search_result", "store_answer", "tavily"]
        );
    }

    #[test]
    fn test_searcher_without_search_keys() {
        let (flow, _, _) = flow_with(FlowToolsConfig::default());
        let executor = flow
            .get_searcher_executor(SearcherExecutorConfig {
                search_result: echo("ok"),
                adviser: echo("ok"),
                memorist: echo("ok"),
                ..Default::default()
            })
            .unwrap();

        let names = tool_names(&executor);
        assert_eq!(names, vec!["advice", "memorist", "search_result"]);
        for engine in ["google", "tavily", "traversaal"] {
            assert!(!names.contains(&engine.to_string()), "{} should be gated off", engine);
        }
    }

    #[test]
    fn test_role_switch_disables_optional_tools() {
        let mut config = FlowToolsConfig::default().with_search(SearchConfig {
            tavily_api_key: Some("tvly-key".into()),
            ..Default::default()
        });
        config.roles.searcher.search_engines = false;
        let (flow, _, _) = flow_with(config);

        let executor = flow
            .get_searcher_executor(SearcherExecutorConfig {
                search_result: echo("ok"),
                adviser: echo("ok"),
                memorist: echo("ok"),
                ..Default::default()
            })
            .unwrap();
        assert!(executor.tool_schema("tavily").is_some());
        assert!(!tool_names(&executor).contains(&"tavily".to_string()));
    }

    #[test]
    fn test_installer_catalog() {
        let mut config = FlowToolsConfig::default();
        config.scraper.public_url = Some("http://scraper.local:8080".into());
        let (flow, _, _) = flow_with(config);
        let flow = flow.with_vector_store(Arc::new(InMemoryVectorStore::new(Arc::new(
            HashEmbeddingProvider::default(),
        ))));

        let executor = flow
            .get_installer_executor(InstallerExecutorConfig {
                maintenance_result: echo("ok"),
                adviser: echo("ok"),
                memorist: echo("ok"),
                searcher: echo("ok"),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(
            tool_names(&executor),
            vec![
                "advice",
                "browser",
                "file",
                "maintenance_result",
                "memorist",
                "search",
                "search_guide",
                "store_guide",
                "terminal"
            ]
        );
        assert_eq!(executor.barrier_names(), vec!["maintenance_result"]);
    }

    #[tokio::test]
    async fn test_handoff_writes_agent_log() {
        let (flow, store, _) = flow_with(FlowToolsConfig::default());
        let executor = flow
            .get_enricher_executor(EnricherExecutorConfig {
                task_id: Some(2),
                subtask_id: Some(5),
                enricher_result: echo("ok"),
                memorist: echo("remembered"),
                searcher: echo("found it"),
                summarizer: None,
            })
            .unwrap();

        let ctx = ExecContext::for_agent(AgentType::Enricher);
        let result = executor
            .execute(&ctx, "call-1", "search", r#"{"question": "nginx version?", "message": "asking"}"#)
            .await
            .unwrap();
        assert_eq!(result, "found it");

        let logs = store.agent_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].initiator, AgentType::Enricher);
        assert_eq!(logs[0].executor, AgentType::Searcher);
        assert_eq!(logs[0].task, "nginx version?");
        assert_eq!(logs[0].subtask_id, Some(5));
    }

    #[tokio::test]
    async fn test_summarized_terminal_output_is_markdown() {
        let (flow, store, runtime) = flow_with(FlowToolsConfig::default().with_summarize_threshold(32));
        flow.prepare().await.unwrap();
        runtime.respond("cat /var/log/syslog", &"kernel: eth0 link up\n".repeat(20), 0);

        let executor = flow
            .get_memorist_executor(MemoristExecutorConfig {
                memorist_result: echo("ok"),
                summarizer: Some(summarize_handler(|_ctx, text| async move {
                    Ok(format!("{} bytes of link-up messages", text.len()))
                })),
                ..Default::default()
            })
            .unwrap();

        let result = executor
            .execute(
                &ExecContext::new(),
                "call-1",
                "terminal",
                r#"{"input": "cat /var/log/syslog", "message": "read syslog"}"#,
            )
            .await
            .unwrap();
        assert!(result.ends_with("bytes of link-up messages"));

        let logs = store.message_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].result, result);
        assert_eq!(logs[0].result_format, ResultFormat::Markdown);
    }

    #[tokio::test]
    async fn test_memory_fallback_through_memorist() {
        let (flow, _, runtime) = flow_with(FlowToolsConfig::default());
        let vector = Arc::new(InMemoryVectorStore::new(Arc::new(HashEmbeddingProvider::default())));
        let flow = flow.with_vector_store(vector.clone());
        flow.prepare().await.unwrap();
        runtime.respond("apt-get install", "nginx installed", 0);

        // Remembered while working on task 1
        let worker = flow
            .get_custom_executor(CustomExecutorConfig {
                task_id: Some(1),
                subtask_id: Some(1),
                builtin: vec![names::TERMINAL.to_string()],
                ..Default::default()
            })
            .unwrap();
        worker
            .execute(
                &ExecContext::for_agent(AgentType::Installer),
                "call-1",
                "terminal",
                &json!({"input": "apt-get install -y nginx", "message": "install nginx"}).to_string(),
            )
            .await
            .unwrap();
        assert_eq!(vector.len().await, 1);

        let executor = flow
            .get_memorist_executor(MemoristExecutorConfig {
                task_id: Some(2),
                subtask_id: Some(9),
                memorist_result: echo("ok"),
                summarizer: None,
            })
            .unwrap();
        let result = executor
            .execute(
                &ExecContext::for_agent(AgentType::Memorist),
                "call-2",
                "search_in_memory",
                r#"{"question": "install nginx apt-get", "task_id": 2, "message": "look up"}"#,
            )
            .await
            .unwrap();
        assert!(result.contains("nginx installed"), "{}", result);
    }

    #[tokio::test]
    async fn test_terminal_follows_container_lifecycle() {
        let (flow, _, runtime) = flow_with(FlowToolsConfig::default());
        runtime.respond("uname", "Linux", 0);

        // Built before the container exists
        let executor = flow
            .get_custom_executor(CustomExecutorConfig {
                builtin: vec![names::TERMINAL.to_string()],
                ..Default::default()
            })
            .unwrap();
        let ctx = ExecContext::new();
        let args = r#"{"input": "uname -a"}"#;

        let result = executor.execute(&ctx, "call-1", "terminal", args).await.unwrap();
        assert_eq!(result, "the flow container is not prepared");

        flow.prepare().await.unwrap();
        let result = executor.execute(&ctx, "call-2", "terminal", args).await.unwrap();
        assert!(result.contains("Linux"), "{}", result);

        flow.release().await.unwrap();
        let result = executor.execute(&ctx, "call-3", "terminal", args).await.unwrap();
        assert_eq!(result, "the flow container is not prepared");
    }

    #[tokio::test]
    async fn test_custom_executor_functions() {
        let (flow, _, _) = flow_with(FlowToolsConfig::default());
        let definition = ToolDefinition::new(
            "finish_report",
            "Submit the report",
            ToolInputSchema::new()
                .with_properties(json!({"text": {"type": "string"}}))
                .with_required(["text"]),
        );
        let executor = flow
            .get_custom_executor(CustomExecutorConfig {
                builtin: vec![names::TERMINAL.to_string()],
                functions: vec![CustomFunction {
                    definition,
                    handler: tool_handler(|_ctx, _name, args| async move {
                        Ok(format!("got {}", args["text"].as_str().unwrap_or_default()))
                    }),
                    barrier: true,
                }],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(tool_names(&executor), vec!["finish_report", "terminal"]);
        assert!(executor.is_barrier_function("finish_report"));

        let result = executor
            .execute(&ExecContext::new(), "call-1", "finish_report", r#"{"text": "ok"}"#)
            .await
            .unwrap();
        assert_eq!(result, "got ok");

        let err = flow
            .get_custom_executor(CustomExecutorConfig {
                builtin: vec!["teleport".to_string()],
                ..Default::default()
            })
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::UnknownTool(name) if name == "teleport"));
    }
}
