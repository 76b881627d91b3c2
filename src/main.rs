use std::env;
use std::sync::Arc;

use flowtools::config::FlowToolsConfig;
use flowtools::container::DockerCli;
use flowtools::core::{AgentType, ExecContext};
use flowtools::flow::{CustomExecutorConfig, FlowToolsExecutor};
use flowtools::logging;
use flowtools::store::InMemoryStore;
use flowtools::tools::names;
use flowtools::vector::{HashEmbeddingProvider, InMemoryVectorStore};

/// Run one shell command in a fresh flow container and print the result
///
/// Usage: flowtools [--config <file>] <command>
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let (config_path, command) = match args.as_slice() {
        [flag, path, rest @ ..] if flag == "--config" => (Some(path.clone()), rest.join(" ")),
        rest => (None, rest.join(" ")),
    };
    let command = if command.trim().is_empty() {
        "uname -a".to_string()
    } else {
        command
    };

    let config = match config_path {
        Some(path) => FlowToolsConfig::from_file(path)?,
        None => FlowToolsConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;

    let _log_guard = logging::init_logging(config.data_dir.join("logs"))?;
    tracing::info!("=== Flow Tools Starting ===");

    let store = Arc::new(InMemoryStore::new());
    let vector = Arc::new(InMemoryVectorStore::new(Arc::new(HashEmbeddingProvider::default())));
    let runtime = Arc::new(DockerCli::new(config.docker.binary.clone()));

    let flow_id = 1;
    let mut flow = FlowToolsExecutor::new(flow_id, config, store.clone())
        .with_container_runtime(runtime)
        .with_vector_store(vector.clone());
    flow.set_msg_log_provider(store.clone());
    flow.set_term_log_provider(store.clone());
    flow.set_vector_store_log_provider(store.clone());

    flow.prepare().await?;

    let executor = flow.get_custom_executor(CustomExecutorConfig {
        task_id: Some(1),
        subtask_id: Some(1),
        builtin: vec![names::TERMINAL.to_string(), names::FILE.to_string()],
        ..Default::default()
    })?;
    tracing::info!("Executor ready with {} tools", executor.list_tools().len());

    let ctx = ExecContext::for_agent(AgentType::Custom);
    let call_args = serde_json::json!({
        "input": command,
        "message": format!("run `{}`", command),
    });
    let outcome = executor
        .execute(&ctx, &uuid::Uuid::new_v4().to_string(), names::TERMINAL, &call_args.to_string())
        .await;

    match &outcome {
        Ok(result) => println!("{}", result),
        Err(e) => tracing::error!("Command failed: {}", e),
    }
    tracing::info!(
        "Recorded {} tool call(s), {} memory document(s)",
        store.toolcalls().len(),
        vector.len().await
    );

    flow.release().await?;
    tracing::info!("=== Flow Tools Shutting Down ===");

    outcome?;
    Ok(())
}
