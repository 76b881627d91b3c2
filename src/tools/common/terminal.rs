//! Terminal and file tools for the flow's sandbox container
//!
//! Commands run through an exec session with a TTY. Output is drained until
//! EOF, the deadline (`timeout + grace`) or cancellation, whichever comes
//! first. Detached commands are drained and logged by a background task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;

use super::super::registry::names;
use super::super::tool::Tool;
use crate::config::TerminalConfig;
use crate::container::{
    ArchiveEntry, ContainerHandle, ContainerRuntime, ContainerSlot, ExecConfig, ExecOutput,
};
use crate::core::{ExecContext, FlowError, FlowResult};
use crate::store::{TerminalLog, TerminalLogProvider, TerminalStream};

const DETACHED_MESSAGE: &str = "Command executed in background";
const FILE_DIVIDER: &str = "----------------------------------------";

/// Input for the terminal tool
#[derive(Debug, Deserialize)]
struct TerminalAction {
    input: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    detach: bool,
    /// Seconds; out-of-range values fall back to the default
    #[serde(default)]
    timeout: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FileOp {
    ReadFile,
    UpdateFile,
}

/// Input for the file tool
#[derive(Debug, Deserialize)]
struct FileAction {
    action: FileOp,
    path: String,
    #[serde(default)]
    content: Option<String>,
}

/// Strip ANSI escape sequences from terminal output
pub fn strip_ansi(text: &str) -> FlowResult<String> {
    let re = Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07|\r")
        .map_err(|e| FlowError::other(format!("invalid ANSI pattern: {}", e)))?;
    Ok(re.replace_all(text, "").into_owned())
}

/// Where terminal log entries go
#[derive(Clone)]
struct TermLogger {
    sink: Option<Arc<dyn TerminalLogProvider>>,
    flow_id: i64,
    container_id: i64,
}

impl TermLogger {
    async fn put(&self, stream: TerminalStream, text: &str) {
        let Some(sink) = &self.sink else {
            return;
        };
        let entry = TerminalLog {
            flow_id: self.flow_id,
            container_id: self.container_id,
            stream,
            text: text.to_string(),
        };
        if let Err(e) = sink.put_terminal_log(entry).await {
            tracing::warn!("[TerminalTool] Failed to write terminal log: {}", e);
        }
    }
}

/// Shell and file access inside the primary container of a flow
pub struct TerminalTool {
    flow_id: i64,
    container: ContainerSlot,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    config: TerminalConfig,
    terminal_log: Option<Arc<dyn TerminalLogProvider>>,
}

impl TerminalTool {
    pub fn new(
        flow_id: i64,
        container: ContainerSlot,
        runtime: Option<Arc<dyn ContainerRuntime>>,
        config: TerminalConfig,
    ) -> Self {
        Self {
            flow_id,
            container,
            runtime,
            config,
            terminal_log: None,
        }
    }

    pub fn with_terminal_log(mut self, sink: Option<Arc<dyn TerminalLogProvider>>) -> Self {
        self.terminal_log = sink;
        self
    }

    fn logger(&self, container: &ContainerHandle) -> TermLogger {
        TermLogger {
            sink: self.terminal_log.clone(),
            flow_id: self.flow_id,
            container_id: container.id,
        }
    }

    fn resolve_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.config.work_dir.trim_end_matches('/'), path)
        }
    }

    /// Running container, or the text to hand back instead
    async fn running_container(
        &self,
    ) -> Result<(ContainerHandle, &Arc<dyn ContainerRuntime>), String> {
        let container = self.container.get().map_err(|e| e.to_string())?;
        let (Some(container), Some(runtime)) = (container, &self.runtime) else {
            return Err("the flow container is not prepared".to_string());
        };
        match runtime.is_container_running(&container.local_id).await {
            Ok(true) => Ok((container, runtime)),
            Ok(false) => Err(format!("container {} is not running", container.name)),
            Err(e) => Err(format!("failed to inspect container {}: {}", container.name, e)),
        }
    }

    async fn exec_command(
        &self,
        ctx: &ExecContext,
        container: &ContainerHandle,
        runtime: &Arc<dyn ContainerRuntime>,
        action: TerminalAction,
    ) -> FlowResult<String> {
        let cwd = action
            .cwd
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.config.work_dir.clone());
        let logger = self.logger(container);

        let prompt = format!("{} $ {}", cwd.blue(), action.input.as_str().green());
        logger.put(TerminalStream::Stdin, &prompt).await;

        let timeout = self.config.effective_timeout(action.timeout);
        let deadline = timeout + self.config.grace();
        tracing::info!(
            "[TerminalTool] Flow {}: executing '{}' in {} (timeout {:?})",
            self.flow_id,
            action.input,
            cwd,
            timeout
        );

        let exec_id = runtime
            .exec_create(&container.local_id, ExecConfig::shell(action.input.clone(), cwd))
            .await?;
        let output = runtime.exec_attach(&exec_id).await?;

        if action.detach {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                match drain(&ctx, output, deadline).await {
                    Ok(text) => logger.put(TerminalStream::Stdout, &text).await,
                    Err(FlowError::Timeout { partial, .. }) => {
                        logger.put(TerminalStream::Stdout, &partial).await
                    }
                    Err(e) => tracing::warn!("[TerminalTool] Detached command failed: {}", e),
                }
            });
            return Ok(DETACHED_MESSAGE.to_string());
        }

        let raw = drain(ctx, output, deadline).await?;
        logger.put(TerminalStream::Stdout, &raw).await;

        let mut text = strip_ansi(&raw)?;
        if let Ok(status) = runtime.exec_inspect(&exec_id).await {
            if let Some(code) = status.exit_code.filter(|c| *c != 0) {
                text.push_str(&format!("\n\ncommand exited with code {}", code));
            }
        }

        if text.trim().is_empty() {
            return Ok("command executed successfully with no output".to_string());
        }
        Ok(text)
    }

    async fn read_file(
        &self,
        container: &ContainerHandle,
        runtime: &Arc<dyn ContainerRuntime>,
        path: &str,
    ) -> FlowResult<String> {
        let path = self.resolve_path(path);
        let logger = self.logger(container);
        let prompt = format!("{} $ {}", self.config.work_dir.blue(), format!("cat {}", path).green());
        logger.put(TerminalStream::Stdin, &prompt).await;

        let entries = match runtime
            .copy_from_container(&container.local_id, &path, self.config.max_file_size)
            .await
        {
            Ok(entries) => entries,
            Err(e) => return Ok(format!("failed to read {}: {}", path, e)),
        };

        if let Some(big) = entries.iter().find(|e| e.content.is_none()) {
            return Ok(format!(
                "file {} is too large to read ({} bytes, limit {} bytes)",
                big.path, big.size, self.config.max_file_size
            ));
        }

        let text = match entries.as_slice() {
            [single] if single.path == path => {
                String::from_utf8_lossy(single.content.as_deref().unwrap_or_default()).into_owned()
            }
            _ => entries
                .iter()
                .map(|e| {
                    format!(
                        "{}\n{}\n{}\n{}",
                        FILE_DIVIDER,
                        e.path,
                        FILE_DIVIDER,
                        String::from_utf8_lossy(e.content.as_deref().unwrap_or_default())
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };

        logger.put(TerminalStream::Stdout, &text).await;
        Ok(text)
    }

    async fn write_file(
        &self,
        container: &ContainerHandle,
        runtime: &Arc<dyn ContainerRuntime>,
        path: &str,
        content: String,
    ) -> FlowResult<String> {
        let path = self.resolve_path(path);
        let (dir, file_name) = match path.rsplit_once('/') {
            Some(("", name)) => ("/", name),
            Some((dir, name)) => (dir, name),
            None => (self.config.work_dir.as_str(), path.as_str()),
        };
        if file_name.is_empty() {
            return Ok(format!("path {} does not name a file", path));
        }

        let logger = self.logger(container);
        let prompt = format!(
            "{} $ {}",
            self.config.work_dir.blue(),
            format!("cat > {} <<'EOF'\n{}\nEOF", path, content).green()
        );
        logger.put(TerminalStream::Stdin, &prompt).await;

        let entry = ArchiveEntry::file(file_name, content.into_bytes());
        if let Err(e) = runtime
            .copy_to_container(&container.local_id, dir, vec![entry])
            .await
        {
            return Ok(format!("failed to write {}: {}", path, e));
        }

        tracing::debug!("[TerminalTool] Flow {}: wrote {}", self.flow_id, path);
        Ok(format!("file {} written successfully", path))
    }
}

/// Read `output` to EOF within `deadline`, honouring cancellation
async fn drain(ctx: &ExecContext, mut output: ExecOutput, deadline: Duration) -> FlowResult<String> {
    let mut buf = Vec::new();

    let finished = {
        let read = async {
            let mut chunk = [0u8; 4096];
            loop {
                let n = output.read(&mut chunk).await?;
                if n == 0 {
                    return Ok::<(), std::io::Error>(());
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        };

        tokio::select! {
            _ = ctx.cancellation().cancelled() => None,
            res = tokio::time::timeout(deadline, read) => Some(res),
        }
    };

    match finished {
        None => Err(FlowError::Cancelled),
        Some(Ok(res)) => {
            res?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
        Some(Err(_)) => Err(FlowError::Timeout {
            secs: deadline.as_secs(),
            partial: String::from_utf8_lossy(&buf).into_owned(),
        }),
    }
}

#[async_trait]
impl Tool for TerminalTool {
    async fn handle(&self, ctx: &ExecContext, name: &str, args: &Value) -> FlowResult<String> {
        match name {
            names::TERMINAL => {
                let action: TerminalAction = serde_json::from_value(args.clone())
                    .map_err(|e| FlowError::invalid_args(name, e))?;
                let (container, runtime) = match self.running_container().await {
                    Ok(found) => found,
                    Err(text) => return Ok(text),
                };

                match self.exec_command(ctx, &container, runtime, action).await {
                    Ok(text) => Ok(text),
                    Err(FlowError::Timeout { secs, partial }) => {
                        let partial = strip_ansi(&partial)?;
                        Ok(format!(
                            "temporary output: {}\n\nthe command did not finish within {} seconds; \
                             it may still be running. Use detach for long-running commands or a larger timeout",
                            partial, secs
                        ))
                    }
                    Err(FlowError::Container(e)) => Ok(format!("failed to execute command: {}", e)),
                    Err(e) => Err(e),
                }
            }
            names::FILE => {
                let action: FileAction = serde_json::from_value(args.clone())
                    .map_err(|e| FlowError::invalid_args(name, e))?;
                let (container, runtime) = match self.running_container().await {
                    Ok(found) => found,
                    Err(text) => return Ok(text),
                };

                match action.action {
                    FileOp::ReadFile => self.read_file(&container, runtime, &action.path).await,
                    FileOp::UpdateFile => {
                        let content = action.content.ok_or_else(|| {
                            FlowError::invalid_args(name, "content is required for update_file")
                        })?;
                        self.write_file(&container, runtime, &action.path, content).await
                    }
                }
            }
            other => Err(FlowError::UnknownTool(other.to_string())),
        }
    }

    fn is_available(&self) -> bool {
        self.runtime.is_some()
    }
}
