//! Per-flow tools executor
//!
//! Owns the expensive resources a flow's tools depend on, the primary
//! sandbox container and the vector store connection, and hands out
//! role-specific `ToolExecutor`s bound to them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::FlowToolsConfig;
use crate::container::{ContainerHandle, ContainerRuntime, ContainerSlot, ContainerSpec};
use crate::core::{FlowError, FlowResult};
use crate::store::{
    AgentLogProvider, ContainerStatus, ContainerStore, FlowStore, MessageLogProvider, NewContainer,
    ScreenshotProvider, SearchLogProvider, TerminalLogProvider, ToolCallStore,
    VectorStoreLogProvider,
};
use crate::tools::ToolRegistry;
use crate::vector::VectorStore;

/// Optional log sinks injected after construction
#[derive(Clone, Default)]
pub(crate) struct Sinks {
    pub screenshot: Option<Arc<dyn ScreenshotProvider>>,
    pub agent_log: Option<Arc<dyn AgentLogProvider>>,
    pub message_log: Option<Arc<dyn MessageLogProvider>>,
    pub search_log: Option<Arc<dyn SearchLogProvider>>,
    pub terminal_log: Option<Arc<dyn TerminalLogProvider>>,
    pub vector_store_log: Option<Arc<dyn VectorStoreLogProvider>>,
}

/// Factory of role executors and owner of a flow's resources
pub struct FlowToolsExecutor {
    pub(crate) flow_id: i64,
    pub(crate) config: FlowToolsConfig,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) toolcalls: Arc<dyn ToolCallStore>,
    containers: Arc<dyn ContainerStore>,
    pub(crate) runtime: Option<Arc<dyn ContainerRuntime>>,
    pub(crate) vector_store: Option<Arc<dyn VectorStore>>,
    pub(crate) sinks: Sinks,

    pub(crate) primary: ContainerSlot,
    vector_open: AtomicBool,
    lifecycle: Mutex<()>,
}

impl FlowToolsExecutor {
    pub fn new<S: FlowStore + 'static>(flow_id: i64, config: FlowToolsConfig, store: Arc<S>) -> Self {
        Self {
            flow_id,
            config,
            registry: Arc::new(ToolRegistry::new()),
            toolcalls: store.clone(),
            containers: store,
            runtime: None,
            vector_store: None,
            sinks: Sinks::default(),
            primary: ContainerSlot::default(),
            vector_open: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    /// Share a registry between flows
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_container_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self.vector_open.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_screenshot_provider(&mut self, sink: Arc<dyn ScreenshotProvider>) {
        self.sinks.screenshot = Some(sink);
    }

    pub fn set_agent_log_provider(&mut self, sink: Arc<dyn AgentLogProvider>) {
        self.sinks.agent_log = Some(sink);
    }

    pub fn set_msg_log_provider(&mut self, sink: Arc<dyn MessageLogProvider>) {
        self.sinks.message_log = Some(sink);
    }

    pub fn set_search_log_provider(&mut self, sink: Arc<dyn SearchLogProvider>) {
        self.sinks.search_log = Some(sink);
    }

    pub fn set_term_log_provider(&mut self, sink: Arc<dyn TerminalLogProvider>) {
        self.sinks.terminal_log = Some(sink);
    }

    pub fn set_vector_store_log_provider(&mut self, sink: Arc<dyn VectorStoreLogProvider>) {
        self.sinks.vector_store_log = Some(sink);
    }

    pub fn flow_id(&self) -> i64 {
        self.flow_id
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        self.registry.clone()
    }

    /// Handle of the prepared primary container
    pub fn primary_container(&self) -> FlowResult<Option<ContainerHandle>> {
        self.primary.get()
    }

    fn set_primary(&self, handle: Option<ContainerHandle>) -> FlowResult<()> {
        self.primary.set(handle)
    }

    fn container_name(&self) -> String {
        format!("flowtools-flow-{}", self.flow_id)
    }

    /// Make sure the flow's primary container is running
    ///
    /// Reuses a running container, replaces a stopped one and otherwise
    /// spawns a new one. Calling it again is a no-op.
    pub async fn prepare(&self) -> FlowResult<()> {
        let _guard = self.lifecycle.lock().await;
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| FlowError::container("no container runtime configured"))?;

        if let Some(record) = self.containers.get_primary_container(self.flow_id).await? {
            if let Some(local_id) = record.local_id.as_deref() {
                if runtime.is_container_running(local_id).await? {
                    tracing::info!(
                        "[FlowToolsExecutor] Flow {}: reusing container {}",
                        self.flow_id,
                        record.name
                    );
                    if record.status != ContainerStatus::Running {
                        self.containers
                            .update_container(record.id, ContainerStatus::Running, Some(local_id))
                            .await?;
                    }
                    return self.set_primary(Some(ContainerHandle {
                        id: record.id,
                        name: record.name.clone(),
                        local_id: local_id.to_string(),
                    }));
                }

                tracing::info!(
                    "[FlowToolsExecutor] Flow {}: container {} is not running, replacing it",
                    self.flow_id,
                    record.name
                );
                runtime.delete_container(local_id).await?;
            }
            self.containers.delete_container(record.id).await?;
        }

        let name = self.container_name();
        // A container left behind without a record still holds the name
        runtime.delete_container(&name).await?;

        let image = self.config.docker.image.clone();
        let record = self
            .containers
            .create_container(NewContainer {
                flow_id: self.flow_id,
                name: name.clone(),
                image: image.clone(),
            })
            .await?;

        let spec = ContainerSpec {
            name: name.clone(),
            image,
            work_dir: self.config.terminal.work_dir.clone(),
            network: self.config.docker.network.clone(),
        };
        let local_id = match runtime.spawn_container(&spec).await {
            Ok(local_id) => local_id,
            Err(e) => {
                tracing::error!("[FlowToolsExecutor] Flow {}: failed to spawn container: {}", self.flow_id, e);
                if let Err(update_err) = self
                    .containers
                    .update_container(record.id, ContainerStatus::Failed, None)
                    .await
                {
                    tracing::warn!("[FlowToolsExecutor] Failed to mark container failed: {}", update_err);
                }
                return Err(e);
            }
        };

        self.containers
            .update_container(record.id, ContainerStatus::Running, Some(&local_id))
            .await?;
        tracing::info!(
            "[FlowToolsExecutor] Flow {}: started container {} ({})",
            self.flow_id,
            name,
            local_id
        );

        self.set_primary(Some(ContainerHandle {
            id: record.id,
            name,
            local_id,
        }))
    }

    /// Close the vector store and remove the primary container
    ///
    /// Every step is attempted; failures are collected into
    /// `FlowError::PartialRelease`.
    pub async fn release(&self) -> FlowResult<()> {
        let _guard = self.lifecycle.lock().await;
        let mut errors = Vec::new();

        if let Some(store) = &self.vector_store {
            if self.vector_open.load(Ordering::SeqCst) {
                match store.close().await {
                    Ok(()) => self.vector_open.store(false, Ordering::SeqCst),
                    Err(e) => errors.push(format!("close vector store: {}", e)),
                }
            }
        }

        match self.containers.get_primary_container(self.flow_id).await {
            Ok(Some(record)) => {
                if let (Some(local_id), Some(runtime)) = (record.local_id.as_deref(), &self.runtime) {
                    if let Err(e) = runtime.delete_container(local_id).await {
                        errors.push(format!("delete container {}: {}", record.name, e));
                    }
                }
                if let Err(e) = self.containers.delete_container(record.id).await {
                    errors.push(format!("delete container record {}: {}", record.id, e));
                }
            }
            Ok(None) => {}
            Err(e) => errors.push(format!("look up primary container: {}", e)),
        }

        if let Err(e) = self.set_primary(None) {
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            tracing::info!("[FlowToolsExecutor] Flow {}: released", self.flow_id);
            Ok(())
        } else {
            tracing::warn!(
                "[FlowToolsExecutor] Flow {}: released with {} error(s)",
                self.flow_id,
                errors.len()
            );
            Err(FlowError::PartialRelease {
                flow_id: self.flow_id,
                errors,
            })
        }
    }
}
