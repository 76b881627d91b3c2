//! Container runtime boundary
//!
//! The terminal tool and the flow tools executor only need a thin capability
//! set from a container backend. Any backend implementing `ContainerRuntime`
//! is substitutable; `DockerCli` drives the local `docker` binary.

mod docker;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::core::{FlowError, FlowResult};

pub use docker::DockerCli;

/// Parameters for spawning a flow container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub work_dir: String,
    pub network: Option<String>,
}

/// The primary container of a flow as seen by tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Id of the persisted container record
    pub id: i64,
    pub name: String,
    /// Runtime id
    pub local_id: String,
}

/// Primary container handle shared between a flow and its tools
///
/// Tools read it on every call, so executors built before the container
/// is prepared pick up the handle once it exists.
#[derive(Debug, Clone, Default)]
pub struct ContainerSlot(Arc<RwLock<Option<ContainerHandle>>>);

impl ContainerSlot {
    pub fn new(handle: Option<ContainerHandle>) -> Self {
        Self(Arc::new(RwLock::new(handle)))
    }

    pub fn get(&self) -> FlowResult<Option<ContainerHandle>> {
        self.0
            .read()
            .map(|h| h.clone())
            .map_err(|_| FlowError::other("container handle lock poisoned"))
    }

    pub fn set(&self, handle: Option<ContainerHandle>) -> FlowResult<()> {
        let mut slot = self
            .0
            .write()
            .map_err(|_| FlowError::other("container handle lock poisoned"))?;
        *slot = handle;
        Ok(())
    }
}

/// Parameters of an exec session inside a running container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
    pub cmd: Vec<String>,
    pub working_dir: String,
    pub tty: bool,
}

impl ExecConfig {
    /// Run `command` through `sh -c`
    pub fn shell(command: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            cmd: vec!["sh".to_string(), "-c".to_string(), command.into()],
            working_dir: working_dir.into(),
            tty: true,
        }
    }
}

/// State of an exec session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecStatus {
    pub running: bool,
    pub exit_code: Option<i64>,
}

/// Combined output stream of an attached exec session
pub type ExecOutput = Box<dyn AsyncRead + Send + Unpin>;

/// One file moved in or out of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the container (absolute on the way out, relative to the
    /// target directory on the way in)
    pub path: String,
    pub size: u64,
    /// `None` when the file exceeded the caller's size limit and was not read
    pub content: Option<Vec<u8>>,
}

impl ArchiveEntry {
    /// Entry carrying `content` under `path`
    pub fn file(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size: content.len() as u64,
            content: Some(content),
        }
    }
}

/// Capability set of a sandbox container backend
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a container and return its runtime id
    async fn spawn_container(&self, spec: &ContainerSpec) -> FlowResult<String>;

    /// Remove a container, stopping it first; missing containers are not an error
    ///
    /// Accepts the runtime id or the container name.
    async fn delete_container(&self, local_id: &str) -> FlowResult<()>;

    async fn is_container_running(&self, local_id: &str) -> FlowResult<bool>;

    /// Prepare an exec session and return its id
    async fn exec_create(&self, local_id: &str, config: ExecConfig) -> FlowResult<String>;

    /// Start the session and return its output stream
    async fn exec_attach(&self, exec_id: &str) -> FlowResult<ExecOutput>;

    /// Report the session state; once an exit status is returned the
    /// session is forgotten
    async fn exec_inspect(&self, exec_id: &str) -> FlowResult<ExecStatus>;

    /// Write `entries` below directory `dir`, overwriting existing files
    async fn copy_to_container(
        &self,
        local_id: &str,
        dir: &str,
        entries: Vec<ArchiveEntry>,
    ) -> FlowResult<()>;

    /// Read a file, or every file below a directory
    ///
    /// Files larger than `max_file_size` come back without content.
    async fn copy_from_container(
        &self,
        local_id: &str,
        path: &str,
        max_file_size: u64,
    ) -> FlowResult<Vec<ArchiveEntry>>;
}
