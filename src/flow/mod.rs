//! Flow-level tool assembly
//!
//! `FlowToolsExecutor` owns a flow's sandbox container and vector store
//! connection and builds the per-role `ToolExecutor`s.

mod executor;
mod roles;

pub use executor::FlowToolsExecutor;
pub use roles::{
    CoderExecutorConfig, CustomExecutorConfig, CustomFunction, EnricherExecutorConfig,
    GeneratorExecutorConfig, InstallerExecutorConfig, MemoristExecutorConfig,
    PentesterExecutorConfig, PrimaryExecutorConfig, ReporterExecutorConfig,
    SearcherExecutorConfig,
};
