//! Runtime configuration
//!
//! Every knob has a default, so an empty JSON object is a valid config file.
//! API keys and service URLs can also be supplied through the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{FlowError, FlowResult};

/// Terminal command execution limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Timeout used when the caller omits one or asks for an out-of-range value
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Smallest accepted caller timeout
    #[serde(default = "default_min_timeout_secs")]
    pub min_timeout_secs: u64,

    /// Largest accepted caller timeout
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,

    /// Added on top of the command timeout before the drain gives up
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Working directory inside the container when the caller gives none
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Largest file the `file` tool will read out of the container
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_min_timeout_secs() -> u64 {
    1
}

fn default_max_timeout_secs() -> u64 {
    1200
}

fn default_grace_secs() -> u64 {
    5
}

fn default_work_dir() -> String {
    "/work".to_string()
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

impl TerminalConfig {
    /// Clamp a caller-supplied timeout
    ///
    /// Values outside `[min, max]` are replaced by the default.
    pub fn effective_timeout(&self, requested_secs: Option<i64>) -> Duration {
        let secs = match requested_secs {
            Some(t) if t >= self.min_timeout_secs as i64 && t <= self.max_timeout_secs as i64 => {
                t as u64
            }
            _ => self.default_timeout_secs,
        };
        Duration::from_secs(secs)
    }

    /// Grace period added to the drain deadline
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            min_timeout_secs: default_min_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            grace_secs: default_grace_secs(),
            work_dir: default_work_dir(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Vector memory search and storage knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum documents returned by one similarity search
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    /// Minimum similarity score for a hit
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// Chunk size used when splitting stored text
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_result_limit() -> usize {
    3
}

fn default_score_threshold() -> f32 {
    0.2
}

fn default_chunk_size() -> usize {
    2000
}

fn default_chunk_overlap() -> usize {
    100
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            result_limit: default_result_limit(),
            score_threshold: default_score_threshold(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Docker backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Path or name of the docker binary; the runtime is disabled when empty
    #[serde(default = "default_docker_binary")]
    pub binary: String,

    /// Image used for new flow containers
    #[serde(default = "default_image")]
    pub image: String,

    /// Optional docker network to attach flow containers to
    #[serde(default)]
    pub network: Option<String>,
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "debian:latest".to_string()
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: default_docker_binary(),
            image: default_image(),
            network: None,
        }
    }
}

/// Scraper service used by the browser tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Scraper for public internet targets
    #[serde(default)]
    pub public_url: Option<String>,

    /// Scraper allowed to reach private network targets
    #[serde(default)]
    pub private_url: Option<String>,
}

/// Search engine credentials; an engine without credentials is never offered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub google_api_key: Option<String>,
    #[serde(default)]
    pub google_cx: Option<String>,
    #[serde(default)]
    pub tavily_api_key: Option<String>,
    #[serde(default)]
    pub traversaal_api_key: Option<String>,
}

/// Per-role switches for optional tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalToolsConfig {
    #[serde(default = "default_enabled")]
    pub browser: bool,
    #[serde(default = "default_enabled")]
    pub search_engines: bool,
    #[serde(default = "default_enabled")]
    pub vector_memory: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for OptionalToolsConfig {
    fn default() -> Self {
        Self {
            browser: true,
            search_engines: true,
            vector_memory: true,
        }
    }
}

/// Optional tool switches for every role that has optional tools
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleToolsConfig {
    #[serde(default)]
    pub installer: OptionalToolsConfig,
    #[serde(default)]
    pub coder: OptionalToolsConfig,
    #[serde(default)]
    pub pentester: OptionalToolsConfig,
    #[serde(default)]
    pub searcher: OptionalToolsConfig,
    #[serde(default)]
    pub generator: OptionalToolsConfig,
    #[serde(default)]
    pub memorist: OptionalToolsConfig,
    #[serde(default)]
    pub enricher: OptionalToolsConfig,
}

/// Top-level configuration for a flow tools runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowToolsConfig {
    #[serde(default)]
    pub terminal: TerminalConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub scraper: ScraperConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub roles: RoleToolsConfig,

    /// Raw results above this many bytes are summarized when possible
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: usize,

    /// Directory for screenshots and other flow artifacts
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_summarize_threshold() -> usize {
    16 * 1024
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for FlowToolsConfig {
    fn default() -> Self {
        Self {
            terminal: TerminalConfig::default(),
            memory: MemoryConfig::default(),
            docker: DockerConfig::default(),
            scraper: ScraperConfig::default(),
            search: SearchConfig::default(),
            roles: RoleToolsConfig::default(),
            summarize_threshold: default_summarize_threshold(),
            data_dir: default_data_dir(),
        }
    }
}

impl FlowToolsConfig {
    /// Create a configuration with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> FlowResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay credentials and service URLs found in the environment
    pub fn with_env_overrides(mut self) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(v) = var("GOOGLE_API_KEY") {
            self.search.google_api_key = Some(v);
        }
        if let Some(v) = var("GOOGLE_CX_KEY") {
            self.search.google_cx = Some(v);
        }
        if let Some(v) = var("TAVILY_API_KEY") {
            self.search.tavily_api_key = Some(v);
        }
        if let Some(v) = var("TRAVERSAAL_API_KEY") {
            self.search.traversaal_api_key = Some(v);
        }
        if let Some(v) = var("SCRAPER_PUBLIC_URL") {
            self.scraper.public_url = Some(v);
        }
        if let Some(v) = var("SCRAPER_PRIVATE_URL") {
            self.scraper.private_url = Some(v);
        }
        if let Some(v) = var("DOCKER_DEFAULT_IMAGE") {
            self.docker.image = v;
        }
        self
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> FlowResult<()> {
        let t = &self.terminal;
        if t.min_timeout_secs > t.max_timeout_secs {
            return Err(FlowError::InvalidConfig(format!(
                "terminal.min_timeout_secs ({}) exceeds terminal.max_timeout_secs ({})",
                t.min_timeout_secs, t.max_timeout_secs
            )));
        }
        if t.default_timeout_secs < t.min_timeout_secs || t.default_timeout_secs > t.max_timeout_secs {
            return Err(FlowError::InvalidConfig(format!(
                "terminal.default_timeout_secs ({}) is outside [{}, {}]",
                t.default_timeout_secs, t.min_timeout_secs, t.max_timeout_secs
            )));
        }
        if self.memory.chunk_size == 0 || self.memory.chunk_overlap >= self.memory.chunk_size {
            return Err(FlowError::InvalidConfig(
                "memory.chunk_overlap must be smaller than a non-zero memory.chunk_size".into(),
            ));
        }
        Ok(())
    }

    /// Set the summarization threshold
    pub fn with_summarize_threshold(mut self, bytes: usize) -> Self {
        self.summarize_threshold = bytes;
        self
    }

    /// Set the search engine credentials
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Set the scraper service URLs
    pub fn with_scraper(mut self, scraper: ScraperConfig) -> Self {
        self.scraper = scraper;
        self
    }

    /// Set the terminal limits
    pub fn with_terminal(mut self, terminal: TerminalConfig) -> Self {
        self.terminal = terminal;
        self
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: FlowToolsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, FlowToolsConfig::default());
        assert_eq!(config.summarize_threshold, 16 * 1024);
        assert_eq!(config.terminal.work_dir, "/work");
        assert!(config.roles.searcher.search_engines);
    }

    #[test]
    fn test_timeout_clamping() {
        let t = TerminalConfig::default();
        assert_eq!(t.effective_timeout(None), Duration::from_secs(300));
        assert_eq!(t.effective_timeout(Some(60)), Duration::from_secs(60));
        assert_eq!(t.effective_timeout(Some(0)), Duration::from_secs(300));
        assert_eq!(t.effective_timeout(Some(-5)), Duration::from_secs(300));
        assert_eq!(t.effective_timeout(Some(1201)), Duration::from_secs(300));
        assert_eq!(t.effective_timeout(Some(1200)), Duration::from_secs(1200));
    }

    #[test]
    fn test_timeout_clamping_respects_custom_bounds() {
        let t = TerminalConfig {
            min_timeout_secs: 10,
            max_timeout_secs: 20,
            default_timeout_secs: 15,
            ..TerminalConfig::default()
        };
        assert_eq!(t.effective_timeout(Some(9)), Duration::from_secs(15));
        assert_eq!(t.effective_timeout(Some(21)), Duration::from_secs(15));
        assert_eq!(t.effective_timeout(Some(10)), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = FlowToolsConfig::default();
        config.terminal.min_timeout_secs = 100;
        config.terminal.max_timeout_secs = 10;
        assert!(matches!(config.validate(), Err(FlowError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("flowtools.json");
        std::fs::write(
            &path,
            r#"{"summarize_threshold": 512, "search": {"tavily_api_key": "tvly"}, "roles": {"coder": {"browser": false}}}"#,
        )
        .unwrap();

        let config = FlowToolsConfig::from_file(&path).unwrap();
        assert_eq!(config.summarize_threshold, 512);
        assert_eq!(config.search.tavily_api_key.as_deref(), Some("tvly"));
        assert!(!config.roles.coder.browser);
        assert!(config.roles.coder.vector_memory);
    }
}
