//! Built-in tools
//!
//! - `TerminalTool` - shell commands and file access in the flow container
//! - `BrowserTool` - page content and screenshots through a scraper service
//! - `SearchTool` - Google, Tavily and Traversaal search
//! - `MemoryTool` - long-term memory search and store

pub mod browser;
pub mod memory;
pub mod search;
pub mod terminal;

pub use browser::BrowserTool;
pub use memory::MemoryTool;
pub use search::{SearchEngine, SearchLogScope, SearchTool};
pub use terminal::{strip_ansi, TerminalTool};
