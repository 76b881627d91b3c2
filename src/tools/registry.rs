//! Tool registry
//!
//! Immutable catalog of every tool the runtime knows about, plus the
//! side-table classifications the executor consults after a call: how the
//! call is narrated in the message log, how its result is rendered, whether
//! an oversized result may be summarized and whether the result is written
//! to long-term memory.
//!
//! Built once and shared as `Arc<ToolRegistry>`.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use super::schema::{ToolDefinition, ToolInputSchema};
use crate::store::{MsgLogType, ResultFormat};

/// Canonical tool names
pub mod names {
    // Barriers
    pub const DONE: &str = "done";
    pub const ASK: &str = "ask";
    pub const CODE_RESULT: &str = "code_result";
    pub const MAINTENANCE_RESULT: &str = "maintenance_result";
    pub const HACK_RESULT: &str = "hack_result";
    pub const SEARCH_RESULT: &str = "search_result";
    pub const MEMORIST_RESULT: &str = "memorist_result";
    pub const ENRICHER_RESULT: &str = "enricher_result";
    pub const REPORT_RESULT: &str = "report_result";
    pub const SUBTASK_LIST: &str = "subtask_list";

    // Handoffs
    pub const ADVICE: &str = "advice";
    pub const CODER: &str = "coder";
    pub const MAINTENANCE: &str = "maintenance";
    pub const PENTESTER: &str = "pentester";
    pub const SEARCH: &str = "search";
    pub const MEMORIST: &str = "memorist";

    // Environment
    pub const TERMINAL: &str = "terminal";
    pub const FILE: &str = "file";
    pub const BROWSER: &str = "browser";

    // Search engines
    pub const GOOGLE: &str = "google";
    pub const TAVILY: &str = "tavily";
    pub const TRAVERSAAL: &str = "traversaal";

    // Vector memory
    pub const SEARCH_IN_MEMORY: &str = "search_in_memory";
    pub const SEARCH_GUIDE: &str = "search_guide";
    pub const STORE_GUIDE: &str = "store_guide";
    pub const SEARCH_CODE: &str = "search_code";
    pub const STORE_CODE: &str = "store_code";
    pub const SEARCH_ANSWER: &str = "search_answer";
    pub const STORE_ANSWER: &str = "store_answer";
}

use names::*;

/// Registry of tool definitions and classifications
pub struct ToolRegistry {
    definitions: HashMap<String, ToolDefinition>,
    message_types: HashMap<&'static str, MsgLogType>,
    result_formats: HashMap<&'static str, ResultFormat>,
    summarizable: HashSet<&'static str>,
    storable: HashSet<&'static str>,
}

impl ToolRegistry {
    /// Build the full catalog
    pub fn new() -> Self {
        let definitions = catalog()
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect::<HashMap<_, _>>();
        tracing::debug!("[ToolRegistry] Built catalog with {} tools", definitions.len());

        let message_types = HashMap::from([
            (TERMINAL, MsgLogType::Terminal),
            (FILE, MsgLogType::File),
            (BROWSER, MsgLogType::Browser),
            (SEARCH, MsgLogType::Search),
            (GOOGLE, MsgLogType::Search),
            (TAVILY, MsgLogType::Search),
            (TRAVERSAAL, MsgLogType::Search),
            (ADVICE, MsgLogType::Advice),
            (ASK, MsgLogType::Ask),
            (DONE, MsgLogType::Done),
        ]);

        let result_formats = HashMap::from([
            (TERMINAL, ResultFormat::Terminal),
            (FILE, ResultFormat::Plain),
            (BROWSER, ResultFormat::Plain),
        ]);

        let summarizable = HashSet::from([TERMINAL, BROWSER]);

        let storable = HashSet::from([
            TERMINAL, FILE, SEARCH, GOOGLE, TAVILY, TRAVERSAAL, MAINTENANCE, CODER, PENTESTER,
            ADVICE,
        ]);

        Self {
            definitions,
            message_types,
            result_formats,
            summarizable,
            storable,
        }
    }

    /// Get a definition by name
    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.get(name)
    }

    /// Message log category; unknown names narrate as thoughts
    pub fn message_type(&self, name: &str) -> MsgLogType {
        self.message_types
            .get(name)
            .copied()
            .unwrap_or(MsgLogType::Thoughts)
    }

    /// Result rendering format; unknown names render as markdown
    pub fn result_format(&self, name: &str) -> ResultFormat {
        self.result_formats
            .get(name)
            .copied()
            .unwrap_or(ResultFormat::Markdown)
    }

    pub fn is_summarizable(&self, name: &str) -> bool {
        self.summarizable.contains(name)
    }

    /// Whether results of this tool go to long-term memory
    pub fn is_storable(&self, name: &str) -> bool {
        self.storable.contains(name)
    }

    /// Get the list of tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.definitions.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Catalog
// ============================================================================

fn message_prop() -> Value {
    json!({
        "type": "string",
        "description": "Short human-readable summary of this action for the user, in the user's language"
    })
}

fn tool(name: &str, description: &str, mut properties: Value, required: &[&str]) -> ToolDefinition {
    // `message` only narrates the call, so it stays optional
    if let Some(props) = properties.as_object_mut() {
        props.insert("message".to_string(), message_prop());
    }

    ToolDefinition::new(
        name,
        description,
        ToolInputSchema::new()
            .with_properties(properties)
            .with_required(required.iter().copied()),
    )
}

fn result_tool(name: &str, description: &str) -> ToolDefinition {
    tool(
        name,
        description,
        json!({
            "result": {
                "type": "string",
                "description": "Complete result of the work in markdown, with all details the caller needs"
            }
        }),
        &["result"],
    )
}

fn question_tool(name: &str, description: &str) -> ToolDefinition {
    tool(
        name,
        description,
        json!({
            "question": {
                "type": "string",
                "description": "Detailed description of the task with all context the specialist needs"
            }
        }),
        &["question"],
    )
}

fn search_engine_tool(name: &str, description: &str) -> ToolDefinition {
    tool(
        name,
        description,
        json!({
            "query": {
                "type": "string",
                "description": "Search query, short and precise"
            },
            "max_results": {
                "type": "integer",
                "description": "Maximum number of results to return (1-10)"
            }
        }),
        &["query", "max_results"],
    )
}

const GUIDE_TYPES: [&str; 6] = ["install", "configure", "use", "pentest", "development", "other"];
const ANSWER_TYPES: [&str; 5] = ["guide", "vulnerability", "code", "tool", "other"];

fn catalog() -> Vec<ToolDefinition> {
    vec![
        // Barriers
        tool(
            DONE,
            "Finish the current subtask and report whether it succeeded",
            json!({
                "success": {"type": "boolean", "description": "Whether the subtask was completed successfully"},
                "result": {"type": "string", "description": "Final result of the subtask in markdown"}
            }),
            &["success", "result"],
        ),
        tool(
            ASK,
            "Ask the user a question and wait for the answer before continuing",
            json!({}),
            &[],
        ),
        result_tool(CODE_RESULT, "Return the result of the coding task to the caller"),
        result_tool(
            MAINTENANCE_RESULT,
            "Return the result of the environment maintenance task to the caller",
        ),
        result_tool(HACK_RESULT, "Return the result of the penetration testing task to the caller"),
        result_tool(SEARCH_RESULT, "Return the answer found by searching to the caller"),
        result_tool(MEMORIST_RESULT, "Return the facts recalled from memory to the caller"),
        result_tool(ENRICHER_RESULT, "Return the enriched context to the caller"),
        tool(
            REPORT_RESULT,
            "Return the final report of the task",
            json!({
                "success": {"type": "boolean", "description": "Whether the task was completed successfully"},
                "result": {"type": "string", "description": "Final report in markdown"}
            }),
            &["success", "result"],
        ),
        tool(
            SUBTASK_LIST,
            "Return the ordered list of subtasks to complete the task",
            json!({
                "subtasks": {
                    "type": "array",
                    "description": "Ordered list of subtasks",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "description": {"type": "string"}
                        },
                        "required": ["title", "description"]
                    }
                }
            }),
            &["subtasks"],
        ),
        // Handoffs
        tool(
            ADVICE,
            "Ask the adviser for a solution when stuck or before a risky step",
            json!({
                "question": {"type": "string", "description": "What you need advice on"},
                "code": {"type": "string", "description": "Relevant code snippet, if any"},
                "output": {"type": "string", "description": "Relevant command output, if any"}
            }),
            &["question"],
        ),
        question_tool(CODER, "Delegate writing or fixing code to the coder specialist"),
        question_tool(
            MAINTENANCE,
            "Delegate installing or configuring software in the environment to the installer",
        ),
        question_tool(PENTESTER, "Delegate a penetration testing step to the pentester specialist"),
        question_tool(SEARCH, "Delegate finding information on the internet to the searcher"),
        tool(
            MEMORIST,
            "Ask the memorist to recall what was done earlier in this flow",
            json!({
                "question": {"type": "string", "description": "What you want to recall"},
                "task_id": {"type": "integer", "description": "Restrict recall to this task"},
                "subtask_id": {"type": "integer", "description": "Restrict recall to this subtask"}
            }),
            &["question"],
        ),
        // Environment
        tool(
            TERMINAL,
            "Run a shell command in the sandbox container",
            json!({
                "input": {"type": "string", "description": "Command to execute"},
                "cwd": {"type": "string", "description": "Working directory, defaults to the container work dir"},
                "detach": {"type": "boolean", "description": "Run in background without waiting for output"},
                "timeout": {"type": "integer", "description": "Timeout in seconds"}
            }),
            &["input"],
        ),
        tool(
            FILE,
            "Read or write a file in the sandbox container",
            json!({
                "action": {"type": "string", "enum": ["read_file", "update_file"]},
                "path": {"type": "string", "description": "Path of the file or directory"},
                "content": {"type": "string", "description": "New file content for update_file"}
            }),
            &["action", "path"],
        ),
        tool(
            BROWSER,
            "Open a web page and read its content",
            json!({
                "url": {"type": "string", "description": "Absolute URL of the page"},
                "action": {"type": "string", "enum": ["markdown", "html", "links"]}
            }),
            &["url", "action"],
        ),
        // Search engines
        search_engine_tool(GOOGLE, "Search the web with Google"),
        search_engine_tool(TAVILY, "Search the web with Tavily, good for research questions"),
        search_engine_tool(TRAVERSAAL, "Ask Traversaal for a direct answer with sources"),
        // Vector memory
        tool(
            SEARCH_IN_MEMORY,
            "Search the long-term memory of this flow for earlier tool results",
            json!({
                "question": {"type": "string", "description": "What to look for"},
                "task_id": {"type": "integer"},
                "subtask_id": {"type": "integer"}
            }),
            &["question"],
        ),
        tool(
            SEARCH_GUIDE,
            "Search stored guides",
            json!({
                "question": {"type": "string"},
                "type": {"type": "string", "enum": GUIDE_TYPES}
            }),
            &["question", "type"],
        ),
        tool(
            STORE_GUIDE,
            "Store a guide for later reuse",
            json!({
                "guide": {"type": "string", "description": "Guide text in markdown"},
                "question": {"type": "string", "description": "Question the guide answers"},
                "type": {"type": "string", "enum": GUIDE_TYPES}
            }),
            &["guide", "question", "type"],
        ),
        tool(
            SEARCH_CODE,
            "Search stored code samples",
            json!({
                "question": {"type": "string"},
                "lang": {"type": "string", "description": "Programming language"}
            }),
            &["question", "lang"],
        ),
        tool(
            STORE_CODE,
            "Store a code sample for later reuse",
            json!({
                "code": {"type": "string"},
                "question": {"type": "string", "description": "Question the code answers"},
                "lang": {"type": "string"},
                "explanation": {"type": "string"},
                "description": {"type": "string", "description": "One line description"}
            }),
            &["code", "question", "lang", "explanation", "description"],
        ),
        tool(
            SEARCH_ANSWER,
            "Search stored answers to earlier questions",
            json!({
                "question": {"type": "string"},
                "type": {"type": "string", "enum": ANSWER_TYPES}
            }),
            &["question", "type"],
        ),
        tool(
            STORE_ANSWER,
            "Store an answer for later reuse",
            json!({
                "answer": {"type": "string"},
                "question": {"type": "string"},
                "type": {"type": "string", "enum": ANSWER_TYPES}
            }),
            &["answer", "question", "type"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_complete() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.len(), 29);
        for name in [DONE, SUBTASK_LIST, MEMORIST, TERMINAL, BROWSER, TRAVERSAAL, STORE_ANSWER] {
            let def = registry.definition(name).unwrap();
            let properties = def.input_schema.properties.as_ref().unwrap();
            assert!(properties.get("message").is_some(), "{} lacks message", name);
            let required = def.input_schema.required.clone().unwrap_or_default();
            assert!(!required.contains(&"message".to_string()), "{} requires message", name);
        }
        assert!(registry.definition("nonexistent").is_none());
    }

    #[test]
    fn test_classifications() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.message_type(TERMINAL), MsgLogType::Terminal);
        assert_eq!(registry.message_type(GOOGLE), MsgLogType::Search);
        assert_eq!(registry.message_type(ASK), MsgLogType::Ask);
        assert_eq!(registry.result_format(FILE), ResultFormat::Plain);
        assert_eq!(registry.result_format(TERMINAL), ResultFormat::Terminal);
        assert_eq!(registry.result_format(CODER), ResultFormat::Markdown);
        assert!(registry.is_summarizable(BROWSER));
        assert!(!registry.is_summarizable(FILE));
        assert!(registry.is_storable(FILE));
        assert!(!registry.is_storable(SEARCH_IN_MEMORY));
    }

    #[test]
    fn test_unknown_and_empty_names_fall_back() {
        let registry = ToolRegistry::new();
        for name in ["", "nonexistent"] {
            assert_eq!(registry.message_type(name), MsgLogType::Thoughts);
            assert_eq!(registry.result_format(name), ResultFormat::Markdown);
            assert!(!registry.is_summarizable(name));
            assert!(!registry.is_storable(name));
        }
    }
}
