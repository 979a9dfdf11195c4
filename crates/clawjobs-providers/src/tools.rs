//! Server tool registry — maps a task's capability flags to the tool
//! entries and beta header the Messages API expects.
//!
//! Server tools run on Anthropic's side; the client only declares them.

use clawjobs_core::types::{Task, ToolDefinition};

/// Static definition of one server tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTool {
    /// Versioned tool type sent as `type`.
    pub kind: &'static str,
    /// Tool name sent as `name`.
    pub name: &'static str,
}

impl ServerTool {
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            kind: self.kind.to_string(),
            name: self.name.to_string(),
        }
    }
}

// ─── Tool Definitions ────────────────────────────────────────────────────────

pub const WEB_SEARCH: ServerTool = ServerTool {
    kind: "web_search_20260209",
    name: "web_search",
};

pub const WEB_FETCH: ServerTool = ServerTool {
    kind: "web_fetch_20260209",
    name: "web_fetch",
};

pub const CODE_EXECUTION: ServerTool = ServerTool {
    kind: "code_execution_20260120",
    name: "code_execution",
};

/// Unlocks dynamic filtering of web results through code execution.
pub const CODE_EXECUTION_WEB_TOOLS_BETA: &str = "code-execution-web-tools-2026-02-09";

/// Tools and optional beta header for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolManifest {
    pub tools: Vec<ToolDefinition>,
    pub beta: Option<String>,
}

/// Build the manifest from the three capability flags, in a fixed order.
///
/// The beta header is set only when code execution is on together with
/// web search or web fetch.
pub fn build_manifest(task: &Task) -> ToolManifest {
    let mut tools = Vec::new();
    if task.enable_web_search {
        tools.push(WEB_SEARCH.definition());
    }
    if task.enable_web_fetch {
        tools.push(WEB_FETCH.definition());
    }
    if task.enable_code_execution {
        tools.push(CODE_EXECUTION.definition());
    }

    let beta = (task.enable_code_execution && (task.enable_web_search || task.enable_web_fetch))
        .then(|| CODE_EXECUTION_WEB_TOOLS_BETA.to_string());

    ToolManifest { tools, beta }
}
