// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use tracing::debug;

use quarry_mcp::{split_qualified, McpManager};

use crate::{normalize_mcp_args, ToolError, ToolRegistry};

/// Terminal sentinel: `finish` ends the session, its input is the result.
pub const FINISH_TOOL: &str = "finish";

/// Resolves tool names to executors.
///
/// Resolution order: `finish` sentinel → built-in registry → qualified
/// MCP name.  Unqualified names with no built-in are [`ToolError::NotFound`].
pub struct ToolDispatcher {
    registry: ToolRegistry,
    mcp: Arc<dyn McpManager>,
    /// Host prefix substituted for the sandbox mount path during MCP
    /// argument normalization (`<data_path>/tmp`).
    host_tmp_prefix: String,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, mcp: Arc<dyn McpManager>, data_path: &str) -> Self {
        Self {
            registry,
            mcp,
            host_tmp_prefix: format!("{}/tmp", data_path.trim_end_matches('/')),
        }
    }

    /// Every tool name the model may use: built-ins plus the qualified
    /// names discovered from the MCP manager, with descriptions for the
    /// prompt.  `finish` is included so the model always sees its
    /// terminal action.
    pub async fn discover_tools(&self) -> Vec<(String, String)> {
        let mut tools = vec![(
            FINISH_TOOL.to_string(),
            "Finish the session. Input: the final answer.".to_string(),
        )];
        tools.extend(self.registry.descriptions());
        for info in self.mcp.list_tools().await {
            tools.push((info.qualified_name(), info.description));
        }
        tools
    }

    /// Execute one tool call.  `finish` echoes its input; the engine
    /// treats it as the termination sentinel before ever dispatching,
    /// so this path only serves direct callers.
    pub async fn execute(&self, name: &str, input: &str) -> Result<String, ToolError> {
        let name = name.trim();
        debug!(tool = name, "dispatching tool");

        if name.eq_ignore_ascii_case(FINISH_TOOL) {
            return Ok(input.to_string());
        }

        if let Some(tool) = self.registry.get(name) {
            return tool.execute(input).await;
        }

        if let Some((server, tool)) = split_qualified(name) {
            let args = normalize_mcp_args(
                input,
                tool,
                quarry_sandbox::SANDBOX_PATH,
                &self.host_tmp_prefix,
            )?;
            return Ok(self.mcp.call_tool(server, tool, args).await?);
        }

        Err(ToolError::NotFound(name.to_string()))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
