// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Client side of the MCP tool-server protocol.
//!
//! The manager knows a set of named servers and exposes two operations:
//! enumerate every `(server, tool)` pair, and invoke one tool with JSON
//! arguments.  Tools are addressed as `"<server>::<tool>"` everywhere
//! else in the workspace; [`split_qualified`] is the one place that
//! convention is parsed.
//!
//! The wire format is JSON-RPC 2.0 over HTTP POST (`tools/list`,
//! `tools/call`).  Calls to the same server are serialized; different
//! servers proceed independently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Separator between server name and tool name in qualified tool names.
pub const QUALIFIER: &str = "::";

#[derive(Debug, Error)]
pub enum McpError {
    #[error("unknown MCP server: {0}")]
    ServerUnknown(String),

    #[error("MCP server unreachable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("malformed MCP response: {0}")]
    Malformed(String),

    /// The server executed the tool and reported a tool-level error.
    #[error("MCP tool error: {0}")]
    Tool(String),
}

/// One discovered tool on one server.
#[derive(Debug, Clone)]
pub struct McpToolInfo {
    pub server: String,
    pub name: String,
    pub description: String,
}

impl McpToolInfo {
    /// Fully-qualified name as presented to the model.
    pub fn qualified_name(&self) -> String {
        format!("{}{QUALIFIER}{}", self.server, self.name)
    }
}

/// Split `"<server>::<tool>"`; `None` when the name is unqualified.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let (server, tool) = name.split_once(QUALIFIER)?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

/// Manager seam: tool discovery plus invocation.
#[async_trait]
pub trait McpManager: Send + Sync {
    /// Every tool on every reachable server.  A server that fails
    /// discovery is logged and omitted — never an error.
    async fn list_tools(&self) -> Vec<McpToolInfo>;

    /// Invoke one tool and return its text content.
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<String, McpError>;
}

struct ServerHandle {
    url: String,
    /// Serializes calls to this server; servers are independent.
    lock: Mutex<()>,
}

/// JSON-RPC-over-HTTP implementation of [`McpManager`].
pub struct HttpMcpManager {
    servers: HashMap<String, ServerHandle>,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpMcpManager {
    pub fn new(servers: &HashMap<String, String>) -> Self {
        Self {
            servers: servers
                .iter()
                .map(|(name, url)| {
                    (
                        name.clone(),
                        ServerHandle {
                            url: url.clone(),
                            lock: Mutex::new(()),
                        },
                    )
                })
                .collect(),
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn rpc(&self, handle: &ServerHandle, method: &str, params: Value) -> Result<Value, McpError> {
        let _serialized = handle.lock.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let resp = self.client.post(&handle.url).json(&body).send().await?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| McpError::Malformed(format!("invalid JSON-RPC body: {e}")))?;
        if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
            return Err(McpError::Tool(
                err["message"].as_str().unwrap_or("unspecified error").to_string(),
            ));
        }
        v.get("result")
            .cloned()
            .ok_or_else(|| McpError::Malformed("response has no result".into()))
    }
}

#[async_trait]
impl McpManager for HttpMcpManager {
    async fn list_tools(&self) -> Vec<McpToolInfo> {
        let mut tools = Vec::new();
        for (name, handle) in &self.servers {
            match self.rpc(handle, "tools/list", json!({})).await {
                Ok(result) => {
                    let listed = result["tools"].as_array().cloned().unwrap_or_default();
                    debug!(server = %name, count = listed.len(), "MCP tools discovered");
                    for tool in listed {
                        let Some(tool_name) = tool["name"].as_str() else {
                            continue;
                        };
                        tools.push(McpToolInfo {
                            server: name.clone(),
                            name: tool_name.to_string(),
                            description: tool["description"].as_str().unwrap_or("").to_string(),
                        });
                    }
                }
                Err(e) => {
                    // Missing tools shrink the prompt, not the session.
                    warn!(server = %name, "MCP discovery failed: {e}");
                }
            }
        }
        tools.sort_by(|a, b| a.qualified_name().cmp(&b.qualified_name()));
        tools
    }

    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<String, McpError> {
        let handle = self
            .servers
            .get(server)
            .ok_or_else(|| McpError::ServerUnknown(server.to_string()))?;
        let result = self
            .rpc(
                handle,
                "tools/call",
                json!({ "name": tool, "arguments": arguments }),
            )
            .await?;

        if result["isError"].as_bool().unwrap_or(false) {
            let message = render_content(&result["content"]);
            return Err(McpError::Tool(if message.is_empty() {
                "tool reported an error".into()
            } else {
                message
            }));
        }
        Ok(render_content(&result["content"]))
    }
}

/// Flatten MCP content blocks into plain text.  Non-text blocks are
/// represented by their type tag so the model knows something was there.
fn render_content(content: &Value) -> String {
    let Some(blocks) = content.as_array() else {
        return content.as_str().unwrap_or("").to_string();
    };
    blocks
        .iter()
        .map(|block| match block["type"].as_str() {
            Some("text") => block["text"].as_str().unwrap_or("").to_string(),
            Some(other) => format!("[{other} content]"),
            None => String::new(),
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A manager with no servers.  Used when the config lists none and in
/// tests that exercise the dispatcher's built-ins only.
#[derive(Default)]
pub struct NullMcpManager;

#[async_trait]
impl McpManager for NullMcpManager {
    async fn list_tools(&self) -> Vec<McpToolInfo> {
        Vec::new()
    }

    async fn call_tool(
        &self,
        server: &str,
        _tool: &str,
        _arguments: Value,
    ) -> Result<String, McpError> {
        Err(McpError::ServerUnknown(server.to_string()))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
