// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use thiserror::Error;

/// Failures surfaced by tool dispatch.  Inside an agent step these are
/// converted to `error: …` observations; only the HTTP layer maps them
/// to status codes.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    /// Argument parsing failed even after normalization.
    #[error("invalid tool arguments: {0}")]
    ArgumentInvalid(String),

    #[error(transparent)]
    Mcp(#[from] quarry_mcp::McpError),

    #[error(transparent)]
    Sandbox(#[from] quarry_sandbox::SandboxError),

    /// The tool ran and failed (non-zero exit, fetch error, …).
    #[error("{0}")]
    Failed(String),
}

/// Trait every built-in tool implements.
///
/// The input is the raw `Action Input` string from the model — each tool
/// carries its own precise schema and parses it itself, so there is no
/// shared dynamic argument type.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    /// One-line description shown in the agent's tool list.
    fn description(&self) -> &str;
    async fn execute(&self, input: &str) -> Result<String, ToolError>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
