// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use quarry_sandbox::{Language, Sandbox};

use crate::{extract_braced, Tool, ToolError};

#[derive(Debug, Deserialize)]
struct CodeEvalArgs {
    language: String,
    code: String,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Run model-written code in the sandbox.
pub struct CodeEvalTool {
    sandbox: Arc<Sandbox>,
}

impl CodeEvalTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for CodeEvalTool {
    fn name(&self) -> &str {
        "code_eval"
    }

    fn description(&self) -> &str {
        "Execute code in an isolated sandbox. Input: JSON {\"language\": \
         \"python\"|\"go\"|\"javascript\", \"code\": \"...\", \"dependencies\": [\"...\"]}. \
         Returns the program output."
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let args: CodeEvalArgs = parse_args(input)?;
        let language = Language::parse(&args.language)?;
        debug!(?language, deps = args.dependencies.len(), "code_eval tool");

        let outcome = self
            .sandbox
            .run(language, &args.code, &args.dependencies)
            .await?;
        match outcome.error {
            None => Ok(outcome.result),
            Some(message) => Err(ToolError::Failed(message)),
        }
    }
}

fn parse_args(input: &str) -> Result<CodeEvalArgs, ToolError> {
    serde_json::from_str(input.trim())
        .or_else(|e| {
            extract_braced(input)
                .and_then(|s| serde_json::from_str(s).ok())
                .ok_or(e)
        })
        .map_err(|e| ToolError::ArgumentInvalid(format!("code_eval args: {e}")))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_args_accepts_minimal_payload() {
        let args = parse_args(r#"{"language":"python","code":"print(1)"}"#).unwrap();
        assert_eq!(args.language, "python");
        assert!(args.dependencies.is_empty());
    }

    #[test]
    fn parse_args_recovers_from_prose() {
        let args =
            parse_args("Run this: {\"language\":\"go\",\"code\":\"package main\"}").unwrap();
        assert_eq!(args.language, "go");
    }

    #[test]
    fn parse_args_rejects_garbage() {
        assert!(matches!(
            parse_args("just run it"),
            Err(ToolError::ArgumentInvalid(_))
        ));
    }
}
