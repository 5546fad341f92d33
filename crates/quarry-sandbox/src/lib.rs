// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sandboxed code execution.
//!
//! Each run gets a fresh host temp directory bind-mounted into a
//! resource-limited container (256 MB memory, 0.5 CPU, no network unless
//! the run needs to fetch dependencies).  The container is killed on a
//! hard wall-clock timeout and both output streams are truncated at a
//! byte budget before they reach the model.

mod runner;

pub use runner::{docker_available, Sandbox};

/// In-container mount point of the per-run working directory.  Paths the
/// model sees under this prefix map to host temp paths; the dispatcher
/// rewrites between the two representations.
pub const SANDBOX_PATH: &str = "/workspace";

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Languages the sandbox image supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Go,
    Javascript,
}

impl Language {
    /// Parse a language tag, case-insensitively.  Unknown tags are an
    /// error — running code in an unexpected runtime is never right.
    pub fn parse(tag: &str) -> Result<Self, SandboxError> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Self::Python),
            "go" | "golang" => Ok(Self::Go),
            "javascript" | "js" | "node" | "nodejs" => Ok(Self::Javascript),
            other => Err(SandboxError::UnknownLanguage(other.to_string())),
        }
    }

    /// Source file name expected by the run command.
    pub fn source_file(&self) -> &'static str {
        match self {
            Self::Python => "user_code.py",
            Self::Go => "main.go",
            Self::Javascript => "user_code.js",
        }
    }
}

/// What went wrong, when something did.  Carried inside [`RunOutcome`]
/// so callers always get the full stream capture alongside the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The wall-clock timeout fired and the container was killed.
    Timeout,
    /// The program exited non-zero.
    Failure,
}

/// The result of one sandbox run.
///
/// Callers that talk to the model use only `result` and `error`; the raw
/// streams stay available for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Program output on success (stdout, plus a warnings block when
    /// stderr was non-empty).  Empty on failure.
    pub result: String,
    /// Human-readable error on failure; `None` on success.
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// 124 on timeout, matching the conventional timeout(1) exit code.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// True when either stream hit the byte budget.
    pub truncated: bool,
}

/// Failures to even start a run.  Runtime failures of the evaluated
/// program are reported through [`RunOutcome`], not here.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("unknown sandbox language: {0}")]
    UnknownLanguage(String),

    /// A dependency name contains characters that could escape the
    /// install command.
    #[error("invalid dependency name: {0}")]
    InvalidDependency(String),

    #[error("failed to launch sandbox: {0}")]
    Launch(#[from] std::io::Error),
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!(Language::parse("Python").unwrap(), Language::Python);
        assert_eq!(Language::parse("golang").unwrap(), Language::Go);
        assert_eq!(Language::parse("node").unwrap(), Language::Javascript);
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(matches!(
            Language::parse("perl"),
            Err(SandboxError::UnknownLanguage(_))
        ));
    }

    #[test]
    fn source_files_match_runtimes() {
        assert_eq!(Language::Python.source_file(), "user_code.py");
        assert_eq!(Language::Go.source_file(), "main.go");
        assert_eq!(Language::Javascript.source_file(), "user_code.js");
    }
}
