// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{extract_braced, Tool, ToolError};

#[derive(Debug, Deserialize)]
struct StagePathArgs {
    src: String,
    #[serde(default)]
    dest: Option<String>,
}

/// Copy a host file into the staging area shared with the sandbox and
/// external tools, reporting both path representations back to the
/// model.
pub struct StagePathTool {
    data_path: PathBuf,
}

impl StagePathTool {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
        }
    }
}

#[async_trait]
impl Tool for StagePathTool {
    fn name(&self) -> &str {
        "stage_path"
    }

    fn description(&self) -> &str {
        "Stage a host file for sandbox and tool access. Input: JSON {\"src\": \
         \"/absolute/path\", \"dest\": \"name\"}. Returns host_path, sandbox_path, and path."
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let args: StagePathArgs = serde_json::from_str(input.trim())
            .or_else(|e| {
                extract_braced(input)
                    .and_then(|s| serde_json::from_str(s).ok())
                    .ok_or(e)
            })
            .map_err(|e| ToolError::ArgumentInvalid(format!("stage_path args: {e}")))?;

        let src = Path::new(&args.src);
        if !src.is_absolute() {
            return Err(ToolError::ArgumentInvalid(format!(
                "src must be an absolute path, got {:?}",
                args.src
            )));
        }

        let dest_name = match args.dest {
            Some(d) if !d.trim().is_empty() => d,
            _ => src
                .file_name()
                .and_then(|n| n.to_str())
                .map(String::from)
                .ok_or_else(|| {
                    ToolError::ArgumentInvalid("src has no usable file name".into())
                })?,
        };
        // Staged names stay flat; path separators would escape tmp/.
        let dest_name = dest_name.replace('/', "_");

        let tmp_dir = self.data_path.join("tmp");
        std::fs::create_dir_all(&tmp_dir)
            .map_err(|e| ToolError::Failed(format!("creating staging dir: {e}")))?;
        let host_path = tmp_dir.join(&dest_name);
        std::fs::copy(src, &host_path)
            .map_err(|e| ToolError::Failed(format!("copying {}: {e}", src.display())))?;

        let sandbox_path = format!("{}/{dest_name}", quarry_sandbox::SANDBOX_PATH);
        debug!(host = %host_path.display(), sandbox = %sandbox_path, "file staged");

        Ok(json!({
            "host_path": host_path.display().to_string(),
            "sandbox_path": sandbox_path,
            "path": host_path.display().to_string(),
        })
        .to_string())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stages_a_file_and_reports_both_paths() {
        let staging = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let src = source.path().join("input.csv");
        std::fs::write(&src, "a,b\n1,2\n").unwrap();

        let tool = StagePathTool::new(staging.path());
        let out = tool
            .execute(&json!({"src": src.display().to_string()}).to_string())
            .await
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(v["sandbox_path"], "/workspace/input.csv");
        assert_eq!(v["path"], v["host_path"]);
        let staged = staging.path().join("tmp/input.csv");
        assert_eq!(std::fs::read_to_string(staged).unwrap(), "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn dest_renames_the_staged_file() {
        let staging = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        let src = source.path().join("x.txt");
        std::fs::write(&src, "data").unwrap();

        let tool = StagePathTool::new(staging.path());
        let out = tool
            .execute(
                &json!({"src": src.display().to_string(), "dest": "renamed.txt"}).to_string(),
            )
            .await
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(v["host_path"].as_str().unwrap().ends_with("tmp/renamed.txt"));
    }

    #[tokio::test]
    async fn relative_src_is_rejected() {
        let staging = tempfile::tempdir().unwrap();
        let tool = StagePathTool::new(staging.path());
        let err = tool
            .execute(r#"{"src": "relative/file.txt"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ArgumentInvalid(_)));
    }

    #[tokio::test]
    async fn missing_source_is_a_tool_failure() {
        let staging = tempfile::tempdir().unwrap();
        let tool = StagePathTool::new(staging.path());
        let err = tool
            .execute(r#"{"src": "/no/such/file.bin"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }
}
