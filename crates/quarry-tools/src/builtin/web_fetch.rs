// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{extract_braced, Tool, ToolError};

const DEFAULT_MAX_CHARS: usize = 50_000;

#[derive(Debug, Deserialize)]
struct WebFetchArgs {
    url: String,
    #[serde(default)]
    max_chars: Option<usize>,
}

/// Fetch a URL and convert the content to readable text.
pub struct WebFetchTool {
    pub max_chars: usize,
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch content from an http(s) URL and convert it to readable text. \
         Input: JSON {\"url\": \"https://...\", \"max_chars\": 10000} or a bare URL."
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let trimmed = input.trim();
        let args: WebFetchArgs = if trimmed.starts_with("http://") || trimmed.starts_with("https://")
        {
            WebFetchArgs {
                url: trimmed.to_string(),
                max_chars: None,
            }
        } else {
            serde_json::from_str(trimmed)
                .or_else(|e| {
                    extract_braced(trimmed)
                        .and_then(|s| serde_json::from_str(s).ok())
                        .ok_or(e)
                })
                .map_err(|e| ToolError::ArgumentInvalid(format!("web_fetch args: {e}")))?
        };

        if !args.url.starts_with("http://") && !args.url.starts_with("https://") {
            return Err(ToolError::ArgumentInvalid(format!(
                "url must be http(s), got {:?}",
                args.url
            )));
        }
        let max_chars = args.max_chars.unwrap_or(self.max_chars);
        debug!(url = %args.url, "web_fetch tool");

        fetch_url(&args.url, max_chars)
            .await
            .map_err(|e| ToolError::Failed(format!("fetch error: {e}")))
    }
}

async fn fetch_url(url: &str, max_chars: usize) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent("quarry-agent/0.4")
        .build()
        .map_err(|e| e.to_string())?;

    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let body = response.text().await.map_err(|e| e.to_string())?;

    let content = if content_type.contains("html") {
        html_to_text(&body)
    } else if content_type.contains("json") {
        match serde_json::from_str::<Value>(&body) {
            Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
            Err(_) => body,
        }
    } else {
        body
    };

    if content.len() > max_chars {
        let mut end = max_chars;
        while end > 0 && !content.is_char_boundary(end) {
            end -= 1;
        }
        Ok(format!(
            "{}...[truncated at {max_chars} chars; total {} chars]",
            &content[..end],
            content.len()
        ))
    } else {
        Ok(content)
    }
}

/// Convert HTML to plain text using html2text.
fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_strips_tags() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }

    #[tokio::test]
    async fn non_http_url_is_rejected() {
        let t = WebFetchTool::default();
        let err = t
            .execute(r#"{"url": "file:///etc/passwd"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ArgumentInvalid(_)));
    }

    #[tokio::test]
    async fn garbage_args_are_rejected() {
        let t = WebFetchTool::default();
        let err = t.execute("fetch the page please").await.unwrap_err();
        assert!(matches!(err, ToolError::ArgumentInvalid(_)));
    }
}
