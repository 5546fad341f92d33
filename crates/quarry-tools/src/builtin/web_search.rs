// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{extract_braced, Tool, ToolError};

#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    query: String,
    #[serde(default)]
    count: Option<usize>,
}

/// Real-time web search via the Brave Search API.
#[derive(Default)]
pub struct WebSearchTool {
    /// Optional API key override (falls back to env BRAVE_API_KEY)
    pub api_key: Option<String>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Real-time web search. Input: JSON {\"query\": \"...\", \"count\": 5}. \
         Returns a numbered result list with titles, URLs, and snippets."
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let args: WebSearchArgs = serde_json::from_str(input.trim())
            .or_else(|e| {
                extract_braced(input)
                    .and_then(|s| serde_json::from_str(s).ok())
                    .ok_or(e)
            })
            .map_err(|e| ToolError::ArgumentInvalid(format!("web_search args: {e}")))?;
        let count = args.count.unwrap_or(5).clamp(1, 10);

        debug!(query = %args.query, count, "web_search tool");

        let api_key = self
            .api_key
            .clone()
            .or_else(|| std::env::var("BRAVE_API_KEY").ok())
            .ok_or_else(|| {
                ToolError::Failed(
                    "no Brave Search API key configured; set BRAVE_API_KEY or \
                     tools.web.search.api_key"
                        .into(),
                )
            })?;

        brave_search(&args.query, count, &api_key)
            .await
            .map_err(|e| ToolError::Failed(format!("search error: {e}")))
    }
}

async fn brave_search(query: &str, count: usize, api_key: &str) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("quarry-agent/0.4")
        .build()
        .map_err(|e| e.to_string())?;

    let url = format!(
        "https://api.search.brave.com/res/v1/web/search?q={}&count={}",
        urlencode(query),
        count
    );

    let resp = client
        .get(&url)
        .header("Accept", "application/json")
        .header("Accept-Encoding", "gzip")
        .header("X-Subscription-Token", api_key)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !resp.status().is_success() {
        return Err(format!("Brave API returned status {}", resp.status()));
    }

    let json: Value = resp.json().await.map_err(|e| e.to_string())?;

    let results = json
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|r| r.as_array())
        .map(|arr| arr.as_slice())
        .unwrap_or(&[]);

    if results.is_empty() {
        return Ok("(no results)".to_string());
    }

    let mut output = Vec::new();
    for (i, r) in results.iter().enumerate().take(count) {
        let title = r
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("(no title)");
        let url = r.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let desc = r.get("description").and_then(|v| v.as_str()).unwrap_or("");
        output.push(format!("{}. **{}**\n   {}\n   {}", i + 1, title, url, desc));
    }

    Ok(output.join("\n\n"))
}

fn urlencode(s: &str) -> String {
    let mut encoded = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => encoded.push(c),
            ' ' => encoded.push('+'),
            c => {
                for byte in c.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    encoded
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
