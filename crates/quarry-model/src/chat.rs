// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI-compatible `/chat/completions` client.
//!
//! One implementation covers every provider that speaks the standard wire
//! format.  Streaming parses SSE `data:` lines with a cross-packet line
//! buffer, because a single SSE event may be split across TCP chunks.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::{ChatRequest, DeltaStream, ModelError, Role};

/// Chat completion provider seam.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One-shot completion: the first choice's content, trimmed.
    async fn complete(&self, req: ChatRequest) -> Result<String, ModelError>;

    /// Streaming completion: a finite stream of content deltas.
    async fn stream(&self, req: ChatRequest) -> Result<DeltaStream, ModelError>;
}

pub struct OpenAiChatClient {
    chat_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiChatClient {
    /// `base_url` ends before `/chat/completions`, e.g. `http://host:8081/v1`.
    pub fn new(
        base_url: &str,
        model: String,
        api_key: Option<String>,
        request_timeout_secs: u64,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            chat_url: format!("{base}/chat/completions"),
            model,
            api_key,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(request_timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }

    fn body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": role_str(m.role),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": req.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "stream": stream,
        });
        if let Some(mt) = req.max_tokens {
            body["max_tokens"] = json!(mt);
        }
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, ModelError> {
        let mut http_req = self.client.post(&self.chat_url).json(body);
        if let Some(key) = &self.api_key {
            http_req = http_req.bearer_auth(key);
        }
        let resp = http_req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::refused(status, text));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, req: ChatRequest) -> Result<String, ModelError> {
        debug!(
            model = req.model.as_deref().unwrap_or(&self.model),
            message_count = req.messages.len(),
            "chat completion"
        );
        let body = self.body(&req, false);
        let resp = self.send(&body).await?;
        let v: Value = resp
            .json()
            .await
            .map_err(|e| ModelError::ProviderMalformed(format!("invalid JSON body: {e}")))?;

        let content = v["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| ModelError::ProviderMalformed("response has no choices".into()))?;
        Ok(content.trim().to_string())
    }

    async fn stream(&self, req: ChatRequest) -> Result<DeltaStream, ModelError> {
        debug!(
            model = req.model.as_deref().unwrap_or(&self.model),
            message_count = req.messages.len(),
            "streaming chat completion"
        );
        let body = self.body(&req, true);
        let resp = self.send(&body).await?;

        // SSE events can be split across multiple TCP packets.  Maintain a
        // line buffer across chunks; emit deltas only for complete lines.
        let byte_stream = resp.bytes_stream();
        let delta_stream = byte_stream
            .scan(String::new(), |buf, chunk| {
                let deltas: Vec<Result<String, ModelError>> = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(ModelError::ProviderUnavailable(e))],
                };
                std::future::ready(Some(deltas))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(delta_stream))
    }
}

fn role_str(r: Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Drain all complete `\n`-terminated SSE lines from `buf`.
///
/// Any trailing incomplete line is left in `buf` so it can be extended by
/// the next TCP chunk.
pub(crate) fn drain_complete_sse_lines(buf: &mut String) -> Vec<Result<String, ModelError>> {
    let mut deltas = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        // Strip the optional Windows-style \r before \n.
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(delta) = parse_sse_data_line(&line) {
            deltas.push(Ok(delta));
        }
    }
    deltas
}

/// Parse a single complete SSE `data:` line into a content delta.
///
/// Returns `None` for empty lines, comment lines, the `[DONE]` sentinel,
/// and chunks without a content delta (role announcements, usage).
fn parse_sse_data_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data: ")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let v: Value = serde_json::from_str(data).ok()?;
    let text = v["choices"][0]["delta"]["content"].as_str()?;
    if text.is_empty() {
        return None;
    }
    Some(text.to_string())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatMessage;

    #[test]
    fn body_uses_configured_model_by_default() {
        let c = OpenAiChatClient::new("http://x/v1", "default-model".into(), None, 180);
        let body = c.body(&ChatRequest::new(vec![ChatMessage::user("q")]), false);
        assert_eq!(body["model"], "default-model");
    }

    #[test]
    fn body_request_model_overrides_default() {
        let c = OpenAiChatClient::new("http://x/v1", "default-model".into(), None, 180);
        let req = ChatRequest::new(vec![]).with_model(Some("other".into()));
        let body = c.body(&req, false);
        assert_eq!(body["model"], "other");
    }

    #[test]
    fn body_omits_unset_sampling_params() {
        let c = OpenAiChatClient::new("http://x/v1", "m".into(), None, 180);
        let body = c.body(&ChatRequest::new(vec![]), false);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_normalised() {
        let c = OpenAiChatClient::new("http://x/v1/", "m".into(), None, 180);
        assert_eq!(c.chat_url, "http://x/v1/chat/completions");
    }

    // ── SSE line draining ─────────────────────────────────────────────────────

    fn delta_chunk(text: &str) -> String {
        format!(
            "data: {}\n",
            json!({"choices":[{"delta":{"content":text}}]})
        )
    }

    #[test]
    fn drains_single_complete_line() {
        let mut buf = delta_chunk("hello");
        let out = drain_complete_sse_lines(&mut buf);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn keeps_incomplete_tail_in_buffer() {
        let mut buf = String::from("data: {\"choices\":[{\"delta\":{\"conte");
        let out = drain_complete_sse_lines(&mut buf);
        assert!(out.is_empty());
        assert!(!buf.is_empty(), "partial line must stay buffered");
    }

    #[test]
    fn split_event_across_chunks_reassembles() {
        let full = delta_chunk("xyz");
        let (a, b) = full.split_at(10);
        let mut buf = a.to_string();
        assert!(drain_complete_sse_lines(&mut buf).is_empty());
        buf.push_str(b);
        let out = drain_complete_sse_lines(&mut buf);
        assert_eq!(out[0].as_ref().unwrap(), "xyz");
    }

    #[test]
    fn done_sentinel_produces_nothing() {
        let mut buf = String::from("data: [DONE]\n");
        assert!(drain_complete_sse_lines(&mut buf).is_empty());
    }

    #[test]
    fn crlf_line_endings_are_handled() {
        let mut buf = delta_chunk("win").replace('\n', "\r\n");
        let out = drain_complete_sse_lines(&mut buf);
        assert_eq!(out[0].as_ref().unwrap(), "win");
    }

    #[test]
    fn role_announcement_chunk_is_skipped() {
        let mut buf = format!(
            "data: {}\n",
            json!({"choices":[{"delta":{"role":"assistant"}}]})
        );
        assert!(drain_complete_sse_lines(&mut buf).is_empty());
    }
}
