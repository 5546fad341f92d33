// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Argument normalization for MCP dispatch.
//!
//! Models produce almost-JSON: fenced, prefixed with prose, with
//! sandbox-relative paths.  These helpers recover a usable argument
//! object before the call goes over the wire:
//!
//! 1. widest balanced `{…}` extraction when the raw string fails to parse
//! 2. sandbox-prefix → host-prefix rewriting in every string value
//! 3. `host_path` → `path` aliasing
//! 4. bare-URL wrapping for `web_content`-style tools

use serde_json::{json, Value};

use crate::ToolError;

/// Extract the widest balanced `{…}` slice of `input`, if any.
///
/// Brace counting ignores braces inside JSON strings so that payloads
/// like `{"code":"if x { }"}` survive.
pub fn extract_braced(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let bytes = input.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    // Keep scanning: a later balanced close widens the slice
                    // only through another top-level object, so stop here.
                    break;
                }
            }
            _ => {}
        }
    }
    end.map(|e| &input[start..=e])
}

/// Replace `sandbox_prefix` with `host_prefix` in every string value of
/// the JSON tree, in place.
pub fn rewrite_paths(value: &mut Value, sandbox_prefix: &str, host_prefix: &str) {
    match value {
        Value::String(s) => {
            if s.contains(sandbox_prefix) {
                *s = s.replace(sandbox_prefix, host_prefix);
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_paths(item, sandbox_prefix, host_prefix);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                rewrite_paths(item, sandbox_prefix, host_prefix);
            }
        }
        _ => {}
    }
}

/// Normalize a raw `Action Input` string into MCP call arguments.
///
/// `tool` is the unqualified tool name on the target server; it selects
/// the `web_content` URL-wrapping special case.
pub fn normalize_mcp_args(
    input: &str,
    tool: &str,
    sandbox_prefix: &str,
    host_prefix: &str,
) -> Result<Value, ToolError> {
    let trimmed = input.trim();

    let mut value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => match extract_braced(trimmed).and_then(|s| serde_json::from_str(s).ok()) {
            Some(v) => v,
            None => {
                // Bare URL convenience for the well-known content fetcher.
                if tool == "web_content" && looks_like_url(trimmed) {
                    json!({ "urls": [trimmed] })
                } else {
                    return Err(ToolError::ArgumentInvalid(format!(
                        "not valid JSON (even after brace extraction): {trimmed:.80}"
                    )));
                }
            }
        },
    };

    // A JSON string that is itself a bare URL gets the same wrapping.
    if tool == "web_content" {
        if let Value::String(s) = &value {
            if looks_like_url(s) {
                value = json!({ "urls": [s] });
            }
        }
    }

    rewrite_paths(&mut value, sandbox_prefix, host_prefix);

    // Tools downstream expect `path`; stage_path reports `host_path`.
    if let Value::Object(map) = &mut value {
        if map.contains_key("host_path") && !map.contains_key("path") {
            let host_path = map["host_path"].clone();
            map.insert("path".into(), host_path);
        }
    }

    Ok(value)
}

fn looks_like_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
