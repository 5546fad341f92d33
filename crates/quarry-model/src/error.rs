// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Failures against an external LLM or embedding endpoint.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Transport failure or timeout — the provider could not be reached.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status and a body.
    #[error("provider refused ({status}): {body}")]
    ProviderRefused {
        status: u16,
        body: String,
    },

    /// The response arrived but its shape was not what the wire format
    /// promises (missing choices, wrong embedding dimension, count
    /// mismatch).
    #[error("malformed provider response: {0}")]
    ProviderMalformed(String),
}

impl ModelError {
    /// Classify an HTTP response status + body into a refusal.
    pub fn refused(status: reqwest::StatusCode, body: String) -> Self {
        Self::ProviderRefused {
            status: status.as_u16(),
            body,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
