// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or query failure against the vector database.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}
