// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Model(#[from] quarry_model::ModelError),

    #[error(transparent)]
    Store(#[from] quarry_store::StoreError),

    /// The summarizer produced no usable keywords, or keywords that mark
    /// the input as an opaque blob.  Gate against ingesting binary data.
    #[error("unreadable content: summarizer produced no usable keywords")]
    UnreadableContent,
}
