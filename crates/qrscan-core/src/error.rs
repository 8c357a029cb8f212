// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for qrscan.

use thiserror::Error;

/// Top-level error type for all qrscan operations.
#[derive(Debug, Error)]
pub enum QrScanError {
    // -- Document errors --
    #[error("failed to open document: {0}")]
    DocumentOpen(String),

    #[error("failed to read images on page {page}: {reason}")]
    PageExtraction { page: u32, reason: String },

    #[error("unsupported image: {0}")]
    UnsupportedImage(String),

    #[error("image processing failed: {0}")]
    ImageProcessing(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Runtime --
    #[error("processing task failed: {0}")]
    Worker(String),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QrScanError>;
