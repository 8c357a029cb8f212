// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Port traits for the collaborators the pipeline drives: page-image
// extraction, raster encoding, barcode decoding, and record storage.
//
// Concrete implementations live in `qrscan-document` (lopdf, image, rqrr) and
// `qrscan-store` (SQLite). Tests substitute in-memory fakes.

use crate::error::Result;
use crate::types::{HistorySummary, QrRecord, RawImage};

/// Opens a document and hands out its pages.
pub trait PageImageExtractor: Send + Sync {
    /// Parse `bytes` into a page source. Failure here is fatal for the run.
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PageSource>>;
}

/// An opened document.
pub trait PageSource: Send {
    fn page_count(&self) -> u32;

    /// Images on `page` (1-indexed) in document order.
    ///
    /// The outer error means the page itself could not be enumerated. Each
    /// inner error stands for one image that exists but could not be turned
    /// into a raster; it still counts as an encountered image.
    fn page_images(&self, page: u32) -> Result<Vec<Result<RawImage>>>;
}

/// Turns a raster into a compressed, displayable encoding.
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, image: &RawImage) -> Result<Vec<u8>>;

    /// MIME type of the bytes `encode` produces.
    fn mime_type(&self) -> &'static str;
}

/// Attempts to read a 2D barcode payload from an RGBA8 buffer.
pub trait BarcodeDecoder: Send + Sync {
    /// `None` when no symbol could be decoded. Never an error.
    fn decode(&self, rgba: &[u8], width: u32, height: u32) -> Option<String>;
}

/// Durable, append-only record storage.
pub trait RecordStore: Send + Sync {
    fn append(&self, record: &QrRecord) -> Result<()>;

    /// Records for one file in insertion order.
    fn records_for_file(&self, file_name: &str) -> Result<Vec<QrRecord>>;

    /// One summary per file, most recently processed first.
    fn history(&self) -> Result<Vec<HistorySummary>>;
}
