// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// qrscan-document: Document-side adapters for the scanning pipeline.
//
// Provides PDF page/image extraction (lopdf), raster conversion and PNG
// encoding (image + base64), QR payload decoding (rqrr), and document
// fingerprinting (sha2).

pub mod decode;
pub mod integrity;
pub mod pdf;
pub mod raster;

// Re-export the primary structs so callers can use `qrscan_document::PdfReader` etc.
pub use decode::RqrrDecoder;
pub use integrity::hash_bytes;
pub use pdf::reader::{LopdfExtractor, PdfReader};
pub use raster::{PngEncoder, to_data_uri, to_rgba};
