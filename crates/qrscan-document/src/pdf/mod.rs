// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: opening documents and pulling raster images out of pages.

pub mod reader;

pub use reader::{LopdfExtractor, PdfReader};
