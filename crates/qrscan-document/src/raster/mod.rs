// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster module: raw pixel normalization and PNG / data URI encoding.

pub mod convert;
pub mod encoder;

pub use convert::to_rgba;
pub use encoder::{PngEncoder, to_data_uri};
