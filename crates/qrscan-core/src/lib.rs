// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// qrscan: Core types, error definitions, configuration, and the port traits
// implemented by the document and store crates.

pub mod config;
pub mod error;
pub mod ports;
pub mod types;

pub use config::ScanConfig;
pub use error::QrScanError;
pub use types::*;
