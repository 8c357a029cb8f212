// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-run duplicate resolution.

use std::collections::HashSet;

use qrscan_core::types::QrStatus;

/// Normalized payloads seen so far in one run.
///
/// Lives on the worker's stack for the duration of a single document and is
/// dropped with it, so duplicates are never resolved across documents.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Valid` the first time `value` is seen, `Duplicate` afterwards.
    pub fn resolve(&mut self, value: &str) -> QrStatus {
        if self.seen.insert(value.to_owned()) {
            QrStatus::Valid
        } else {
            QrStatus::Duplicate
        }
    }

    pub fn distinct(&self) -> usize {
        self.seen.len()
    }
}
