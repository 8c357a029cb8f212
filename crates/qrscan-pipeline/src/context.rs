// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mutable state carried through one `process_document` invocation.

use qrscan_core::types::SessionId;

use crate::dedup::Deduplicator;

/// Per-run state. Created when a run starts, dropped when it ends.
#[derive(Debug)]
pub struct RunContext {
    pub session_id: SessionId,
    /// SHA-256 of the submitted document, for log correlation.
    pub document_hash: String,
    pub dedup: Deduplicator,
    /// Records the store refused even after retrying.
    pub dropped_writes: usize,
    /// Records classified as QR-like so far.
    pub qr_like: usize,
}

impl RunContext {
    pub fn new(session_id: SessionId, document_hash: String) -> Self {
        Self {
            session_id,
            document_hash,
            dedup: Deduplicator::new(),
            dropped_writes: 0,
            qr_like: 0,
        }
    }

    /// Message reported with the terminal `done` update.
    pub fn completion_message(&self) -> String {
        let mut message = format!("Finished processing. Found {} QR codes", self.qr_like);
        if self.dropped_writes > 0 {
            message.push_str(&format!(" ({} records not saved)", self.dropped_writes));
        }
        message
    }
}
