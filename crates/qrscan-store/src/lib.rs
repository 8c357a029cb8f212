// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// qrscan-store: Durable, append-only storage of classified QR records and the
// per-file history aggregate computed from them.

pub mod records;

pub use records::QrStore;
