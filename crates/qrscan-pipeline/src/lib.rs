// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// qrscan-pipeline: Scan orchestration for qrscan.
//
// Walks a document's pages and images in order, classifies each image as a
// QR symbol (decoded, unreadable, or not QR-like), resolves duplicates within
// the run, persists one record per image, and broadcasts progress per session.

pub mod classifier;
pub mod context;
pub mod dedup;
pub mod follow;
pub mod orchestrator;
pub mod progress;

pub use classifier::{Classification, ImageClassifier, normalize_payload};
pub use context::RunContext;
pub use dedup::Deduplicator;
pub use follow::{FollowOutcome, follow};
pub use orchestrator::Orchestrator;
pub use progress::{EventHandle, ProgressTracker, Subscription};
