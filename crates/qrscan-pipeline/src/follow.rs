// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Consumer side of the progress stream: follow one session until it reaches a
// terminal status, covering subscription races and ids that never appear.

use std::sync::Arc;

use chrono::Utc;
use qrscan_core::ScanConfig;
use qrscan_core::types::{ProcessingSession, ProgressEvent, ProgressStatus, ScanEvent, SessionId};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::progress::ProgressTracker;

/// How a [`follow`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Done,
    Error,
    /// The id never showed up within the follow timeout.
    Timeout,
    /// The tracker went away mid-stream.
    Closed,
}

fn outcome_for(status: ProgressStatus) -> Option<FollowOutcome> {
    match status {
        ProgressStatus::Done => Some(FollowOutcome::Done),
        ProgressStatus::Error => Some(FollowOutcome::Error),
        ProgressStatus::Timeout => Some(FollowOutcome::Timeout),
        ProgressStatus::Processing | ProgressStatus::Unknown => None,
    }
}

/// Stream every event for `id` into `on_event` until a terminal status.
///
/// Subscribes before reading the snapshot so nothing published in between is
/// missed. A known snapshot is emitted first, which also covers callers that
/// arrive after the run finished but within the grace period; progress events
/// already reflected in an emitted snapshot are not forwarded again. An
/// unknown id is polled every `poll_interval` until `follow_timeout`, after
/// which a synthetic `timeout` event is emitted.
pub async fn follow<F>(
    tracker: &Arc<ProgressTracker>,
    id: &SessionId,
    config: &ScanConfig,
    on_event: F,
) -> FollowOutcome
where
    F: FnMut(&ScanEvent),
{
    let mut subscription = tracker.subscribe(id);
    let mut emitter = Emitter::new(on_event);

    if let Some(outcome) = emitter.snapshot(&tracker.get(id)) {
        return outcome;
    }

    let deadline = Instant::now() + config.follow_timeout();
    let mut poll = tokio::time::interval(config.poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and the snapshot was just read.
    poll.tick().await;

    loop {
        tokio::select! {
            received = subscription.recv() => match received {
                Ok(event) => {
                    if let Some(outcome) = emitter.event(&event) {
                        return outcome;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session = %id, skipped, "follower lagged, re-reading snapshot");
                    if let Some(outcome) = emitter.snapshot(&tracker.get(id)) {
                        return outcome;
                    }
                }
                Err(RecvError::Closed) => return FollowOutcome::Closed,
            },
            _ = poll.tick(), if !emitter.known => {
                debug!(session = %id, "polling for session");
                if let Some(outcome) = emitter.snapshot(&tracker.get(id)) {
                    return outcome;
                }
            }
            _ = tokio::time::sleep_until(deadline), if !emitter.known => {
                if let Some(outcome) = emitter.snapshot(&tracker.get(id)) {
                    return outcome;
                }
                if !emitter.known {
                    warn!(session = %id, "session never appeared, giving up");
                    return emitter.timed_out(id);
                }
            }
        }
    }
}

/// Forwards events to the caller. A progress event older than the last one
/// forwarded, or identical to it, is already covered (typically by the
/// snapshot read right after subscribing) and is dropped. Terminal events
/// always go through.
struct Emitter<F> {
    on_event: F,
    known: bool,
    last_progress: Option<ProgressEvent>,
}

impl<F> Emitter<F>
where
    F: FnMut(&ScanEvent),
{
    fn new(on_event: F) -> Self {
        Self {
            on_event,
            known: false,
            last_progress: None,
        }
    }

    /// Emit `snapshot` when the tracker knows the session. Returns the
    /// outcome if that snapshot is terminal.
    fn snapshot(&mut self, snapshot: &ProcessingSession) -> Option<FollowOutcome> {
        if snapshot.status == ProgressStatus::Unknown {
            return None;
        }
        self.event(&ScanEvent::Progress(snapshot.to_event()))
    }

    /// Forward a live event. Returns the outcome if it is a terminal
    /// progress update.
    fn event(&mut self, event: &ScanEvent) -> Option<FollowOutcome> {
        self.known = true;
        let status = match event {
            ScanEvent::Progress(progress) => {
                let covered = self
                    .last_progress
                    .as_ref()
                    .is_some_and(|last| progress.timestamp < last.timestamp || progress == last);
                if covered && !progress.status.is_terminal() {
                    trace!(session = %progress.file_name, "progress already emitted");
                    return None;
                }
                self.last_progress = Some(progress.clone());
                Some(progress.status)
            }
            ScanEvent::Record(_) => None,
        };
        (self.on_event)(event);
        status.and_then(outcome_for)
    }

    fn timed_out(&mut self, id: &SessionId) -> FollowOutcome {
        (self.on_event)(&ScanEvent::Progress(ProgressEvent {
            file_name: id.clone(),
            progress: 0,
            status: ProgressStatus::Timeout,
            message: "No progress detected. The file may not be processing.".to_owned(),
            timestamp: Utc::now(),
        }));
        FollowOutcome::Timeout
    }
}
