// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-session progress state machine with publish/subscribe fan-out.
//
// Snapshots and broadcast senders live in two maps keyed by session id. A
// sender is created by the first subscriber and pruned once the last
// subscriber is gone and no snapshot remains. Updates never block: with no
// subscribers the event is simply dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use qrscan_core::types::{ProcessingSession, ProgressStatus, QrRecord, RecordEvent, ScanEvent, SessionId};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Process-wide registry of processing sessions.
pub struct ProgressTracker {
    sessions: Mutex<HashMap<SessionId, ProcessingSession>>,
    channels: Mutex<HashMap<SessionId, broadcast::Sender<ScanEvent>>>,
    capacity: usize,
}

/// Lock without propagating poison: the maps hold plain data that stays
/// consistent across a panicking holder.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProgressTracker {
    /// `capacity` bounds each session's broadcast buffer.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Upsert the snapshot for `id` and broadcast it to current subscribers.
    pub fn update(&self, id: &SessionId, progress: u8, status: ProgressStatus, message: impl Into<String>) {
        let now = Utc::now();
        let message = message.into();
        let event = {
            let mut sessions = lock(&self.sessions);
            let session = sessions
                .entry(id.clone())
                .or_insert_with(|| ProcessingSession {
                    file_name: id.clone(),
                    progress: 0,
                    status,
                    message: String::new(),
                    created_at: now,
                    updated_at: now,
                });
            session.progress = progress.min(100);
            session.status = status;
            session.message = message;
            session.updated_at = now;
            session.to_event()
        };

        debug!(session = %id, progress = event.progress, status = %event.status, "progress updated");
        self.broadcast(id, ScanEvent::Progress(event));
    }

    /// Announce a freshly classified record to subscribers of its session.
    pub fn publish_record(&self, record: &QrRecord) {
        self.broadcast(&record.file_name, ScanEvent::Record(RecordEvent::from(record)));
    }

    /// Current snapshot, or the `unknown` sentinel.
    pub fn get(&self, id: &SessionId) -> ProcessingSession {
        lock(&self.sessions)
            .get(id)
            .cloned()
            .unwrap_or_else(|| ProcessingSession::unknown(id.clone()))
    }

    /// Every live snapshot, oldest first.
    pub fn snapshot_all(&self) -> Vec<ProcessingSession> {
        let mut all: Vec<_> = lock(&self.sessions).values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.file_name.cmp(&b.file_name)));
        all
    }

    /// Receive every event published for `id` from now on.
    pub fn subscribe(self: &Arc<Self>, id: &SessionId) -> Subscription {
        let receiver = lock(&self.channels)
            .entry(id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        trace!(session = %id, "subscriber attached");
        Subscription {
            id: id.clone(),
            receiver: Some(receiver),
            tracker: Arc::downgrade(self),
        }
    }

    /// Deliver events for `id` to `callback` on a background task until the
    /// returned handle is unsubscribed or dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_event<F>(self: &Arc<Self>, id: &SessionId, mut callback: F) -> EventHandle
    where
        F: FnMut(ScanEvent) + Send + 'static,
    {
        let mut subscription = self.subscribe(id);
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                callback(event);
            }
        });
        EventHandle { task }
    }

    /// Drop the snapshot for `id` after `grace`, provided it is terminal by
    /// then.
    ///
    /// Uses the current Tokio runtime when there is one and a plain thread
    /// otherwise.
    pub fn schedule_removal(self: &Arc<Self>, id: &SessionId, grace: Duration) {
        let tracker = Arc::downgrade(self);
        let id = id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Some(tracker) = tracker.upgrade() {
                        tracker.remove_if_terminal(&id);
                    }
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(grace);
                    if let Some(tracker) = tracker.upgrade() {
                        tracker.remove_if_terminal(&id);
                    }
                });
            }
        }
    }

    /// Number of live receivers for `id`.
    pub fn subscriber_count(&self, id: &SessionId) -> usize {
        lock(&self.channels)
            .get(id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn broadcast(&self, id: &SessionId, event: ScanEvent) {
        let channels = lock(&self.channels);
        match channels.get(id) {
            Some(tx) => {
                if tx.send(event).is_err() {
                    trace!(session = %id, "no receivers, event dropped");
                }
            }
            None => trace!(session = %id, "no subscribers, event dropped"),
        }
    }

    fn remove_if_terminal(&self, id: &SessionId) {
        let removed = {
            let mut sessions = lock(&self.sessions);
            let terminal = sessions.get(id).is_some_and(|s| s.status.is_terminal());
            if terminal {
                sessions.remove(id);
            }
            terminal
        };
        if removed {
            debug!(session = %id, "session snapshot expired");
            self.prune(id);
        }
    }

    /// Remove the sender for `id` if nobody listens and no snapshot remains.
    fn prune(&self, id: &SessionId) {
        let has_snapshot = lock(&self.sessions).contains_key(id);
        if has_snapshot {
            return;
        }
        let mut channels = lock(&self.channels);
        if channels.get(id).is_some_and(|tx| tx.receiver_count() == 0) {
            channels.remove(id);
            trace!(session = %id, "channel pruned");
        }
    }

    #[cfg(test)]
    fn has_channel(&self, id: &SessionId) -> bool {
        lock(&self.channels).contains_key(id)
    }
}

/// A live subscription to one session's events. Dropping it releases the
/// underlying receiver.
pub struct Subscription {
    id: SessionId,
    receiver: Option<broadcast::Receiver<ScanEvent>>,
    tracker: Weak<ProgressTracker>,
}

impl Subscription {
    /// Next event, surfacing lag and closure to the caller.
    pub async fn recv(&mut self) -> Result<ScanEvent, RecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => Err(RecvError::Closed),
        }
    }

    /// Next event, skipping over anything lost to lag. `None` once the
    /// channel is closed.
    pub async fn next(&mut self) -> Option<ScanEvent> {
        loop {
            match self.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session = %self.id, skipped, "subscriber lagged, events lost");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.receiver.take());
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.prune(&self.id);
        }
    }
}

/// Handle for a callback registered with [`ProgressTracker::on_event`].
pub struct EventHandle {
    task: JoinHandle<()>,
}

impl EventHandle {
    /// Stop delivery.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
