//! Per-job fan-out of progress events to live observers.
//!
//! Workers hand events to the broadcaster through a plain synchronous call;
//! delivery to each observer goes through an unbounded channel sender, so the
//! worker never waits on a consumer. There is no history: a new subscriber
//! gets the job's current snapshot and nothing else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::mpsc;

use crate::event::{Frame, JobEvent};
use crate::job::{JobId, Snapshot};

/// Identifies one subscription for later [`EventBroadcaster::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

type Sink = mpsc::UnboundedSender<Frame>;

/// Multicasts a job's events to its current subscribers.
///
/// Failed sinks (receiver dropped) are pruned on the next delivery and never
/// retried; a job with no subscribers costs nothing and its events are
/// dropped silently.
#[derive(Debug, Default)]
pub struct EventBroadcaster {
    subscribers: RwLock<HashMap<JobId, Vec<(SubscriberId, Sink)>>>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    /// Registers a sink for `job_id` and immediately delivers the current
    /// snapshot — catch-up is snapshot-only, never event backfill.
    pub fn subscribe(
        &self,
        job_id: JobId,
        snapshot: Snapshot,
    ) -> (SubscriberId, mpsc::UnboundedReceiver<Frame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(Frame::Snapshot(snapshot));
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap()
            .entry(job_id)
            .or_default()
            .push((id, sender));
        (id, receiver)
    }

    /// Removes one sink; the job's entry is dropped entirely once its last
    /// sink goes.
    pub fn unsubscribe(&self, job_id: JobId, subscriber: SubscriberId) {
        let mut map = self.subscribers.write().unwrap();
        if let Some(sinks) = map.get_mut(&job_id) {
            sinks.retain(|(id, _)| *id != subscriber);
            if sinks.is_empty() {
                map.remove(&job_id);
            }
        }
    }

    /// Delivers `event` to every current sink for `job_id`.
    ///
    /// No subscribers means the event is dropped without error or buffering.
    /// A sink whose receiver has gone away is removed; the remaining sinks
    /// still get the event.
    pub fn publish(&self, job_id: JobId, event: JobEvent) {
        let mut map = self.subscribers.write().unwrap();
        let Some(sinks) = map.get_mut(&job_id) else {
            return;
        };
        sinks.retain(|(_, sink)| sink.send(Frame::Event(event.clone())).is_ok());
        if sinks.is_empty() {
            map.remove(&job_id);
        }
    }

    /// Drops every subscription for a job. Used when the registry sweeps the
    /// job out of its table.
    pub fn remove_job(&self, job_id: JobId) {
        self.subscribers.write().unwrap().remove(&job_id);
    }

    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        self.subscribers
            .read()
            .unwrap()
            .get(&job_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
