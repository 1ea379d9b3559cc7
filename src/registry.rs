//! The in-memory job table and lifecycle entry points.
//!
//! The registry owns every job handle for the lifetime of the process (until
//! swept), spawns exactly one worker task per started job, and wires the
//! workers to the shared broadcaster, record store, and notification sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::instrument;

use crate::broadcaster::EventBroadcaster;
use crate::delay::{DelayPolicy, GammaDelay};
use crate::event::JobEvent;
use crate::job::runner::ReservationWorker;
use crate::job::{JobHandle, JobId, JobSpec, JobStatus, OwnerId, Snapshot};
use crate::provider::SessionProvider;
use crate::sink::{NewRecord, NotificationSink, RecordStore, SinkError};

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The record store rejected the initial append; the job is not created.
    #[error("failed to persist the job record: {0}")]
    Record(#[from] SinkError),
}

/// Creates, starts, observes, cancels, and sweeps jobs.
///
/// Cheap to clone via [`Arc`]; the serving layer typically holds one and
/// shares it with every request handler.
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Arc<JobHandle>>>,
    broadcaster: Arc<EventBroadcaster>,
    records: Arc<dyn RecordStore>,
    notifier: Arc<dyn NotificationSink>,
    delay: Arc<dyn DelayPolicy>,
}

impl JobRegistry {
    pub fn new(records: Arc<dyn RecordStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            jobs: Default::default(),
            broadcaster: Arc::new(EventBroadcaster::default()),
            records,
            notifier,
            delay: Arc::new(GammaDelay::default()),
        }
    }

    /// Replaces the inter-poll delay policy.
    pub fn with_delay_policy(self, delay: impl DelayPolicy + 'static) -> Self {
        Self {
            delay: Arc::new(delay),
            ..self
        }
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Registers a new job in `created` status and appends its persisted
    /// record. The job does not poll until [`start`](Self::start).
    #[instrument(skip_all, fields(owner = ?spec.owner, provider = %spec.provider))]
    pub async fn create(
        &self,
        spec: JobSpec,
        provider: Arc<dyn SessionProvider>,
    ) -> Result<JobId, RegistryError> {
        let id = JobId::new();
        self.records
            .append(NewRecord {
                id,
                owner: spec.owner,
                provider: spec.provider,
                criteria: spec.criteria.clone(),
                candidates: spec.candidates.clone(),
                status: JobStatus::Running,
            })
            .await?;

        let handle = Arc::new(JobHandle::new(id, spec, provider));
        self.jobs.lock().unwrap().insert(id, handle);
        tracing::info!(job_id = %id, "job created");
        Ok(id)
    }

    /// Starts the job's worker. At most one worker ever runs per job: a
    /// second call, or a call on a cancelled or finished job, is a no-op.
    pub fn start(&self, id: JobId) {
        let Some(handle) = self.handle(id) else {
            return;
        };
        if !handle.begin() {
            tracing::debug!(job_id = %id, "start ignored, job already started");
            return;
        }
        let worker = ReservationWorker::new(
            handle,
            Arc::clone(&self.delay),
            Arc::clone(&self.broadcaster),
            Arc::clone(&self.records),
            Arc::clone(&self.notifier),
        );
        tokio::spawn(worker.run());
    }

    /// Requests cancellation. Unknown ids and already-terminal jobs are
    /// no-ops; a job that never started is finalized directly, since no
    /// worker exists to observe the token.
    pub fn cancel(&self, id: JobId) {
        let Some(handle) = self.handle(id) else {
            return;
        };
        if handle.cancel_if_unstarted() {
            tracing::debug!(job_id = %id, "cancelled before start");
            self.broadcaster.publish(id, JobEvent::Cancelled);
            let records = Arc::clone(&self.records);
            let update = handle.terminal_update();
            tokio::spawn(async move {
                if let Err(error) = records.finalize(id, update).await {
                    tracing::error!(%error, job_id = %id, "failed to finalize job record");
                }
            });
            return;
        }
        // Running jobs finish through their worker; terminal jobs ignore the
        // token entirely.
        handle.cancel_token().cancel();
    }

    pub fn get(&self, id: JobId) -> Option<Snapshot> {
        self.handle(id).map(|handle| handle.snapshot())
    }

    /// Snapshots of the non-terminal jobs, optionally restricted to one
    /// owner.
    pub fn list(&self, owner: Option<OwnerId>) -> Vec<Snapshot> {
        self.snapshots(|snapshot| {
            !snapshot.status.is_terminal() && owner.map_or(true, |owner| snapshot.owner == owner)
        })
    }

    /// Snapshots of every job still in the table, terminal ones included.
    pub fn list_all(&self) -> Vec<Snapshot> {
        self.snapshots(|_| true)
    }

    /// Drops terminal jobs from the table, along with any subscriptions still
    /// attached to them. Returns how many were removed.
    pub fn sweep_terminal(&self) -> usize {
        let swept: Vec<JobId> = {
            let mut jobs = self.jobs.lock().unwrap();
            let terminal: Vec<JobId> = jobs
                .iter()
                .filter(|(_, handle)| handle.status().is_terminal())
                .map(|(id, _)| *id)
                .collect();
            for id in &terminal {
                jobs.remove(id);
            }
            terminal
        };
        for id in &swept {
            self.broadcaster.remove_job(*id);
        }
        if !swept.is_empty() {
            tracing::debug!(count = swept.len(), "swept terminal jobs");
        }
        swept.len()
    }

    fn handle(&self, id: JobId) -> Option<Arc<JobHandle>> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    fn snapshots(&self, keep: impl Fn(&Snapshot) -> bool) -> Vec<Snapshot> {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .map(|handle| handle.snapshot())
            .filter(keep)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;
    use crate::delay::FixedDelay;
    use crate::event::Frame;
    use crate::sink::{InMemoryRecordStore, NoopNotifier};
    use crate::testing::{criteria, offer, reservation, FakeProvider};

    struct Rig {
        registry: JobRegistry,
        records: Arc<InMemoryRecordStore>,
    }

    fn rig() -> Rig {
        let records = Arc::new(InMemoryRecordStore::default());
        let registry = JobRegistry::new(records.clone(), Arc::new(NoopNotifier))
            .with_delay_policy(FixedDelay(Duration::from_millis(1)));
        Rig { registry, records }
    }

    fn spec(owner: i64) -> JobSpec {
        JobSpec::builder()
            .owner(OwnerId::from(owner))
            .criteria(criteria())
            .candidates(vec![0])
            .build()
    }

    async fn wait_for_status(registry: &JobRegistry, id: JobId, status: JobStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if registry.get(id).map(|snapshot| snapshot.status) == Some(status) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("job never reached {status:?}"));
    }

    #[tokio::test]
    async fn create_then_start_runs_to_success() {
        let rig = rig();
        let provider = Arc::new(FakeProvider::default());
        provider.script_search(Ok(vec![offer("A", true, false, false)]));
        provider.script_reserve(Ok(reservation("A")));

        let id = rig.registry.create(spec(1), provider).await.unwrap();
        assert_eq!(rig.registry.get(id).unwrap().status, JobStatus::Created);
        assert!(rig.records.get(id).is_some());

        rig.registry.start(id);
        wait_for_status(&rig.registry, id, JobStatus::Success).await;

        let terminal = rig.records.get(id).unwrap().terminal.unwrap();
        assert_eq!(terminal.status, JobStatus::Success);
        assert_eq!(terminal.result.unwrap().train_number, "A");
    }

    #[tokio::test]
    async fn starting_twice_spawns_one_worker() {
        let rig = rig();
        let provider = Arc::new(FakeProvider::default());
        provider.script_search(Ok(vec![offer("A", true, false, false)]));
        provider.script_reserve(Ok(reservation("A")));

        let id = rig.registry.create(spec(1), provider.clone()).await.unwrap();
        rig.registry.start(id);
        rig.registry.start(id);
        wait_for_status(&rig.registry, id, JobStatus::Success).await;

        assert_eq!(provider.times_logged_in(), 1);
    }

    #[tokio::test]
    async fn unknown_ids_are_no_ops() {
        let rig = rig();
        let id = JobId::new();
        assert!(rig.registry.get(id).is_none());
        rig.registry.start(id);
        rig.registry.cancel(id);
    }

    #[tokio::test]
    async fn list_filters_by_owner_and_hides_terminal_jobs() {
        let rig = rig();
        let first = rig
            .registry
            .create(spec(1), Arc::new(FakeProvider::default()))
            .await
            .unwrap();
        let second = rig
            .registry
            .create(spec(2), Arc::new(FakeProvider::default()))
            .await
            .unwrap();

        assert_eq!(rig.registry.list(None).len(), 2);
        let mine = rig.registry.list(Some(OwnerId::from(1)));
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, first);

        rig.registry.cancel(second);
        wait_for_status(&rig.registry, second, JobStatus::Cancelled).await;
        assert_eq!(rig.registry.list(None).len(), 1);
        // The terminal job is still in the table until swept.
        assert_eq!(rig.registry.list_all().len(), 2);
    }

    #[tokio::test]
    async fn cancelling_a_job_that_never_started_finalizes_it() {
        let rig = rig();
        let id = rig
            .registry
            .create(spec(1), Arc::new(FakeProvider::default()))
            .await
            .unwrap();
        let (_, mut rx) = rig
            .registry
            .broadcaster()
            .subscribe(id, rig.registry.get(id).unwrap());

        rig.registry.cancel(id);
        assert_eq!(rig.registry.get(id).unwrap().status, JobStatus::Cancelled);

        assert_matches!(rx.recv().await.unwrap(), Frame::Snapshot(_));
        assert_matches!(rx.recv().await.unwrap(), Frame::Event(JobEvent::Cancelled));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if rig
                    .records
                    .get(id)
                    .is_some_and(|stored| stored.terminal.is_some())
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("record never finalized");
        let terminal = rig.records.get(id).unwrap().terminal.unwrap();
        assert_eq!(terminal.status, JobStatus::Cancelled);
        assert_eq!(terminal.attempts, 0);
    }

    #[tokio::test]
    async fn cancelling_a_running_job_goes_through_its_worker() {
        let rig = rig();
        let provider = Arc::new(FakeProvider::default());

        let id = rig.registry.create(spec(1), provider).await.unwrap();
        rig.registry.start(id);
        wait_for_status(&rig.registry, id, JobStatus::Running).await;

        rig.registry.cancel(id);
        wait_for_status(&rig.registry, id, JobStatus::Cancelled).await;
        let terminal = rig.records.get(id).unwrap().terminal.unwrap();
        assert_eq!(terminal.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_a_finished_job_changes_nothing() {
        let rig = rig();
        let provider = Arc::new(FakeProvider::default());
        provider.script_search(Ok(vec![offer("A", true, false, false)]));
        provider.script_reserve(Ok(reservation("A")));

        let id = rig.registry.create(spec(1), provider).await.unwrap();
        rig.registry.start(id);
        wait_for_status(&rig.registry, id, JobStatus::Success).await;

        rig.registry.cancel(id);
        assert_eq!(rig.registry.get(id).unwrap().status, JobStatus::Success);
    }

    #[tokio::test]
    async fn sweep_removes_terminal_jobs_and_their_subscriptions() {
        let rig = rig();
        let live = rig
            .registry
            .create(spec(1), Arc::new(FakeProvider::default()))
            .await
            .unwrap();
        let done = rig
            .registry
            .create(spec(1), Arc::new(FakeProvider::default()))
            .await
            .unwrap();
        let (_, _rx) = rig
            .registry
            .broadcaster()
            .subscribe(done, rig.registry.get(done).unwrap());

        rig.registry.cancel(done);
        assert_eq!(rig.registry.sweep_terminal(), 1);

        assert!(rig.registry.get(done).is_none());
        assert!(rig.registry.get(live).is_some());
        assert_eq!(rig.registry.broadcaster().subscriber_count(done), 0);
        // Idempotent.
        assert_eq!(rig.registry.sweep_terminal(), 0);
    }
}
