//! Job identities, specifications, statuses, and snapshots.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::provider::{ProviderKind, Reservation, SeatPreference, SessionProvider};
use crate::sink::TerminalUpdate;

pub mod builder;
pub(crate) mod runner;

/// Opaque unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

/// Identifier of the application user owning a job.
///
/// The registry only carries this for filtering; ownership enforcement is the
/// caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(i64);

impl From<i64> for OwnerId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses are sticky: no further transition ever occurs.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

/// The fixed itinerary a job polls for. Validated upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub departure: String,
    pub arrival: String,
    /// `YYYYMMDD`
    pub date: String,
    /// `HHMMSS`, earliest acceptable departure
    pub time: String,
}

/// Passenger counts per fare category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerComposition {
    pub adults: u8,
    pub children: u8,
    pub seniors: u8,
    pub disability_1_to_3: u8,
    pub disability_4_to_6: u8,
}

impl Default for PassengerComposition {
    fn default() -> Self {
        Self::adults(1)
    }
}

impl PassengerComposition {
    pub fn adults(count: u8) -> Self {
        Self {
            adults: count,
            children: 0,
            seniors: 0,
            disability_1_to_3: 0,
            disability_4_to_6: 0,
        }
    }

    pub fn total(&self) -> u16 {
        u16::from(self.adults)
            + u16::from(self.children)
            + u16::from(self.seniors)
            + u16::from(self.disability_1_to_3)
            + u16::from(self.disability_4_to_6)
    }
}

/// Payment card reference used for auto-pay.
#[derive(Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub number: String,
    pub password: String,
    /// Birthday (6 digits) for personal cards, business number for corporate.
    pub birthday: String,
    pub expiry: String,
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Card numbers must not end up in logs.
        f.debug_struct("CardDetails")
            .field("number", &"****")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

/// Everything needed to create a job. Immutable once created.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub owner: OwnerId,
    pub provider: ProviderKind,
    pub criteria: SearchCriteria,
    /// Positions in the search result to try, in preference order. The first
    /// reservable candidate wins; this is not earliest-departure-wins.
    pub candidates: Vec<usize>,
    pub passengers: PassengerComposition,
    pub seat_preference: SeatPreference,
    pub auto_pay: bool,
    pub card: Option<CardDetails>,
}

impl JobSpec {
    pub fn builder() -> builder::JobSpecBuilder {
        Default::default()
    }
}

/// A point-in-time read-only projection of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: JobId,
    pub owner: OwnerId,
    pub provider: ProviderKind,
    #[serde(flatten)]
    pub criteria: SearchCriteria,
    pub status: JobStatus,
    pub attempts: u32,
    pub elapsed: f64,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    attempts: u32,
    started_at: Option<Instant>,
    result: Option<Reservation>,
}

/// The registry's record of one job: immutable spec plus lock-guarded mutable
/// state and the cooperative cancellation token.
///
/// All state transitions go through this type, which is what makes terminal
/// statuses sticky and snapshots consistent — a snapshot is taken under the
/// same lock every mutation takes.
pub(crate) struct JobHandle {
    pub(crate) id: JobId,
    pub(crate) spec: JobSpec,
    pub(crate) provider: Arc<dyn SessionProvider>,
    state: Mutex<JobState>,
    cancel: CancellationToken,
}

impl JobHandle {
    pub(crate) fn new(id: JobId, spec: JobSpec, provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            id,
            spec,
            provider,
            state: Mutex::new(JobState {
                status: JobStatus::Created,
                attempts: 0,
                started_at: None,
                result: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().unwrap();
        Snapshot {
            id: self.id,
            owner: self.spec.owner,
            provider: self.spec.provider,
            criteria: self.spec.criteria.clone(),
            status: state.status,
            attempts: state.attempts,
            elapsed: round_tenths(elapsed_of(&state)),
        }
    }

    pub(crate) fn status(&self) -> JobStatus {
        self.state.lock().unwrap().status
    }

    /// `Created -> Running`, recording the start instant. Returns `false` if
    /// the job was already started (or is terminal), in which case the caller
    /// must not spawn a worker: at most one execution context runs per job.
    pub(crate) fn begin(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.status != JobStatus::Created {
            return false;
        }
        state.status = JobStatus::Running;
        state.started_at = Some(Instant::now());
        true
    }

    /// Increments the attempt counter and returns the new value. The counter
    /// strictly increases and never resets.
    pub(crate) fn next_attempt(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        state.attempts
    }

    /// Transition into a terminal status. Returns `false` if the job is
    /// already terminal — terminal states are sticky and the caller must not
    /// emit a second terminal event.
    pub(crate) fn try_finish(&self, status: JobStatus, result: Option<Reservation>) -> bool {
        debug_assert!(status.is_terminal());
        let mut state = self.state.lock().unwrap();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        state.result = result;
        true
    }

    /// Cancel a job that was never started. Without a worker to observe the
    /// token there is nothing else to mark the job terminal.
    pub(crate) fn cancel_if_unstarted(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.status != JobStatus::Created {
            return false;
        }
        state.status = JobStatus::Cancelled;
        true
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn elapsed_seconds(&self) -> f64 {
        round_tenths(elapsed_of(&self.state.lock().unwrap()))
    }

    /// The terminal fields to persist, read atomically.
    pub(crate) fn terminal_update(&self) -> TerminalUpdate {
        let state = self.state.lock().unwrap();
        TerminalUpdate {
            status: state.status,
            attempts: state.attempts,
            elapsed_seconds: round_tenths(elapsed_of(&state)),
            result: state.result.clone(),
            finished_at: Utc::now(),
        }
    }
}

fn elapsed_of(state: &JobState) -> Duration {
    state
        .started_at
        .map(|started| started.elapsed())
        .unwrap_or(Duration::ZERO)
}

fn round_tenths(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 10.0).round() / 10.0
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::FakeProvider;

    fn new_handle() -> JobHandle {
        JobHandle::new(
            JobId::new(),
            JobSpec::builder().build(),
            Arc::new(FakeProvider::default()),
        )
    }

    #[test]
    fn begin_only_from_created() {
        let handle = new_handle();
        assert!(handle.begin());
        assert_eq!(handle.status(), JobStatus::Running);
        assert!(!handle.begin());
    }

    #[test]
    fn terminal_statuses_are_sticky() {
        let handle = new_handle();
        handle.begin();
        assert!(handle.try_finish(JobStatus::Success, None));
        assert!(!handle.try_finish(JobStatus::Cancelled, None));
        assert_eq!(handle.status(), JobStatus::Success);
    }

    #[test]
    fn attempts_strictly_increase() {
        let handle = new_handle();
        assert_eq!(handle.next_attempt(), 1);
        assert_eq!(handle.next_attempt(), 2);
        assert_eq!(handle.snapshot().attempts, 2);
    }

    #[test]
    fn cancel_if_unstarted_only_applies_to_created_jobs() {
        let handle = new_handle();
        assert!(handle.cancel_if_unstarted());
        assert_eq!(handle.status(), JobStatus::Cancelled);

        let handle = new_handle();
        handle.begin();
        assert!(!handle.cancel_if_unstarted());
        assert_eq!(handle.status(), JobStatus::Running);
    }

    #[test]
    fn card_debug_redacts_the_number() {
        let card = CardDetails {
            number: "1234567890123456".into(),
            password: "12".into(),
            birthday: "900101".into(),
            expiry: "2027-12".into(),
        };
        let debug = format!("{card:?}");
        assert!(!debug.contains("1234567890123456"));
        assert!(!debug.contains("900101"));
    }
}
