//! External collaborators: persisted records and success notifications.
//!
//! Both sit behind traits so the scheduler can be exercised without a
//! database or a chat transport. The worker writes a record exactly twice per
//! job (append on creation, finalize on the terminal event) and fires the
//! success notification without ever waiting on it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{JobId, JobStatus, OwnerId, SearchCriteria};
use crate::provider::{ProviderKind, Reservation};

/// Failure reported by a record store or notification sink.
///
/// The scheduler logs these and moves on; no sink failure ever changes a
/// job's outcome.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// The initial persisted record, appended when a job is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub id: JobId,
    pub owner: OwnerId,
    pub provider: ProviderKind,
    pub criteria: SearchCriteria,
    pub candidates: Vec<usize>,
    pub status: JobStatus,
}

/// The terminal fields written once the job finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalUpdate {
    pub status: JobStatus,
    pub attempts: u32,
    pub elapsed_seconds: f64,
    pub result: Option<Reservation>,
    pub finished_at: DateTime<Utc>,
}

/// Durable storage for job records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn append(&self, record: NewRecord) -> Result<(), SinkError>;

    async fn finalize(&self, id: JobId, update: TerminalUpdate) -> Result<(), SinkError>;
}

/// Outbound "reservation succeeded" message. Fire-and-forget: the worker
/// spawns the call and swallows any failure.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_success(&self, reservation: Reservation) -> Result<(), SinkError>;
}

/// A stored record plus its terminal fields once written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub record: NewRecord,
    pub terminal: Option<TerminalUpdate>,
}

/// An in-memory [`RecordStore`].
///
/// A correct but unoptimized implementation, primarily for tests and small
/// single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<JobId, StoredRecord>>,
}

impl InMemoryRecordStore {
    pub fn get(&self, id: JobId) -> Option<StoredRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn append(&self, record: NewRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().insert(
            record.id,
            StoredRecord {
                record,
                terminal: None,
            },
        );
        Ok(())
    }

    async fn finalize(&self, id: JobId, update: TerminalUpdate) -> Result<(), SinkError> {
        let mut records = self.records.lock().unwrap();
        let stored = records
            .get_mut(&id)
            .ok_or_else(|| SinkError(format!("no record for {id}")))?;
        stored.terminal = Some(update);
        Ok(())
    }
}

/// A [`NotificationSink`] that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn notify_success(&self, _reservation: Reservation) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::reservation;

    fn record(id: JobId) -> NewRecord {
        NewRecord {
            id,
            owner: OwnerId::from(1),
            provider: ProviderKind::Srt,
            criteria: SearchCriteria {
                departure: "수서".into(),
                arrival: "부산".into(),
                date: "20260301".into(),
                time: "080000".into(),
            },
            candidates: vec![0],
            status: JobStatus::Running,
        }
    }

    #[tokio::test]
    async fn append_then_finalize_round_trip() {
        let store = InMemoryRecordStore::default();
        let id = JobId::new();
        store.append(record(id)).await.unwrap();

        let stored = store.get(id).unwrap();
        assert_eq!(stored.record.status, JobStatus::Running);
        assert!(stored.terminal.is_none());

        store
            .finalize(
                id,
                TerminalUpdate {
                    status: JobStatus::Success,
                    attempts: 4,
                    elapsed_seconds: 5.5,
                    result: Some(reservation("101")),
                    finished_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let terminal = store.get(id).unwrap().terminal.unwrap();
        assert_eq!(terminal.status, JobStatus::Success);
        assert_eq!(terminal.attempts, 4);
    }

    #[tokio::test]
    async fn finalizing_an_unknown_job_fails() {
        let store = InMemoryRecordStore::default();
        let result = store
            .finalize(
                JobId::new(),
                TerminalUpdate {
                    status: JobStatus::Cancelled,
                    attempts: 0,
                    elapsed_seconds: 0.0,
                    result: None,
                    finished_at: Utc::now(),
                },
            )
            .await;
        assert!(result.is_err());
    }
}
