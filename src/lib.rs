//! A polling reservation scheduler.
//!
//! `seatwatch` automates ticket-reservation polling against a remote rail
//! provider: given a fixed itinerary and a ranked list of candidate trains, a
//! job repeatedly searches for availability, reserves the first candidate
//! that opens up, optionally pays for it, and streams live progress to any
//! number of observers while writing a terminal record.
//!
//! The crate is built around four pieces:
//!
//! - [`registry::JobRegistry`] — creates, starts, cancels, and queries jobs;
//!   the sole entry point into the scheduler.
//! - [`job::runner`] (internal) — the per-job poll/reserve/retry state
//!   machine, one tokio task per running job.
//! - [`broadcaster::EventBroadcaster`] — per-job fan-out of progress events
//!   to live observer sinks, with snapshot-only catch-up.
//! - [`provider::SessionProvider`] — the capability abstraction for the
//!   remote service (login/search/reserve/pay), implemented outside this
//!   crate.
//!
//! Persistence and outbound notifications are likewise behind traits
//! ([`sink::RecordStore`], [`sink::NotificationSink`]); the scheduler never
//! blocks on either.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use seatwatch::prelude::*;
//! # use seatwatch::sink::{InMemoryRecordStore, NoopNotifier};
//! # async fn example(provider: Arc<dyn SessionProvider>) {
//! let registry = JobRegistry::new(
//!     Arc::new(InMemoryRecordStore::default()),
//!     Arc::new(NoopNotifier),
//! );
//!
//! let spec = JobSpec::builder()
//!     .owner(OwnerId::from(1))
//!     .provider(ProviderKind::Srt)
//!     .criteria(SearchCriteria {
//!         departure: "수서".into(),
//!         arrival: "부산".into(),
//!         date: "20260301".into(),
//!         time: "080000".into(),
//!     })
//!     .candidates(vec![0, 2])
//!     .seat_preference(SeatPreference::GeneralFirst)
//!     .build();
//!
//! let id = registry.create(spec, provider).await.unwrap();
//! registry.start(id);
//! # }
//! ```

pub mod broadcaster;
pub mod delay;
pub mod event;
pub mod job;
pub mod prelude;
pub mod progress;
pub mod provider;
pub mod registry;
pub mod sink;
pub mod testing;

pub use registry::JobRegistry;
