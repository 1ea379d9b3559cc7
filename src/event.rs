//! Progress events and observer wire frames.
//!
//! Events are transient: they are fanned out to whoever is subscribed at the
//! moment of emission and never stored beyond the job's latest snapshot.

use serde::{Deserialize, Serialize};

use crate::job::Snapshot;
use crate::provider::Reservation;

/// One progress event emitted by a job's worker.
///
/// Serialized with a `"type"` tag, e.g.
/// `{"type":"tick","attempts":3,"elapsed":4.1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A poll cycle completed without a reservation.
    Tick { attempts: u32, elapsed: f64 },
    /// A mid-loop re-login succeeded.
    Relogin,
    /// A non-fatal (or, for `authentication` at start, fatal) error.
    Error {
        category: ErrorCategory,
        message: String,
    },
    /// The job reserved a seat. Terminal.
    Success {
        reservation: Reservation,
        attempts: u32,
        elapsed: f64,
    },
    /// The job observed its cancellation flag. Terminal.
    Cancelled,
}

/// Coarse error classification surfaced to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    AntiAutomation,
    Session,
    Payment,
    Connection,
    Provider,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Authentication => "authentication",
            Self::AntiAutomation => "anti_automation",
            Self::Session => "session",
            Self::Payment => "payment",
            Self::Connection => "connection",
            Self::Provider => "provider",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// A server→observer frame on the live progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// Catch-up state, sent once on subscribe.
    Snapshot(Snapshot),
    Event(JobEvent),
    /// Answer to a liveness ping.
    Pong,
}
