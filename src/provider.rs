//! The session-provider contract.
//!
//! A [`SessionProvider`] is the per-provider capability a job polls against:
//! login, search, reserve, pay. Implementations live outside this crate (they
//! speak the actual provider protocol); the scheduler only relies on the
//! structured [`ProviderError`] categories to decide whether to keep
//! retrying, surface an error event, or give up.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{CardDetails, PassengerComposition, SearchCriteria};

/// The remote rail services a job can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderKind {
    Srt,
    Ktx,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Srt => write!(f, "SRT"),
            Self::Ktx => write!(f, "KTX"),
        }
    }
}

/// One row of a search result.
///
/// Candidate indices in a [`crate::job::JobSpec`] refer to positions in the
/// `Vec<TrainOffer>` returned by [`SessionProvider::search`]; the ordering is
/// provider-specific and the scheduler never reorders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOffer {
    pub train_name: String,
    pub train_number: String,
    pub dep_station: String,
    pub arr_station: String,
    pub dep_date: String,
    pub dep_time: String,
    pub arr_time: String,
    pub general_available: bool,
    pub special_available: bool,
    pub standby_available: bool,
}

impl TrainOffer {
    /// Whether any seat class is open outright.
    pub fn any_seat_available(&self) -> bool {
        self.general_available || self.special_available
    }
}

/// Which seat classes (and waiting-list states) count as reservable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatPreference {
    GeneralFirst,
    GeneralOnly,
    SpecialFirst,
    SpecialOnly,
}

impl SeatPreference {
    /// The seat-availability policy.
    ///
    /// When no seat of any class is open, a standby/waiting slot counts as
    /// available regardless of the preferred class. Otherwise the `*First`
    /// preferences accept any open seat and the `*Only` preferences accept
    /// only their own class.
    pub fn accepts(&self, offer: &TrainOffer) -> bool {
        if !offer.any_seat_available() {
            return offer.standby_available;
        }
        match self {
            Self::GeneralFirst | Self::SpecialFirst => offer.any_seat_available(),
            Self::GeneralOnly => offer.general_available,
            Self::SpecialOnly => offer.special_available,
        }
    }
}

/// A confirmed reservation, as handed back by [`SessionProvider::reserve`].
///
/// This is the terminal result payload: it is serialized into the `success`
/// event and into the persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_number: String,
    pub train_name: String,
    pub train_number: String,
    pub dep_station: String,
    pub arr_station: String,
    pub dep_date: String,
    pub dep_time: String,
    pub arr_time: String,
    pub total_cost: u32,
    pub paid: bool,
}

/// Structured failure categories for provider calls.
///
/// The scheduler classifies on these variants alone; provider implementations
/// are responsible for mapping whatever the remote service reports (status
/// codes, localized message text) into the right category.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials rejected. Fatal when raised by the initial login,
    /// retried with a re-login when raised mid-loop.
    #[error("authentication rejected: {0}")]
    Authentication(String),
    /// An anti-automation gate (queueing/captcha layer) refused the request.
    #[error("anti-automation gate rejected the request: {0}")]
    AntiAutomation(String),
    /// The logged-in session is no longer valid.
    #[error("session no longer valid: {0}")]
    SessionExpired(String),
    /// Provider-reported recoverable unavailability: sold out, high demand,
    /// booking window closed. Expected while polling, absorbed silently.
    #[error("no inventory: {0}")]
    Unavailable(String),
    /// Any other provider-reported rejection.
    #[error("provider rejected the request: {0}")]
    Provider(String),
    #[error("connection failed: {0}")]
    Connectivity(String),
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("payment failed: {0}")]
    Payment(String),
    #[error("{0}")]
    Other(String),
}

/// Per-provider session capability: login, search, reserve, pay.
///
/// All methods may take arbitrarily long (they talk to an unreliable remote
/// service) and may fail with any [`ProviderError`]; no other error shape is
/// expected by the scheduler. Implementations must be safe to share across
/// the job's worker task and the request-serving layer.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn login(&self) -> Result<(), ProviderError>;

    async fn search(
        &self,
        criteria: &SearchCriteria,
        passengers: &PassengerComposition,
    ) -> Result<Vec<TrainOffer>, ProviderError>;

    async fn reserve(
        &self,
        offer: &TrainOffer,
        passengers: &PassengerComposition,
        preference: SeatPreference,
    ) -> Result<Reservation, ProviderError>;

    async fn pay(
        &self,
        reservation: &Reservation,
        card: &CardDetails,
    ) -> Result<(), ProviderError>;

    /// Reset any provider-side queued state after an anti-automation
    /// rejection. Providers without such a gate keep the default no-op.
    async fn clear_queue(&self) {}
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::offer;

    fn sold_out() -> TrainOffer {
        offer("101", false, false, false)
    }

    #[test]
    fn open_seats_match_preference_class() {
        let general_only = offer("101", true, false, false);
        let special_only = offer("101", false, true, false);

        assert!(SeatPreference::GeneralFirst.accepts(&general_only));
        assert!(SeatPreference::GeneralFirst.accepts(&special_only));
        assert!(SeatPreference::SpecialFirst.accepts(&general_only));

        assert!(SeatPreference::GeneralOnly.accepts(&general_only));
        assert!(!SeatPreference::GeneralOnly.accepts(&special_only));

        assert!(SeatPreference::SpecialOnly.accepts(&special_only));
        assert!(!SeatPreference::SpecialOnly.accepts(&general_only));
    }

    #[test]
    fn standby_is_a_fallback_only_when_nothing_is_open() {
        let mut train = sold_out();
        assert!(!SeatPreference::GeneralOnly.accepts(&train));

        train.standby_available = true;
        // Sold out but with a waiting list: every preference falls back.
        assert!(SeatPreference::GeneralFirst.accepts(&train));
        assert!(SeatPreference::GeneralOnly.accepts(&train));
        assert!(SeatPreference::SpecialOnly.accepts(&train));

        // A standby slot does not widen the policy while seats are open.
        train.general_available = true;
        assert!(!SeatPreference::SpecialOnly.accepts(&train));
    }

    #[test]
    fn provider_kind_serializes_to_the_wire_tags() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::Srt).unwrap(),
            r#""SRT""#
        );
        assert_eq!(
            serde_json::to_string(&ProviderKind::Ktx).unwrap(),
            r#""KTX""#
        );
    }
}
