//! Scripted fakes and fixture builders for exercising the scheduler without a
//! real rail provider.
//!
//! [`FakeProvider`] is script-driven: each operation pops the next result off
//! its queue, and an exhausted queue falls back to the most benign answer
//! (login succeeds, search finds nothing) so a job can idle forever under a
//! cancellation test without an infinite script.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::job::{CardDetails, JobId, JobStatus, OwnerId, PassengerComposition, SearchCriteria, Snapshot};
use crate::provider::{
    ProviderError, ProviderKind, Reservation, SeatPreference, SessionProvider, TrainOffer,
};

/// An offer fixture with the given seat availability flags.
pub fn offer(train_number: &str, general: bool, special: bool, standby: bool) -> TrainOffer {
    TrainOffer {
        train_name: "SRT".into(),
        train_number: train_number.into(),
        dep_station: "수서".into(),
        arr_station: "부산".into(),
        dep_date: "20260301".into(),
        dep_time: "080000".into(),
        arr_time: "102500".into(),
        general_available: general,
        special_available: special,
        standby_available: standby,
    }
}

/// A reservation fixture for the given train, unpaid.
pub fn reservation(train_number: &str) -> Reservation {
    Reservation {
        reservation_number: format!("R-{train_number}"),
        train_name: "SRT".into(),
        train_number: train_number.into(),
        dep_station: "수서".into(),
        arr_station: "부산".into(),
        dep_date: "20260301".into(),
        dep_time: "080000".into(),
        arr_time: "102500".into(),
        total_cost: 52_600,
        paid: false,
    }
}

/// A search criteria fixture.
pub fn criteria() -> SearchCriteria {
    SearchCriteria {
        departure: "수서".into(),
        arrival: "부산".into(),
        date: "20260301".into(),
        time: "080000".into(),
    }
}

/// A snapshot fixture for the given job.
pub fn snapshot(id: JobId, status: JobStatus, attempts: u32) -> Snapshot {
    Snapshot {
        id,
        owner: OwnerId::from(1),
        provider: ProviderKind::Srt,
        criteria: criteria(),
        status,
        attempts,
        elapsed: 0.0,
    }
}

type Script<T> = Mutex<VecDeque<Result<T, ProviderError>>>;

/// A [`SessionProvider`] whose every response is scripted in advance.
#[derive(Debug, Default)]
pub struct FakeProvider {
    login_script: Script<()>,
    search_script: Script<Vec<TrainOffer>>,
    reserve_script: Script<Reservation>,
    pay_script: Script<()>,
    logins: AtomicUsize,
    searches: AtomicUsize,
    reserved: Mutex<Vec<String>>,
    cleared: AtomicUsize,
}

impl FakeProvider {
    pub fn script_login(&self, result: Result<(), ProviderError>) {
        self.login_script.lock().unwrap().push_back(result);
    }

    pub fn script_search(&self, result: Result<Vec<TrainOffer>, ProviderError>) {
        self.search_script.lock().unwrap().push_back(result);
    }

    pub fn script_reserve(&self, result: Result<Reservation, ProviderError>) {
        self.reserve_script.lock().unwrap().push_back(result);
    }

    pub fn script_pay(&self, result: Result<(), ProviderError>) {
        self.pay_script.lock().unwrap().push_back(result);
    }

    pub fn times_logged_in(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn times_searched(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn times_cleared(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }

    /// Train numbers passed to `reserve`, in call order.
    pub fn reserved_trains(&self) -> Vec<String> {
        self.reserved.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Srt
    }

    async fn login(&self) -> Result<(), ProviderError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.login_script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn search(
        &self,
        _criteria: &SearchCriteria,
        _passengers: &PassengerComposition,
    ) -> Result<Vec<TrainOffer>, ProviderError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.search_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn reserve(
        &self,
        offer: &TrainOffer,
        _passengers: &PassengerComposition,
        _preference: SeatPreference,
    ) -> Result<Reservation, ProviderError> {
        self.reserved
            .lock()
            .unwrap()
            .push(offer.train_number.clone());
        self.reserve_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Other("unscripted reserve call".into())))
    }

    async fn pay(
        &self,
        _reservation: &Reservation,
        _card: &CardDetails,
    ) -> Result<(), ProviderError> {
        self.pay_script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn clear_queue(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}
