use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{instrument, Instrument};

use crate::broadcaster::EventBroadcaster;
use crate::delay::DelayPolicy;
use crate::event::{ErrorCategory, JobEvent};
use crate::job::{JobHandle, JobStatus};
use crate::provider::{ProviderError, Reservation};
use crate::sink::{NotificationSink, RecordStore};

/// The per-job execution context: one poll/reserve/retry state machine,
/// running on its own tokio task until it reaches a terminal status.
///
/// The worker is the only writer of the job's terminal status once the job is
/// running, and it emits events strictly sequentially, which is what gives
/// observers per-job ordering.
pub(crate) struct ReservationWorker {
    handle: Arc<JobHandle>,
    delay: Arc<dyn DelayPolicy>,
    broadcaster: Arc<EventBroadcaster>,
    records: Arc<dyn RecordStore>,
    notifier: Arc<dyn NotificationSink>,
}

enum CycleOutcome {
    Reserved(Reservation),
    Miss,
    Cancelled,
}

impl ReservationWorker {
    pub(crate) fn new(
        handle: Arc<JobHandle>,
        delay: Arc<dyn DelayPolicy>,
        broadcaster: Arc<EventBroadcaster>,
        records: Arc<dyn RecordStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            handle,
            delay,
            broadcaster,
            records,
            notifier,
        }
    }

    #[instrument(
        skip(self),
        fields(job_id = %self.handle.id, provider = %self.handle.spec.provider)
    )]
    pub(crate) async fn run(self) {
        // The initial login is the only non-cancellation failure exit; every
        // error after this point keeps the job alive.
        if let Err(error) = self.handle.provider.login().await {
            tracing::warn!(%error, "initial login failed, job failed");
            self.emit_error(ErrorCategory::Authentication, error.to_string());
            if self.handle.try_finish(JobStatus::Failed, None) {
                self.finalize().await;
            }
            return;
        }
        tracing::debug!("logged in, entering poll loop");

        let cancel = self.handle.cancel_token();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let attempts = self.handle.next_attempt();
            match self.poll_cycle(&cancel).await {
                CycleOutcome::Reserved(reservation) => {
                    self.complete(reservation, attempts).await;
                    return;
                }
                CycleOutcome::Cancelled => break,
                CycleOutcome::Miss => {
                    self.emit(JobEvent::Tick {
                        attempts,
                        elapsed: self.handle.elapsed_seconds(),
                    });
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.delay.next_delay(attempts)) => {}
            }
        }

        if self.handle.try_finish(JobStatus::Cancelled, None) {
            tracing::debug!("job cancelled");
            self.finalize().await;
            self.emit(JobEvent::Cancelled);
        }
    }

    /// One search-and-scan pass over the candidate list, in declared order —
    /// first reservable candidate wins, not earliest departure.
    async fn poll_cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        let spec = &self.handle.spec;
        let offers = match self
            .handle
            .provider
            .search(&spec.criteria, &spec.passengers)
            .await
        {
            Ok(offers) => offers,
            Err(error) => {
                self.absorb(error).await;
                return CycleOutcome::Miss;
            }
        };

        for &index in &spec.candidates {
            if cancel.is_cancelled() {
                return CycleOutcome::Cancelled;
            }
            // The result set can shrink between cycles; a stale index is
            // skipped, not an error.
            let Some(offer) = offers.get(index) else {
                continue;
            };
            if !spec.seat_preference.accepts(offer) {
                continue;
            }
            tracing::debug!(train = %offer.train_number, index, "candidate open, reserving");
            match self
                .handle
                .provider
                .reserve(offer, &spec.passengers, spec.seat_preference)
                .await
            {
                Ok(reservation) => return CycleOutcome::Reserved(reservation),
                Err(error) => {
                    self.absorb(error).await;
                    return CycleOutcome::Miss;
                }
            }
        }
        CycleOutcome::Miss
    }

    async fn complete(&self, mut reservation: Reservation, attempts: u32) {
        if self.handle.spec.auto_pay {
            if let Some(card) = &self.handle.spec.card {
                match self.handle.provider.pay(&reservation, card).await {
                    Ok(()) => reservation.paid = true,
                    Err(error) => {
                        // Reported, but the reservation stands: the job still
                        // completes as Success.
                        tracing::warn!(%error, "auto-pay failed, keeping the reservation");
                        self.emit_error(ErrorCategory::Payment, error.to_string());
                    }
                }
            }
        }

        self.handle
            .try_finish(JobStatus::Success, Some(reservation.clone()));
        let elapsed = self.handle.elapsed_seconds();
        tracing::info!(attempts, train = %reservation.train_number, "reservation secured");
        self.finalize().await;
        self.emit(JobEvent::Success {
            reservation: reservation.clone(),
            attempts,
            elapsed,
        });

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(
            async move {
                if let Err(error) = notifier.notify_success(reservation).await {
                    tracing::debug!(%error, "success notification failed");
                }
            }
            .in_current_span(),
        );
    }

    /// In-loop error classification. Nothing here terminates the job.
    async fn absorb(&self, error: ProviderError) {
        match error {
            ProviderError::AntiAutomation(message) => {
                self.emit_error(ErrorCategory::AntiAutomation, message);
                self.handle.provider.clear_queue().await;
            }
            ProviderError::Authentication(message) | ProviderError::SessionExpired(message) => {
                self.emit_error(ErrorCategory::Session, message);
                self.relogin().await;
            }
            ProviderError::Unavailable(message) => {
                // Expected while polling; no event.
                tracing::trace!(%message, "no inventory this cycle");
            }
            ProviderError::Provider(message) => {
                self.emit_error(ErrorCategory::Provider, message);
            }
            ProviderError::Connectivity(message) | ProviderError::MalformedResponse(message) => {
                self.emit_error(ErrorCategory::Connection, message);
                self.relogin().await;
            }
            other => self.emit_error(ErrorCategory::Unknown, other.to_string()),
        }
    }

    async fn relogin(&self) {
        match self.handle.provider.login().await {
            Ok(()) => {
                tracing::debug!("re-login succeeded");
                self.emit(JobEvent::Relogin);
            }
            Err(error) => {
                // Not fatal mid-loop; the next cycle will hit the same wall
                // and retry.
                tracing::warn!(%error, "re-login failed");
                self.emit_error(ErrorCategory::Authentication, error.to_string());
            }
        }
    }

    async fn finalize(&self) {
        let update = self.handle.terminal_update();
        if let Err(error) = self.records.finalize(self.handle.id, update).await {
            tracing::error!(%error, "failed to finalize job record");
        }
    }

    fn emit(&self, event: JobEvent) {
        self.broadcaster.publish(self.handle.id, event);
    }

    fn emit_error(&self, category: ErrorCategory, message: String) {
        self.emit(JobEvent::Error { category, message });
    }
}
