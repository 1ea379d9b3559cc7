//! Convenient re-exports of the types most integrations need.

pub use crate::broadcaster::{EventBroadcaster, SubscriberId};
pub use crate::delay::{DelayPolicy, FixedDelay, GammaDelay};
pub use crate::event::{ErrorCategory, Frame, JobEvent};
pub use crate::job::{
    builder::JobSpecBuilder, CardDetails, JobId, JobSpec, JobStatus, OwnerId,
    PassengerComposition, SearchCriteria, Snapshot,
};
pub use crate::progress::{attach, detach, handle_control, ControlMessage};
pub use crate::provider::{
    ProviderError, ProviderKind, Reservation, SeatPreference, SessionProvider, TrainOffer,
};
pub use crate::registry::{JobRegistry, RegistryError};
pub use crate::sink::{
    InMemoryRecordStore, NewRecord, NoopNotifier, NotificationSink, RecordStore, SinkError,
    TerminalUpdate,
};
