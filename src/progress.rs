//! The live progress channel protocol.
//!
//! A serving layer (typically a websocket handler) attaches an observer to a
//! job, relays the [`Frame`]s it receives, and feeds inbound control tokens
//! back through [`handle_control`]. The protocol is deliberately tiny: two
//! inbound tokens, and frames that are plain tagged JSON.

use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::broadcaster::SubscriberId;
use crate::event::Frame;
use crate::job::JobId;
use crate::registry::JobRegistry;

/// An inbound control token on the progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Request cancellation of the observed job.
    Cancel,
    /// Liveness probe; answered with [`Frame::Pong`].
    Ping,
}

#[derive(Debug, Error)]
#[error("unknown control token: {0:?}")]
pub struct UnknownControl(String);

impl FromStr for ControlMessage {
    type Err = UnknownControl;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "cancel" => Ok(Self::Cancel),
            "ping" => Ok(Self::Ping),
            other => Err(UnknownControl(other.to_owned())),
        }
    }
}

/// Attaches an observer to a job.
///
/// The receiver's first frame is always the job's current snapshot; events
/// the job emitted before the attach are gone. `None` when the job is not in
/// the registry.
pub fn attach(
    registry: &Arc<JobRegistry>,
    id: JobId,
) -> Option<(SubscriberId, mpsc::UnboundedReceiver<Frame>)> {
    let snapshot = registry.get(id)?;
    Some(registry.broadcaster().subscribe(id, snapshot))
}

/// Detaches one observer; dropping the receiver works too, but this frees the
/// slot immediately instead of on the next delivery.
pub fn detach(registry: &Arc<JobRegistry>, id: JobId, subscriber: SubscriberId) {
    registry.broadcaster().unsubscribe(id, subscriber);
}

/// Applies one control token, returning the frame to send back, if any.
///
/// `ping` answers with a pong on the spot; `cancel` forwards to the registry
/// and answers nothing — the observer learns the outcome from the job's
/// `cancelled` event like everyone else.
pub fn handle_control(
    registry: &Arc<JobRegistry>,
    id: JobId,
    message: ControlMessage,
) -> Option<Frame> {
    match message {
        ControlMessage::Ping => Some(Frame::Pong),
        ControlMessage::Cancel => {
            registry.cancel(id);
            None
        }
    }
}
