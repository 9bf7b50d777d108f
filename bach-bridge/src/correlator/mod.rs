//! Request/reply correlation over an untagged line stream
//!
//! The host protocol carries no request ids, so replies are matched by
//! arrival order: the next inbound line after a send is that send's reply.
//! That only works with one request in flight, so the correlator holds a
//! single slot. [`Correlator::acquire`] hands out an owned [`RequestSlot`];
//! a second acquire fails with `Busy` until the first slot is consumed by
//! [`RequestSlot::wait`] or dropped.

mod router;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use bach_protocol::{InboundEvent, MessageKind};

use crate::error::{BridgeError, Result};

pub use router::{run_router, SessionEvent, OBSERVER_CHANNEL_CAPACITY};

/// Which inbound line fulfils a pending request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplyMatch {
    /// The next line, whatever it is
    #[default]
    Next,
    /// The next line with this envelope kind; others go to the observer
    Kind(MessageKind),
}

impl ReplyMatch {
    pub fn matches(&self, event: &InboundEvent) -> bool {
        match self {
            Self::Next => true,
            Self::Kind(kind) => event.kind == *kind,
        }
    }
}

/// The one request awaiting a reply
struct PendingRequest {
    token: Uuid,
    command: String,
    submitted_at: DateTime<Utc>,
    deadline: Instant,
    timeout: Duration,
    matcher: ReplyMatch,
    reply_tx: oneshot::Sender<Result<InboundEvent>>,
}

/// Read-only view of the pending request, for status output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInfo {
    pub token: Uuid,
    pub command: String,
    pub submitted_at: DateTime<Utc>,
}

/// Single-slot correlator
#[derive(Default)]
pub struct Correlator {
    slot: Mutex<Option<PendingRequest>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `command`. Fails with `Busy` if it is taken.
    pub fn acquire(
        self: &Arc<Self>,
        command: &str,
        timeout: Duration,
        matcher: ReplyMatch,
    ) -> Result<RequestSlot> {
        let deadline = Instant::now().checked_add(timeout).ok_or_else(|| {
            BridgeError::invalid_arguments(command, format!("reply timeout {timeout:?} is out of range"))
        })?;

        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(BridgeError::Busy);
        }

        let token = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();

        *slot = Some(PendingRequest {
            token,
            command: command.to_string(),
            submitted_at: Utc::now(),
            deadline,
            timeout,
            matcher,
            reply_tx,
        });
        debug!(%token, %command, timeout_ms = timeout.as_millis() as u64, "Request slot acquired");

        Ok(RequestSlot {
            token,
            deadline,
            timeout,
            reply_rx,
            correlator: Arc::clone(self),
        })
    }

    pub fn is_idle(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// `Busy` while a request is outstanding
    pub fn ensure_idle(&self) -> Result<()> {
        if self.is_idle() {
            Ok(())
        } else {
            Err(BridgeError::Busy)
        }
    }

    pub fn pending(&self) -> Option<PendingInfo> {
        self.slot.lock().as_ref().map(|p| PendingInfo {
            token: p.token,
            command: p.command.clone(),
            submitted_at: p.submitted_at,
        })
    }

    /// Offer an inbound line to the pending request
    ///
    /// Returns the event back when it was not consumed, so the caller can
    /// forward it as unsolicited. An expired request is cleared here and
    /// never receives the line.
    pub fn offer(&self, event: InboundEvent) -> Option<InboundEvent> {
        let pending = {
            let mut slot = self.slot.lock();
            let Some(pending) = slot.as_ref() else {
                return Some(event);
            };

            if Instant::now() >= pending.deadline {
                let expired = slot.take();
                drop(slot);
                if let Some(expired) = expired {
                    debug!(token = %expired.token, "Dropping expired request on late line");
                    let _ = expired.reply_tx.send(Err(BridgeError::TimedOut {
                        millis: expired.timeout.as_millis() as u64,
                    }));
                }
                return Some(event);
            }

            if !pending.matcher.matches(&event) {
                return Some(event);
            }

            match slot.take() {
                Some(pending) => pending,
                None => return Some(event),
            }
        };

        debug!(token = %pending.token, command = %pending.command, "Reply matched");
        match pending.reply_tx.send(Ok(event)) {
            Ok(()) => None,
            // Waiter went away; treat the line as unsolicited
            Err(Ok(event)) => Some(event),
            Err(Err(_)) => None,
        }
    }

    /// Fail the pending request, if any. Returns whether one was failed.
    pub fn fail_pending(&self, error: BridgeError) -> bool {
        let pending = self.slot.lock().take();
        match pending {
            Some(pending) => {
                warn!(token = %pending.token, command = %pending.command, %error, "Failing pending request");
                let _ = pending.reply_tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Clear the slot if it still belongs to `token`
    fn release(&self, token: Uuid) -> bool {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|p| p.token == token) {
            *slot = None;
            true
        } else {
            false
        }
    }
}

/// Owned claim on the correlator's single slot
///
/// Dropping it without waiting releases the slot.
pub struct RequestSlot {
    token: Uuid,
    deadline: Instant,
    timeout: Duration,
    reply_rx: oneshot::Receiver<Result<InboundEvent>>,
    correlator: Arc<Correlator>,
}

impl RequestSlot {
    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Suspend until the reply arrives, the deadline passes, or the
    /// request is failed by the router
    pub async fn wait(mut self) -> Result<InboundEvent> {
        match tokio::time::timeout_at(self.deadline, &mut self.reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::Cancelled),
            Err(_) => {
                if self.correlator.release(self.token) {
                    warn!(token = %self.token, timeout_ms = self.timeout.as_millis() as u64, "Request timed out");
                    Err(BridgeError::TimedOut {
                        millis: self.timeout.as_millis() as u64,
                    })
                } else {
                    // Resolved at the deadline boundary
                    match self.reply_rx.try_recv() {
                        Ok(result) => result,
                        Err(_) => Err(BridgeError::TimedOut {
                            millis: self.timeout.as_millis() as u64,
                        }),
                    }
                }
            }
        }
    }
}

impl Drop for RequestSlot {
    fn drop(&mut self) {
        self.correlator.release(self.token);
    }
}
