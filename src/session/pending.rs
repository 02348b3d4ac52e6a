//! Single-slot tracker for the one GATT request a link allows in flight.
//!
//! The link serializes requests, so the tracker refuses to hold more than
//! one: a second submission is rejected with `Busy` instead of being queued,
//! keeping behavior deterministic for the caller.

use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use crate::domain::models::{ErrorKind, OperationKind, Result};

/// One outstanding request against the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub characteristic: Uuid,
    /// Payload submitted with a write, echoed back on acknowledgement.
    pub payload: Option<Vec<u8>>,
    pub submitted_at: Instant,
}

/// The pending slot itself.
#[derive(Debug, Default)]
pub struct PendingOperations {
    slot: Option<PendingOperation>,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupy the slot, rejecting with `Busy` (naming the request already in
    /// flight) when it is taken. Never overwrites.
    pub fn submit(
        &mut self,
        kind: OperationKind,
        characteristic: Uuid,
        payload: Option<Vec<u8>>,
    ) -> Result<()> {
        if let Some(current) = &self.slot {
            return Err(ErrorKind::Busy(current.kind));
        }
        self.slot = Some(PendingOperation {
            kind,
            characteristic,
            payload,
            submitted_at: Instant::now(),
        });
        Ok(())
    }

    /// Release the slot for a completion matching the pending kind and
    /// characteristic.
    ///
    /// A completion that does not match what is pending leaves the slot
    /// untouched and returns `None`; the caller treats it as stray traffic,
    /// such as the late acknowledgement of a request that already expired.
    pub fn take(&mut self, kind: OperationKind, characteristic: Uuid) -> Option<PendingOperation> {
        match &self.slot {
            Some(current) if current.kind == kind && current.characteristic == characteristic => {
                self.slot.take()
            }
            Some(current) => {
                warn!(
                    "ignoring {} completion for {} while a {} on {} is pending",
                    kind, characteristic, current.kind, current.characteristic
                );
                None
            }
            None => None,
        }
    }

    /// Clear the slot unconditionally (disconnect, link-down, timeout).
    pub fn cancel(&mut self) -> Option<PendingOperation> {
        self.slot.take()
    }

    pub fn current(&self) -> Option<&PendingOperation> {
        self.slot.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_some()
    }

    /// Instant at which the occupying request must be expired, if one is
    /// pending and a limit is configured.
    pub fn deadline(&self, timeout: Duration) -> Option<Instant> {
        self.slot
            .as_ref()
            .map(|operation| operation.submitted_at + timeout)
    }
}
