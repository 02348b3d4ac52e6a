//! Core vocabulary shared by every layer: connection states, identifiers,
//! outbound events and the failure taxonomy.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Result alias used across the session core.
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Lifecycle of the single peripheral session.
///
/// Characteristic I/O is only legal in [`ConnectionState::Ready`]; everywhere
/// else only `connect`/`disconnect` are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    DiscoveringServices,
    Ready,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::DiscoveringServices => "discovering services",
            Self::Ready => "ready",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Address-like opaque identifier of a peripheral.
///
/// The core never interprets it; the transport knows what it means
/// (a MAC address, a platform device id, a sim label).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeripheralId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonically increasing epoch number, one per connect intent.
///
/// Every transport event carries the epoch it belongs to; completions tagged
/// with an older epoch are discarded instead of being applied to a newer
/// session. `SessionId::default()` is the never-connected epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(epoch: u64) -> Self {
        Self(epoch)
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of GATT request that can occupy the single pending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
    DescriptorWrite,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::DescriptorWrite => "descriptor write",
        };
        f.write_str(name)
    }
}

/// Delivery mode for characteristic writes.
///
/// `WithResponse` is preferred when the characteristic supports both, since
/// only it produces a link-level acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

/// Events fanned out to the external collaborator.
///
/// Payloads are opaque byte strings; in the LED domain they happen to be
/// ASCII `"0"`/`"1"`, but nothing here depends on that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    /// Unsolicited notify/indicate push from the target characteristic.
    DataChanged(Vec<u8>),
    ReadCompleted(Vec<u8>),
    /// Write acknowledged (or locally accepted for write-without-response),
    /// echoing the payload that is now the last-known value.
    WriteCompleted(Vec<u8>),
    OperationFailed(ErrorKind),
}

/// Opaque failure code passed through from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("transport failure (status {code})")]
pub struct TransportError {
    pub code: i32,
}

impl TransportError {
    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Failure taxonomy surfaced to callers and observers.
///
/// `InvalidState` and `Busy` are synchronous rejections of the triggering
/// call; every other kind arrives asynchronously through the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("operation not permitted while {0}")]
    InvalidState(ConnectionState),
    #[error("a {0} request is already in flight")]
    Busy(OperationKind),
    #[error("service {0} not present on the peripheral")]
    ServiceNotFound(Uuid),
    #[error("characteristic {0} not present in the target service")]
    CharacteristicNotFound(Uuid),
    #[error("link could not be established")]
    LinkFailed,
    #[error("request cancelled by disconnect")]
    Cancelled,
    #[error("request timed out")]
    Timeout,
    #[error(transparent)]
    Transport(#[from] TransportError),
}
