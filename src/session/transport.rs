//! Capability seam between the session core and a concrete BLE stack.
//!
//! The core never talks to a radio directly: it submits requests through the
//! [`Transport`] trait and consumes the completions the transport pushes back
//! as [`TransportEvent`]s, usually over an `mpsc` channel owned by whoever
//! wires the two together.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{PeripheralId, SessionId, TransportError, WriteMode};
use crate::session::gatt::ServiceInfo;

/// Submission interface onto the underlying BLE stack.
///
/// Every method returns as soon as the request has been handed to the stack:
/// `Ok(())` means "accepted for asynchronous completion", and the actual
/// outcome arrives later as a [`TransportEvent`]. An immediate `Err` means
/// the request could not even be submitted.
///
/// Implementations must tag every event they emit with the [`SessionId`]
/// received in [`Transport::connect`], so the core can discard completions
/// that belong to a torn-down session.
#[async_trait]
pub trait Transport: Send {
    /// Establish a link to the peripheral. Completion: `LinkUp` or
    /// `LinkFailed`.
    async fn connect(
        &mut self,
        session: SessionId,
        peripheral: &PeripheralId,
    ) -> Result<(), TransportError>;

    /// Tear the link down. Completion: `LinkDown`.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Enumerate services and characteristics. Completion:
    /// `ServicesDiscovered` or `DiscoveryFailed`.
    async fn discover_services(&mut self) -> Result<(), TransportError>;

    /// Write a descriptor value (CCCD subscription enable, in practice).
    /// Completion: `DescriptorWriteComplete` or `DescriptorWriteFailed`.
    async fn write_descriptor(
        &mut self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError>;

    /// Read the characteristic value. Completion: `CharacteristicRead` or
    /// `ReadFailed`.
    async fn read_characteristic(&mut self, characteristic: Uuid) -> Result<(), TransportError>;

    /// Write the characteristic value. Completion for
    /// [`WriteMode::WithResponse`]: `CharacteristicWriteComplete` or
    /// `WriteFailed`. [`WriteMode::WithoutResponse`] produces no completion
    /// on the link.
    async fn write_characteristic(
        &mut self,
        characteristic: Uuid,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError>;
}

/// Completion or unsolicited event from the transport, tagged with the
/// session epoch it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub session: SessionId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(session: SessionId, kind: TransportEventKind) -> Self {
        Self { session, kind }
    }
}

/// The event payloads a transport can deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    LinkUp,
    LinkFailed(TransportError),
    LinkDown,
    ServicesDiscovered(Vec<ServiceInfo>),
    DiscoveryFailed(TransportError),
    DescriptorWriteComplete {
        characteristic: Uuid,
    },
    DescriptorWriteFailed {
        characteristic: Uuid,
        error: TransportError,
    },
    CharacteristicRead {
        characteristic: Uuid,
        value: Vec<u8>,
    },
    ReadFailed {
        characteristic: Uuid,
        error: TransportError,
    },
    CharacteristicWriteComplete {
        characteristic: Uuid,
    },
    WriteFailed {
        characteristic: Uuid,
        error: TransportError,
    },
    /// Notify/indicate push; arrives without any request pending.
    CharacteristicChanged {
        characteristic: Uuid,
        value: Vec<u8>,
    },
}
