//! The session state machine.
//!
//! Owns every piece of connection state and mutates it only from its own
//! transition function: intent calls arrive from the boundary,
//! completions arrive as [`TransportEvent`]s, and both are processed on the
//! single thread that owns the [`Session`]. Requests never block; each one
//! submits to the transport and returns, and the outcome comes back later
//! through [`Session::handle_transport_event`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::models::{
    ConnectionState, ErrorKind, OperationKind, PeripheralId, Result, SessionEvent, SessionId,
    TransportError, WriteMode,
};
use crate::domain::settings::Settings;
use crate::session::dispatch::{EventDispatcher, SessionObserver};
use crate::session::gatt::{self, ServiceInfo};
use crate::session::pending::PendingOperations;
use crate::session::registry::CharacteristicRegistry;
use crate::session::transport::{Transport, TransportEvent, TransportEventKind};

/// How long a submitted request may stay unanswered before the host should
/// expire it.
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(10);

/// Construction-time knobs for a session. `Default` targets the LED
/// peripheral the crate grew up against.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Service expected to hold the target characteristic.
    pub service: Uuid,
    /// Characteristic the session reads, writes and toggles.
    pub characteristic: Uuid,
    /// Descriptor written to enable notify/indicate delivery.
    pub config_descriptor: Uuid,
    /// Expiry for in-flight requests; `None` disables the deadline hook.
    pub pending_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service: gatt::LED_SERVICE_UUID,
            characteristic: gatt::LED_CHARACTERISTIC_UUID,
            config_descriptor: gatt::CLIENT_CHARACTERISTIC_CONFIG,
            pending_timeout: Some(DEFAULT_PENDING_TIMEOUT),
        }
    }
}

impl SessionConfig {
    /// Validate persisted [`Settings`] into a config, naming the offending
    /// string on failure.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let service = Uuid::parse_str(&settings.service_uuid)
            .with_context(|| format!("invalid service UUID {:?}", settings.service_uuid))?;
        let characteristic = Uuid::parse_str(&settings.characteristic_uuid).with_context(|| {
            format!(
                "invalid characteristic UUID {:?}",
                settings.characteristic_uuid
            )
        })?;
        let config_descriptor =
            Uuid::parse_str(&settings.config_descriptor_uuid).with_context(|| {
                format!(
                    "invalid config descriptor UUID {:?}",
                    settings.config_descriptor_uuid
                )
            })?;
        Ok(Self {
            service,
            characteristic,
            config_descriptor,
            pending_timeout: settings.pending_timeout_ms.map(Duration::from_millis),
        })
    }
}

/// One queued configuration-descriptor write.
#[derive(Debug, Clone)]
struct ConfigStep {
    characteristic: Uuid,
    descriptor: Uuid,
    value: [u8; 2],
}

/// Client session over one peripheral link.
///
/// Drives the transport through connect, service discovery and subscription
/// setup, then serializes characteristic I/O through the single pending
/// slot. All outcomes fan out through the registered observers.
pub struct Session<T: Transport> {
    config: SessionConfig,
    transport: T,
    dispatcher: EventDispatcher,
    state: ConnectionState,
    session_id: SessionId,
    peripheral: Option<PeripheralId>,
    registry: Option<CharacteristicRegistry>,
    pending: PendingOperations,
    config_queue: VecDeque<ConfigStep>,
    last_value: Option<Vec<u8>>,
}

impl<T: Transport> Session<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            dispatcher: EventDispatcher::new(),
            state: ConnectionState::Disconnected,
            session_id: SessionId::default(),
            peripheral: None,
            registry: None,
            pending: PendingOperations::new(),
            config_queue: VecDeque::new(),
            last_value: None,
        }
    }

    pub fn register_observer(&mut self, observer: Box<dyn SessionObserver>) {
        self.dispatcher.register(observer);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn peripheral(&self) -> Option<&PeripheralId> {
        self.peripheral.as_ref()
    }

    /// Last value observed on the target characteristic, from a read, an
    /// acknowledged write or a pushed change. Cleared on connect.
    pub fn last_value(&self) -> Option<&[u8]> {
        self.last_value.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_busy()
    }

    /// Open a new session toward `peripheral`.
    ///
    /// Only legal while disconnected. Bumps the session epoch so completions
    /// from any earlier link can no longer be applied.
    pub async fn connect(&mut self, peripheral: PeripheralId) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(ErrorKind::InvalidState(self.state));
        }
        self.session_id = self.session_id.next();
        self.last_value = None;
        info!("session {} connecting to {}", self.session_id, peripheral);
        self.set_state(ConnectionState::Connecting);
        let submitted = self.transport.connect(self.session_id, &peripheral).await;
        self.peripheral = Some(peripheral);
        if let Err(error) = submitted {
            warn!("connect could not be submitted: {}", error);
            self.emit(SessionEvent::OperationFailed(error.into()));
            self.drop_link();
        }
        Ok(())
    }

    /// Close the session. Legal in every state; does nothing while already
    /// disconnected. Any in-flight request is reported as cancelled.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            debug!("disconnect requested while already disconnected");
            return;
        }
        info!("session {} disconnecting", self.session_id);
        self.cancel_pending();
        self.config_queue.clear();
        self.set_state(ConnectionState::Disconnecting);
        if let Err(error) = self.transport.disconnect().await {
            warn!("disconnect could not be submitted: {}", error);
            self.emit(SessionEvent::OperationFailed(error.into()));
            self.drop_link();
        }
    }

    /// Read the target characteristic. `Ready` only; one request at a time.
    pub async fn request_read(&mut self) -> Result<()> {
        self.ensure_ready()?;
        let characteristic = self.config.characteristic;
        self.pending
            .submit(OperationKind::Read, characteristic, None)?;
        debug!("read submitted for {}", characteristic);
        if let Err(error) = self.transport.read_characteristic(characteristic).await {
            self.pending.cancel();
            warn!("read could not be submitted: {}", error);
            self.emit(SessionEvent::OperationFailed(error.into()));
        }
        Ok(())
    }

    /// Write `value` to the target characteristic. `Ready` only; one request
    /// at a time.
    ///
    /// The delivery mode follows the discovered properties, preferring
    /// with-response. A without-response write has no acknowledgement on the
    /// link, so it completes locally as soon as the transport accepts it.
    pub async fn request_write(&mut self, value: Vec<u8>) -> Result<()> {
        self.ensure_ready()?;
        if let Some(current) = self.pending.current() {
            return Err(ErrorKind::Busy(current.kind));
        }
        let characteristic = self.config.characteristic;
        let mode = self
            .registry
            .as_ref()
            .and_then(|registry| registry.get(characteristic))
            .and_then(|record| record.preferred_write_mode())
            .unwrap_or(WriteMode::WithResponse);
        match mode {
            WriteMode::WithResponse => {
                self.pending
                    .submit(OperationKind::Write, characteristic, Some(value.clone()))?;
                debug!("write submitted for {} ({} bytes)", characteristic, value.len());
                if let Err(error) = self
                    .transport
                    .write_characteristic(characteristic, &value, mode)
                    .await
                {
                    self.pending.cancel();
                    warn!("write could not be submitted: {}", error);
                    self.emit(SessionEvent::OperationFailed(error.into()));
                }
            }
            WriteMode::WithoutResponse => {
                debug!(
                    "unacknowledged write submitted for {} ({} bytes)",
                    characteristic,
                    value.len()
                );
                if let Err(error) = self
                    .transport
                    .write_characteristic(characteristic, &value, mode)
                    .await
                {
                    warn!("write could not be submitted: {}", error);
                    self.emit(SessionEvent::OperationFailed(error.into()));
                    return Ok(());
                }
                // No acknowledgement exists on the link for this mode; the
                // write is complete once the stack has taken it.
                self.last_value = Some(value.clone());
                self.emit(SessionEvent::WriteCompleted(value));
            }
        }
        Ok(())
    }

    /// Flip the target value: writes `b"1"` when the last known value is
    /// `b"0"` or nothing has been observed yet, otherwise writes `b"0"`.
    pub async fn request_toggle(&mut self) -> Result<()> {
        let next = if matches!(self.last_value.as_deref(), Some(b"0") | None) {
            b"1".to_vec()
        } else {
            b"0".to_vec()
        };
        self.request_write(next).await
    }

    /// Apply one transport event to the machine.
    ///
    /// Events tagged with a session other than the current one are
    /// discarded; they belong to a link that no longer exists.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        if event.session != self.session_id {
            debug!(
                "discarding event from stale session {}: {:?}",
                event.session, event.kind
            );
            return;
        }
        match event.kind {
            TransportEventKind::LinkUp => self.on_link_up().await,
            TransportEventKind::LinkFailed(error) => self.on_link_failed(error),
            TransportEventKind::LinkDown => self.on_link_down(),
            TransportEventKind::ServicesDiscovered(services) => {
                self.on_services_discovered(services).await
            }
            TransportEventKind::DiscoveryFailed(error) => self.on_discovery_failed(error).await,
            TransportEventKind::DescriptorWriteComplete { characteristic } => {
                self.on_descriptor_written(characteristic).await
            }
            TransportEventKind::DescriptorWriteFailed {
                characteristic,
                error,
            } => self.on_descriptor_failed(characteristic, error).await,
            TransportEventKind::CharacteristicRead {
                characteristic,
                value,
            } => self.on_read(characteristic, value),
            TransportEventKind::ReadFailed {
                characteristic,
                error,
            } => self.on_read_failed(characteristic, error),
            TransportEventKind::CharacteristicWriteComplete { characteristic } => {
                self.on_written(characteristic)
            }
            TransportEventKind::WriteFailed {
                characteristic,
                error,
            } => self.on_write_failed(characteristic, error),
            TransportEventKind::CharacteristicChanged {
                characteristic,
                value,
            } => self.on_changed(characteristic, value),
        }
    }

    /// Next instant at which [`Session::expire_pending`] should run, if a
    /// request is in flight and a timeout is configured.
    pub fn pending_deadline(&self) -> Option<Instant> {
        let timeout = self.config.pending_timeout?;
        self.pending.deadline(timeout)
    }

    /// Expire the in-flight request. The host drives this off the deadline
    /// reported by [`Session::pending_deadline`].
    pub async fn expire_pending(&mut self) {
        let Some(operation) = self.pending.cancel() else {
            return;
        };
        warn!("{} on {} timed out", operation.kind, operation.characteristic);
        self.emit(SessionEvent::OperationFailed(ErrorKind::Timeout));
        if operation.kind == OperationKind::DescriptorWrite {
            self.advance_configuration().await;
        }
    }

    async fn on_link_up(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!("link up ignored while {}", self.state);
            return;
        }
        info!("session {} link established", self.session_id);
        self.set_state(ConnectionState::Connected);
        self.set_state(ConnectionState::DiscoveringServices);
        if let Err(error) = self.transport.discover_services().await {
            warn!("service discovery could not be submitted: {}", error);
            self.emit(SessionEvent::OperationFailed(error.into()));
            self.abort_link().await;
        }
    }

    fn on_link_failed(&mut self, error: TransportError) {
        if self.state == ConnectionState::Disconnected {
            debug!("link failure ignored while disconnected");
            return;
        }
        warn!("session {} link failed (status {})", self.session_id, error.code);
        self.cancel_pending();
        self.emit(SessionEvent::OperationFailed(ErrorKind::LinkFailed));
        self.drop_link();
    }

    fn on_link_down(&mut self) {
        if self.state == ConnectionState::Disconnected {
            debug!("link down ignored while disconnected");
            return;
        }
        info!("session {} link closed", self.session_id);
        self.cancel_pending();
        self.drop_link();
    }

    async fn on_services_discovered(&mut self, services: Vec<ServiceInfo>) {
        if self.state != ConnectionState::DiscoveringServices {
            debug!("discovery result ignored while {}", self.state);
            return;
        }
        let registry = match CharacteristicRegistry::from_discovery(
            &services,
            self.config.service,
            self.config.characteristic,
            self.config.config_descriptor,
        ) {
            Ok(registry) => registry,
            Err(error) => {
                warn!("{}", error);
                self.emit(SessionEvent::OperationFailed(error));
                self.abort_link().await;
                return;
            }
        };
        if registry.find_target().is_none() {
            let error = ErrorKind::CharacteristicNotFound(self.config.characteristic);
            warn!("{}", error);
            self.emit(SessionEvent::OperationFailed(error));
            self.abort_link().await;
            return;
        }
        let steps: VecDeque<ConfigStep> = registry
            .notifiable_characteristics()
            .filter_map(|record| {
                let descriptor = record.config_descriptor?;
                let value = record.subscription_value()?;
                Some(ConfigStep {
                    characteristic: record.uuid,
                    descriptor,
                    value,
                })
            })
            .collect();
        info!(
            "session {} discovered {} characteristics, {} subscriptions to configure",
            self.session_id,
            registry.len(),
            steps.len()
        );
        self.registry = Some(registry);
        self.config_queue = steps;
        self.advance_configuration().await;
    }

    async fn on_discovery_failed(&mut self, error: TransportError) {
        if self.state != ConnectionState::DiscoveringServices {
            debug!("discovery failure ignored while {}", self.state);
            return;
        }
        warn!("service discovery failed: {}", error);
        self.emit(SessionEvent::OperationFailed(error.into()));
        self.abort_link().await;
    }

    async fn on_descriptor_written(&mut self, characteristic: Uuid) {
        if self
            .pending
            .take(OperationKind::DescriptorWrite, characteristic)
            .is_some()
        {
            debug!("subscription enabled on {}", characteristic);
            self.advance_configuration().await;
        }
    }

    async fn on_descriptor_failed(&mut self, characteristic: Uuid, error: TransportError) {
        if self
            .pending
            .take(OperationKind::DescriptorWrite, characteristic)
            .is_some()
        {
            warn!(
                "subscription setup failed on {} (status {}); notifications may be limited",
                characteristic, error.code
            );
            self.emit(SessionEvent::OperationFailed(error.into()));
            self.advance_configuration().await;
        }
    }

    fn on_read(&mut self, characteristic: Uuid, value: Vec<u8>) {
        if self.pending.take(OperationKind::Read, characteristic).is_none() {
            debug!("read completion with nothing pending for {}", characteristic);
            return;
        }
        debug!("read {} bytes from {}", value.len(), characteristic);
        self.last_value = Some(value.clone());
        self.emit(SessionEvent::ReadCompleted(value));
    }

    fn on_read_failed(&mut self, characteristic: Uuid, error: TransportError) {
        if self.pending.take(OperationKind::Read, characteristic).is_none() {
            return;
        }
        warn!("read failed for {}: {}", characteristic, error);
        self.emit(SessionEvent::OperationFailed(error.into()));
    }

    fn on_written(&mut self, characteristic: Uuid) {
        let Some(operation) = self.pending.take(OperationKind::Write, characteristic) else {
            debug!("write acknowledgement with nothing pending for {}", characteristic);
            return;
        };
        debug!("write to {} acknowledged", characteristic);
        let value = operation.payload.unwrap_or_default();
        self.last_value = Some(value.clone());
        self.emit(SessionEvent::WriteCompleted(value));
    }

    fn on_write_failed(&mut self, characteristic: Uuid, error: TransportError) {
        if self.pending.take(OperationKind::Write, characteristic).is_none() {
            return;
        }
        warn!("write failed for {}: {}", characteristic, error);
        self.emit(SessionEvent::OperationFailed(error.into()));
    }

    fn on_changed(&mut self, characteristic: Uuid, value: Vec<u8>) {
        if self.registry.is_none() || characteristic != self.config.characteristic {
            debug!("change push from untracked {} dropped", characteristic);
            return;
        }
        debug!("value change pushed from {} ({} bytes)", characteristic, value.len());
        self.last_value = Some(value.clone());
        self.emit(SessionEvent::DataChanged(value));
    }

    /// Issue the next queued subscription write, skipping over submissions
    /// the transport refuses, and declare the session ready once the queue
    /// is empty. The link stays usable even when individual subscriptions
    /// could not be enabled.
    async fn advance_configuration(&mut self) {
        if self.state != ConnectionState::DiscoveringServices {
            return;
        }
        while let Some(step) = self.config_queue.pop_front() {
            if let Err(error) =
                self.pending
                    .submit(OperationKind::DescriptorWrite, step.characteristic, None)
            {
                warn!(
                    "cannot start subscription setup on {}: {}",
                    step.characteristic, error
                );
                self.emit(SessionEvent::OperationFailed(error));
                continue;
            }
            debug!("enabling subscription on {}", step.characteristic);
            match self
                .transport
                .write_descriptor(step.characteristic, step.descriptor, &step.value)
                .await
            {
                Ok(()) => return,
                Err(error) => {
                    self.pending.cancel();
                    warn!(
                        "subscription setup on {} could not be submitted: {}",
                        step.characteristic, error
                    );
                    self.emit(SessionEvent::OperationFailed(error.into()));
                }
            }
        }
        info!("session {} ready", self.session_id);
        self.set_state(ConnectionState::Ready);
    }

    /// Best-effort teardown after a failure between link-up and ready.
    async fn abort_link(&mut self) {
        if let Err(error) = self.transport.disconnect().await {
            debug!("teardown disconnect failed: {}", error);
        }
        self.cancel_pending();
        self.drop_link();
    }

    fn drop_link(&mut self) {
        self.registry = None;
        self.config_queue.clear();
        self.set_state(ConnectionState::Disconnected);
    }

    fn cancel_pending(&mut self) {
        if let Some(operation) = self.pending.cancel() {
            debug!(
                "pending {} on {} cancelled",
                operation.kind, operation.characteristic
            );
            self.emit(SessionEvent::OperationFailed(ErrorKind::Cancelled));
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state == ConnectionState::Ready {
            Ok(())
        } else {
            Err(ErrorKind::InvalidState(self.state))
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        info!("session {}: {} -> {}", self.session_id, self.state, next);
        self.state = next;
        self.emit(SessionEvent::StateChanged(next));
    }

    fn emit(&self, event: SessionEvent) {
        self.dispatcher.emit(&event);
    }
}
