//! Scripted in-memory peripheral.
//!
//! Stands in for a real BLE stack in tests and in the demo binary:
//! completions are emitted in submission order on the event channel, so a
//! whole connect/discover/subscribe/read/write conversation runs
//! deterministically without a radio. The failure and stall knobs on
//! [`SimDevice`] exercise the session's error paths.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::{PeripheralId, SessionId, TransportError, WriteMode};
use crate::session::gatt::{
    CharacteristicInfo, Properties, ServiceInfo, CLIENT_CHARACTERISTIC_CONFIG,
    LED_CHARACTERISTIC_UUID, LED_SERVICE_UUID,
};
use crate::session::transport::{Transport, TransportEvent, TransportEventKind};

/// Behavior script for the simulated peripheral.
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    /// GATT tree handed back by discovery.
    pub services: Vec<ServiceInfo>,
    /// Characteristic values, updated by writes.
    pub values: HashMap<Uuid, Vec<u8>>,
    /// Push a change notification after every write, the way the LED
    /// peripheral reports its new state.
    pub notify_on_write: bool,
    /// Answer connect attempts with a link failure carrying this status.
    pub fail_connect: Option<TransportError>,
    /// Answer discovery with a failure carrying this status.
    pub fail_discovery: Option<TransportError>,
    /// Answer descriptor writes with a failure carrying this status.
    pub fail_descriptor_writes: Option<TransportError>,
    /// Answer reads with a failure carrying this status.
    pub fail_reads: Option<TransportError>,
    /// Answer writes with a failure carrying this status.
    pub fail_writes: Option<TransportError>,
    /// Swallow reads without answering them at all.
    pub stall_reads: bool,
}

impl SimDevice {
    /// The LED peripheral this crate grew up against: one service with one
    /// readable, writable, notifiable characteristic starting at `b"0"`.
    pub fn led_demo() -> Self {
        let led = CharacteristicInfo::new(
            LED_CHARACTERISTIC_UUID,
            Properties::READ | Properties::WRITE | Properties::NOTIFY,
        )
        .with_descriptor(CLIENT_CHARACTERISTIC_CONFIG);
        Self {
            services: vec![ServiceInfo::new(LED_SERVICE_UUID).with_characteristic(led)],
            values: HashMap::from([(LED_CHARACTERISTIC_UUID, b"0".to_vec())]),
            notify_on_write: true,
            ..Self::default()
        }
    }
}

/// Transport backed by a [`SimDevice`] script.
pub struct SimTransport {
    device: SimDevice,
    events: mpsc::UnboundedSender<TransportEvent>,
    session: SessionId,
}

impl SimTransport {
    /// Build the transport and the receiver its completions arrive on.
    pub fn new(device: SimDevice) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                device,
                events,
                session: SessionId::default(),
            },
            receiver,
        )
    }

    /// Clone of the event sender, for injecting unsolicited traffic (link
    /// drops, stray notifications) from a test.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
        self.events.clone()
    }

    /// Epoch handed over on the most recent connect.
    pub fn session(&self) -> SessionId {
        self.session
    }

    fn emit(&self, kind: TransportEventKind) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.events.send(TransportEvent::new(self.session, kind));
    }

    fn value_of(&self, characteristic: Uuid) -> Vec<u8> {
        self.device
            .values
            .get(&characteristic)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn connect(
        &mut self,
        session: SessionId,
        peripheral: &PeripheralId,
    ) -> Result<(), TransportError> {
        self.session = session;
        debug!("sim: connect to {} as session {}", peripheral, session);
        match self.device.fail_connect {
            Some(error) => self.emit(TransportEventKind::LinkFailed(error)),
            None => self.emit(TransportEventKind::LinkUp),
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        debug!("sim: disconnect");
        self.emit(TransportEventKind::LinkDown);
        Ok(())
    }

    async fn discover_services(&mut self) -> Result<(), TransportError> {
        debug!("sim: discover services");
        match self.device.fail_discovery {
            Some(error) => self.emit(TransportEventKind::DiscoveryFailed(error)),
            None => self.emit(TransportEventKind::ServicesDiscovered(
                self.device.services.clone(),
            )),
        }
        Ok(())
    }

    async fn write_descriptor(
        &mut self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError> {
        debug!(
            "sim: write descriptor {} on {} = {:02x?}",
            descriptor, characteristic, value
        );
        match self.device.fail_descriptor_writes {
            Some(error) => self.emit(TransportEventKind::DescriptorWriteFailed {
                characteristic,
                error,
            }),
            None => self.emit(TransportEventKind::DescriptorWriteComplete { characteristic }),
        }
        Ok(())
    }

    async fn read_characteristic(&mut self, characteristic: Uuid) -> Result<(), TransportError> {
        if self.device.stall_reads {
            debug!("sim: read for {} stalled", characteristic);
            return Ok(());
        }
        match self.device.fail_reads {
            Some(error) => self.emit(TransportEventKind::ReadFailed {
                characteristic,
                error,
            }),
            None => {
                let value = self.value_of(characteristic);
                debug!("sim: read {} = {:02x?}", characteristic, value);
                self.emit(TransportEventKind::CharacteristicRead {
                    characteristic,
                    value,
                });
            }
        }
        Ok(())
    }

    async fn write_characteristic(
        &mut self,
        characteristic: Uuid,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        if let Some(error) = self.device.fail_writes {
            if mode == WriteMode::WithResponse {
                self.emit(TransportEventKind::WriteFailed {
                    characteristic,
                    error,
                });
            }
            return Ok(());
        }
        debug!("sim: write {} = {:02x?} ({:?})", characteristic, value, mode);
        self.device.values.insert(characteristic, value.to_vec());
        if mode == WriteMode::WithResponse {
            self.emit(TransportEventKind::CharacteristicWriteComplete { characteristic });
        }
        if self.device.notify_on_write {
            self.emit(TransportEventKind::CharacteristicChanged {
                characteristic,
                value: value.to_vec(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recv(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        rx.try_recv().expect("expected a queued transport event")
    }

    #[tokio::test]
    async fn led_demo_answers_the_whole_conversation() {
        let (mut sim, mut rx) = SimTransport::new(SimDevice::led_demo());
        let session = SessionId::new(1);

        sim.connect(session, &PeripheralId::from("sim:led")).await.unwrap();
        assert_eq!(recv(&mut rx).kind, TransportEventKind::LinkUp);

        sim.discover_services().await.unwrap();
        match recv(&mut rx).kind {
            TransportEventKind::ServicesDiscovered(services) => {
                assert_eq!(services.len(), 1);
                assert_eq!(services[0].uuid, LED_SERVICE_UUID);
            }
            other => panic!("unexpected event {:?}", other),
        }

        sim.write_descriptor(
            LED_CHARACTERISTIC_UUID,
            CLIENT_CHARACTERISTIC_CONFIG,
            &[0x01, 0x00],
        )
        .await
        .unwrap();
        assert_eq!(
            recv(&mut rx).kind,
            TransportEventKind::DescriptorWriteComplete {
                characteristic: LED_CHARACTERISTIC_UUID
            }
        );

        sim.read_characteristic(LED_CHARACTERISTIC_UUID).await.unwrap();
        assert_eq!(
            recv(&mut rx).kind,
            TransportEventKind::CharacteristicRead {
                characteristic: LED_CHARACTERISTIC_UUID,
                value: b"0".to_vec()
            }
        );

        sim.write_characteristic(LED_CHARACTERISTIC_UUID, b"1", WriteMode::WithResponse)
            .await
            .unwrap();
        assert_eq!(
            recv(&mut rx).kind,
            TransportEventKind::CharacteristicWriteComplete {
                characteristic: LED_CHARACTERISTIC_UUID
            }
        );
        // The LED peripheral pushes its new state after a write.
        assert_eq!(
            recv(&mut rx).kind,
            TransportEventKind::CharacteristicChanged {
                characteristic: LED_CHARACTERISTIC_UUID,
                value: b"1".to_vec()
            }
        );

        sim.read_characteristic(LED_CHARACTERISTIC_UUID).await.unwrap();
        assert_eq!(
            recv(&mut rx).kind,
            TransportEventKind::CharacteristicRead {
                characteristic: LED_CHARACTERISTIC_UUID,
                value: b"1".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn stalled_reads_answer_nothing() {
        let mut device = SimDevice::led_demo();
        device.stall_reads = true;
        let (mut sim, mut rx) = SimTransport::new(device);

        sim.read_characteristic(LED_CHARACTERISTIC_UUID).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unacknowledged_writes_store_but_stay_silent() {
        let mut device = SimDevice::led_demo();
        device.notify_on_write = false;
        let (mut sim, mut rx) = SimTransport::new(device);

        sim.write_characteristic(LED_CHARACTERISTIC_UUID, b"1", WriteMode::WithoutResponse)
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());

        sim.read_characteristic(LED_CHARACTERISTIC_UUID).await.unwrap();
        assert_eq!(
            recv(&mut rx).kind,
            TransportEventKind::CharacteristicRead {
                characteristic: LED_CHARACTERISTIC_UUID,
                value: b"1".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn events_carry_the_connect_epoch() {
        let (mut sim, mut rx) = SimTransport::new(SimDevice::led_demo());
        let session = SessionId::new(7);

        sim.connect(session, &PeripheralId::from("sim:led")).await.unwrap();
        sim.discover_services().await.unwrap();

        assert_eq!(recv(&mut rx).session, session);
        assert_eq!(recv(&mut rx).session, session);
    }

    #[tokio::test]
    async fn scripted_connect_failure_reports_the_status() {
        let mut device = SimDevice::led_demo();
        device.fail_connect = Some(TransportError::new(133));
        let (mut sim, mut rx) = SimTransport::new(device);

        sim.connect(SessionId::new(1), &PeripheralId::from("sim:led"))
            .await
            .unwrap();
        assert_eq!(
            recv(&mut rx).kind,
            TransportEventKind::LinkFailed(TransportError::new(133))
        );
    }
}
