//! Demo binary: scripts the LED happy path against the simulated
//! peripheral and logs everything the session reports.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use gatt_session::domain::settings::SettingsService;
use gatt_session::infrastructure::logging;
use gatt_session::infrastructure::sim::{SimDevice, SimTransport};
use gatt_session::{ConnectionState, SessionConfig, SessionEvent, SessionService};

const EVENT_WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let mut settings_service = SettingsService::new().context("failed to load settings")?;
    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)?;

    info!("starting LED session demo");

    let config = SessionConfig::from_settings(settings_service.get())?;
    let (transport, transport_events) = SimTransport::new(SimDevice::led_demo());
    let (handle, mut events) = SessionService::spawn(config, transport, transport_events)?;

    let peripheral = settings_service
        .get()
        .last_peripheral
        .clone()
        .unwrap_or_else(|| "sim:led".to_string());
    handle.connect(peripheral.as_str())?;
    if let Err(error) = settings_service.remember_peripheral(&peripheral) {
        warn!("could not persist the peripheral id: {}", error);
    }

    wait_for(&mut events, |event| {
        matches!(event, SessionEvent::StateChanged(ConnectionState::Ready))
    })
    .await?;

    // With no value seen yet the first toggle switches the LED on and the
    // second switches it back off; the peripheral pushes each new state as
    // a notification.
    handle.toggle()?;
    wait_for(&mut events, |event| matches!(event, SessionEvent::DataChanged(_))).await?;
    handle.toggle()?;
    wait_for(&mut events, |event| matches!(event, SessionEvent::DataChanged(_))).await?;

    handle.read()?;
    wait_for(&mut events, |event| matches!(event, SessionEvent::ReadCompleted(_))).await?;

    handle.disconnect()?;
    wait_for(&mut events, |event| {
        matches!(
            event,
            SessionEvent::StateChanged(ConnectionState::Disconnected)
        )
    })
    .await?;

    handle.shutdown()?;
    info!("demo complete");
    Ok(())
}

/// Log every event until one matches `accept`.
async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    accept: impl Fn(&SessionEvent) -> bool,
) -> Result<()> {
    loop {
        let event = timeout(EVENT_WAIT, events.recv())
            .await
            .context("timed out waiting for a session event")?
            .context("session event channel closed")?;
        log_event(&event);
        if accept(&event) {
            return Ok(());
        }
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => info!("state: {}", state),
        SessionEvent::DataChanged(value) => info!("peripheral pushed {}", printable(value)),
        SessionEvent::ReadCompleted(value) => info!("read back {}", printable(value)),
        SessionEvent::WriteCompleted(value) => info!("wrote {}", printable(value)),
        SessionEvent::OperationFailed(error) => warn!("operation failed: {}", error),
    }
}

fn printable(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(text) => format!("{:?}", text),
        Err(_) => format!("{:02x?}", value),
    }
}
