//! Transport-agnostic GATT client session.
//!
//! Models the client side of one BLE peripheral link as an event-driven
//! state machine: connect, discover services, enable notify/indicate
//! subscriptions, then serialized characteristic reads and writes plus
//! unsolicited value pushes. The machine never touches a radio; it drives
//! any implementation of [`session::Transport`] and reports everything that
//! happens as [`domain::models::SessionEvent`]s.
//!
//! Most embedders spawn the machine behind [`session::SessionService`] and
//! talk to it over channels:
//!
//! ```no_run
//! use gatt_session::infrastructure::sim::{SimDevice, SimTransport};
//! use gatt_session::session::{SessionConfig, SessionService};
//!
//! # fn main() -> anyhow::Result<()> {
//! let (transport, transport_events) = SimTransport::new(SimDevice::led_demo());
//! let (handle, mut events) =
//!     SessionService::spawn(SessionConfig::default(), transport, transport_events)?;
//!
//! handle.connect("sim:led")?;
//! while let Some(event) = events.blocking_recv() {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod infrastructure;
pub mod session;

pub use domain::models::{
    ConnectionState, ErrorKind, PeripheralId, SessionEvent, SessionId, TransportError, WriteMode,
};
pub use session::{
    Session, SessionCommand, SessionConfig, SessionHandle, SessionService, Transport,
    TransportEvent, TransportEventKind,
};
