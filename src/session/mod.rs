//! Session Module
//!
//! Drives one GATT client session over any [`transport::Transport`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     SessionService                       │
//! │   (thread-hosted loop - commands in, events out)         │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Session                           │
//! │   (state machine - owns all connection state)            │
//! └───┬──────────────┬──────────────┬──────────────┬────────┘
//!     │              │              │              │
//!     ▼              ▼              ▼              ▼
//! ┌─────────┐  ┌──────────┐  ┌───────────┐  ┌──────────┐
//! │ registry │  │ pending  │  │ dispatch  │  │ transport │
//! │          │  │          │  │           │  │           │
//! │ - lookup │  │ - single │  │ - observer│  │ - BLE     │
//! │   by UUID│  │   slot   │  │   fan-out │  │   seam    │
//! └─────────┘  └──────────┘  └───────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`gatt`] - Protocol constants, characteristic properties, discovery tree
//! - [`transport`] - Capability trait onto the underlying BLE stack
//! - [`registry`] - Per-discovery characteristic lookup
//! - [`pending`] - Single-slot in-flight request tracker
//! - [`dispatch`] - Observer fan-out for session events
//! - [`machine`] - The session state machine itself
//! - [`service`] - Thread-hosted command loop around the machine

pub mod dispatch;
pub mod gatt;
pub mod machine;
pub mod pending;
pub mod registry;
pub mod service;
pub mod transport;

// Re-export the pieces embedders touch most
pub use machine::{Session, SessionConfig};
pub use service::{SessionCommand, SessionHandle, SessionService};
pub use transport::{Transport, TransportEvent, TransportEventKind};
