//! Host-facing plumbing: logging setup and the simulated peripheral.

pub mod logging;
pub mod sim;
