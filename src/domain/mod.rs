//! Domain types: the session vocabulary and persisted settings.

pub mod models;
pub mod settings;
