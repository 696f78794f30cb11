//! Core domain + application logic for the topic reaction bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind a
//! port (trait) implemented in the adapter crate; the core only knows how to
//! set/clear a reaction, read reaction counts, and receive message events.

pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod reactions;

pub use errors::{Error, Result};
