//! Reaction abstractions: the port the adapter implements, the event and
//! snapshot types flowing through it, and outbound throttling.

pub mod port;
pub mod throttle;
pub mod types;
