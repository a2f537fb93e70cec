//! # Synergia Common
//!
//! Foundation utilities shared by the other workspace crates.
//!
//! Currently this is the clock abstraction: every time-dependent component
//! (cache staleness, token expiry) takes a [`time::Clock`] so tests can run
//! against [`time::MockClock`] without real time passing.

pub mod time;

pub use time::{Clock, MockClock, SystemClock};
