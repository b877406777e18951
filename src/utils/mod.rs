// src/utils/mod.rs
//! Common utilities shared across the rig core

pub mod time;

pub use time::{default_session_name, Clock, MockClock, SystemClock};
