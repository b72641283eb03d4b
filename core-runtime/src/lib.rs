//! # Core Runtime Module
//!
//! Ambient infrastructure shared by the player crates:
//! - Logging and tracing setup ([`logging`])
//! - Player configuration builder ([`config`])
//! - Typed event bus ([`events`])

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
