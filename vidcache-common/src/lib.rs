//! # vidcache Common Library
//!
//! Shared code for the vidcache crates:
//! - Error types
//! - Scan events and the broadcast hub (EventBus)
//! - Scan and schedule settings
//! - Configuration loading
//! - Identifier and duration helpers

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod ids;
pub mod settings;

pub use error::{Error, Result};
