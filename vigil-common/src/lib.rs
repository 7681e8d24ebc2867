//! # Vigil Common Library
//!
//! Shared code for the Vigil services including:
//! - Error and result types
//! - Event types (VigilEvent enum) and the broadcast EventBus
//! - Shared risk vocabulary (RiskLevel, CrisisState)
//! - TOML configuration loading and path resolution
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{CrisisState, EventBus, RiskLevel, VigilEvent};
