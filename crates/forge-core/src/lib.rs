//! Forge CD Core
//!
//! Core domain types, traits, and error handling for Forge CD.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used across all other crates.

pub mod artifact;
pub mod condition;
pub mod context;
pub mod error;
pub mod ids;
pub mod pipeline;
pub mod ports;
pub mod release;
pub mod run;

pub use error::{Error, Result};
pub use ids::*;
