//! Release publishing: an HTTP adapter for the release host and the
//! idempotent create-or-replace protocol for floating tags.

pub mod client;
pub mod publisher;

pub use client::HttpReleaseHost;
pub use publisher::{AssetPayload, Publisher};
