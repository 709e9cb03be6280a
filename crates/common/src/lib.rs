//! Shared types used across the engine crates.

pub mod types;

pub use types::{AggregateId, Metadata, Payload};
