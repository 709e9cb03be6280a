//! Messaging primitives for the engine.
//!
//! This crate provides:
//! - [`Message`], the immutable envelope for commands, events and queries
//! - [`WireMessage`], the shape messages take at the transport boundary
//! - The schema gate: [`SchemaValidator`] and the built-in [`JsonSchemaValidator`]
//! - [`SchemaRegistry`], mapping message names to their type and schema

pub mod error;
pub mod message;
pub mod registry;
pub mod schema;
pub mod wire;

pub use common::{Metadata, Payload};
pub use error::{MessagingError, Result};
pub use message::{Message, MessageBuilder, MessageId, MessageType, meta};
pub use registry::{SchemaEntry, SchemaRegistry};
pub use schema::{FieldViolation, JsonSchemaValidator, Schema, SchemaValidator, ValidationError};
pub use wire::WireMessage;
