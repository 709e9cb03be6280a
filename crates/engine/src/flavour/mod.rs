//! Adapters between the engine's generic messages and user-chosen shapes.
//!
//! The engine is written once against [`Flavour`]. A flavour decides what a
//! handler, an apply function and an aggregate state look like:
//!
//! - [`GenericFlavour`]: JSON payloads and closures over [`Message`]
//! - [`ValueObjectFlavour`]: typed `serde` values per message name
//! - [`AggregateObjectFlavour`]: stateful aggregate objects behind an [`AggregatePort`]

mod aggregate_object;
mod generic;
mod value_object;

use std::fmt;

use common::{AggregateId, Metadata, Payload};
use messaging::Message;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::Rejection;

pub use aggregate_object::{
    AggregateApply, AggregateContextProvider, AggregateHandler, AggregateObjectFlavour,
    AggregatePort, AggregatePreProcessor,
};
pub use generic::{
    GenericApplier, GenericContextProvider, GenericFlavour, GenericHandler, GenericPreProcessor,
};
pub use value_object::{
    ObjectContext, ObjectState, Recorded, ValueApplier, ValueContextProvider, ValueHandler,
    ValueObjectFlavour, ValuePreProcessor,
};

/// Which message-authoring style a flavour implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlavourKind {
    Generic,
    ValueObject,
    AggregateObject,
}

impl fmt::Display for FlavourKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlavourKind::Generic => "generic",
            FlavourKind::ValueObject => "value-object",
            FlavourKind::AggregateObject => "aggregate-object",
        };
        f.write_str(name)
    }
}

/// An event yielded by a handler, before the engine assigns identity and
/// stream metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducedEvent {
    pub name: String,
    pub payload: Payload,
    pub metadata: Metadata,
}

impl ProducedEvent {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
            metadata: Metadata::new(),
        }
    }

    /// Creates an event from a JSON value, which must be an object.
    pub fn from_json(name: impl Into<String>, payload: Value) -> Result<Self, FlavourError> {
        let name = name.into();
        match payload {
            Value::Object(map) => Ok(Self::new(name, map)),
            _ => Err(FlavourError::PayloadNotAnObject(name)),
        }
    }

    /// Creates an event from any serializable value.
    pub fn from_value<T: Serialize>(name: impl Into<String>, value: &T) -> Result<Self, FlavourError> {
        let name = name.into();
        let payload = serde_json::to_value(value).map_err(|source| FlavourError::Encode {
            message_name: name.clone(),
            source,
        })?;
        Self::from_json(name, payload)
    }

    /// Adds a metadata entry carried over onto the recorded event.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Errors raised inside a flavour while translating or invoking user code.
#[derive(Debug, Error)]
pub enum FlavourError {
    /// User code rejected the message.
    #[error("{0}")]
    Rejected(Rejection),

    #[error("aggregate identifier {key} is missing")]
    MissingIdentifier { key: String },

    #[error("cannot decode {message_name} into {type_name}: {source}")]
    Decode {
        message_name: String,
        type_name: &'static str,
        source: serde_json::Error,
    },

    #[error("cannot encode {message_name}: {source}")]
    Encode {
        message_name: String,
        source: serde_json::Error,
    },

    #[error("payload of {0} must be a JSON object")]
    PayloadNotAnObject(String),

    /// A handler or apply function for existing aggregates ran without state.
    #[error("{0} needs prior aggregate state")]
    MissingState(String),

    #[error("aggregate state of {aggregate_type} is not a {expected}")]
    StateTypeMismatch {
        aggregate_type: String,
        expected: &'static str,
    },

    #[error("context of {command_name} is not a {expected}")]
    ContextTypeMismatch {
        command_name: String,
        expected: &'static str,
    },

    #[error("no state type registered for aggregate {0}")]
    UnregisteredState(String),

    /// The aggregate object itself failed.
    #[error("aggregate {aggregate_type} failed: {reason}")]
    Aggregate {
        aggregate_type: String,
        reason: String,
    },
}

impl From<Rejection> for FlavourError {
    fn from(rejection: Rejection) -> Self {
        FlavourError::Rejected(rejection)
    }
}

/// The capability set the engine dispatches through.
///
/// One flavour is chosen per engine. Its associated types fix the shape of
/// everything registered in process descriptions.
pub trait Flavour: Send + Sync + 'static {
    /// Aggregate state as seen by handlers and query callers.
    type State: Clone + Send + Sync + fmt::Debug + 'static;
    /// Read-only value produced by a context provider.
    type Context: Send + Sync + 'static;
    type Handler: Send + Sync + 'static;
    type Applier: Send + Sync + 'static;
    type PreProcessor: Send + Sync + 'static;
    type ContextProvider: Send + Sync + 'static;

    fn kind(&self) -> FlavourKind;

    /// Reads the aggregate identity from a command.
    ///
    /// Strings are taken as-is and numbers are rendered; anything else counts
    /// as missing.
    fn extract_identity(&self, key: &str, command: &Message) -> Result<AggregateId, FlavourError> {
        match command.get(key) {
            Some(Value::String(id)) if !id.is_empty() => Ok(AggregateId::from(id.as_str())),
            Some(Value::Number(id)) => Ok(AggregateId::from(id.to_string())),
            _ => Err(FlavourError::MissingIdentifier {
                key: key.to_string(),
            }),
        }
    }

    fn call_pre_processor(
        &self,
        pre_processor: &Self::PreProcessor,
        command: Message,
    ) -> Result<Message, FlavourError>;

    fn call_context_provider(
        &self,
        provider: &Self::ContextProvider,
        command: &Message,
    ) -> Result<Self::Context, FlavourError>;

    /// Runs a handler that creates a new aggregate.
    fn call_aggregate_factory(
        &self,
        aggregate_type: &str,
        handler: &Self::Handler,
        command: &Message,
        context: Option<&Self::Context>,
    ) -> Result<Vec<ProducedEvent>, FlavourError>;

    /// Runs a handler against the state of an existing aggregate.
    fn call_aggregate_function(
        &self,
        aggregate_type: &str,
        handler: &Self::Handler,
        state: &Self::State,
        command: &Message,
        context: Option<&Self::Context>,
    ) -> Result<Vec<ProducedEvent>, FlavourError>;

    /// Builds the initial state from the first event of a stream.
    fn apply_first_event(
        &self,
        aggregate_type: &str,
        applier: &Self::Applier,
        event: &Message,
    ) -> Result<Self::State, FlavourError>;

    fn apply_subsequent_event(
        &self,
        aggregate_type: &str,
        applier: &Self::Applier,
        state: Self::State,
        event: &Message,
    ) -> Result<Self::State, FlavourError>;

    fn serialize_state(&self, aggregate_type: &str, state: &Self::State)
    -> Result<Value, FlavourError>;

    /// Restores state from a snapshot produced by [`Flavour::serialize_state`].
    fn reconstitute_state(&self, aggregate_type: &str, state: Value)
    -> Result<Self::State, FlavourError>;

    /// Checks, when the engine is built, that a command's handler and context
    /// provider agree with the apply functions of its aggregate type on the
    /// state and context they exchange. Untyped flavours accept anything.
    fn check_bindings(
        &self,
        _aggregate_type: &str,
        _command_name: &str,
        _handler: &Self::Handler,
        _context_provider: Option<&Self::ContextProvider>,
        _appliers: &[&Self::Applier],
    ) -> Result<(), FlavourError> {
        Ok(())
    }
}
