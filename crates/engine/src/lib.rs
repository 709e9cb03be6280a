//! Aggregate command handling and event replay.
//!
//! An [`Engine`] is built from a [`Flavour`], a [`SchemaRegistry`](messaging::SchemaRegistry),
//! an [`EventStore`](event_store::EventStore) and a set of [`ProcessDescription`]s.
//! Dispatching a command loads the aggregate's stream, folds it into state,
//! runs the bound handler, validates and appends the recorded events, and
//! broadcasts them to subscribers and process managers.

pub mod config;
pub mod conversion;
pub mod description;
pub mod engine;
pub mod error;
pub mod flavour;
pub mod outcome;
pub mod projector;
pub mod query;
pub mod subscriber;

pub use config::EngineConfig;
pub use conversion::{envelope_from_message, message_from_envelope, messages_from_envelopes};
pub use description::{AggregateDescription, ProcessDescription};
pub use engine::{DispatchStage, Engine, EngineBuilder};
pub use error::{ConfigError, EngineError, ErrorResponse, Rejection, Result};
pub use flavour::{
    AggregateApply, AggregateHandler, AggregateObjectFlavour, AggregatePort, Flavour,
    FlavourError, FlavourKind, GenericFlavour, ObjectContext, ObjectState, ProducedEvent,
    Recorded, ValueApplier, ValueContextProvider, ValueHandler, ValueObjectFlavour,
    ValuePreProcessor,
};
pub use outcome::{BroadcastReport, CommandOutcome, DeliveryFailure, DispatchOutcome, FollowUpFailure};
pub use projector::StateProjector;
pub use query::{
    AggregateStateLoader, AggregateStateResolver, DeferredQueryResolver, QueryContext,
    QueryDescription, QueryError, QueryResolver, Resolver, ResultSlot,
};
pub use subscriber::{EventSubscriber, ProcessManager, SubscriberError};
