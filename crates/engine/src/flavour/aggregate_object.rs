use std::fmt;
use std::sync::Arc;

use messaging::Message;
use serde_json::Value;

use super::{Flavour, FlavourError, FlavourKind, ProducedEvent};
use crate::error::Rejection;

/// Bridge between the engine and a stateful aggregate object.
///
/// Aggregates record events on themselves while handling a command; the
/// engine pops them afterwards. Applying events back onto an aggregate must be
/// free of side effects.
pub trait AggregatePort: Send + Sync + 'static {
    type Aggregate: Clone + Send + Sync + fmt::Debug + 'static;
    type Context: Send + Sync + 'static;

    /// Drains the events recorded since the last call.
    fn pop_recorded_events(&self, aggregate: &mut Self::Aggregate) -> Vec<ProducedEvent>;

    fn apply_event(
        &self,
        aggregate: &mut Self::Aggregate,
        event: &Message,
    ) -> Result<(), FlavourError>;

    fn serialize_aggregate(&self, aggregate: &Self::Aggregate) -> Result<Value, FlavourError>;

    /// Rebuilds an aggregate from its history, which is never empty.
    fn reconstitute_aggregate(
        &self,
        aggregate_type: &str,
        history: &[Message],
    ) -> Result<Self::Aggregate, FlavourError>;

    /// Restores an aggregate from the output of
    /// [`AggregatePort::serialize_aggregate`].
    fn restore_aggregate(
        &self,
        aggregate_type: &str,
        state: Value,
    ) -> Result<Self::Aggregate, FlavourError>;
}

type FactoryFn<A, X> = dyn Fn(&Message, Option<&X>) -> Result<A, Rejection> + Send + Sync;
type MethodFn<A, X> = dyn Fn(&mut A, &Message, Option<&X>) -> Result<(), Rejection> + Send + Sync;

/// How a command reaches an aggregate object.
pub enum AggregateHandler<A, X> {
    /// Creates a new aggregate, which records its first events.
    Factory(Arc<FactoryFn<A, X>>),
    /// Calls a method on the existing aggregate.
    Method(Arc<MethodFn<A, X>>),
}

impl<A, X> AggregateHandler<A, X> {
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&Message, Option<&X>) -> Result<A, Rejection> + Send + Sync + 'static,
    {
        AggregateHandler::Factory(Arc::new(f))
    }

    pub fn method<F>(f: F) -> Self
    where
        F: Fn(&mut A, &Message, Option<&X>) -> Result<(), Rejection> + Send + Sync + 'static,
    {
        AggregateHandler::Method(Arc::new(f))
    }
}

impl<A, X> Clone for AggregateHandler<A, X> {
    fn clone(&self) -> Self {
        match self {
            AggregateHandler::Factory(f) => AggregateHandler::Factory(Arc::clone(f)),
            AggregateHandler::Method(f) => AggregateHandler::Method(Arc::clone(f)),
        }
    }
}

/// Apply marker: aggregate objects apply their own events through the port.
///
/// Binding it per event name keeps the apply map explicit, so unknown event
/// names are still caught before anything is appended.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateApply;

pub type AggregatePreProcessor = Arc<dyn Fn(Message) -> Result<Message, Rejection> + Send + Sync>;
pub type AggregateContextProvider<X> =
    Arc<dyn Fn(&Message) -> Result<X, Rejection> + Send + Sync>;

/// Flavour where the aggregate is a stateful object exposing command methods.
pub struct AggregateObjectFlavour<P: AggregatePort> {
    port: P,
}

impl<P: AggregatePort> AggregateObjectFlavour<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn pre_processor<F>(f: F) -> AggregatePreProcessor
    where
        F: Fn(Message) -> Result<Message, Rejection> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    pub fn context_provider<F>(f: F) -> AggregateContextProvider<P::Context>
    where
        F: Fn(&Message) -> Result<P::Context, Rejection> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    fn method_on_new(aggregate_type: &str) -> FlavourError {
        FlavourError::Aggregate {
            aggregate_type: aggregate_type.to_string(),
            reason: "a method handler cannot create an aggregate".to_string(),
        }
    }
}

impl<P: AggregatePort> Flavour for AggregateObjectFlavour<P> {
    type State = P::Aggregate;
    type Context = P::Context;
    type Handler = AggregateHandler<P::Aggregate, P::Context>;
    type Applier = AggregateApply;
    type PreProcessor = AggregatePreProcessor;
    type ContextProvider = AggregateContextProvider<P::Context>;

    fn kind(&self) -> FlavourKind {
        FlavourKind::AggregateObject
    }

    fn call_pre_processor(
        &self,
        pre_processor: &Self::PreProcessor,
        command: Message,
    ) -> Result<Message, FlavourError> {
        Ok(pre_processor(command)?)
    }

    fn call_context_provider(
        &self,
        provider: &Self::ContextProvider,
        command: &Message,
    ) -> Result<P::Context, FlavourError> {
        Ok(provider(command)?)
    }

    fn call_aggregate_factory(
        &self,
        aggregate_type: &str,
        handler: &Self::Handler,
        command: &Message,
        context: Option<&P::Context>,
    ) -> Result<Vec<ProducedEvent>, FlavourError> {
        match handler {
            AggregateHandler::Factory(factory) => {
                let mut aggregate = factory(command, context)?;
                Ok(self.port.pop_recorded_events(&mut aggregate))
            }
            AggregateHandler::Method(_) => Err(Self::method_on_new(aggregate_type)),
        }
    }

    fn call_aggregate_function(
        &self,
        aggregate_type: &str,
        handler: &Self::Handler,
        state: &P::Aggregate,
        command: &Message,
        context: Option<&P::Context>,
    ) -> Result<Vec<ProducedEvent>, FlavourError> {
        match handler {
            AggregateHandler::Method(method) => {
                let mut aggregate = state.clone();
                method(&mut aggregate, command, context)?;
                Ok(self.port.pop_recorded_events(&mut aggregate))
            }
            AggregateHandler::Factory(_) => Err(FlavourError::Aggregate {
                aggregate_type: aggregate_type.to_string(),
                reason: "a factory handler cannot run against an existing aggregate".to_string(),
            }),
        }
    }

    fn apply_first_event(
        &self,
        aggregate_type: &str,
        _applier: &AggregateApply,
        event: &Message,
    ) -> Result<P::Aggregate, FlavourError> {
        self.port
            .reconstitute_aggregate(aggregate_type, std::slice::from_ref(event))
    }

    fn apply_subsequent_event(
        &self,
        _aggregate_type: &str,
        _applier: &AggregateApply,
        mut state: P::Aggregate,
        event: &Message,
    ) -> Result<P::Aggregate, FlavourError> {
        self.port.apply_event(&mut state, event)?;
        Ok(state)
    }

    fn serialize_state(
        &self,
        _aggregate_type: &str,
        state: &P::Aggregate,
    ) -> Result<Value, FlavourError> {
        self.port.serialize_aggregate(state)
    }

    fn reconstitute_state(
        &self,
        aggregate_type: &str,
        state: Value,
    ) -> Result<P::Aggregate, FlavourError> {
        self.port.restore_aggregate(aggregate_type, state)
    }
}
