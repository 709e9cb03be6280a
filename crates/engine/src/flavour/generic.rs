use std::sync::Arc;

use messaging::Message;
use serde_json::Value;

use super::{Flavour, FlavourError, FlavourKind, ProducedEvent};
use crate::error::Rejection;

/// Handler over raw messages: `(prior state, command, context) -> events`.
///
/// The prior state is `None` for commands that create an aggregate.
pub type GenericHandler = Arc<
    dyn Fn(Option<&Value>, &Message, Option<&Value>) -> Result<Vec<ProducedEvent>, Rejection>
        + Send
        + Sync,
>;

/// Apply function over raw messages: `(prior state, event) -> state`.
pub type GenericApplier = Arc<dyn Fn(Option<Value>, &Message) -> Value + Send + Sync>;

pub type GenericPreProcessor = Arc<dyn Fn(Message) -> Result<Message, Rejection> + Send + Sync>;

pub type GenericContextProvider = Arc<dyn Fn(&Message) -> Result<Value, Rejection> + Send + Sync>;

/// Flavour where payloads are used directly as JSON maps and state is a
/// `serde_json::Value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericFlavour;

impl GenericFlavour {
    pub fn new() -> Self {
        Self
    }

    /// Wraps a closure as a handler.
    pub fn handler<F>(f: F) -> GenericHandler
    where
        F: Fn(Option<&Value>, &Message, Option<&Value>) -> Result<Vec<ProducedEvent>, Rejection>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(f)
    }

    /// Wraps a closure as an apply function.
    pub fn applier<F>(f: F) -> GenericApplier
    where
        F: Fn(Option<Value>, &Message) -> Value + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    pub fn pre_processor<F>(f: F) -> GenericPreProcessor
    where
        F: Fn(Message) -> Result<Message, Rejection> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    pub fn context_provider<F>(f: F) -> GenericContextProvider
    where
        F: Fn(&Message) -> Result<Value, Rejection> + Send + Sync + 'static,
    {
        Arc::new(f)
    }
}

impl Flavour for GenericFlavour {
    type State = Value;
    type Context = Value;
    type Handler = GenericHandler;
    type Applier = GenericApplier;
    type PreProcessor = GenericPreProcessor;
    type ContextProvider = GenericContextProvider;

    fn kind(&self) -> FlavourKind {
        FlavourKind::Generic
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
    ) -> Result<Value, FlavourError> {
        Ok(provider(command)?)
    }

    fn call_aggregate_factory(
        &self,
        _aggregate_type: &str,
        handler: &Self::Handler,
        command: &Message,
        context: Option<&Value>,
    ) -> Result<Vec<ProducedEvent>, FlavourError> {
        Ok(handler(None, command, context)?)
    }

    fn call_aggregate_function(
        &self,
        _aggregate_type: &str,
        handler: &Self::Handler,
        state: &Value,
        command: &Message,
        context: Option<&Value>,
    ) -> Result<Vec<ProducedEvent>, FlavourError> {
        Ok(handler(Some(state), command, context)?)
    }

    fn apply_first_event(
        &self,
        _aggregate_type: &str,
        applier: &Self::Applier,
        event: &Message,
    ) -> Result<Value, FlavourError> {
        Ok(applier(None, event))
    }

    fn apply_subsequent_event(
        &self,
        _aggregate_type: &str,
        applier: &Self::Applier,
        state: Value,
        event: &Message,
    ) -> Result<Value, FlavourError> {
        Ok(applier(Some(state), event))
    }

    fn serialize_state(&self, _aggregate_type: &str, state: &Value) -> Result<Value, FlavourError> {
        Ok(state.clone())
    }

    fn reconstitute_state(&self, _aggregate_type: &str, state: Value) -> Result<Value, FlavourError> {
        Ok(state)
    }
}
