use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use common::Metadata;
use messaging::Message;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::{Flavour, FlavourError, FlavourKind, ProducedEvent};
use crate::error::Rejection;

/// Identity of a Rust type, compared when an engine is built.
#[derive(Debug, Clone, Copy)]
struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    fn same(self, other: TypeTag) -> bool {
        self.id == other.id
    }
}

type DebugFn = fn(&(dyn Any + Send + Sync), &mut fmt::Formatter<'_>) -> fmt::Result;

/// Type-erased aggregate state of the value-object flavour.
///
/// Cloning is cheap; the value itself is shared and never mutated.
#[derive(Clone)]
pub struct ObjectState {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    debug: DebugFn,
}

impl ObjectState {
    pub fn new<S>(value: S) -> Self
    where
        S: Any + Send + Sync + fmt::Debug,
    {
        Self {
            type_name: type_name::<S>(),
            value: Arc::new(value),
            debug: debug_as::<S>,
        }
    }

    pub fn downcast_ref<S: Any>(&self) -> Option<&S> {
        self.value.downcast_ref::<S>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

fn debug_as<S: Any + fmt::Debug>(
    value: &(dyn Any + Send + Sync),
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    match value.downcast_ref::<S>() {
        Some(value) => fmt::Debug::fmt(value, f),
        None => f.write_str("<opaque>"),
    }
}

impl fmt::Debug for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.debug)(self.value.as_ref(), f)
    }
}

/// Type-erased context value produced by a [`ValueContextProvider`].
#[derive(Clone)]
pub struct ObjectContext(Arc<dyn Any + Send + Sync>);

impl ObjectContext {
    pub fn new<X: Any + Send + Sync>(value: X) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<X: Any>(&self) -> Option<&X> {
        self.0.downcast_ref::<X>()
    }
}

/// A typed event recorded by a value-object handler.
#[derive(Debug)]
pub struct Recorded {
    name: String,
    payload: Result<Value, serde_json::Error>,
    metadata: Metadata,
}

impl Recorded {
    pub fn new<T: Serialize>(name: impl Into<String>, event: &T) -> Self {
        Self {
            name: name.into(),
            payload: serde_json::to_value(event),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn into_produced(self) -> Result<ProducedEvent, FlavourError> {
        let payload = self.payload.map_err(|source| FlavourError::Encode {
            message_name: self.name.clone(),
            source,
        })?;
        let mut event = ProducedEvent::from_json(self.name, payload)?;
        event.metadata = self.metadata;
        Ok(event)
    }
}

fn decode<T: DeserializeOwned>(message: &Message) -> Result<T, FlavourError> {
    message
        .payload_as::<T>()
        .map_err(|err| match err {
            messaging::MessagingError::Serialization(source) => FlavourError::Decode {
                message_name: message.name().to_string(),
                type_name: type_name::<T>(),
                source,
            },
            other => FlavourError::Aggregate {
                aggregate_type: message.name().to_string(),
                reason: other.to_string(),
            },
        })
}

fn prior<'a, S: Any>(state: Option<&'a ObjectState>, name: &str) -> Result<&'a S, FlavourError> {
    let state = state.ok_or_else(|| FlavourError::MissingState(name.to_string()))?;
    state
        .downcast_ref::<S>()
        .ok_or_else(|| FlavourError::StateTypeMismatch {
            aggregate_type: state.type_name().to_string(),
            expected: type_name::<S>(),
        })
}

fn context<'a, X: Any>(
    context: Option<&'a ObjectContext>,
    command: &Message,
) -> Result<&'a X, FlavourError> {
    context
        .and_then(|c| c.downcast_ref::<X>())
        .ok_or_else(|| FlavourError::ContextTypeMismatch {
            command_name: command.name().to_string(),
            expected: type_name::<X>(),
        })
}

fn produce(recorded: Vec<Recorded>) -> Result<Vec<ProducedEvent>, FlavourError> {
    recorded.into_iter().map(Recorded::into_produced).collect()
}

type HandlerFn = dyn Fn(Option<&ObjectState>, &Message, Option<&ObjectContext>) -> Result<Vec<ProducedEvent>, FlavourError>
    + Send
    + Sync;

/// A handler over typed commands.
#[derive(Clone)]
pub struct ValueHandler {
    call: Arc<HandlerFn>,
    state: Option<TypeTag>,
    context: Option<TypeTag>,
}

impl ValueHandler {
    fn from_fn<F>(state: Option<TypeTag>, context: Option<TypeTag>, f: F) -> Self
    where
        F: Fn(
                Option<&ObjectState>,
                &Message,
                Option<&ObjectContext>,
            ) -> Result<Vec<ProducedEvent>, FlavourError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            call: Arc::new(f),
            state,
            context,
        }
    }

    /// Handler that creates a new aggregate from command `C`.
    pub fn create<C, F>(f: F) -> Self
    where
        C: DeserializeOwned + 'static,
        F: Fn(C) -> Result<Vec<Recorded>, Rejection> + Send + Sync + 'static,
    {
        Self::from_fn(None, None, move |_, command, _| {
            let command = decode::<C>(command)?;
            produce(f(command)?)
        })
    }

    /// Like [`ValueHandler::create`], with a context of type `X`.
    pub fn create_with_context<C, X, F>(f: F) -> Self
    where
        C: DeserializeOwned + 'static,
        X: Any,
        F: Fn(C, &X) -> Result<Vec<Recorded>, Rejection> + Send + Sync + 'static,
    {
        Self::from_fn(None, Some(TypeTag::of::<X>()), move |_, message, ctx| {
            let ctx = context::<X>(ctx, message)?;
            let command = decode::<C>(message)?;
            produce(f(command, ctx)?)
        })
    }

    /// Handler that runs command `C` against existing state `S`.
    pub fn handle<S, C, F>(f: F) -> Self
    where
        S: Any,
        C: DeserializeOwned + 'static,
        F: Fn(&S, C) -> Result<Vec<Recorded>, Rejection> + Send + Sync + 'static,
    {
        Self::from_fn(Some(TypeTag::of::<S>()), None, move |state, message, _| {
            let state = prior::<S>(state, message.name())?;
            let command = decode::<C>(message)?;
            produce(f(state, command)?)
        })
    }

    /// Like [`ValueHandler::handle`], with a context of type `X`.
    pub fn handle_with_context<S, C, X, F>(f: F) -> Self
    where
        S: Any,
        C: DeserializeOwned + 'static,
        X: Any,
        F: Fn(&S, C, &X) -> Result<Vec<Recorded>, Rejection> + Send + Sync + 'static,
    {
        let (state_tag, context_tag) = (Some(TypeTag::of::<S>()), Some(TypeTag::of::<X>()));
        Self::from_fn(state_tag, context_tag, move |state, message, ctx| {
            let state = prior::<S>(state, message.name())?;
            let ctx = context::<X>(ctx, message)?;
            let command = decode::<C>(message)?;
            produce(f(state, command, ctx)?)
        })
    }
}

type ApplierFn =
    dyn Fn(Option<&ObjectState>, &Message) -> Result<ObjectState, FlavourError> + Send + Sync;

/// An apply function over typed events.
#[derive(Clone)]
pub struct ValueApplier {
    call: Arc<ApplierFn>,
    state: TypeTag,
}

impl ValueApplier {
    fn from_fn<S: Any, F>(f: F) -> Self
    where
        F: Fn(Option<&ObjectState>, &Message) -> Result<ObjectState, FlavourError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            call: Arc::new(f),
            state: TypeTag::of::<S>(),
        }
    }

    /// Apply function that builds a fresh state from event `E`.
    pub fn creates<S, E, F>(f: F) -> Self
    where
        S: Any + Send + Sync + fmt::Debug,
        E: DeserializeOwned + 'static,
        F: Fn(E) -> S + Send + Sync + 'static,
    {
        Self::from_fn::<S, _>(move |_, event| {
            let event = decode::<E>(event)?;
            Ok(ObjectState::new(f(event)))
        })
    }

    /// Apply function that derives the next state from the prior one.
    pub fn evolves<S, E, F>(f: F) -> Self
    where
        S: Any + Send + Sync + fmt::Debug,
        E: DeserializeOwned + 'static,
        F: Fn(&S, E) -> S + Send + Sync + 'static,
    {
        Self::from_fn::<S, _>(move |state, event| {
            let state = prior::<S>(state, event.name())?;
            let decoded = decode::<E>(event)?;
            Ok(ObjectState::new(f(state, decoded)))
        })
    }
}

/// Pre-processor over a typed command; the result replaces the payload.
#[derive(Clone)]
pub struct ValuePreProcessor(Arc<dyn Fn(Message) -> Result<Message, FlavourError> + Send + Sync>);

impl ValuePreProcessor {
    pub fn new<C, F>(f: F) -> Self
    where
        C: Serialize + DeserializeOwned + 'static,
        F: Fn(C) -> Result<C, Rejection> + Send + Sync + 'static,
    {
        Self(Arc::new(move |message: Message| -> Result<Message, FlavourError> {
            let command = f(decode::<C>(&message)?)?;
            let payload =
                serde_json::to_value(&command).map_err(|source| FlavourError::Encode {
                    message_name: message.name().to_string(),
                    source,
                })?;
            match payload {
                Value::Object(map) => Ok(message.with_payload(map)),
                _ => Err(FlavourError::PayloadNotAnObject(message.name().to_string())),
            }
        }))
    }
}

/// Context provider over a typed command.
#[derive(Clone)]
pub struct ValueContextProvider {
    call: Arc<dyn Fn(&Message) -> Result<ObjectContext, FlavourError> + Send + Sync>,
    context: TypeTag,
}

impl ValueContextProvider {
    pub fn new<C, X, F>(f: F) -> Self
    where
        C: DeserializeOwned + 'static,
        X: Any + Send + Sync,
        F: Fn(C) -> Result<X, Rejection> + Send + Sync + 'static,
    {
        Self {
            call: Arc::new(
                move |message: &Message| -> Result<ObjectContext, FlavourError> {
                    let command = decode::<C>(message)?;
                    Ok(ObjectContext::new(f(command)?))
                },
            ),
            context: TypeTag::of::<X>(),
        }
    }
}

#[derive(Clone, Copy)]
struct StateCodec {
    state: TypeTag,
    serialize: fn(&str, &ObjectState) -> Result<Value, FlavourError>,
    deserialize: fn(&str, Value) -> Result<ObjectState, FlavourError>,
}

fn serialize_as<S: Serialize + Any>(
    aggregate_type: &str,
    state: &ObjectState,
) -> Result<Value, FlavourError> {
    let typed = state
        .downcast_ref::<S>()
        .ok_or_else(|| FlavourError::StateTypeMismatch {
            aggregate_type: aggregate_type.to_string(),
            expected: type_name::<S>(),
        })?;
    serde_json::to_value(typed).map_err(|source| FlavourError::Encode {
        message_name: aggregate_type.to_string(),
        source,
    })
}

fn deserialize_as<S>(aggregate_type: &str, state: Value) -> Result<ObjectState, FlavourError>
where
    S: DeserializeOwned + Any + Send + Sync + fmt::Debug,
{
    let typed: S = serde_json::from_value(state).map_err(|source| FlavourError::Decode {
        message_name: aggregate_type.to_string(),
        type_name: type_name::<S>(),
        source,
    })?;
    Ok(ObjectState::new(typed))
}

/// Flavour where every message name maps to a concrete `serde` type.
///
/// State types must be registered per aggregate type with
/// [`ValueObjectFlavour::register_state`] to be snapshotted or returned from
/// queries.
#[derive(Clone, Default)]
pub struct ValueObjectFlavour {
    codecs: HashMap<String, StateCodec>,
}

impl fmt::Debug for ValueObjectFlavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueObjectFlavour")
            .field("states", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ValueObjectFlavour {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_state<S>(mut self, aggregate_type: impl Into<String>) -> Self
    where
        S: Serialize + DeserializeOwned + Any + Send + Sync + fmt::Debug,
    {
        self.codecs.insert(
            aggregate_type.into(),
            StateCodec {
                state: TypeTag::of::<S>(),
                serialize: serialize_as::<S>,
                deserialize: deserialize_as::<S>,
            },
        );
        self
    }

    fn codec(&self, aggregate_type: &str) -> Result<StateCodec, FlavourError> {
        self.codecs
            .get(aggregate_type)
            .copied()
            .ok_or_else(|| FlavourError::UnregisteredState(aggregate_type.to_string()))
    }
}

impl Flavour for ValueObjectFlavour {
    type State = ObjectState;
    type Context = ObjectContext;
    type Handler = ValueHandler;
    type Applier = ValueApplier;
    type PreProcessor = ValuePreProcessor;
    type ContextProvider = ValueContextProvider;

    fn kind(&self) -> FlavourKind {
        FlavourKind::ValueObject
    }

    fn call_pre_processor(
        &self,
        pre_processor: &ValuePreProcessor,
        command: Message,
    ) -> Result<Message, FlavourError> {
        (pre_processor.0)(command)
    }

    fn call_context_provider(
        &self,
        provider: &ValueContextProvider,
        command: &Message,
    ) -> Result<ObjectContext, FlavourError> {
        (provider.call)(command)
    }

    fn call_aggregate_factory(
        &self,
        _aggregate_type: &str,
        handler: &ValueHandler,
        command: &Message,
        context: Option<&ObjectContext>,
    ) -> Result<Vec<ProducedEvent>, FlavourError> {
        (handler.call)(None, command, context)
    }

    fn call_aggregate_function(
        &self,
        _aggregate_type: &str,
        handler: &ValueHandler,
        state: &ObjectState,
        command: &Message,
        context: Option<&ObjectContext>,
    ) -> Result<Vec<ProducedEvent>, FlavourError> {
        (handler.call)(Some(state), command, context)
    }

    fn apply_first_event(
        &self,
        _aggregate_type: &str,
        applier: &ValueApplier,
        event: &Message,
    ) -> Result<ObjectState, FlavourError> {
        (applier.call)(None, event)
    }

    fn apply_subsequent_event(
        &self,
        _aggregate_type: &str,
        applier: &ValueApplier,
        state: ObjectState,
        event: &Message,
    ) -> Result<ObjectState, FlavourError> {
        (applier.call)(Some(&state), event)
    }

    fn serialize_state(
        &self,
        aggregate_type: &str,
        state: &ObjectState,
    ) -> Result<Value, FlavourError> {
        (self.codec(aggregate_type)?.serialize)(aggregate_type, state)
    }

    fn reconstitute_state(
        &self,
        aggregate_type: &str,
        state: Value,
    ) -> Result<ObjectState, FlavourError> {
        (self.codec(aggregate_type)?.deserialize)(aggregate_type, state)
    }

    /// The registered state type wins; without one, the apply functions of
    /// the aggregate must agree among themselves.
    fn check_bindings(
        &self,
        aggregate_type: &str,
        command_name: &str,
        handler: &ValueHandler,
        context_provider: Option<&ValueContextProvider>,
        appliers: &[&ValueApplier],
    ) -> Result<(), FlavourError> {
        let expected = self
            .codecs
            .get(aggregate_type)
            .map(|codec| codec.state)
            .or_else(|| appliers.first().map(|applier| applier.state));
        if let Some(expected) = expected {
            let mismatch = appliers
                .iter()
                .map(|applier| applier.state)
                .chain(handler.state)
                .find(|tag| !tag.same(expected));
            if let Some(found) = mismatch {
                return Err(FlavourError::StateTypeMismatch {
                    aggregate_type: aggregate_type.to_string(),
                    expected: found.name,
                });
            }
        }

        if let Some(wanted) = handler.context {
            let provided = context_provider.map(|provider| provider.context);
            if provided.is_none_or(|tag| !tag.same(wanted)) {
                return Err(FlavourError::ContextTypeMismatch {
                    command_name: command_name.to_string(),
                    expected: wanted.name,
                });
            }
        }
        Ok(())
    }
}
