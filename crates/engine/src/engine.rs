//! The dispatch engine.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use event_store::{AppendOptions, EventStore, EventStoreExt, Snapshot, StreamId, Version};
use messaging::{
    JsonSchemaValidator, Message, MessageType, SchemaRegistry, SchemaValidator, WireMessage, meta,
};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::conversion::{envelope_from_message, messages_from_envelopes};
use crate::description::{
    AggregateDescription, CommandBinding, ProcessDescription, compile, expect_registered,
};
use crate::error::{ConfigError, EngineError, Result};
use crate::flavour::Flavour;
use crate::outcome::{BroadcastReport, CommandOutcome, DeliveryFailure, DispatchOutcome, FollowUpFailure};
use crate::projector::StateProjector;
use crate::query::{AggregateStateLoader, QueryContext, QueryDescription};
use crate::subscriber::{EventSubscriber, ProcessManager};

/// Stages a command passes through during dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Received,
    Validated,
    Loaded,
    PreProcessed,
    Handled,
    EventsValidated,
    Appended,
    Broadcast,
    Complete,
    Failed(&'static str),
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStage::Failed(code) => write!(f, "failed({code})"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

fn enter(stage: DispatchStage, command_name: &str) {
    tracing::debug!(command = %command_name, stage = %stage, "dispatch stage");
}

/// Builds an [`Engine`] from a flavour, registered schemas and a store.
pub struct EngineBuilder<S, F: Flavour> {
    flavour: F,
    schemas: SchemaRegistry,
    store: S,
    validator: Arc<dyn SchemaValidator>,
    config: EngineConfig,
    processes: Vec<ProcessDescription<F>>,
    queries: Vec<QueryDescription>,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    process_managers: Vec<Arc<dyn ProcessManager>>,
}

impl<S, F> EngineBuilder<S, F>
where
    S: EventStore + 'static,
    F: Flavour,
{
    pub fn new(flavour: F, schemas: SchemaRegistry, store: S) -> Self {
        Self {
            flavour,
            schemas,
            store,
            validator: Arc::new(JsonSchemaValidator::new()),
            config: EngineConfig::default(),
            processes: Vec::new(),
            queries: Vec::new(),
            subscribers: Vec::new(),
            process_managers: Vec::new(),
        }
    }

    /// Replaces the built-in JSON schema validator.
    pub fn validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn process(mut self, description: ProcessDescription<F>) -> Self {
        self.processes.push(description);
        self
    }

    pub fn query(mut self, description: QueryDescription) -> Self {
        self.queries.push(description);
        self
    }

    /// Adds a subscriber; subscribers receive events in registration order.
    pub fn subscribe(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn process_manager(mut self, manager: Arc<dyn ProcessManager>) -> Self {
        self.process_managers.push(manager);
        self
    }

    /// Validates every description against the schema registry.
    pub fn build(self) -> std::result::Result<Engine<S, F>, ConfigError> {
        if self.config.watch_capacity == 0 {
            return Err(ConfigError::ZeroWatchCapacity);
        }
        let compiled = compile(&self.flavour, self.processes, &self.schemas)?;

        let mut queries = HashMap::new();
        for description in self.queries {
            let name = description.query_name().to_string();
            if queries.contains_key(&name) {
                return Err(ConfigError::DuplicateQuery(name));
            }
            expect_registered(&self.schemas, &name, MessageType::Query)?;
            queries.insert(name, description);
        }

        let (watch, _) = broadcast::channel(self.config.watch_capacity);

        tracing::info!(
            flavour = %self.flavour.kind(),
            commands = compiled.commands.len(),
            aggregates = compiled.aggregates.len(),
            queries = queries.len(),
            subscribers = self.subscribers.len(),
            process_managers = self.process_managers.len(),
            "engine built"
        );

        Ok(Engine {
            inner: Arc::new(EngineInner {
                flavour: self.flavour,
                schemas: self.schemas,
                store: self.store,
                validator: self.validator,
                config: self.config,
                commands: compiled.commands,
                aggregates: compiled.aggregates,
                queries,
                subscribers: self.subscribers,
                process_managers: self.process_managers,
                watch,
            }),
        })
    }
}

struct EngineInner<S, F: Flavour> {
    flavour: F,
    schemas: SchemaRegistry,
    store: S,
    validator: Arc<dyn SchemaValidator>,
    config: EngineConfig,
    commands: HashMap<String, CommandBinding<F>>,
    aggregates: HashMap<String, AggregateDescription<F>>,
    queries: HashMap<String, QueryDescription>,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    process_managers: Vec<Arc<dyn ProcessManager>>,
    watch: broadcast::Sender<Message>,
}

/// Routes commands, events and queries to their descriptions.
///
/// Cloning is cheap; clones share registrations, store and watchers.
pub struct Engine<S, F: Flavour> {
    inner: Arc<EngineInner<S, F>>,
}

impl<S, F: Flavour> Clone for Engine<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, F> Engine<S, F>
where
    S: EventStore + 'static,
    F: Flavour,
{
    pub fn builder(flavour: F, schemas: SchemaRegistry, store: S) -> EngineBuilder<S, F> {
        EngineBuilder::new(flavour, schemas, store)
    }

    pub fn flavour(&self) -> &F {
        &self.inner.flavour
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.inner.schemas
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Names of all described commands, sorted.
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.inner.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn aggregate(&self, aggregate_type: &str) -> Option<&AggregateDescription<F>> {
        self.inner.aggregates.get(aggregate_type)
    }

    /// Subscribes to every event broadcast from now on.
    pub fn watch(&self) -> broadcast::Receiver<Message> {
        self.inner.watch.subscribe()
    }

    /// Dispatches any message according to its type.
    #[tracing::instrument(skip(self, message), fields(message_name = %message.name(), message_type = %message.message_type()))]
    pub async fn dispatch(&self, message: Message) -> Result<DispatchOutcome<F::State>> {
        match message.message_type() {
            MessageType::Command => self.handle_command(message).await.map(DispatchOutcome::Accepted),
            MessageType::Event => self.publish_event(message).await.map(DispatchOutcome::Published),
            MessageType::Query => self
                .resolve_query(message)
                .await
                .map(DispatchOutcome::QueryResult),
        }
    }

    /// Dispatches a message received from a transport.
    pub async fn dispatch_wire(&self, wire: WireMessage) -> Result<DispatchOutcome<F::State>> {
        let message = self.inner.schemas.message_from_wire(wire)?;
        self.dispatch(message).await
    }

    /// Handles a command, then dispatches any follow-up commands issued by
    /// process managers.
    ///
    /// Follow-up failures are reported in the outcome; the command itself is
    /// committed once its events are appended.
    #[tracing::instrument(skip(self, command), fields(message_name = %command.name()))]
    pub async fn handle_command(&self, command: Message) -> Result<CommandOutcome<F::State>> {
        let (mut outcome, follow_ups) = self.execute_command(command).await?;
        let follow_up_report = self.run_follow_ups(follow_ups).await;
        outcome.report.merge(follow_up_report);
        Ok(outcome)
    }

    /// Validates an externally recorded event and broadcasts it. No stream
    /// is touched.
    #[tracing::instrument(skip(self, event), fields(message_name = %event.name()))]
    pub async fn publish_event(&self, event: Message) -> Result<BroadcastReport> {
        expect_type(&event, MessageType::Event)?;
        self.validate(&event)?;

        let (mut report, follow_ups) = self.broadcast(std::slice::from_ref(&event)).await;
        report.merge(self.run_follow_ups(follow_ups).await);
        Ok(report)
    }

    /// Resolves a query through its registered resolver.
    #[tracing::instrument(skip(self, query), fields(message_name = %query.name()))]
    pub async fn resolve_query(&self, query: Message) -> Result<Value> {
        expect_type(&query, MessageType::Query)?;
        let description = self
            .inner
            .queries
            .get(query.name())
            .ok_or_else(|| EngineError::UnknownQuery(query.name().to_string()))?;
        self.validate(&query)?;

        let context = QueryContext::new(Arc::new(self.clone()), self.inner.watch.clone());
        let result = description
            .run(query, context, self.inner.config.query_timeout)
            .await;

        match &result {
            Ok(_) => metrics::counter!("engine_queries_resolved_total").increment(1),
            Err(err) => {
                tracing::warn!(code = err.code(), error = %err, "query failed");
            }
        }
        result
    }

    /// Replays the stream of an aggregate into its current state.
    #[tracing::instrument(skip(self))]
    pub async fn load_aggregate_state(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<F::State> {
        let not_found = || EngineError::AggregateNotFound {
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
        };
        let aggregate = self.inner.aggregates.get(aggregate_type).ok_or_else(not_found)?;
        let projector = StateProjector::new(&self.inner.flavour, aggregate);
        let stream = StreamId::new(aggregate_type, aggregate_id);

        let (state, _) = self.replay(&projector, &stream).await?;
        state.ok_or_else(not_found)
    }

    /// Folds events into a fresh state for `aggregate_type`.
    pub fn project(&self, aggregate_type: &str, events: &[Message]) -> Result<Option<F::State>> {
        match self.inner.aggregates.get(aggregate_type) {
            Some(aggregate) => StateProjector::new(&self.inner.flavour, aggregate).project(None, events),
            None => match events.first() {
                Some(event) => Err(EngineError::UnknownEventForApplyMap {
                    aggregate_type: aggregate_type.to_string(),
                    event_name: event.name().to_string(),
                }),
                None => Ok(None),
            },
        }
    }

    /// Applies further events onto an existing state.
    pub fn apply_events(
        &self,
        aggregate_type: &str,
        state: F::State,
        events: &[Message],
    ) -> Result<F::State> {
        let Some(aggregate) = self.inner.aggregates.get(aggregate_type) else {
            return match events.first() {
                Some(event) => Err(EngineError::UnknownEventForApplyMap {
                    aggregate_type: aggregate_type.to_string(),
                    event_name: event.name().to_string(),
                }),
                None => Ok(state),
            };
        };
        let projector = StateProjector::new(&self.inner.flavour, aggregate);
        events
            .iter()
            .try_fold(state, |state, event| projector.apply(Some(state), event))
    }

    fn validate(&self, message: &Message) -> Result<()> {
        Ok(self
            .inner
            .schemas
            .validate(self.inner.validator.as_ref(), message)?)
    }

    async fn execute_command(
        &self,
        command: Message,
    ) -> Result<(CommandOutcome<F::State>, Vec<Message>)> {
        let command_name = command.name().to_string();
        let started = Instant::now();

        let result = self.run_pipeline(command).await;

        metrics::histogram!("engine_dispatch_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        match &result {
            Ok((outcome, _)) => {
                metrics::counter!("engine_commands_dispatched_total").increment(1);
                enter(DispatchStage::Complete, &command_name);
                tracing::debug!(
                    command = %command_name,
                    version = %outcome.version,
                    events = outcome.events.len(),
                    "command handled"
                );
            }
            Err(err) => {
                metrics::counter!("engine_commands_failed_total", "code" => err.code()).increment(1);
                if matches!(err, EngineError::ConcurrencyConflict { .. }) {
                    metrics::counter!("engine_concurrency_conflicts_total").increment(1);
                }
                enter(DispatchStage::Failed(err.code()), &command_name);
                tracing::warn!(command = %command_name, code = err.code(), error = %err, "command failed");
            }
        }
        result
    }

    #[tracing::instrument(
        skip(self, command),
        fields(
            message_name = %command.name(),
            aggregate_type = tracing::field::Empty,
            aggregate_id = tracing::field::Empty,
        )
    )]
    async fn run_pipeline(
        &self,
        command: Message,
    ) -> Result<(CommandOutcome<F::State>, Vec<Message>)> {
        let flavour = &self.inner.flavour;
        let command_name = command.name().to_string();
        enter(DispatchStage::Received, &command_name);

        expect_type(&command, MessageType::Command)?;
        let binding = self
            .inner
            .commands
            .get(&command_name)
            .ok_or_else(|| EngineError::UnknownCommand(command_name.clone()))?;
        self.validate(&command)?;
        enter(DispatchStage::Validated, &command_name);

        let aggregate_type = binding.aggregate_type.as_str();
        let aggregate_id = flavour
            .extract_identity(&binding.identity_key, &command)
            .map_err(|err| EngineError::from_flavour(&command_name, err))?;
        let span = tracing::Span::current();
        span.record("aggregate_type", aggregate_type);
        span.record("aggregate_id", aggregate_id.as_str());

        let aggregate = self
            .inner
            .aggregates
            .get(aggregate_type)
            .ok_or_else(|| EngineError::UnknownCommand(command_name.clone()))?;
        let projector = StateProjector::new(flavour, aggregate);
        let stream = StreamId::new(aggregate_type, aggregate_id.clone());

        let (prior_state, version) = if binding.is_new {
            (None, Version::initial())
        } else {
            match self.replay(&projector, &stream).await? {
                (Some(state), version) => (Some(state), version),
                (None, _) => {
                    return Err(EngineError::AggregateNotFound {
                        aggregate_type: aggregate_type.to_string(),
                        aggregate_id: aggregate_id.into_inner(),
                    });
                }
            }
        };
        enter(DispatchStage::Loaded, &command_name);

        let mut command = command;
        for pre_processor in &binding.pre_processors {
            command = flavour
                .call_pre_processor(pre_processor, command)
                .map_err(|err| EngineError::from_flavour(&command_name, err))?;
        }
        enter(DispatchStage::PreProcessed, &command_name);

        let context = match &binding.context_provider {
            Some(provider) => Some(
                flavour
                    .call_context_provider(provider, &command)
                    .map_err(|err| EngineError::from_flavour(&command_name, err))?,
            ),
            None => None,
        };

        let produced = match &prior_state {
            None => flavour.call_aggregate_factory(
                aggregate_type,
                &binding.handler,
                &command,
                context.as_ref(),
            ),
            Some(state) => flavour.call_aggregate_function(
                aggregate_type,
                &binding.handler,
                state,
                &command,
                context.as_ref(),
            ),
        }
        .map_err(|err| EngineError::from_flavour(&command_name, err))?;
        enter(DispatchStage::Handled, &command_name);

        if produced.is_empty() {
            tracing::debug!(command = %command_name, "no events produced");
            return Ok((
                CommandOutcome {
                    aggregate_type: aggregate_type.to_string(),
                    aggregate_id: aggregate_id.into_inner(),
                    version,
                    events: Vec::new(),
                    state: prior_state,
                    report: BroadcastReport::default(),
                },
                Vec::new(),
            ));
        }

        let correlation_id = command
            .correlation_id()
            .map(str::to_string)
            .unwrap_or_else(|| command.id().to_string());
        let mut events = Vec::with_capacity(produced.len());
        for (offset, produced) in produced.into_iter().enumerate() {
            projector.ensure_known(&produced.name)?;

            let mut metadata = produced.metadata;
            metadata.insert(meta::CAUSATION_ID.to_string(), json!(command.id().to_string()));
            metadata.insert(meta::CAUSATION_NAME.to_string(), json!(command_name));
            metadata.insert(meta::CORRELATION_ID.to_string(), json!(correlation_id));
            metadata.insert(meta::AGGREGATE_TYPE.to_string(), json!(aggregate_type));
            metadata.insert(meta::AGGREGATE_ID.to_string(), json!(aggregate_id.as_str()));
            metadata.insert(
                meta::AGGREGATE_VERSION.to_string(),
                json!(version.advance(offset + 1).as_i64()),
            );

            let event = Message::new(produced.name, MessageType::Event, produced.payload)
                .with_metadata(metadata);
            self.validate(&event)?;
            events.push(event);
        }

        // Folding before the append keeps apply failures free of side effects.
        let state = projector.project(prior_state, &events)?;
        enter(DispatchStage::EventsValidated, &command_name);

        let envelopes = events
            .iter()
            .enumerate()
            .map(|(offset, event)| envelope_from_message(event, &stream, version.advance(offset + 1)))
            .collect::<Result<Vec<_>>>()?;
        let options = if version == Version::initial() {
            AppendOptions::expect_new()
        } else {
            AppendOptions::expect_version(version)
        };
        let new_version = self
            .inner
            .store
            .append_to_stream(&stream, envelopes, options)
            .await?;
        metrics::counter!("engine_events_appended_total").increment(events.len() as u64);
        enter(DispatchStage::Appended, &command_name);

        if let Some(state) = &state
            && self
                .inner
                .config
                .snapshot_due(version.as_i64() as u64, new_version.as_i64() as u64)
        {
            self.save_snapshot(&stream, new_version, state).await;
        }

        let (report, follow_ups) = self.broadcast(&events).await;
        enter(DispatchStage::Broadcast, &command_name);

        Ok((
            CommandOutcome {
                aggregate_type: aggregate_type.to_string(),
                aggregate_id: aggregate_id.into_inner(),
                version: new_version,
                events,
                state,
                report,
            },
            follow_ups,
        ))
    }

    /// Loads and folds a stream, starting from a snapshot when enabled.
    async fn replay(
        &self,
        projector: &StateProjector<'_, F>,
        stream: &StreamId,
    ) -> Result<(Option<F::State>, Version)> {
        if self.inner.config.snapshot_interval > 0 {
            match self.replay_from_snapshot(projector, stream).await {
                Ok(replayed) => return Ok(replayed),
                Err(err) => {
                    tracing::warn!(stream = %stream, error = %err, "snapshot unusable, replaying full stream");
                }
            }
        }

        let envelopes = self.inner.store.load_stream(stream).await?;
        let version = envelopes.last().map(|e| e.version).unwrap_or_default();
        let events = messages_from_envelopes(&envelopes)?;
        Ok((projector.project(None, &events)?, version))
    }

    /// Folds the events recorded after the latest snapshot onto it, or the
    /// whole stream when there is none.
    async fn replay_from_snapshot(
        &self,
        projector: &StateProjector<'_, F>,
        stream: &StreamId,
    ) -> Result<(Option<F::State>, Version)> {
        let (snapshot, envelopes) = self.inner.store.load_with_snapshot(stream).await?;
        let (state, base) = match snapshot {
            Some(snapshot) => (
                Some(
                    self.inner
                        .flavour
                        .reconstitute_state(&stream.aggregate_type, snapshot.state)?,
                ),
                snapshot.version,
            ),
            None => (None, Version::initial()),
        };
        let version = envelopes.last().map(|e| e.version).unwrap_or(base);
        let events = messages_from_envelopes(&envelopes)?;
        Ok((projector.project(state, &events)?, version))
    }

    async fn save_snapshot(&self, stream: &StreamId, version: Version, state: &F::State) {
        let serialized = match self
            .inner
            .flavour
            .serialize_state(&stream.aggregate_type, state)
        {
            Ok(serialized) => serialized,
            Err(err) => {
                tracing::warn!(stream = %stream, error = %err, "cannot serialize state for snapshot");
                return;
            }
        };
        let snapshot = Snapshot::new(stream.clone(), version, serialized);
        match self.inner.store.save_snapshot(snapshot).await {
            Ok(()) => tracing::debug!(stream = %stream, version = %version, "snapshot saved"),
            Err(err) => tracing::warn!(stream = %stream, error = %err, "snapshot save failed"),
        }
    }

    /// Delivers events to subscribers, process managers and watchers, in
    /// that order per event. Returns the follow-up commands issued.
    async fn broadcast(&self, events: &[Message]) -> (BroadcastReport, Vec<Message>) {
        let mut report = BroadcastReport::default();
        let mut follow_ups = Vec::new();

        for event in events {
            for subscriber in &self.inner.subscribers {
                if let Err(err) = subscriber.on_event(event).await {
                    metrics::counter!("engine_broadcast_failures_total").increment(1);
                    tracing::error!(
                        subscriber = subscriber.name(),
                        event = event.name(),
                        error = %err,
                        "subscriber failed"
                    );
                    report.subscriber_failures.push(DeliveryFailure {
                        recipient: subscriber.name().to_string(),
                        event_name: event.name().to_string(),
                        reason: err.to_string(),
                    });
                }
            }

            for manager in &self.inner.process_managers {
                match manager.react(event).await {
                    Ok(commands) => {
                        follow_ups.extend(commands.into_iter().map(|c| caused_by(c, event)));
                    }
                    Err(err) => {
                        metrics::counter!("engine_broadcast_failures_total").increment(1);
                        tracing::error!(
                            process_manager = manager.name(),
                            event = event.name(),
                            error = %err,
                            "process manager failed"
                        );
                        report.subscriber_failures.push(DeliveryFailure {
                            recipient: manager.name().to_string(),
                            event_name: event.name().to_string(),
                            reason: err.to_string(),
                        });
                    }
                }
            }

            // No receivers is not an error.
            let _ = self.inner.watch.send(event.clone());
        }

        (report, follow_ups)
    }

    /// Dispatches follow-up commands breadth-first, bounded by
    /// `max_follow_up_commands`.
    async fn run_follow_ups(&self, follow_ups: Vec<Message>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut queue = VecDeque::from(follow_ups);
        let limit = self.inner.config.max_follow_up_commands;

        while let Some(command) = queue.pop_front() {
            if report.follow_ups_dispatched >= limit {
                tracing::error!(limit, dropped = queue.len() + 1, "follow-up limit reached");
                report.follow_up_failures.extend(
                    std::iter::once(command).chain(queue.drain(..)).map(|c| FollowUpFailure {
                        command_name: c.name().to_string(),
                        code: "FOLLOW_UP_LIMIT".to_string(),
                        reason: format!("more than {limit} follow-up commands"),
                    }),
                );
                break;
            }

            let command_name = command.name().to_string();
            match self.execute_command(command).await {
                Ok((outcome, more)) => {
                    report.follow_ups_dispatched += 1;
                    report.merge(outcome.report);
                    queue.extend(more);
                }
                Err(err) => {
                    report.follow_up_failures.push(FollowUpFailure {
                        command_name,
                        code: err.code().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        report
    }
}

#[async_trait]
impl<S, F> AggregateStateLoader for Engine<S, F>
where
    S: EventStore + 'static,
    F: Flavour,
{
    async fn load_state(&self, aggregate_type: &str, aggregate_id: &str) -> Result<Value> {
        let state = self.load_aggregate_state(aggregate_type, aggregate_id).await?;
        Ok(self.inner.flavour.serialize_state(aggregate_type, &state)?)
    }
}

impl<S, F: Flavour> fmt::Debug for Engine<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("flavour", &self.inner.flavour.kind())
            .field("commands", &self.inner.commands.len())
            .field("queries", &self.inner.queries.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

fn expect_type(message: &Message, expected: MessageType) -> Result<()> {
    if message.message_type() == expected {
        Ok(())
    } else {
        Err(EngineError::UnexpectedMessageType {
            name: message.name().to_string(),
            expected,
            actual: message.message_type(),
        })
    }
}

/// Marks a follow-up command as caused by `event`, keeping its correlation.
fn caused_by(command: Message, event: &Message) -> Message {
    let correlation_id = command
        .correlation_id()
        .or(event.correlation_id())
        .map(str::to_string)
        .unwrap_or_else(|| event.id().to_string());
    command
        .with_added_metadata(meta::CAUSATION_ID, json!(event.id().to_string()))
        .with_added_metadata(meta::CAUSATION_NAME, json!(event.name()))
        .with_added_metadata(meta::CORRELATION_ID, json!(correlation_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_display_in_lowercase() {
        assert_eq!(DispatchStage::PreProcessed.to_string(), "preprocessed");
        assert_eq!(
            DispatchStage::Failed("SCHEMA_VIOLATION").to_string(),
            "failed(SCHEMA_VIOLATION)"
        );
    }

    #[test]
    fn follow_ups_inherit_correlation() {
        let event = Message::event("UserWasRegistered", Default::default())
            .with_added_metadata(meta::CORRELATION_ID, json!("flow-1"));
        let command = caused_by(Message::command("SendWelcomeMail", Default::default()), &event);

        assert_eq!(command.causation_id(), Some(event.id().to_string().as_str()));
        assert_eq!(command.correlation_id(), Some("flow-1"));
        assert_eq!(
            command.metadata_value(meta::CAUSATION_NAME),
            Some(&json!("UserWasRegistered"))
        );
    }
}
