//! Process descriptions: how a command reaches an aggregate.

use std::collections::HashMap;

use messaging::{MessageType, SchemaRegistry};

use crate::error::ConfigError;
use crate::flavour::Flavour;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    New(String),
    Existing(String),
}

/// Binds one command to an aggregate type, its identity rule, optional
/// pre-processors and context provider, a handler, and the events it records
/// along with their apply functions.
///
/// ```ignore
/// ProcessDescription::for_command("RegisterUser")
///     .with_new("User")
///     .identified_by("userId")
///     .handle(register_user)
///     .record_that("UserWasRegistered")
///     .apply(user_was_registered);
/// ```
pub struct ProcessDescription<F: Flavour> {
    command_name: String,
    target: Option<Target>,
    identity_key: Option<String>,
    pre_processors: Vec<F::PreProcessor>,
    context_provider: Option<F::ContextProvider>,
    handler: Option<F::Handler>,
    recorded_events: Vec<String>,
    appliers: Vec<(String, F::Applier)>,
    misuse: Option<ConfigError>,
}

impl<F: Flavour> ProcessDescription<F> {
    pub fn for_command(command_name: impl Into<String>) -> Self {
        Self {
            command_name: command_name.into(),
            target: None,
            identity_key: None,
            pre_processors: Vec::new(),
            context_provider: None,
            handler: None,
            recorded_events: Vec::new(),
            appliers: Vec::new(),
            misuse: None,
        }
    }

    /// The command creates a new aggregate of this type.
    pub fn with_new(mut self, aggregate_type: impl Into<String>) -> Self {
        self.target = Some(Target::New(aggregate_type.into()));
        self
    }

    /// The command targets an existing aggregate of this type.
    pub fn with_existing(mut self, aggregate_type: impl Into<String>) -> Self {
        self.target = Some(Target::Existing(aggregate_type.into()));
        self
    }

    /// Payload field holding the aggregate id.
    pub fn identified_by(mut self, key: impl Into<String>) -> Self {
        self.identity_key = Some(key.into());
        self
    }

    /// Appends a pre-processor; pre-processors run in registration order.
    pub fn pre_process(mut self, pre_processor: F::PreProcessor) -> Self {
        self.pre_processors.push(pre_processor);
        self
    }

    pub fn provide_context(mut self, provider: F::ContextProvider) -> Self {
        self.context_provider = Some(provider);
        self
    }

    pub fn handle(mut self, handler: F::Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Declares an event the handler may record.
    pub fn record_that(mut self, event_name: impl Into<String>) -> Self {
        let event_name = event_name.into();
        if !self.recorded_events.contains(&event_name) {
            self.recorded_events.push(event_name);
        }
        self
    }

    /// Binds an apply function to the most recently recorded event.
    pub fn apply(mut self, applier: F::Applier) -> Self {
        match self.recorded_events.last() {
            Some(event_name) => self.appliers.push((event_name.clone(), applier)),
            None => {
                self.misuse
                    .get_or_insert(ConfigError::ApplyWithoutRecordedEvent(
                        self.command_name.clone(),
                    ));
            }
        }
        self
    }

    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    pub fn recorded_events(&self) -> &[String] {
        &self.recorded_events
    }
}

/// A validated process description.
pub(crate) struct CommandBinding<F: Flavour> {
    pub command_name: String,
    pub aggregate_type: String,
    pub identity_key: String,
    pub is_new: bool,
    pub pre_processors: Vec<F::PreProcessor>,
    pub context_provider: Option<F::ContextProvider>,
    pub handler: F::Handler,
    pub recorded_events: Vec<String>,
}

/// Everything the engine knows about one aggregate type: the union of the
/// apply functions of every process targeting it.
pub struct AggregateDescription<F: Flavour> {
    aggregate_type: String,
    apply_map: HashMap<String, F::Applier>,
}

impl<F: Flavour> AggregateDescription<F> {
    fn new(aggregate_type: String) -> Self {
        Self {
            aggregate_type,
            apply_map: HashMap::new(),
        }
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn applier(&self, event_name: &str) -> Option<&F::Applier> {
        self.apply_map.get(event_name)
    }

    pub fn handles(&self, event_name: &str) -> bool {
        self.apply_map.contains_key(event_name)
    }

    /// Event names with an apply function, sorted.
    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.apply_map.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

pub(crate) struct CompiledDescriptions<F: Flavour> {
    pub commands: HashMap<String, CommandBinding<F>>,
    pub aggregates: HashMap<String, AggregateDescription<F>>,
}

pub(crate) fn expect_registered(
    schemas: &SchemaRegistry,
    name: &str,
    expected: MessageType,
) -> Result<(), ConfigError> {
    match schemas.message_type(name) {
        None => Err(ConfigError::UnregisteredMessage {
            name: name.to_string(),
            expected,
        }),
        Some(actual) if actual != expected => Err(ConfigError::WrongMessageType {
            name: name.to_string(),
            expected,
            actual,
        }),
        Some(_) => Ok(()),
    }
}

/// Validates descriptions against the registry and builds the per-type apply maps.
pub(crate) fn compile<F: Flavour>(
    flavour: &F,
    descriptions: Vec<ProcessDescription<F>>,
    schemas: &SchemaRegistry,
) -> Result<CompiledDescriptions<F>, ConfigError> {
    let mut commands: HashMap<String, CommandBinding<F>> = HashMap::new();
    let mut aggregates: HashMap<String, AggregateDescription<F>> = HashMap::new();

    for description in descriptions {
        if let Some(misuse) = description.misuse {
            return Err(misuse);
        }

        let command_name = description.command_name;
        if commands.contains_key(&command_name) {
            return Err(ConfigError::DuplicateCommand(command_name));
        }
        expect_registered(schemas, &command_name, MessageType::Command)?;

        let (aggregate_type, is_new) = match description.target {
            Some(Target::New(aggregate_type)) => (aggregate_type, true),
            Some(Target::Existing(aggregate_type)) => (aggregate_type, false),
            None => return Err(ConfigError::MissingAggregateType(command_name)),
        };
        let Some(identity_key) = description.identity_key else {
            return Err(ConfigError::MissingIdentityKey(command_name));
        };
        let Some(handler) = description.handler else {
            return Err(ConfigError::MissingHandler(command_name));
        };

        for event_name in &description.recorded_events {
            expect_registered(schemas, event_name, MessageType::Event)?;
        }

        let aggregate = aggregates
            .entry(aggregate_type.clone())
            .or_insert_with(|| AggregateDescription::new(aggregate_type.clone()));
        for (event_name, applier) in description.appliers {
            if aggregate.apply_map.contains_key(&event_name) {
                return Err(ConfigError::DuplicateApplyFunction {
                    aggregate_type,
                    event_name,
                });
            }
            aggregate.apply_map.insert(event_name, applier);
        }

        tracing::debug!(
            command = %command_name,
            aggregate_type = %aggregate_type,
            is_new,
            "process described"
        );

        commands.insert(
            command_name.clone(),
            CommandBinding {
                command_name,
                aggregate_type,
                identity_key,
                is_new,
                pre_processors: description.pre_processors,
                context_provider: description.context_provider,
                handler,
                recorded_events: description.recorded_events,
            },
        );
    }

    for binding in commands.values() {
        let aggregate = aggregates.get(&binding.aggregate_type);
        for event_name in &binding.recorded_events {
            if !aggregate.is_some_and(|a| a.handles(event_name)) {
                return Err(ConfigError::MissingApplyFunction {
                    aggregate_type: binding.aggregate_type.clone(),
                    event_name: event_name.clone(),
                });
            }
        }

        let appliers: Vec<&F::Applier> = aggregate
            .map(|a| a.apply_map.values().collect())
            .unwrap_or_default();
        flavour
            .check_bindings(
                &binding.aggregate_type,
                &binding.command_name,
                &binding.handler,
                binding.context_provider.as_ref(),
                &appliers,
            )
            .map_err(|err| ConfigError::IncompatibleTypes {
                command_name: binding.command_name.clone(),
                reason: err.to_string(),
            })?;
    }

    Ok(CompiledDescriptions {
        commands,
        aggregates,
    })
}
