//! User registration: schemas, processes, queries and the user list read model.

use std::sync::Arc;

use async_trait::async_trait;
use engine::{
    AggregateStateResolver, Engine, EngineConfig, EngineError, GenericFlavour, ProcessDescription,
    ProducedEvent, QueryContext, QueryDescription, QueryError, QueryResolver, Rejection, Resolver,
};
use event_store::EventStore;
use messaging::schema::builder::{empty_object, object, string, string_min};
use messaging::{Message, MessageType, SchemaRegistry};
use projections::{
    Document, DocumentChange, DocumentProjection, DocumentStore, InMemoryDocumentStore,
    ProjectionProcessor, string_field,
};
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::reply::Reply;

/// Collection the user list projection writes to.
pub const USERS: &str = "users";

/// Usernames no one may register or rename to.
const RESERVED: &[&str] = &["root", "admin"];

pub fn user_schemas() -> Result<SchemaRegistry> {
    let mut schemas = SchemaRegistry::new();
    schemas.register_command(
        "RegisterUser",
        object(
            vec![("userId", string_min(1)), ("username", string_min(1))],
            vec![("email", string())],
            false,
        ),
    )?;
    schemas.register_command(
        "ChangeUsername",
        object(
            vec![("userId", string_min(1)), ("newUsername", string_min(1))],
            vec![],
            false,
        ),
    )?;
    schemas.register_event(
        "UserWasRegistered",
        object(
            vec![("userId", string()), ("username", string())],
            vec![("email", string())],
            false,
        ),
    )?;
    schemas.register_event(
        "UsernameWasChanged",
        object(
            vec![
                ("userId", string()),
                ("oldUsername", string()),
                ("newUsername", string()),
            ],
            vec![],
            false,
        ),
    )?;
    schemas.register_query(
        "GetUser",
        object(vec![("userId", string_min(1))], vec![], false),
    )?;
    schemas.register_query("ListUsers", empty_object())?;
    Ok(schemas)
}

fn check_username(name: &str) -> std::result::Result<String, Rejection> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Rejection::new("username must not be blank"));
    }
    if RESERVED.contains(&name) {
        return Err(Rejection::new(format!("username {name} is reserved")));
    }
    Ok(name.to_string())
}

fn text<'a>(message: &'a Message, key: &str) -> &'a str {
    message.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn produced(name: &str, payload: Value) -> std::result::Result<ProducedEvent, Rejection> {
    ProducedEvent::from_json(name, payload).map_err(|err| Rejection::new(err.to_string()))
}

fn register_user() -> ProcessDescription<GenericFlavour> {
    ProcessDescription::for_command("RegisterUser")
        .with_new("User")
        .identified_by("userId")
        .handle(GenericFlavour::handler(|_, command, _| {
            let username = check_username(text(command, "username"))?;
            let mut payload = command.payload_value();
            payload["username"] = json!(username);
            Ok(vec![produced("UserWasRegistered", payload)?])
        }))
        .record_that("UserWasRegistered")
        .apply(GenericFlavour::applier(|_, event| event.payload_value()))
}

fn change_username() -> ProcessDescription<GenericFlavour> {
    ProcessDescription::for_command("ChangeUsername")
        .with_existing("User")
        .identified_by("userId")
        .handle(GenericFlavour::handler(|state, command, _| {
            let current = state
                .and_then(|s| s.get("username"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let requested = check_username(text(command, "newUsername"))?;
            if requested == current {
                return Ok(vec![]);
            }
            Ok(vec![produced(
                "UsernameWasChanged",
                json!({
                    "userId": text(command, "userId"),
                    "oldUsername": current,
                    "newUsername": requested,
                }),
            )?])
        }))
        .record_that("UsernameWasChanged")
        .apply(GenericFlavour::applier(|state, event| {
            let mut state = state.unwrap_or_else(|| json!({}));
            state["username"] = event.get("newUsername").cloned().unwrap_or_default();
            state
        }))
}

/// The read model behind `ListUsers`.
pub fn user_list(documents: InMemoryDocumentStore) -> DocumentProjection<InMemoryDocumentStore> {
    DocumentProjection::new("user-list", USERS, documents)
        .on("UserWasRegistered", |event| {
            Some(DocumentChange::Upsert {
                id: string_field(event, "userId")?,
                doc: event.payload().clone(),
            })
        })
        .on("UsernameWasChanged", |event| {
            let mut changes = Document::new();
            changes.insert("username".to_string(), event.get("newUsername")?.clone());
            Some(DocumentChange::Merge {
                id: string_field(event, "userId")?,
                changes,
            })
        })
}

/// Answers `ListUsers` from the user list documents.
struct ListUsers {
    documents: InMemoryDocumentStore,
}

#[async_trait]
impl QueryResolver for ListUsers {
    async fn resolve(&self, query: &Message, _context: &QueryContext) -> engine::Result<Value> {
        let users = self
            .documents
            .find_docs(USERS, &Document::new())
            .await
            .map_err(|err| {
                EngineError::from(QueryError::Rejected {
                    query_name: query.name().to_string(),
                    reason: err.to_string(),
                })
            })?;
        Ok(Value::Array(users.into_iter().map(Value::Object).collect()))
    }
}

/// The user service: an engine over the generic flavour plus the user list.
pub struct UserService<S: EventStore + Clone + 'static> {
    pub engine: Engine<S, GenericFlavour>,
    pub processor: Arc<ProjectionProcessor<S>>,
    pub documents: InMemoryDocumentStore,
}

impl<S: EventStore + Clone + 'static> UserService<S> {
    /// Wires the engine and the user list, then catches the list up with
    /// whatever the store already holds.
    #[tracing::instrument(skip_all)]
    pub async fn start(store: S, config: EngineConfig) -> Result<Self> {
        let documents = InMemoryDocumentStore::new();
        let processor = Arc::new(
            ProjectionProcessor::new(store.clone()).with(Arc::new(user_list(documents.clone()))),
        );
        processor.run_catch_up().await?;

        let engine = Engine::builder(GenericFlavour::new(), user_schemas()?, store)
            .config(config)
            .process(register_user())
            .process(change_username())
            .query(QueryDescription::new(
                "GetUser",
                Resolver::immediate(AggregateStateResolver::new("User", "userId")),
            ))
            .query(QueryDescription::new(
                "ListUsers",
                Resolver::immediate(ListUsers {
                    documents: documents.clone(),
                }),
            ))
            .subscribe(processor.clone())
            .build()?;

        tracing::info!(commands = ?engine.command_names(), "user service started");
        Ok(Self {
            engine,
            processor,
            documents,
        })
    }

    /// Builds a message from one input line.
    ///
    /// A line carrying a `uuid` is read as a [`messaging::WireMessage`];
    /// otherwise `{"message_name": .., "payload": {..}}` is enough and the
    /// message type comes from the schema registry.
    pub fn parse_line(&self, line: &str) -> Result<Message> {
        let value: Value = serde_json::from_str(line)?;
        if value.get("uuid").is_some() {
            let wire = serde_json::from_value(value)?;
            return Ok(self.engine.schemas().message_from_wire(wire)?);
        }

        let name = value
            .get("message_name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let message_type: MessageType = self
            .engine
            .schemas()
            .message_type(name)
            .ok_or_else(|| messaging::MessagingError::UnknownMessage(name.to_string()))?;
        let payload = value.get("payload").cloned().unwrap_or_else(|| json!({}));
        Ok(Message::from_json(name, message_type, payload)?)
    }

    /// Parses and dispatches one input line. Failures become error replies.
    pub async fn handle_line(&self, line: &str) -> Reply {
        let outcome = match self.parse_line(line) {
            Ok(message) => self.engine.dispatch(message).await.map_err(AppError::from),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(outcome) => {
                metrics::counter!("app_input_lines_total", "code" => "OK").increment(1);
                Reply::from(outcome)
            }
            Err(err) => {
                metrics::counter!("app_input_lines_total", "code" => err.code()).increment(1);
                tracing::warn!(code = err.code(), error = %err, "message failed");
                Reply::from(&err)
            }
        }
    }
}
