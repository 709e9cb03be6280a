//! User-registration fixtures shared by the engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use engine::{
    AggregateStateResolver, EngineBuilder, EventSubscriber, GenericFlavour, ProcessDescription,
    ProcessManager, ProducedEvent, QueryDescription, Rejection, Resolver, SubscriberError,
};
use event_store::InMemoryEventStore;
use messaging::schema::builder::{object, string, string_min};
use messaging::{Message, MessageType, SchemaRegistry};
use serde_json::{Value, json};

pub fn user_schemas() -> SchemaRegistry {
    let mut schemas = SchemaRegistry::new();
    schemas
        .register_command(
            "RegisterUser",
            object(
                vec![("userId", string_min(1)), ("username", string_min(1))],
                vec![("email", string())],
                false,
            ),
        )
        .unwrap();
    schemas
        .register_command(
            "ChangeUsername",
            object(
                vec![("userId", string_min(1)), ("newUsername", string_min(1))],
                vec![],
                false,
            ),
        )
        .unwrap();
    schemas
        .register_command(
            "DeleteUser",
            object(vec![("userId", string_min(1))], vec![], false),
        )
        .unwrap();
    schemas
        .register_command(
            "SendWelcomeMail",
            object(vec![("userId", string_min(1))], vec![], false),
        )
        .unwrap();
    schemas
        .register_event(
            "UserWasRegistered",
            object(
                vec![("userId", string()), ("username", string())],
                vec![("email", string()), ("registeredBy", string())],
                false,
            ),
        )
        .unwrap();
    schemas
        .register_event(
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
        )
        .unwrap();
    schemas
        .register_event(
            "UserWasDeleted",
            object(vec![("userId", string())], vec![], false),
        )
        .unwrap();
    schemas
        .register_event(
            "WelcomeMailWasSent",
            object(vec![("userId", string())], vec![], false),
        )
        .unwrap();
    schemas
        .register_query(
            "GetUser",
            object(vec![("userId", string_min(1))], vec![], false),
        )
        .unwrap();
    schemas
        .register_query(
            "AwaitUser",
            object(vec![("userId", string_min(1))], vec![], false),
        )
        .unwrap();
    schemas
}

pub fn register_user(user_id: &str, username: &str) -> Message {
    Message::from_json(
        "RegisterUser",
        MessageType::Command,
        json!({"userId": user_id, "username": username}),
    )
    .unwrap()
}

pub fn change_username(user_id: &str, new_username: &str) -> Message {
    Message::from_json(
        "ChangeUsername",
        MessageType::Command,
        json!({"userId": user_id, "newUsername": new_username}),
    )
    .unwrap()
}

pub fn get_user(user_id: &str) -> Message {
    Message::from_json("GetUser", MessageType::Query, json!({"userId": user_id})).unwrap()
}

pub fn event(name: &str, payload: Value) -> Message {
    Message::from_json(name, MessageType::Event, payload).unwrap()
}

fn produced(name: &str, payload: Value) -> Result<ProducedEvent, Rejection> {
    ProducedEvent::from_json(name, payload).map_err(|err| Rejection::new(err.to_string()))
}

pub fn register_user_process() -> ProcessDescription<GenericFlavour> {
    ProcessDescription::for_command("RegisterUser")
        .with_new("User")
        .identified_by("userId")
        .handle(GenericFlavour::handler(|_, command, context| {
            let mut payload = command.payload_value();
            if let Some(Value::String(by)) = context {
                payload["registeredBy"] = json!(by);
            }
            Ok(vec![produced("UserWasRegistered", payload)?])
        }))
        .record_that("UserWasRegistered")
        .apply(GenericFlavour::applier(|_, event| event.payload_value()))
}

pub fn change_username_process() -> ProcessDescription<GenericFlavour> {
    ProcessDescription::for_command("ChangeUsername")
        .with_existing("User")
        .identified_by("userId")
        .handle(GenericFlavour::handler(|state, command, _| {
            let current = state
                .and_then(|s| s.get("username"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let requested = command
                .get("newUsername")
                .and_then(Value::as_str)
                .unwrap_or_default();

            if requested == "root" {
                return Err(Rejection::new("username root is reserved"));
            }
            if requested == current {
                return Ok(vec![]);
            }
            Ok(vec![produced(
                "UsernameWasChanged",
                json!({
                    "userId": command.get("userId"),
                    "oldUsername": current,
                    "newUsername": requested,
                }),
            )?])
        }))
        .record_that("UsernameWasChanged")
        .apply(GenericFlavour::applier(|state, event| {
            let mut state = state.unwrap_or_else(|| json!({}));
            state["username"] = event.get("newUsername").cloned().unwrap_or(Value::Null);
            state
        }))
}

/// Yields an event the `User` aggregate has no apply function for.
pub fn delete_user_process() -> ProcessDescription<GenericFlavour> {
    ProcessDescription::for_command("DeleteUser")
        .with_existing("User")
        .identified_by("userId")
        .handle(GenericFlavour::handler(|_, command, _| {
            Ok(vec![produced(
                "UserWasDeleted",
                json!({"userId": command.get("userId")}),
            )?])
        }))
}

pub fn send_welcome_mail_process() -> ProcessDescription<GenericFlavour> {
    ProcessDescription::for_command("SendWelcomeMail")
        .with_new("Mailbox")
        .identified_by("userId")
        .handle(GenericFlavour::handler(|_, command, _| {
            Ok(vec![produced(
                "WelcomeMailWasSent",
                json!({"userId": command.get("userId")}),
            )?])
        }))
        .record_that("WelcomeMailWasSent")
        .apply(GenericFlavour::applier(|_, event| event.payload_value()))
}

pub fn user_engine_builder(
    store: InMemoryEventStore,
) -> EngineBuilder<InMemoryEventStore, GenericFlavour> {
    EngineBuilder::new(GenericFlavour::new(), user_schemas(), store)
        .process(register_user_process())
        .process(change_username_process())
        .process(delete_user_process())
        .process(send_welcome_mail_process())
        .query(QueryDescription::new(
            "GetUser",
            Resolver::immediate(AggregateStateResolver::new("User", "userId")),
        ))
}

/// Records the name of every event it receives.
#[derive(Default)]
pub struct RecordingSubscriber {
    seen: Mutex<Vec<Message>>,
}

impl RecordingSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seen(&self) -> Vec<Message> {
        self.seen.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.seen().iter().map(|m| m.name().to_string()).collect()
    }
}

#[async_trait]
impl EventSubscriber for RecordingSubscriber {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_event(&self, event: &Message) -> Result<(), SubscriberError> {
        self.seen.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct FailingSubscriber;

#[async_trait]
impl EventSubscriber for FailingSubscriber {
    fn name(&self) -> &str {
        "failing"
    }

    async fn on_event(&self, _event: &Message) -> Result<(), SubscriberError> {
        Err(SubscriberError::msg("read model unavailable"))
    }
}

/// Sends a welcome mail for every registered user.
pub struct WelcomeMailer;

#[async_trait]
impl ProcessManager for WelcomeMailer {
    fn name(&self) -> &str {
        "welcome-mailer"
    }

    async fn react(&self, event: &Message) -> Result<Vec<Message>, SubscriberError> {
        if event.name() != "UserWasRegistered" {
            return Ok(vec![]);
        }
        let user_id = event.get("userId").cloned().unwrap_or(Value::Null);
        let command = Message::from_json(
            "SendWelcomeMail",
            MessageType::Command,
            json!({"userId": user_id}),
        )
        .map_err(SubscriberError::new)?;
        Ok(vec![command])
    }
}
