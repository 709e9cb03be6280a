//! Integration tests for command dispatch with the generic flavour.
//!
//! These tests cover the full pipeline: schema gate, replay, handler,
//! append with optimistic concurrency, metadata and snapshots.

mod support;

use engine::{
    AggregateStateResolver, ConfigError, DispatchOutcome, EngineBuilder, EngineConfig,
    EngineError, ErrorResponse, GenericFlavour, ProcessDescription, ProducedEvent,
    QueryDescription, Resolver,
};
use event_store::{EventStore, InMemoryEventStore, Snapshot, StreamId, Version};
use messaging::schema::builder::object;
use messaging::{Message, MessageType, SchemaRegistry, WireMessage, meta};
use serde_json::json;
use support::*;

fn user_stream(id: &str) -> StreamId {
    StreamId::new("User", id)
}

mod projection {
    use super::*;

    fn history() -> Vec<Message> {
        vec![
            event(
                "UserWasRegistered",
                json!({"userId": "u-1", "username": "John"}),
            ),
            event(
                "UsernameWasChanged",
                json!({"userId": "u-1", "oldUsername": "John", "newUsername": "Max"}),
            ),
            event(
                "UsernameWasChanged",
                json!({"userId": "u-1", "oldUsername": "Max", "newUsername": "Moritz"}),
            ),
        ]
    }

    #[tokio::test]
    async fn fold_applies_events_in_order() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();

        let state = engine.project("User", &history()[..2]).unwrap().unwrap();
        assert_eq!(state["username"], "Max");
    }

    #[tokio::test]
    async fn projection_is_deterministic() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();
        let events = history();

        let first = engine.project("User", &events).unwrap();
        let second = engine.project("User", &events).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn replay_equals_prefix_then_incremental_apply() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();
        let events = history();

        let whole = engine.project("User", &events).unwrap().unwrap();
        for split in 1..events.len() {
            let prefix = engine.project("User", &events[..split]).unwrap().unwrap();
            let rest = engine
                .apply_events("User", prefix, &events[split..])
                .unwrap();
            assert_eq!(rest, whole, "split at {split}");
        }
    }

    #[tokio::test]
    async fn unknown_event_is_fatal() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();
        let events = vec![event("UserWasDeleted", json!({"userId": "u-1"}))];

        assert!(matches!(
            engine.project("User", &events),
            Err(EngineError::UnknownEventForApplyMap { .. })
        ));
        assert!(engine.project("User", &[]).unwrap().is_none());
    }
}

mod commands {
    use super::*;

    #[tokio::test]
    async fn register_then_change_username() {
        let store = InMemoryEventStore::new();
        let engine = user_engine_builder(store.clone()).build().unwrap();

        let registered = engine
            .handle_command(register_user("u-1", "John"))
            .await
            .unwrap();
        assert_eq!(registered.version, Version::first());
        assert_eq!(registered.event_names(), vec!["UserWasRegistered"]);
        assert_eq!(registered.state.as_ref().unwrap()["username"], "John");

        let changed = engine
            .handle_command(change_username("u-1", "Max"))
            .await
            .unwrap();
        assert_eq!(changed.version, Version::new(2));
        assert_eq!(changed.state.as_ref().unwrap()["username"], "Max");

        let stored = store.load_stream(&user_stream("u-1")).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].event_type, "UsernameWasChanged");
        assert_eq!(stored[1].payload["oldUsername"], "John");

        let state = engine.load_aggregate_state("User", "u-1").await.unwrap();
        assert_eq!(state, changed.state.unwrap());
    }

    #[tokio::test]
    async fn events_carry_causation_and_stream_metadata() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();
        let command = register_user("u-1", "John")
            .with_added_metadata(meta::CORRELATION_ID, json!("signup-flow"));
        let command_id = command.id().to_string();

        let outcome = engine.handle_command(command).await.unwrap();
        let event = &outcome.events[0];

        assert_eq!(event.causation_id(), Some(command_id.as_str()));
        assert_eq!(event.correlation_id(), Some("signup-flow"));
        assert_eq!(
            event.metadata_value(meta::CAUSATION_NAME),
            Some(&json!("RegisterUser"))
        );
        assert_eq!(event.metadata_value(meta::AGGREGATE_TYPE), Some(&json!("User")));
        assert_eq!(event.metadata_value(meta::AGGREGATE_ID), Some(&json!("u-1")));
        assert_eq!(event.metadata_value(meta::AGGREGATE_VERSION), Some(&json!(1)));
        assert_eq!(event.message_type(), MessageType::Event);
    }

    #[tokio::test]
    async fn correlation_defaults_to_command_id() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();
        let command = register_user("u-1", "John");
        let command_id = command.id().to_string();

        let outcome = engine.handle_command(command).await.unwrap();
        assert_eq!(outcome.events[0].correlation_id(), Some(command_id.as_str()));
    }

    #[tokio::test]
    async fn noop_command_leaves_stream_untouched() {
        let store = InMemoryEventStore::new();
        let engine = user_engine_builder(store.clone()).build().unwrap();
        engine
            .handle_command(register_user("u-1", "John"))
            .await
            .unwrap();
        let mut watcher = engine.watch();

        let outcome = engine
            .handle_command(change_username("u-1", "John"))
            .await
            .unwrap();

        assert!(outcome.is_noop());
        assert_eq!(outcome.version, Version::first());
        assert!(outcome.report.is_clean());
        assert_eq!(
            store.stream_version(&user_stream("u-1")).await.unwrap(),
            Some(Version::first())
        );
        assert!(watcher.try_recv().is_err());
    }

    #[tokio::test]
    async fn existing_aggregate_must_have_a_stream() {
        let store = InMemoryEventStore::new();
        let engine = user_engine_builder(store.clone()).build().unwrap();

        let result = engine.handle_command(change_username("ghost", "Max")).await;

        match result {
            Err(EngineError::AggregateNotFound {
                aggregate_type,
                aggregate_id,
            }) => {
                assert_eq!(aggregate_type, "User");
                assert_eq!(aggregate_id, "ghost");
            }
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn rejected_command_appends_nothing() {
        let store = InMemoryEventStore::new();
        let engine = user_engine_builder(store.clone()).build().unwrap();
        engine
            .handle_command(register_user("u-1", "John"))
            .await
            .unwrap();

        let result = engine.handle_command(change_username("u-1", "root")).await;

        let err = result.unwrap_err();
        assert!(matches!(&err, EngineError::Rejected { command_name, .. } if command_name == "ChangeUsername"));
        assert_eq!(err.code(), "REJECTED");
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn event_outside_apply_map_fails_before_append() {
        let store = InMemoryEventStore::new();
        let engine = user_engine_builder(store.clone()).build().unwrap();
        engine
            .handle_command(register_user("u-1", "John"))
            .await
            .unwrap();

        let delete = Message::from_json("DeleteUser", MessageType::Command, json!({"userId": "u-1"}))
            .unwrap();
        let result = engine.handle_command(delete).await;

        assert!(matches!(
            result,
            Err(EngineError::UnknownEventForApplyMap { ref event_name, .. }) if event_name == "UserWasDeleted"
        ));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();
        let command = Message::command("ArchiveUser", Default::default());

        assert!(matches!(
            engine.handle_command(command).await,
            Err(EngineError::UnknownCommand(name)) if name == "ArchiveUser"
        ));
    }

    #[tokio::test]
    async fn commands_must_be_commands() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();
        let not_a_command = event("UserWasRegistered", json!({"userId": "u-1", "username": "J"}));

        assert!(matches!(
            engine.handle_command(not_a_command).await,
            Err(EngineError::UnexpectedMessageType { .. })
        ));
    }
}

mod schema_gate {
    use super::*;

    #[tokio::test]
    async fn invalid_command_payload_mutates_nothing() {
        let store = InMemoryEventStore::new();
        let engine = user_engine_builder(store.clone()).build().unwrap();
        let command = Message::from_json(
            "RegisterUser",
            MessageType::Command,
            json!({"userId": "u-1"}),
        )
        .unwrap();

        let err = engine.handle_command(command).await.unwrap_err();

        match &err {
            EngineError::SchemaViolation {
                message_name,
                error,
            } => {
                assert_eq!(message_name, "RegisterUser");
                assert!(error.has_field("username"));
            }
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
        assert!(err.is_client_error());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn produced_events_are_validated_too() {
        let store = InMemoryEventStore::new();
        let sloppy = ProcessDescription::<GenericFlavour>::for_command("RegisterUser")
            .with_new("User")
            .identified_by("userId")
            .handle(GenericFlavour::handler(|_, _, _| {
                Ok(vec![ProducedEvent::new("UserWasRegistered", Default::default())])
            }))
            .record_that("UserWasRegistered")
            .apply(GenericFlavour::applier(|_, event| event.payload_value()));
        let engine = EngineBuilder::new(GenericFlavour::new(), user_schemas(), store.clone())
            .process(sloppy)
            .build()
            .unwrap();

        let err = engine
            .handle_command(register_user("u-1", "John"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::SchemaViolation { ref message_name, .. } if message_name == "UserWasRegistered"
        ));
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn missing_identity_is_reported() {
        let mut schemas = SchemaRegistry::new();
        schemas
            .register_command("Ping", object(vec![], vec![], true))
            .unwrap();
        schemas
            .register_event("Pinged", object(vec![], vec![], true))
            .unwrap();
        let engine = EngineBuilder::new(GenericFlavour::new(), schemas, InMemoryEventStore::new())
            .process(
                ProcessDescription::for_command("Ping")
                    .with_new("Pinger")
                    .identified_by("pingerId")
                    .handle(GenericFlavour::handler(|_, _, _| Ok(vec![])))
                    .record_that("Pinged")
                    .apply(GenericFlavour::applier(|_, event| event.payload_value())),
            )
            .build()
            .unwrap();

        let err = engine
            .handle_command(Message::command("Ping", Default::default()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::MissingAggregateIdentifier { ref key, .. } if key == "pingerId"
        ));
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn concurrent_creation_has_exactly_one_winner() {
        let store = InMemoryEventStore::new();
        let engine = user_engine_builder(store.clone()).build().unwrap();

        let (first, second) = tokio::join!(
            engine.handle_command(register_user("u-1", "John")),
            engine.handle_command(register_user("u-1", "Jane")),
        );

        let results = [first, second];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::ConcurrencyConflict { .. })))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn parallel_dispatch_on_different_aggregates() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .handle_command(register_user(&format!("u-{i}"), "John"))
                        .await
                })
            })
            .collect();

        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert_eq!(outcome.version, Version::first());
        }
    }

    #[tokio::test]
    async fn conflict_is_retryable_by_the_caller() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();
        engine
            .handle_command(register_user("u-1", "John"))
            .await
            .unwrap();

        let err = engine
            .handle_command(register_user("u-1", "John"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONCURRENCY_CONFLICT");
        assert!(err.is_client_error());

        // Retrying the load-modify-append cycle against the current version works.
        let changed = engine
            .handle_command(change_username("u-1", "Max"))
            .await
            .unwrap();
        assert_eq!(changed.version, Version::new(2));
    }
}

mod snapshots {
    use super::*;

    #[tokio::test]
    async fn snapshot_is_taken_when_interval_is_crossed() {
        let store = InMemoryEventStore::new();
        let engine = user_engine_builder(store.clone())
            .config(EngineConfig::default().with_snapshot_interval(2))
            .build()
            .unwrap();

        engine
            .handle_command(register_user("u-1", "John"))
            .await
            .unwrap();
        assert_eq!(store.snapshot_count().await, 0);

        engine
            .handle_command(change_username("u-1", "Max"))
            .await
            .unwrap();
        let snapshot = store.get_snapshot(&user_stream("u-1")).await.unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(2));
        assert_eq!(snapshot.state["username"], "Max");

        let outcome = engine
            .handle_command(change_username("u-1", "Moritz"))
            .await
            .unwrap();
        assert_eq!(outcome.version, Version::new(3));
        assert_eq!(outcome.state.unwrap()["username"], "Moritz");

        let state = engine.load_aggregate_state("User", "u-1").await.unwrap();
        assert_eq!(state["username"], "Moritz");
    }

    #[tokio::test]
    async fn replay_without_snapshot_matches_replay_with_snapshot() {
        let store = InMemoryEventStore::new();
        let with_snapshots = user_engine_builder(store.clone())
            .config(EngineConfig::default().with_snapshot_interval(1))
            .build()
            .unwrap();
        let without_snapshots = user_engine_builder(store.clone()).build().unwrap();

        with_snapshots
            .handle_command(register_user("u-1", "John"))
            .await
            .unwrap();
        with_snapshots
            .handle_command(change_username("u-1", "Max"))
            .await
            .unwrap();

        assert_eq!(
            with_snapshots.load_aggregate_state("User", "u-1").await.unwrap(),
            without_snapshots
                .load_aggregate_state("User", "u-1")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn replay_starts_from_the_stored_snapshot() {
        let store = InMemoryEventStore::new();
        let plain = user_engine_builder(store.clone()).build().unwrap();
        plain
            .handle_command(register_user("u-1", "John"))
            .await
            .unwrap();
        plain
            .handle_command(change_username("u-1", "Max"))
            .await
            .unwrap();
        store
            .save_snapshot(Snapshot::new(
                user_stream("u-1"),
                Version::first(),
                json!({"userId": "u-1", "username": "John", "restored": true}),
            ))
            .await
            .unwrap();

        let engine = user_engine_builder(store)
            .config(EngineConfig::default().with_snapshot_interval(10))
            .build()
            .unwrap();
        let state = engine.load_aggregate_state("User", "u-1").await.unwrap();

        assert_eq!(state["restored"], true);
        assert_eq!(state["username"], "Max");
    }
}

mod transport {
    use super::*;

    #[tokio::test]
    async fn wire_messages_are_dispatched_by_registered_type() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();
        let wire: WireMessage = serde_json::from_value(json!({
            "message_name": "RegisterUser",
            "payload": {"userId": "u-1", "username": "John"},
            "metadata": {"correlation_id": "http-42"},
            "uuid": "6a2f41a3-c54c-fce8-32d2-0324e1c32e22",
            "created_at": "2024-03-01T10:00:00Z"
        }))
        .unwrap();

        let outcome = engine.dispatch_wire(wire).await.unwrap();

        let command = outcome.into_command().unwrap();
        assert_eq!(
            command.events[0].causation_id(),
            Some("6a2f41a3-c54c-fce8-32d2-0324e1c32e22")
        );
        assert_eq!(command.events[0].correlation_id(), Some("http-42"));
    }

    #[tokio::test]
    async fn dispatch_routes_by_message_type() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();

        let accepted = engine.dispatch(register_user("u-1", "John")).await.unwrap();
        assert!(matches!(accepted, DispatchOutcome::Accepted(_)));

        let result = engine.dispatch(get_user("u-1")).await.unwrap();
        assert_eq!(result.into_query_result().unwrap()["username"], "John");

        let published = engine
            .dispatch(event("WelcomeMailWasSent", json!({"userId": "u-1"})))
            .await
            .unwrap();
        assert!(published.report().unwrap().is_clean());
    }

    #[tokio::test]
    async fn unknown_wire_message_has_an_error_code() {
        let engine = user_engine_builder(InMemoryEventStore::new()).build().unwrap();
        let wire: WireMessage = serde_json::from_value(json!({
            "message_name": "Nope",
            "uuid": "6a2f41a3-c54c-fce8-32d2-0324e1c32e22",
            "created_at": "2024-03-01T10:00:00Z"
        }))
        .unwrap();

        let response = ErrorResponse::from(engine.dispatch_wire(wire).await.unwrap_err());
        assert_eq!(response.code, "UNKNOWN_MESSAGE");
    }
}

mod configuration {
    use super::*;

    #[test]
    fn recorded_event_without_apply_function_fails_build() {
        let result = EngineBuilder::new(
            GenericFlavour::new(),
            user_schemas(),
            InMemoryEventStore::new(),
        )
        .process(
            ProcessDescription::for_command("DeleteUser")
                .with_existing("User")
                .identified_by("userId")
                .handle(GenericFlavour::handler(|_, _, _| Ok(vec![])))
                .record_that("UserWasDeleted"),
        )
        .build();

        assert!(matches!(
            result,
            Err(ConfigError::MissingApplyFunction { ref event_name, .. }) if event_name == "UserWasDeleted"
        ));
    }

    #[test]
    fn queries_must_be_registered_as_queries() {
        let result = user_engine_builder(InMemoryEventStore::new())
            .query(QueryDescription::new(
                "RegisterUser",
                Resolver::immediate(AggregateStateResolver::new("User", "userId")),
            ))
            .build();

        assert!(matches!(
            result,
            Err(ConfigError::WrongMessageType {
                expected: MessageType::Query,
                ..
            })
        ));
    }

    #[test]
    fn duplicate_queries_fail_build() {
        let result = user_engine_builder(InMemoryEventStore::new())
            .query(QueryDescription::new(
                "GetUser",
                Resolver::immediate(AggregateStateResolver::new("User", "userId")),
            ))
            .build();

        assert_eq!(
            result.err(),
            Some(ConfigError::DuplicateQuery("GetUser".to_string()))
        );
    }

    #[test]
    fn zero_watch_capacity_fails_build() {
        let result = user_engine_builder(InMemoryEventStore::new())
            .config(EngineConfig {
                watch_capacity: 0,
                ..EngineConfig::default()
            })
            .build();

        assert_eq!(result.err(), Some(ConfigError::ZeroWatchCapacity));
    }
}
