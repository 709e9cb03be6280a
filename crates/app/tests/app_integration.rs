//! Integration tests for the user service: input lines in, replies out.

use app::{Reply, UserService, USERS};
use engine::EngineConfig;
use event_store::{EventStore, InMemoryEventStore, StreamId};
use metrics_exporter_prometheus::PrometheusBuilder;
use projections::DocumentStore;
use serde_json::{Value, json};

async fn service() -> UserService<InMemoryEventStore> {
    UserService::start(InMemoryEventStore::new(), EngineConfig::default())
        .await
        .unwrap()
}

fn line(name: &str, payload: Value) -> String {
    json!({"message_name": name, "payload": payload}).to_string()
}

#[tokio::test]
async fn register_and_query_a_user() {
    let service = service().await;

    let reply = service
        .handle_line(&line(
            "RegisterUser",
            json!({"userId": "u-1", "username": "  John "}),
        ))
        .await;
    assert_eq!(
        reply,
        Reply::Accepted {
            aggregate_type: "User".to_string(),
            aggregate_id: "u-1".to_string(),
            version: 1,
            events: vec!["UserWasRegistered".to_string()],
            failures: 0,
        }
    );

    let reply = service
        .handle_line(&line("GetUser", json!({"userId": "u-1"})))
        .await;
    assert_eq!(
        reply,
        Reply::Result {
            result: json!({"userId": "u-1", "username": "John"})
        }
    );
}

#[tokio::test]
async fn list_users_reads_the_projection() {
    let service = service().await;
    for (id, name) in [("u-1", "John"), ("u-2", "Jane")] {
        service
            .handle_line(&line("RegisterUser", json!({"userId": id, "username": name})))
            .await;
    }
    service
        .handle_line(&line(
            "ChangeUsername",
            json!({"userId": "u-2", "newUsername": "Janet"}),
        ))
        .await;

    let Reply::Result { result } = service.handle_line(&line("ListUsers", json!({}))).await else {
        panic!("expected a query result");
    };
    let names: Vec<_> = result
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["username"].clone())
        .collect();
    assert_eq!(names, vec![json!("John"), json!("Janet")]);
    assert_eq!(service.documents.count(USERS).await, 2);
}

#[tokio::test]
async fn reserved_names_are_rejected() {
    let service = service().await;

    let reply = service
        .handle_line(&line(
            "RegisterUser",
            json!({"userId": "u-1", "username": "root"}),
        ))
        .await;

    let Reply::Error { code, message } = reply else {
        panic!("expected an error reply");
    };
    assert_eq!(code, "REJECTED");
    assert!(message.contains("username root is reserved"));
    assert!(
        service
            .documents
            .get_doc(USERS, "u-1")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn blank_usernames_are_rejected() {
    let service = service().await;

    let reply = service
        .handle_line(&line(
            "RegisterUser",
            json!({"userId": "u-1", "username": "   "}),
        ))
        .await;
    assert!(matches!(reply, Reply::Error { ref code, .. } if code == "REJECTED"));
    assert_eq!(service.documents.count(USERS).await, 0);

    service
        .handle_line(&line(
            "RegisterUser",
            json!({"userId": "u-1", "username": "John"}),
        ))
        .await;
    let reply = service
        .handle_line(&line(
            "ChangeUsername",
            json!({"userId": "u-1", "newUsername": " \t "}),
        ))
        .await;
    assert!(matches!(reply, Reply::Error { ref code, .. } if code == "REJECTED"));

    let reply = service
        .handle_line(&line("GetUser", json!({"userId": "u-1"})))
        .await;
    assert_eq!(
        reply,
        Reply::Result {
            result: json!({"userId": "u-1", "username": "John"})
        }
    );
}

#[tokio::test]
async fn bad_lines_become_error_replies() {
    let service = service().await;

    let cases = [
        ("not json".to_string(), "INVALID_MESSAGE"),
        (line("Shout", json!({})), "UNKNOWN_MESSAGE"),
        (line("RegisterUser", json!({"userId": "u-1"})), "SCHEMA_VIOLATION"),
        (
            line("ChangeUsername", json!({"userId": "ghost", "newUsername": "x"})),
            "AGGREGATE_NOT_FOUND",
        ),
    ];

    for (input, expected) in cases {
        match service.handle_line(&input).await {
            Reply::Error { code, .. } => assert_eq!(code, expected, "input: {input}"),
            other => panic!("expected {expected} for {input}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn wire_messages_keep_their_identity() {
    let service = service().await;
    let wire = json!({
        "message_name": "RegisterUser",
        "payload": {"userId": "u-1", "username": "John"},
        "metadata": {"correlation_id": "cli-7"},
        "uuid": "0d6c4f6e-5d1c-4b5e-9a3f-2f1a8e9c7b10",
        "created_at": "2024-03-01T10:00:00Z"
    });

    let reply = service.handle_line(&wire.to_string()).await;
    assert!(matches!(reply, Reply::Accepted { version: 1, .. }));

    let stored = service
        .engine
        .store()
        .load_stream(&StreamId::new("User", "u-1"))
        .await
        .unwrap();
    assert_eq!(
        stored[0].metadata.get("causation_id"),
        Some(&json!("0d6c4f6e-5d1c-4b5e-9a3f-2f1a8e9c7b10"))
    );
    assert_eq!(stored[0].metadata.get("correlation_id"), Some(&json!("cli-7")));
}

#[tokio::test]
async fn restart_rebuilds_the_user_list() {
    let store = InMemoryEventStore::new();
    let first = UserService::start(store.clone(), EngineConfig::default())
        .await
        .unwrap();
    first
        .handle_line(&line(
            "RegisterUser",
            json!({"userId": "u-1", "username": "John"}),
        ))
        .await;

    let second = UserService::start(store, EngineConfig::default())
        .await
        .unwrap();
    assert_eq!(second.documents.count(USERS).await, 1);
}

#[test]
fn handled_lines_are_counted_by_code() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let service = service().await;
            service
                .handle_line(&line(
                    "RegisterUser",
                    json!({"userId": "u-1", "username": "John"}),
                ))
                .await;
            service.handle_line("not json").await;
        })
    });

    let rendered = handle.render();
    assert!(rendered.contains(r#"app_input_lines_total{code="OK"} 1"#));
    assert!(rendered.contains(r#"app_input_lines_total{code="INVALID_MESSAGE"} 1"#));
}
