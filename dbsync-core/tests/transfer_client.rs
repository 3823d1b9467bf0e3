//! Transfer client behavior against an in-process HTTP server.

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use dbsync_core::protocol::TransferEnvelope;
use dbsync_core::security::{DatabaseCredentials, SharedSecret, derive_token, time_bucket, unix_now};
use dbsync_core::{
    ClientConfig, ErrorCode, InspectRequest, InspectorAction, RemoteSource, SchemaObjectKind,
    TransferClient, TransferError,
};
use serde_json::{Value, json};
use std::time::Duration;

async fn inspect(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    match body["action"].as_str().unwrap_or_default() {
        "get_tables" => Json(TransferEnvelope::ok(json!({"names": ["orders", "users"]}))).into_response(),
        "list_databases" => Json(TransferEnvelope::ok(json!({
            "names": [],
            "echo": {
                "api_key": header("x-api-key"),
                "token": header("x-sync-token"),
                "db_user": body["db_user"],
                "db_pass": body["db_pass"],
                "db_name": body["db_name"],
                "body_api_key": body.get("api_key").cloned().unwrap_or(Value::Null),
            }
        })))
        .into_response(),
        "get_views" => (
            StatusCode::UNAUTHORIZED,
            Json(TransferEnvelope::failure(
                ErrorCode::InvalidApiKey,
                "Unauthorized: Invalid API key",
            )),
        )
            .into_response(),
        "get_procedures" => (StatusCode::OK, "<html>Fatal error</html>").into_response(),
        "get_functions" => Json(json!({
            "success": false,
            "data": null,
            "message": "",
            "timestamp": "2024-01-01 00:00:00"
        }))
        .into_response(),
        "get_table_data" => Json(TransferEnvelope::ok(json!({
            "rows": [{"id": 3}],
            "total_rows": 3,
            "offset": body["offset"],
            "limit": body["limit"],
            "has_more": false
        })))
        .into_response(),
        "get_table_structure" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(TransferEnvelope::ok(json!({"name": "x", "create_statement": "CREATE TABLE x (id int)"})))
                .into_response()
        }
        _ => Json(TransferEnvelope::ok(json!({"triggers": "not-a-list"}))).into_response(),
    }
}

async fn spawn_server() -> String {
    let app = Router::new().route("/console/api/inspect", post(inspect));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/console", addr)
}

fn client(base_url: &str) -> TransferClient {
    let config = ClientConfig::new(base_url, SharedSecret::new("shared-secret")).unwrap();
    let credentials = DatabaseCredentials::new("db.internal", "reader", "pw").with_database("shop");
    TransferClient::new(config, credentials).unwrap()
}

#[tokio::test]
async fn test_success_returns_data() {
    let base = spawn_server().await;
    let names = client(&base)
        .list_objects(SchemaObjectKind::Table)
        .await
        .unwrap();
    assert_eq!(names, vec!["orders", "users"]);
}

#[tokio::test]
async fn test_request_carries_secret_and_credentials() {
    let base = spawn_server().await;
    let data = client(&base)
        .call(
            InspectorAction::ListDatabases,
            InspectRequest::for_action(InspectorAction::ListDatabases),
        )
        .await
        .unwrap();

    let echo = &data["echo"];
    assert_eq!(echo["api_key"], json!("shared-secret"));
    assert_eq!(echo["token"], json!(""));
    assert_eq!(echo["db_user"], json!("reader"));
    assert_eq!(echo["db_pass"], json!("pw"));
    assert_eq!(echo["db_name"], json!("shop"));
    assert_eq!(echo["body_api_key"], Value::Null);
}

#[tokio::test]
async fn test_token_header_when_enabled() {
    let base = spawn_server().await;
    let secret = SharedSecret::new("shared-secret");
    let config = ClientConfig::new(&base, secret.clone()).unwrap().with_token(true);
    let client = TransferClient::new(config, DatabaseCredentials::new("h", "u", "")).unwrap();

    let before = time_bucket(unix_now(), 300);
    let data = client
        .call(
            InspectorAction::ListDatabases,
            InspectRequest::for_action(InspectorAction::ListDatabases),
        )
        .await
        .unwrap();
    let after = time_bucket(unix_now(), 300);

    if before == after {
        assert_eq!(data["echo"]["token"], json!(derive_token(&secret, before)));
    }
}

#[tokio::test]
async fn test_failure_envelope_is_application_error() {
    let base = spawn_server().await;
    let err = client(&base)
        .list_objects(SchemaObjectKind::View)
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ApplicationError);
    assert_eq!(err.remote_code(), Some("INVALID_API_KEY"));
    match err {
        TransferError::Application {
            message, status, timestamp, ..
        } => {
            assert_eq!(message, "Unauthorized: Invalid API key");
            assert_eq!(status, 401);
            assert_eq!(timestamp.len(), 19);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_non_json_reply_is_protocol_error() {
    let base = spawn_server().await;
    let err = client(&base)
        .list_objects(SchemaObjectKind::Procedure)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ProtocolError);
}

#[tokio::test]
async fn test_failure_without_message_is_protocol_error() {
    let base = spawn_server().await;
    let err = client(&base)
        .list_objects(SchemaObjectKind::Function)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ProtocolError);
}

#[tokio::test]
async fn test_unexpected_payload_shape_is_protocol_error() {
    let base = spawn_server().await;
    let err = client(&base).list_triggers().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ProtocolError);
}

#[tokio::test]
async fn test_table_page_round_trip() {
    let base = spawn_server().await;
    let page = client(&base).table_page("users", 2, 2).await.unwrap();
    assert_eq!(page.offset, 2);
    assert_eq!(page.limit, 2);
    assert_eq!(page.rows.len(), 1);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_timeout_is_network_error() {
    let base = spawn_server().await;
    let config = ClientConfig::new(&base, SharedSecret::new("k"))
        .unwrap()
        .with_timeout(Duration::from_millis(200));
    let client = TransferClient::new(config, DatabaseCredentials::new("h", "u", "")).unwrap();

    let err = client
        .object_definition(SchemaObjectKind::Table, "x")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NetworkError);
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_unreachable_remote_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{}", addr))
        .list_objects(SchemaObjectKind::Table)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NetworkError);
    assert!(!err.to_string().contains("shared-secret"));
}
