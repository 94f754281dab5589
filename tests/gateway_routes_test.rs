//! Router, runner and transaction behavior against a recording bridge.

mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::{app, get, post, send, state, Call, RecordingBridge};
use resource_gateway::{gateway_router, AuthorizationMode, BridgeError, Route, TransactionMode};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

#[tokio::test]
async fn get_resource_runs_in_a_read_transaction() {
    let bridge = RecordingBridge::new();
    let reply = send(app(&bridge), get("/orders/7")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["content-type"], "application/vnd.api+json");
    assert_eq!(reply.body, json!({ "data": { "type": "orders", "id": "7" } }));

    let calls = bridge.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], Call::Begin(TransactionMode::ReadOnly));
    assert!(matches!(
        &calls[1],
        Call::Fetch { route: Route::Resource { entity, id }, user, .. }
            if entity == "orders" && id == "7" && user == "admin"
    ));
    assert_eq!(calls[2], Call::Commit);
}

#[tokio::test]
async fn every_shape_is_readable() {
    for (uri, shape) in [
        ("/orders", "collection"),
        ("/orders/7", "resource"),
        ("/orders/7/customer", "nested collection"),
        ("/customers/3/relationships/orders", "relationship"),
    ] {
        let bridge = RecordingBridge::new();
        let reply = send(app(&bridge), get(uri)).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", uri);
        match &bridge.calls()[1] {
            Call::Fetch { route, .. } => assert_eq!(route.shape(), shape),
            other => panic!("expected fetch, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn query_parameters_are_forwarded_verbatim() {
    let bridge = RecordingBridge::new();
    let uri = "/orders?include=customer&include=lines&filter%5Bstatus%5D=open&page%5Blimit%5D=5";
    let reply = send(app(&bridge), get(uri)).await;
    assert_eq!(reply.status, StatusCode::OK);

    let Call::Fetch { params, .. } = &bridge.calls()[1] else {
        panic!("expected fetch");
    };
    assert_eq!(params.get_all("include"), ["customer", "lines"]);
    assert_eq!(params.first("filter[status]"), Some("open"));
    assert_eq!(params.first("page[limit]"), Some("5"));
    assert_eq!(params.len(), 3);
}

#[tokio::test]
async fn post_collection_creates_and_commits() {
    let bridge = RecordingBridge::new();
    let body = r#"{"data":{"type":"orders","attributes":{"status":"open"}}}"#;
    let reply = send(app(&bridge), post("/orders", body)).await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["data"]["id"], "1");
    let calls = bridge.calls();
    assert_eq!(calls[0], Call::Begin(TransactionMode::ReadWrite));
    assert_eq!(
        calls[1],
        Call::Create {
            route: Route::parse("/orders").unwrap(),
            body: body.to_string(),
            user: "admin".into(),
            authorization: AuthorizationMode::Inactive,
        }
    );
    assert_eq!(calls[2], Call::Commit);
}

#[tokio::test]
async fn post_relationship_answers_ok() {
    let bridge = RecordingBridge::new();
    let body = r#"{"data":[{"type":"orders","id":"10"}]}"#;
    let reply = send(app(&bridge), post("/customers/3/relationships/orders", body)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(bridge.calls().last(), Some(&Call::Commit));
}

#[tokio::test]
async fn create_authorization_mode_reaches_the_bridge() {
    let bridge = RecordingBridge::new();
    let state = state(&bridge).with_create_authorization(AuthorizationMode::Active);
    let app = gateway_router(state, 1024);
    send(app, post("/orders", r#"{"data":{"type":"orders"}}"#)).await;
    assert!(matches!(
        &bridge.calls()[1],
        Call::Create { authorization: AuthorizationMode::Active, .. }
    ));
}

#[tokio::test]
async fn bridge_failure_rolls_back_and_keeps_status() {
    let bridge = RecordingBridge::failing_with(|| BridgeError::Forbidden("USER may not write orders".into()));
    let reply = send(app(&bridge), post("/orders", r#"{"data":{"type":"orders"}}"#)).await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["errors"][0]["status"], "403");
    assert_eq!(reply.body["errors"][0]["code"], "forbidden");
    let calls = bridge.calls();
    assert_eq!(calls.last(), Some(&Call::Rollback));
    assert!(!calls.contains(&Call::Commit));
}

#[tokio::test]
async fn read_failure_rolls_back() {
    let bridge = RecordingBridge::failing_with(|| BridgeError::NotFound("orders 7 not found".into()));
    let reply = send(app(&bridge), get("/orders/7")).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["errors"][0]["detail"], "orders 7 not found");
    assert_eq!(bridge.calls().last(), Some(&Call::Rollback));
}

#[tokio::test]
async fn database_details_do_not_leak() {
    let bridge = RecordingBridge::failing_with(|| BridgeError::Internal("relation \"shop.orders\" does not exist".into()));
    let reply = send(app(&bridge), get("/orders")).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["errors"][0]["detail"], "internal error");
}

#[tokio::test]
async fn commit_failure_is_a_server_error() {
    let bridge = RecordingBridge::failing_commit();
    let reply = send(app(&bridge), post("/orders", r#"{"data":{"type":"orders"}}"#)).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["errors"][0]["code"], "transaction_error");
    assert_eq!(reply.body["errors"][0]["detail"], "transaction could not be completed");
}

#[tokio::test]
async fn post_is_limited_to_collections_and_relationships() {
    for uri in ["/orders/7", "/orders/7/customer"] {
        let bridge = RecordingBridge::new();
        let reply = send(app(&bridge), post(uri, "{}")).await;
        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED, "{}", uri);
        assert_eq!(reply.body["errors"][0]["code"], "method_not_allowed");
        assert!(bridge.calls().is_empty(), "no transaction for {}", uri);
    }
}

#[tokio::test]
async fn other_methods_get_an_error_envelope() {
    let bridge = RecordingBridge::new();
    let request = Request::builder()
        .method("DELETE")
        .uri("/orders/7")
        .header("authorization", common::admin())
        .body(Body::empty())
        .unwrap();
    let reply = send(app(&bridge), request).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(reply.body["errors"][0]["detail"], "method DELETE not allowed on resource routes");
    assert!(bridge.calls().is_empty());
}

#[tokio::test]
async fn unclassifiable_paths_never_reach_the_bridge() {
    for uri in ["/", "/a/b/c/d/e", "/orders//customer", "/orders/7/owner/relationships", "/orders/"] {
        let bridge = RecordingBridge::new();
        let reply = send(app(&bridge), get(uri)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(reply.body["errors"][0]["code"], "not_found");
        assert!(bridge.calls().is_empty(), "{}", uri);
    }
}

#[tokio::test]
async fn non_json_accept_is_not_acceptable() {
    let bridge = RecordingBridge::new();
    let request = Request::builder()
        .uri("/orders")
        .header("authorization", common::admin())
        .header("accept", "text/html")
        .body(Body::empty())
        .unwrap();
    let reply = send(app(&bridge), request).await;
    assert_eq!(reply.status, StatusCode::NOT_ACCEPTABLE);
    assert!(bridge.calls().is_empty());

    let request = Request::builder()
        .uri("/orders")
        .header("authorization", common::admin())
        .header("accept", "text/html, application/vnd.api+json")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(app(&bridge), request).await.status, StatusCode::OK);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let bridge = RecordingBridge::new();
    let app = gateway_router(state(&bridge), 16);
    let reply = send(app, post("/orders", &"x".repeat(64))).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.body["errors"][0]["status"], "413");
    assert_eq!(reply.body["errors"][0]["code"], "payload_too_large");
    assert!(!bridge.calls().iter().any(|c| matches!(c, Call::Create { .. })));
}

#[tokio::test]
async fn non_utf8_bodies_get_the_error_envelope() {
    let bridge = RecordingBridge::new();
    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("authorization", common::admin())
        .header("content-type", "application/vnd.api+json")
        .body(Body::from(vec![0xff_u8, 0xfe, 0x00]))
        .unwrap();
    let reply = send(app(&bridge), request).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errors"][0]["status"], "400");
    assert_eq!(reply.body["errors"][0]["code"], "bad_request");
    assert!(bridge.calls().is_empty());
}

#[tokio::test]
async fn encoded_segments_reach_the_bridge_as_sent() {
    let bridge = RecordingBridge::new();
    let reply = send(app(&bridge), get("/tags/caf%C3%A9")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(matches!(
        &bridge.calls()[1],
        Call::Fetch { route: Route::Resource { id, .. }, .. } if id == "caf%C3%A9"
    ));
}

#[tokio::test]
async fn cors_preflight_needs_no_credentials() {
    let bridge = RecordingBridge::new();
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/orders")
        .header("origin", "https://app.example")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let reply = send(app(&bridge), request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["access-control-allow-origin"], "*");
    assert!(bridge.calls().is_empty());

    let mut request = get("/orders/7");
    request.headers_mut().insert("origin", "https://app.example".parse().unwrap());
    let reply = send(app(&bridge), request).await;
    assert_eq!(reply.headers["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn concurrent_reads_do_not_wait_on_each_other() {
    let barrier = Arc::new(Barrier::new(2));
    let bridge = RecordingBridge::with_barrier(barrier);
    let first = send(app(&bridge), get("/orders/1"));
    let second = send(app(&bridge), get("/orders/2"));

    let (a, b) = tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(first, second) })
        .await
        .expect("both reads must be in flight at once");
    assert_eq!(a.status, StatusCode::OK);
    assert_eq!(b.status, StatusCode::OK);
    let commits = bridge.calls().iter().filter(|c| **c == Call::Commit).count();
    assert_eq!(commits, 2);
}
