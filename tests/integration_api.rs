//! API integration tests: the full session/transfer/history flow over
//! the real router, backed by the in-memory store.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    middleware, Router,
};
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::Value;
use tower::util::ServiceExt;
use uuid::Uuid;

use wingpay::api::{
    self,
    routes::{RefreshRequest, SessionRequest, TokenPairResponse, TransferRequest},
    AppState,
};
use wingpay::store::{MemoryStore, Store};

use common::{auth_config, seed_account};

fn app(store: MemoryStore) -> Router {
    let state = AppState::new(store, &auth_config());
    api::create_router(state).layer(middleware::from_fn(api::middleware::context_middleware))
}

fn post_json<T: Serialize>(uri: &str, token: Option<&str>, body: &T) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn open_session(app: &Router, account_id: Uuid) -> TokenPairResponse {
    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/session",
            None,
            &SessionRequest { account_id },
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED, "session issuance failed");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_session_transfer_and_history_flow() {
    let store = MemoryStore::new();
    let alice = seed_account(&store, "alice@example.com", "Alice").await;
    let bob = seed_account(&store, "bob@example.com", "Bob").await;
    let app = app(store.clone());

    let session = open_session(&app, alice).await;

    // Transfer to Bob by email.
    let response = app
        .clone()
        .oneshot(post_json(
            "/transfer",
            Some(&session.access_token),
            &TransferRequest {
                recipient: "bob@example.com".to_string(),
                amount: "120.50".to_string(),
            },
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["sender_id"], alice.to_string());
    assert_eq!(body["recipient_id"], bob.to_string());
    assert_eq!(body["amount"], "120.50");

    let sender = store.account_by_id(alice).await.unwrap().unwrap();
    assert_eq!(sender.balance.value(), dec!(379.50));

    // Both parties see the transfer in their history.
    for account in [alice, bob] {
        let session = open_session(&app, account).await;
        let response = app
            .clone()
            .oneshot(get("/transactions", &session.access_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total_count"], 1);
        assert_eq!(body["transactions"][0]["amount"], "120.50");
        assert_eq!(
            body["transactions"][0]["sender"]["email"],
            "alice@example.com"
        );
    }
}

#[tokio::test]
async fn test_protected_routes_require_a_valid_token() {
    let store = MemoryStore::new();
    seed_account(&store, "alice@example.com", "Alice").await;
    let app = app(store);

    let transfer = TransferRequest {
        recipient: "bob@example.com".to_string(),
        amount: "1.00".to_string(),
    };

    // No token at all.
    let response = app
        .clone()
        .oneshot(post_json("/transfer", None, &transfer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "unauthenticated");

    // A token that does not verify.
    let response = app
        .clone()
        .oneshot(post_json("/transfer", Some("not-a-jwt"), &transfer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "invalid_token");
}

#[tokio::test]
async fn test_refresh_rotates_and_rejects_replay() {
    let store = MemoryStore::new();
    let alice = seed_account(&store, "alice@example.com", "Alice").await;
    let app = app(store);

    let session = open_session(&app, alice).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/refresh",
            None,
            &RefreshRequest {
                refresh_token: session.refresh_token.clone(),
            },
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["refresh_token"].as_str().is_some());
    assert_ne!(body["refresh_token"], session.refresh_token.as_str());

    // Replaying the consumed token is an opaque 401.
    let response = app
        .clone()
        .oneshot(post_json(
            "/auth/refresh",
            None,
            &RefreshRequest {
                refresh_token: session.refresh_token,
            },
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "invalid_token");
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_logout_revokes_every_session() {
    let store = MemoryStore::new();
    let alice = seed_account(&store, "alice@example.com", "Alice").await;
    let app = app(store);

    let phone = open_session(&app, alice).await;
    let laptop = open_session(&app, alice).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header("Authorization", format!("Bearer {}", phone.access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["revoked_tokens"], 2);

    for pair in [phone, laptop] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/auth/refresh",
                None,
                &RefreshRequest {
                    refresh_token: pair.refresh_token,
                },
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_transfer_rejections_map_to_http_statuses() {
    let store = MemoryStore::new();
    let alice = seed_account(&store, "alice@example.com", "Alice").await;
    seed_account(&store, "bob@example.com", "Bob").await;
    let app = app(store);
    let session = open_session(&app, alice).await;

    let cases = [
        ("bob@example.com", "0", StatusCode::BAD_REQUEST, "invalid_amount"),
        ("bob@example.com", "-5", StatusCode::BAD_REQUEST, "invalid_amount"),
        ("bob@example.com", "1.999", StatusCode::BAD_REQUEST, "invalid_amount"),
        ("bob@example.com", "ten", StatusCode::BAD_REQUEST, "invalid_amount"),
        ("Alice@Example.com", "10", StatusCode::BAD_REQUEST, "self_transfer"),
        ("bob@example.com", "9999", StatusCode::BAD_REQUEST, "insufficient_funds"),
        ("ghost@example.com", "10", StatusCode::NOT_FOUND, "recipient_not_found"),
    ];

    for (recipient, amount, status, error_code) in cases {
        let response = app
            .clone()
            .oneshot(post_json(
                "/transfer",
                Some(&session.access_token),
                &TransferRequest {
                    recipient: recipient.to_string(),
                    amount: amount.to_string(),
                },
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), status, "case: {amount} to {recipient}");
        let body = body_json(response).await;
        assert_eq!(body["error_code"], error_code, "case: {amount} to {recipient}");
    }

    // Nothing moved.
    let response = app
        .clone()
        .oneshot(get("/transactions", &session.access_token))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total_count"], 0);
}

#[tokio::test]
async fn test_directory_and_balance_endpoints() {
    let store = MemoryStore::new();
    let alice = seed_account(&store, "alice@example.com", "Alice").await;
    seed_account(&store, "bob@example.com", "Bob").await;
    let app = app(store);
    let session = open_session(&app, alice).await;

    // Directory requires auth like every other account-scoped route.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/users")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get("/users", &session.access_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_count"], 2);
    assert_eq!(body["users"][0]["display_name"], "Alice");
    assert_eq!(body["users"][1]["display_name"], "Bob");

    let response = app
        .clone()
        .oneshot(get("/users?filter=bob", &session.access_token))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["users"][0]["email"], "bob@example.com");

    // Balance reflects committed transfers.
    let response = app
        .clone()
        .oneshot(post_json(
            "/transfer",
            Some(&session.access_token),
            &TransferRequest {
                recipient: "bob@example.com".to_string(),
                amount: "100.00".to_string(),
            },
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(get("/balance", &session.access_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["account_id"], alice.to_string());
    assert_eq!(body["balance"], "400.00");
}

#[tokio::test]
async fn test_session_for_unknown_account_is_not_found() {
    let app = app(MemoryStore::new());

    let response = app
        .oneshot(post_json(
            "/auth/session",
            None,
            &SessionRequest {
                account_id: Uuid::new_v4(),
            },
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "account_not_found");
}

#[tokio::test]
async fn test_transaction_listing_query_parameters() {
    let store = MemoryStore::new();
    let alice = seed_account(&store, "alice@example.com", "Alice").await;
    seed_account(&store, "bob@example.com", "Bob").await;
    let app = app(store);
    let session = open_session(&app, alice).await;

    for amount in ["10.00", "20.00", "30.00"] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/transfer",
                Some(&session.access_token),
                &TransferRequest {
                    recipient: "bob@example.com".to_string(),
                    amount: amount.to_string(),
                },
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .clone()
        .oneshot(get(
            "/transactions?sort_by=amount&sort_order=desc&start_index=0&count=2",
            &session.access_token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_count"], 3);
    assert_eq!(body["transactions"][0]["amount"], "30.00");
    assert_eq!(body["transactions"][1]["amount"], "20.00");

    // count=0 is rejected before the store is consulted.
    let response = app
        .clone()
        .oneshot(get("/transactions?count=0", &session.access_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "invalid_page");
}
