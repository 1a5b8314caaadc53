use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use http_server::core::{AppConfig, AppState};
use inbox::{InboxStore, MemoryInbox};
use ingest::Gateway;
use notify::Notifier;
use registry::Registry;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const KEY: &str = "test-master-key";

const RAW_MAIL: &str = concat!(
    "From: Alice <alice@example.com>\r\n",
    "To: tester@oplex.online\r\n",
    "Subject: Hi\r\n",
    "Content-Type: text/plain; charset=utf-8\r\n",
    "\r\n",
    "Hello there\r\n",
);

const RAW_MAIL_2: &str = concat!(
    "From: carol@example.com\r\n",
    "To: tester@oplex.online\r\n",
    "Subject: Second\r\n",
    "\r\n",
    "Another one\r\n",
);

async fn test_app(ttl: Duration) -> Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let registry = Registry::new(pool, vec!["oplex.online".into(), "agrovia.store".into()]);
    registry.migrate().await.unwrap();
    let inbox_store: Arc<dyn InboxStore> = Arc::new(MemoryInbox::new(ttl));
    let notifier = Notifier::new();
    let gateway = Gateway::new(registry.clone(), inbox_store.clone(), notifier.clone());
    let state = AppState {
        registry,
        inbox: inbox_store,
        notifier,
        gateway,
        config: Arc::new(AppConfig {
            master_key: KEY.into(),
            domains: vec!["oplex.online".into(), "agrovia.store".into()],
            inbox_ttl: ttl,
            max_message_size: 1024 * 1024,
        }),
    };
    http_server::app(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn delete(path: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(path)
        .body(Body::empty())
        .unwrap()
}

fn put_json(path: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn post_raw(path: &str, raw: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(raw.as_bytes().to_vec()))
        .unwrap()
}

#[tokio::test]
async fn requests_without_valid_key_are_rejected() {
    let app = test_app(Duration::from_secs(60)).await;

    let (status, body) = send(&app, get("/generate?deviceId=dev-1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(&app, get("/generate?deviceId=dev-1&key=wrong")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        post_raw("/incoming/raw?to=tester@oplex.online", RAW_MAIL),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // No state change leaked through the gate.
    let (status, body) = send(&app, get(&format!("/history/dev-1?key={KEY}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 0);
    let (_, inbox) = send(&app, get(&format!("/inbox/tester@oplex.online?key={KEY}"))).await;
    assert_eq!(inbox.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn generate_issues_an_address_on_an_allowed_domain() {
    let app = test_app(Duration::from_secs(60)).await;

    let (status, body) = send(&app, get(&format!("/generate?key={KEY}&deviceId=dev-1"))).await;
    assert_eq!(status, StatusCode::OK);
    let email = body["email"].as_str().unwrap();
    assert!(email.ends_with("@oplex.online") || email.ends_with("@agrovia.store"));
    assert_eq!(body["deviceId"], "dev-1");

    let (status, check) = send(&app, get(&format!("/check/{email}?key={KEY}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["available"], false);
    assert_eq!(check["exists"], true);
}

#[tokio::test]
async fn generate_requires_a_device_id() {
    let app = test_app(Duration::from_secs(60)).await;
    let (status, body) = send(&app, get(&format!("/generate?key={KEY}"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn manual_generation_conflicts_and_validates() {
    let app = test_app(Duration::from_secs(60)).await;
    let path =
        format!("/generate/manual?key={KEY}&username=alice&domain=oplex.online&deviceId=dev-a");

    let (status, body) = send(&app, get(&path)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alice@oplex.online");

    let (status, body) = send(&app, get(&path)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "address_taken");

    let (status, body) = send(
        &app,
        get(&format!(
            "/generate/manual?key={KEY}&username=bob&domain=evil.example&deviceId=dev-a"
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_domain");

    let (status, _) = send(
        &app,
        get(&format!(
            "/generate/manual?key={KEY}&username=a&domain=oplex.online&deviceId=dev-a"
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ingested_mail_shows_up_in_the_inbox_in_order() {
    let app = test_app(Duration::from_secs(60)).await;

    // No registry row for this address: mail still creates a live inbox.
    let (status, _) = send(
        &app,
        post_raw(&format!("/incoming/raw?key={KEY}&to=tester@oplex.online"), RAW_MAIL),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        post_raw(&format!("/incoming/raw?key={KEY}&to=tester@oplex.online"), RAW_MAIL_2),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get(&format!("/inbox/tester@oplex.online?key={KEY}"))).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["subject"], "Hi");
    assert_eq!(messages[0]["from"], "Alice <alice@example.com>");
    assert_eq!(messages[1]["subject"], "Second");
}

#[tokio::test]
async fn ingest_rejects_missing_recipient_and_empty_body() {
    let app = test_app(Duration::from_secs(60)).await;

    let (status, body) = send(&app, post_raw(&format!("/incoming/raw?key={KEY}"), RAW_MAIL)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, _) = send(
        &app,
        post_raw(&format!("/incoming/raw?key={KEY}&to=tester@oplex.online"), ""),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_by_index_and_delete_all() {
    let app = test_app(Duration::from_secs(60)).await;
    for raw in [RAW_MAIL, RAW_MAIL_2] {
        send(
            &app,
            post_raw(&format!("/incoming/raw?key={KEY}&to=tester@oplex.online"), raw),
        )
        .await;
    }

    let (status, body) = send(&app, delete(&format!("/delete/tester@oplex.online/5?key={KEY}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send(&app, delete(&format!("/delete/tester@oplex.online/0?key={KEY}"))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app, get(&format!("/inbox/tester@oplex.online?key={KEY}"))).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["subject"], "Second");

    let (status, _) = send(
        &app,
        delete(&format!("/delete/tester@oplex.online/all?key={KEY}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app, get(&format!("/inbox/tester@oplex.online?key={KEY}"))).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn inbox_expires_without_an_explicit_delete() {
    let app = test_app(Duration::from_millis(40)).await;
    send(
        &app,
        post_raw(&format!("/incoming/raw?key={KEY}&to=tester@oplex.online"), RAW_MAIL),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(80)).await;
    let (status, body) = send(&app, get(&format!("/inbox/tester@oplex.online?key={KEY}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn star_history_and_starred_listing() {
    let app = test_app(Duration::from_secs(60)).await;
    send(
        &app,
        get(&format!(
            "/generate/manual?key={KEY}&username=alice&domain=oplex.online&deviceId=dev-a"
        )),
    )
    .await;

    let (status, body) = send(
        &app,
        put_json(
            &format!("/star/alice@oplex.online?key={KEY}"),
            json!({"isStarred": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isStarred"], true);

    let (status, body) = send(
        &app,
        put_json(
            &format!("/star/nobody@oplex.online?key={KEY}"),
            json!({"isStarred": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = send(&app, get(&format!("/history/dev-a?key={KEY}&page=1&limit=10"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["pages"], 1);
    assert_eq!(body["emails"][0]["address"], "alice@oplex.online");
    assert_eq!(body["emails"][0]["isStarred"], true);

    let (status, body) = send(&app, get(&format!("/starred/dev-a?key={KEY}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["emails"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_history_releases_the_address() {
    let app = test_app(Duration::from_secs(60)).await;
    send(
        &app,
        get(&format!(
            "/generate/manual?key={KEY}&username=alice&domain=oplex.online&deviceId=dev-a"
        )),
    )
    .await;
    send(
        &app,
        post_raw(&format!("/incoming/raw?key={KEY}&to=alice@oplex.online"), RAW_MAIL),
    )
    .await;

    // Wrong owner cannot delete the record.
    let (status, body) = send(
        &app,
        delete(&format!("/history/alice@oplex.online?key={KEY}&deviceId=dev-b")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = send(
        &app,
        delete(&format!("/history/alice@oplex.online?key={KEY}&deviceId=dev-a")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["inboxPurged"], true);

    let (_, check) = send(&app, get(&format!("/check/alice@oplex.online?key={KEY}"))).await;
    assert_eq!(check["available"], true);
    assert_eq!(check["exists"], false);

    let (status, _) = send(
        &app,
        delete(&format!("/history/alice@oplex.online?key={KEY}&deviceId=dev-a")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
