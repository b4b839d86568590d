mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use ucp_merchant_api::{
    cache::InMemoryCache,
    config::{AppConfig, DiscountReapplication},
    events::EventSender,
    handlers::AppServices,
    models::payment::PaymentHandler,
    services::{
        checkout::{CheckoutConfig, CheckoutService},
        orders::OrderService,
    },
    stores, AppState,
};

fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        base_url: common::BASE_URL.to_string(),
        environment: "test".to_string(),
        log_level: "info".to_string(),
        log_json: false,
        session_ttl_secs: 3600,
        discount_reapplication: DiscountReapplication::Replace,
        webhook_secret: None,
        simulation_secret: None,
        cors_allowed_origins: None,
    }
}

fn build_app() -> Router {
    let (tx, mut rx) = mpsc::channel(64);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let event_sender = EventSender::new(tx);

    let cache = Arc::new(InMemoryCache::new());
    let orders = Arc::new(OrderService::new(cache.clone()));
    let checkout = Arc::new(CheckoutService::new(
        Arc::new(stores::seed_flower_shop()),
        cache,
        orders,
        event_sender.clone(),
        CheckoutConfig {
            base_url: common::BASE_URL.to_string(),
            session_ttl: Duration::from_secs(3600),
            discount_reapplication: DiscountReapplication::Replace,
            default_handlers: vec![PaymentHandler::new(
                "mock_payment_handler",
                "mock_payment_handler",
            )],
        },
    ));

    let state = AppState {
        config: test_config(),
        event_sender,
        services: AppServices::new(checkout),
    };

    Router::new()
        .merge(ucp_merchant_api::api_routes())
        .with_state(state)
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => {
            builder = builder.header("Content-Type", "application/json");
            builder.body(Body::from(body.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn create_returns_201_with_location() {
    let app = build_app();
    let request = Request::builder()
        .method("POST")
        .uri("/checkout-sessions")
        .header("Content-Type", "application/json")
        .header("Idempotency-Key", "http-test-0001")
        .body(Body::from(
            json!({
                "currency": "USD",
                "line_items": [{"item": {"id": "bouquet_roses"}, "quantity": 1}]
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response
            .headers()
            .get("Idempotency-Key")
            .and_then(|v| v.to_str().ok()),
        Some("http-test-0001")
    );
    let location = response
        .headers()
        .get("Location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string();

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ready_for_complete");
    assert!(location.ends_with(body["id"].as_str().unwrap()));
}

#[tokio::test]
async fn full_lifecycle_over_http() {
    let app = build_app();

    let (status, created) = send_json(
        &app,
        "POST",
        "/checkout-sessions",
        Some(json!({
            "currency": "USD",
            "line_items": [{"item": {"id": "bouquet_roses"}, "quantity": 1}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    // Add the pot and the discount code in one PUT.
    let bouquet_line = created["line_items"][0]["id"].as_str().unwrap();
    let (status, updated) = send_json(
        &app,
        "PUT",
        &format!("/checkout-sessions/{}", id),
        Some(json!({
            "line_items": [
                {"id": bouquet_line, "item": {"id": "bouquet_roses"}, "quantity": 1},
                {"item": {"id": "pot_ceramic"}, "quantity": 2}
            ],
            "discounts": {"codes": ["10OFF"]}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let totals = updated["totals"].as_array().unwrap();
    assert!(totals
        .iter()
        .any(|t| t["type"] == "discount" && t["amount"] == 650));
    assert!(totals
        .iter()
        .any(|t| t["type"] == "total" && t["amount"] == 5850));

    // Destination, then option.
    let (status, _) = send_json(
        &app,
        "PUT",
        &format!("/checkout-sessions/{}", id),
        Some(json!({
            "fulfillment": {"methods": [{
                "type": "shipping",
                "destinations": [{"id": "dest_1", "address_country": "US"}],
                "selected_destination_id": "dest_1"
            }]}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, ready) = send_json(
        &app,
        "PUT",
        &format!("/checkout-sessions/{}", id),
        Some(json!({
            "fulfillment": {"methods": [{
                "type": "shipping",
                "selected_destination_id": "dest_1",
                "groups": [{"selected_option_id": "std-ship"}]
            }]}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ready["status"], "ready_for_complete");

    let (status, completed) = send_json(
        &app,
        "POST",
        &format!("/checkout-sessions/{}/complete", id),
        Some(json!({
            "payment_data": {
                "id": "instr_1",
                "handler_id": "mock_payment_handler",
                "type": "card",
                "credential": {"type": "token", "token": "success_token"}
            },
            "risk_signals": {"ip": "127.0.0.1"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["status"], "completed");
    let order_id = completed["order"]["id"].as_str().unwrap().to_string();

    let (status, order) = send_json(&app, "GET", &format!("/orders/{}", order_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["checkout_id"].as_str().unwrap(), id);

    let (status, shipped) =
        send_json(&app, "POST", &format!("/orders/{}/ship", order_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipped["fulfillment"]["events"][0]["type"], "shipped");
}

#[tokio::test]
async fn declined_payment_maps_to_402() {
    let app = build_app();
    let (_, created) = send_json(
        &app,
        "POST",
        "/checkout-sessions",
        Some(json!({
            "currency": "USD",
            "line_items": [{"item": {"id": "bouquet_roses"}, "quantity": 1}]
        })),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/checkout-sessions/{}/complete", id),
        Some(json!({
            "payment_data": {
                "id": "instr_1",
                "handler_id": "mock_payment_handler",
                "type": "card",
                "credential": {"type": "token", "token": "fail_token"}
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");
}

#[tokio::test]
async fn unknown_checkout_is_404() {
    let app = build_app();
    let (status, body) = send_json(&app, "GET", "/checkout-sessions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "RESOURCE_NOT_FOUND");
}

#[tokio::test]
async fn cancel_then_cancel_again_conflicts() {
    let app = build_app();
    let (_, created) = send_json(
        &app,
        "POST",
        "/checkout-sessions",
        Some(json!({
            "currency": "USD",
            "line_items": [{"item": {"id": "tulip"}, "quantity": 1}]
        })),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, canceled) = send_json(
        &app,
        "POST",
        &format!("/checkout-sessions/{}/cancel", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(canceled["status"], "canceled");

    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/checkout-sessions/{}/cancel", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CHECKOUT_NOT_MODIFIABLE");
}
