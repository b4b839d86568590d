use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post, put},
    Router,
};

use crate::{
    errors::ServiceError,
    models::checkout::{Checkout, PlatformConfig},
    models::requests::{CheckoutCompleteRequest, CheckoutCreateRequest, CheckoutUpdateRequest},
    AppState,
};

/// Routes for the UCP checkout session operations.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout-sessions", post(create_checkout))
        .route("/checkout-sessions/:id", get(get_checkout))
        .route("/checkout-sessions/:id", put(update_checkout))
        .route("/checkout-sessions/:id/complete", post(complete_checkout))
        .route("/checkout-sessions/:id/cancel", post(cancel_checkout))
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, ServiceError> {
    match headers.get("Idempotency-Key") {
        Some(value) => value
            .to_str()
            .map(|v| Some(v.to_owned()))
            .map_err(|_| ServiceError::ValidationError(
                "Idempotency-Key must be valid ASCII".to_string(),
            )),
        None => Ok(None),
    }
}

/// Platform configuration negotiated by the transport. The sample server
/// accepts the webhook endpoint directly via header instead of fetching the
/// agent profile referenced by `UCP-Agent`.
fn platform_config(headers: &HeaderMap) -> Option<PlatformConfig> {
    headers
        .get("UCP-Webhook-Url")
        .and_then(|v| v.to_str().ok())
        .map(|url| PlatformConfig {
            webhook_url: Some(url.to_owned()),
        })
}

async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutCreateRequest>,
) -> Result<Response, ServiceError> {
    let idempotency = idempotency_key(&headers)?;
    let platform = platform_config(&headers);

    let result = state
        .services
        .checkout
        .create_checkout(payload, idempotency.as_deref(), platform)
        .await?;
    let checkout = result.checkout;

    let mut response = Response::builder()
        .status(if result.was_created {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        })
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-store");

    if let Some(value) = headers.get("Idempotency-Key") {
        response = response.header("Idempotency-Key", value);
    }
    if let Some(request_id) = headers.get("Request-Id") {
        response = response.header("Request-Id", request_id);
    }
    if result.was_created {
        response = response.header("Location", format!("/checkout-sessions/{}", checkout.id));
    }

    let body = serde_json::to_string(&checkout)
        .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
    response
        .body(body.into())
        .map_err(|e| ServiceError::InternalError(format!("Response build error: {}", e)))
}

async fn get_checkout(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Checkout>, ServiceError> {
    let checkout = state.services.checkout.get_checkout(&id).await?;
    Ok(Json(checkout))
}

async fn update_checkout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutUpdateRequest>,
) -> Result<Json<Checkout>, ServiceError> {
    let idempotency = idempotency_key(&headers)?;
    let platform = platform_config(&headers);

    let checkout = state
        .services
        .checkout
        .update_checkout(&id, payload, idempotency.as_deref(), platform)
        .await?;
    Ok(Json(checkout))
}

async fn complete_checkout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutCompleteRequest>,
) -> Result<Json<Checkout>, ServiceError> {
    let idempotency = idempotency_key(&headers)?;

    let checkout = state
        .services
        .checkout
        .complete_checkout(&id, payload, idempotency.as_deref())
        .await?;
    Ok(Json(checkout))
}

async fn cancel_checkout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Checkout>, ServiceError> {
    let idempotency = idempotency_key(&headers)?;

    let checkout = state
        .services
        .checkout
        .cancel_checkout(&id, idempotency.as_deref())
        .await?;
    Ok(Json(checkout))
}
