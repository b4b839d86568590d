use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

use crate::{errors::ServiceError, models::order::Order, AppState};

/// Routes for post-completion order access and lifecycle simulation.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/ship", post(ship_order))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ServiceError> {
    let order = state.services.checkout.get_order(&id).await?;
    Ok(Json(order))
}

/// Simulates a carrier shipping event. Guarded by a shared secret when one
/// is configured.
async fn ship_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Order>, ServiceError> {
    if let Some(secret) = &state.config.simulation_secret {
        let supplied = headers
            .get("Simulation-Secret")
            .and_then(|v| v.to_str().ok());
        if supplied != Some(secret.as_str()) {
            return Err(ServiceError::Unauthorized(
                "Invalid simulation secret".to_string(),
            ));
        }
    }

    let order = state.services.checkout.ship_order(&id).await?;
    Ok(Json(order))
}
