use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use ucp_merchant_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Seeded in-memory stores: catalog, discount rules, shipping rates,
    // inventory, address book, and the mock payment authorizer.
    let stores = Arc::new(api::stores::seed_flower_shop());
    let cache = Arc::new(api::cache::InMemoryCache::new());

    // Init events and the webhook-forwarding processor
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = api::events::EventSender::new(event_tx);
    let notifier = Arc::new(api::webhooks::WebhookNotifier::new(
        cfg.webhook_secret.clone(),
    ));
    tokio::spawn(api::events::process_events(event_rx, Some(notifier)));

    let orders = Arc::new(api::services::orders::OrderService::new(cache.clone()));
    let checkout = Arc::new(api::services::checkout::CheckoutService::new(
        stores,
        cache,
        orders,
        event_sender.clone(),
        api::services::checkout::CheckoutConfig {
            base_url: cfg.base_url.clone(),
            session_ttl: Duration::from_secs(cfg.session_ttl_secs),
            discount_reapplication: cfg.discount_reapplication,
            default_handlers: vec![api::models::payment::PaymentHandler::new(
                "mock_payment_handler",
                "mock_payment_handler",
            )],
        },
    ));

    let app_state = api::AppState {
        config: cfg.clone(),
        event_sender,
        services: api::handlers::AppServices::new(checkout),
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = match configured_origins {
        Some(origins) => CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let app = Router::new()
        .merge(api::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("ucp-merchant-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
