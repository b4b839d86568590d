#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use ucp_merchant_api::{
    cache::InMemoryCache,
    config::DiscountReapplication,
    events::EventSender,
    models::payment::{PaymentCredential, PaymentHandler, PaymentInstrument},
    models::requests::{
        CheckoutCompleteRequest, CheckoutCreateRequest, DestinationInput, FulfillmentGroupInput,
        FulfillmentInput, FulfillmentMethodInput, LineItemInput, ShippingMethodInput,
    },
    services::{
        checkout::{CheckoutConfig, CheckoutService},
        orders::OrderService,
    },
    stores,
};

pub const BASE_URL: &str = "http://merchant.example.com";

/// Checkout service over the seeded flower-shop stores. Events are drained
/// in the background so emission never blocks.
pub fn build_checkout_service(mode: DiscountReapplication) -> Arc<CheckoutService> {
    let (tx, mut rx) = mpsc::channel(64);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let cache = Arc::new(InMemoryCache::new());
    let orders = Arc::new(OrderService::new(cache.clone()));
    Arc::new(CheckoutService::new(
        Arc::new(stores::seed_flower_shop()),
        cache,
        orders,
        EventSender::new(tx),
        CheckoutConfig {
            base_url: BASE_URL.to_string(),
            session_ttl: Duration::from_secs(3600),
            discount_reapplication: mode,
            default_handlers: vec![PaymentHandler::new(
                "mock_payment_handler",
                "mock_payment_handler",
            )],
        },
    ))
}

pub fn line_input(item_id: &str, quantity: i32, id: Option<&str>) -> LineItemInput {
    LineItemInput {
        id: id.map(str::to_string),
        item: ucp_merchant_api::models::requests::ItemInput {
            id: item_id.to_string(),
            title: None,
        },
        quantity,
        parent_id: None,
    }
}

pub fn create_request(items: Vec<LineItemInput>) -> CheckoutCreateRequest {
    CheckoutCreateRequest {
        id: None,
        currency: "USD".to_string(),
        line_items: items,
        buyer: None,
        payment: None,
        discounts: None,
        fulfillment: None,
    }
}

pub fn us_destination_input(id: &str) -> DestinationInput {
    DestinationInput {
        id: Some(id.to_string()),
        street_address: Some("123 Analytical Way".to_string()),
        address_locality: Some("San Francisco".to_string()),
        address_region: Some("CA".to_string()),
        postal_code: Some("94105".to_string()),
        address_country: "US".to_string(),
    }
}

pub fn shipping_with_destination(destination_id: &str) -> FulfillmentInput {
    FulfillmentInput {
        methods: vec![FulfillmentMethodInput::Shipping(ShippingMethodInput {
            destinations: Some(vec![us_destination_input(destination_id)]),
            selected_destination_id: Some(destination_id.to_string()),
            ..Default::default()
        })],
    }
}

pub fn shipping_with_selection(destination_id: &str, option_id: &str) -> FulfillmentInput {
    FulfillmentInput {
        methods: vec![FulfillmentMethodInput::Shipping(ShippingMethodInput {
            selected_destination_id: Some(destination_id.to_string()),
            groups: Some(vec![FulfillmentGroupInput {
                selected_option_id: Some(option_id.to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        })],
    }
}

pub fn token_instrument(handler_id: &str, token: &str) -> PaymentInstrument {
    PaymentInstrument {
        id: "instr_1".to_string(),
        handler_id: handler_id.to_string(),
        instrument_type: "card".to_string(),
        brand: Some("Visa".to_string()),
        last_digits: Some("4242".to_string()),
        credential: Some(PaymentCredential::Token {
            token: token.to_string(),
        }),
        billing_address: None,
    }
}

pub fn complete_request(handler_id: &str, token: &str) -> CheckoutCompleteRequest {
    CheckoutCompleteRequest {
        payment_data: token_instrument(handler_id, token),
        risk_signals: Some(serde_json::json!({"ip": "127.0.0.1"})),
        buyer: None,
    }
}
