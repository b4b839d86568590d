//! UCP Merchant API Library
//!
//! Checkout session engine for the Universal Commerce Protocol: discovery
//! clients build a cart, apply discounts, select fulfillment, and complete
//! payment through a uniform REST contract.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod services;
pub mod stores;
pub mod webhooks;

use axum::Router;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Assembles the UCP routes served by the binary.
pub fn api_routes() -> Router<AppState> {
    handlers::checkout::checkout_routes().merge(handlers::orders::order_routes())
}
