//! HTTP surface for the checkout engine.

use std::sync::Arc;

use crate::services::checkout::CheckoutService;

pub mod checkout;
pub mod orders;

/// Services shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    pub fn new(checkout: Arc<CheckoutService>) -> Self {
        Self { checkout }
    }
}
