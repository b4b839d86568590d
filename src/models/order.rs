use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checkout::{Item, Total};
use super::fulfillment::PostalAddress;

/// Identity of the minted order as echoed back into the checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub id: String,
    pub permalink_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuantity {
    pub total: i32,
    pub fulfilled: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: String,
    pub item: Item,
    pub quantity: OrderQuantity,
    pub totals: Vec<Total>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationLineItem {
    pub id: String,
    pub quantity: i32,
}

/// What the buyer should expect for a group of line items: the method, the
/// destination, and the selected option's description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expectation {
    pub id: String,
    pub line_items: Vec<ExpectationLineItem>,
    pub method_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PostalAddress>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFulfillment {
    #[serde(default)]
    pub expectations: Vec<Expectation>,
    #[serde(default)]
    pub events: Vec<FulfillmentEvent>,
}

/// Immutable order aggregate created exactly once at completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub checkout_id: String,
    pub permalink_url: String,
    pub line_items: Vec<OrderLineItem>,
    pub totals: Vec<Total>,
    #[serde(default)]
    pub fulfillment: OrderFulfillment,
    pub created_at: DateTime<Utc>,
}
