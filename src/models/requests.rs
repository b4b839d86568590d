use serde::{Deserialize, Serialize};

use super::checkout::Buyer;
use super::payment::{PaymentHandler, PaymentInstrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInput {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemInput {
    /// Echoing a previously assigned id updates that line in place; absent
    /// or unknown ids insert a new line.
    #[serde(default)]
    pub id: Option<String>,
    pub item: ItemInput,
    pub quantity: i32,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscountsInput {
    #[serde(default)]
    pub codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub street_address: Option<String>,
    #[serde(default)]
    pub address_locality: Option<String>,
    #[serde(default)]
    pub address_region: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    pub address_country: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulfillmentGroupInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub line_item_ids: Option<Vec<String>>,
    #[serde(default)]
    pub selected_option_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingMethodInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub line_item_ids: Option<Vec<String>>,
    #[serde(default)]
    pub destinations: Option<Vec<DestinationInput>>,
    #[serde(default)]
    pub selected_destination_id: Option<String>,
    #[serde(default)]
    pub groups: Option<Vec<FulfillmentGroupInput>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FulfillmentMethodInput {
    #[serde(rename = "shipping")]
    Shipping(ShippingMethodInput),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulfillmentInput {
    #[serde(default)]
    pub methods: Vec<FulfillmentMethodInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentInput {
    #[serde(default)]
    pub handlers: Option<Vec<PaymentHandler>>,
    #[serde(default)]
    pub instruments: Vec<PaymentInstrument>,
    #[serde(default)]
    pub selected_instrument_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutCreateRequest {
    /// Caller-assigned checkout id; a fresh id is minted when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub currency: String,
    pub line_items: Vec<LineItemInput>,
    #[serde(default)]
    pub buyer: Option<Buyer>,
    #[serde(default)]
    pub payment: Option<PaymentInput>,
    #[serde(default)]
    pub discounts: Option<DiscountsInput>,
    #[serde(default)]
    pub fulfillment: Option<FulfillmentInput>,
}

/// Update requests carry full-document replace semantics for each section
/// they include; omitted sections are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutUpdateRequest {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub line_items: Option<Vec<LineItemInput>>,
    #[serde(default)]
    pub buyer: Option<Buyer>,
    #[serde(default)]
    pub payment: Option<PaymentInput>,
    #[serde(default)]
    pub discounts: Option<DiscountsInput>,
    #[serde(default)]
    pub fulfillment: Option<FulfillmentInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutCompleteRequest {
    pub payment_data: PaymentInstrument,
    #[serde(default)]
    pub risk_signals: Option<serde_json::Value>,
    #[serde(default)]
    pub buyer: Option<Buyer>,
}
