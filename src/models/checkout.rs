use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::discount::Discounts;
use super::fulfillment::Fulfillment;
use super::order::OrderConfirmation;
use super::payment::Payment;

/// Lifecycle of a checkout session. `Completed`, `Canceled` and `Expired`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    InProgress,
    ReadyForComplete,
    Completed,
    Canceled,
    Expired,
}

impl CheckoutStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Expired)
    }
}

/// Named total line. Amounts are integer minor units of the checkout
/// currency; no floating point anywhere in the fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalType {
    Subtotal,
    Discount,
    Fulfillment,
    Tax,
    Total,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Total {
    #[serde(rename = "type")]
    pub total_type: TotalType,
    pub amount: i64,
}

impl Total {
    pub fn new(total_type: TotalType, amount: i64) -> Self {
        Self { total_type, amount }
    }
}

/// Returns the amount of the first total line of the given type, zero when
/// the line is absent.
pub fn total_amount(totals: &[Total], total_type: TotalType) -> i64 {
    totals
        .iter()
        .find(|t| t.total_type == total_type)
        .map(|t| t.amount)
        .unwrap_or(0)
}

/// Catalog item reference carried on a line item. Price and title are
/// authoritative from the catalog; a client-supplied title is informational
/// only and overwritten on resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub item: Item,
    pub quantity: i32,
    #[serde(default)]
    pub totals: Vec<Total>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl LineItem {
    pub fn subtotal(&self) -> i64 {
        self.item.price * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Non-fatal feedback reported alongside the committed merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "info")]
    Info {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        param: Option<String>,
        content_type: String,
        content: String,
    },
    #[serde(rename = "error")]
    Error {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        param: Option<String>,
        content_type: String,
        content: String,
    },
}

impl Message {
    pub fn error(code: impl Into<String>, param: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            param: Some(param.into()),
            content_type: "plain".to_string(),
            content: content.into(),
        }
    }
}

/// Platform-level configuration attached by the transport (e.g. the webhook
/// endpoint negotiated from the agent profile).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// The root checkout aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    pub id: String,
    pub status: CheckoutStatus,
    pub currency: String,
    pub line_items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer: Option<Buyer>,
    #[serde(default)]
    pub discounts: Discounts,
    #[serde(default)]
    pub fulfillment: Fulfillment,
    pub payment: Payment,
    #[serde(default)]
    pub totals: Vec<Total>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderConfirmation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformConfig>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Checkout {
    pub fn line_item_ids(&self) -> Vec<String> {
        self.line_items.iter().map(|li| li.id.clone()).collect()
    }
}
