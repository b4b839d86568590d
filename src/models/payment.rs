use serde::{Deserialize, Serialize};

use super::fulfillment::PostalAddress;

/// Merchant-configured payment processor. The handler set is fixed at
/// checkout creation and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentHandler {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
}

impl PaymentHandler {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: None,
            spec: None,
        }
    }
}

/// Opaque credential attached to an instrument. Tokens cover the mock
/// authorization path; card numbers are accepted as a pass-through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PaymentCredential {
    #[serde(rename = "token")]
    Token { token: String },
    #[serde(rename = "card")]
    Card { number: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInstrument {
    pub id: String,
    pub handler_id: String,
    #[serde(rename = "type")]
    pub instrument_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_digits: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<PaymentCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<PostalAddress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub handlers: Vec<PaymentHandler>,
    #[serde(default)]
    pub instruments: Vec<PaymentInstrument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_instrument_id: Option<String>,
}

impl Payment {
    pub fn offers_handler(&self, handler_id: &str) -> bool {
        self.handlers.iter().any(|h| h.id == handler_id)
    }
}
