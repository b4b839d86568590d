use serde::{Deserialize, Serialize};

use super::checkout::Total;

/// Postal address as used for order expectations and billing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub address_country: String,
}

/// Candidate shipping destination offered on a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub address_country: String,
}

impl Destination {
    pub fn postal_address(&self) -> PostalAddress {
        PostalAddress {
            street_address: self.street_address.clone(),
            address_locality: self.address_locality.clone(),
            address_region: self.address_region.clone(),
            postal_code: self.postal_code.clone(),
            address_country: self.address_country.clone(),
        }
    }

    /// Content equality ignoring the server-assigned id.
    pub fn same_address(&self, other: &Destination) -> bool {
        self.street_address == other.street_address
            && self.address_locality == other.address_locality
            && self.address_region == other.address_region
            && self.postal_code == other.postal_code
            && self.address_country == other.address_country
    }
}

/// Priced shipping choice for one fulfillment group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentOption {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    pub totals: Vec<Total>,
}

impl FulfillmentOption {
    pub fn total(&self) -> i64 {
        super::checkout::total_amount(&self.totals, super::checkout::TotalType::Total)
    }
}

/// Partition of a method's line items sharing one set of options for the
/// selected destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentGroup {
    pub id: String,
    pub line_item_ids: Vec<String>,
    #[serde(default)]
    pub options: Vec<FulfillmentOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option_id: Option<String>,
}

impl FulfillmentGroup {
    /// The selected option when the selection resolves against the group's
    /// current options. A selection recorded before options exist resolves
    /// to nothing and contributes no fulfillment total.
    pub fn selected_option(&self) -> Option<&FulfillmentOption> {
        let selected = self.selected_option_id.as_deref()?;
        self.options.iter().find(|o| o.id == selected)
    }
}

/// Fulfillment methods are a tagged variant keyed by `type`; `shipping` is
/// the only concrete variant in this engine. Extend with new variants, not
/// subclassing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FulfillmentMethod {
    #[serde(rename = "shipping")]
    Shipping(ShippingMethod),
}

impl FulfillmentMethod {
    pub fn id(&self) -> &str {
        match self {
            Self::Shipping(m) => &m.id,
        }
    }

    pub fn groups(&self) -> &[FulfillmentGroup] {
        match self {
            Self::Shipping(m) => &m.groups,
        }
    }

    /// A method is fully selected once a destination is chosen and every
    /// group's selection resolves to a priced option.
    pub fn is_fully_selected(&self) -> bool {
        match self {
            Self::Shipping(m) => {
                m.selected_destination().is_some()
                    && !m.groups.is_empty()
                    && m.groups.iter().all(|g| g.selected_option().is_some())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: String,
    pub line_item_ids: Vec<String>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_destination_id: Option<String>,
    #[serde(default)]
    pub groups: Vec<FulfillmentGroup>,
}

impl ShippingMethod {
    pub fn selected_destination(&self) -> Option<&Destination> {
        let selected = self.selected_destination_id.as_deref()?;
        self.destinations.iter().find(|d| d.id == selected)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fulfillment {
    #[serde(default)]
    pub methods: Vec<FulfillmentMethod>,
}

impl Fulfillment {
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
