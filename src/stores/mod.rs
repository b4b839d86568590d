//! Externally-owned read-only stores and collaborators, injected into the
//! engine at call time. The traits are the seam a real catalog, rating
//! service, or payment gateway would implement; the in-memory versions back
//! the sample deployment and the test suite.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::checkout::{Total, TotalType};
use crate::models::fulfillment::{Destination, FulfillmentOption};
use crate::models::payment::{PaymentCredential, PaymentInstrument};

/// Catalog row: authoritative title and unit price in minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    pub title: String,
    pub price: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product(&self, product_id: &str) -> Result<Option<CatalogProduct>, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percent of the eligible subtotal, in whole percent points.
    Percentage,
    /// Fixed amount in minor units, clamped to the eligible subtotal.
    FixedAmount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountRule {
    pub code: String,
    pub title: String,
    pub kind: DiscountKind,
    pub value: i64,
    /// Restricts the subtotal the rule applies to; `None` means the whole
    /// checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_item_ids: Option<Vec<String>>,
}

#[async_trait]
pub trait DiscountRules: Send + Sync {
    /// Batch lookup preserving nothing about order; callers match by code.
    async fn rules_by_codes(&self, codes: &[String]) -> Result<Vec<DiscountRule>, ServiceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingRate {
    pub id: String,
    /// ISO country code or "default" for the fallback row.
    pub country_code: String,
    pub service_level: String,
    pub price: i64,
    pub title: String,
}

/// Free-shipping promotion: triggers on a minimum subtotal or on the
/// presence of an eligible item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_subtotal: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligible_item_ids: Option<Vec<String>>,
    pub description: String,
}

#[async_trait]
pub trait ShippingRates: Send + Sync {
    /// Priced options for a destination and the catalog item ids it would
    /// cover. `subtotal` is the eligible subtotal in minor units.
    async fn options_for(
        &self,
        destination: &Destination,
        item_ids: &[String],
        subtotal: i64,
    ) -> Result<Vec<FulfillmentOption>, ServiceError>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn available(&self, product_id: &str) -> Result<Option<i64>, ServiceError>;
    /// Atomically decrements stock; `false` when insufficient.
    async fn reserve(&self, product_id: &str, quantity: i64) -> Result<bool, ServiceError>;
    async fn release(&self, product_id: &str, quantity: i64) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn addresses_for(&self, email: &str) -> Result<Vec<Destination>, ServiceError>;
    /// Persists an address for the buyer, reusing the stored id when the
    /// content already exists. Returns the canonical id.
    async fn remember(&self, email: &str, destination: &Destination)
        -> Result<String, ServiceError>;
}

#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    async fn authorize(
        &self,
        instrument: &PaymentInstrument,
        risk_signals: Option<&serde_json::Value>,
    ) -> Result<(), ServiceError>;
}

/// Everything the checkout engine needs injected.
pub struct CheckoutStores {
    pub catalog: Arc<dyn ProductCatalog>,
    pub discount_rules: Arc<dyn DiscountRules>,
    pub shipping_rates: Arc<dyn ShippingRates>,
    pub inventory: Arc<dyn InventoryStore>,
    pub address_book: Arc<dyn AddressBook>,
    pub authorizer: Arc<dyn PaymentAuthorizer>,
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryCatalog {
    products: DashMap<String, CatalogProduct>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: CatalogProduct) {
        self.products.insert(product.id.clone(), product);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn product(&self, product_id: &str) -> Result<Option<CatalogProduct>, ServiceError> {
        Ok(self.products.get(product_id).map(|p| p.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryDiscountRules {
    rules: DashMap<String, DiscountRule>,
}

impl InMemoryDiscountRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, rule: DiscountRule) {
        self.rules.insert(rule.code.clone(), rule);
    }
}

#[async_trait]
impl DiscountRules for InMemoryDiscountRules {
    async fn rules_by_codes(&self, codes: &[String]) -> Result<Vec<DiscountRule>, ServiceError> {
        Ok(codes
            .iter()
            .filter_map(|code| self.rules.get(code).map(|r| r.clone()))
            .collect())
    }
}

pub struct InMemoryShippingRates {
    rates: Vec<ShippingRate>,
    promotions: Vec<Promotion>,
}

impl InMemoryShippingRates {
    pub fn new(rates: Vec<ShippingRate>, promotions: Vec<Promotion>) -> Self {
        Self { rates, promotions }
    }

    fn free_shipping_applies(&self, item_ids: &[String], subtotal: i64) -> bool {
        self.promotions.iter().any(|promo| {
            if let Some(min) = promo.min_subtotal {
                if subtotal >= min {
                    return true;
                }
            }
            if let Some(eligible) = &promo.eligible_item_ids {
                if item_ids.iter().any(|id| eligible.contains(id)) {
                    return true;
                }
            }
            false
        })
    }
}

#[async_trait]
impl ShippingRates for InMemoryShippingRates {
    async fn options_for(
        &self,
        destination: &Destination,
        item_ids: &[String],
        subtotal: i64,
    ) -> Result<Vec<FulfillmentOption>, ServiceError> {
        let country = destination.address_country.as_str();
        let free_shipping = self.free_shipping_applies(item_ids, subtotal);

        // One rate per service level, preferring the country-specific row
        // over the "default" fallback.
        let mut by_level: Vec<&ShippingRate> = Vec::new();
        for rate in self
            .rates
            .iter()
            .filter(|r| r.country_code == country || r.country_code == "default")
        {
            match by_level
                .iter()
                .position(|r| r.service_level == rate.service_level)
            {
                Some(idx) => {
                    if by_level[idx].country_code == "default" && rate.country_code != "default" {
                        by_level[idx] = rate;
                    }
                }
                None => by_level.push(rate),
            }
        }
        by_level.sort_by_key(|r| r.price);

        let options = by_level
            .into_iter()
            .map(|rate| {
                let mut price = rate.price;
                let mut title = rate.title.clone();
                if free_shipping && rate.service_level == "standard" {
                    price = 0;
                    title.push_str(" (Free)");
                }
                FulfillmentOption {
                    id: rate.id.clone(),
                    title,
                    carrier: None,
                    totals: vec![
                        Total::new(TotalType::Subtotal, price),
                        Total::new(TotalType::Total, price),
                    ],
                }
            })
            .collect();

        Ok(options)
    }
}

#[derive(Default)]
pub struct InMemoryInventory {
    stock: DashMap<String, i64>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, product_id: &str, quantity: i64) {
        self.stock.insert(product_id.to_string(), quantity);
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventory {
    async fn available(&self, product_id: &str) -> Result<Option<i64>, ServiceError> {
        Ok(self.stock.get(product_id).map(|q| *q))
    }

    async fn reserve(&self, product_id: &str, quantity: i64) -> Result<bool, ServiceError> {
        let mut reserved = false;
        self.stock.alter(product_id, |_, current| {
            if current >= quantity {
                reserved = true;
                current - quantity
            } else {
                current
            }
        });
        Ok(reserved)
    }

    async fn release(&self, product_id: &str, quantity: i64) -> Result<(), ServiceError> {
        self.stock.alter(product_id, |_, current| current + quantity);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAddressBook {
    addresses: DashMap<String, Vec<Destination>>,
}

impl InMemoryAddressBook {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AddressBook for InMemoryAddressBook {
    async fn addresses_for(&self, email: &str) -> Result<Vec<Destination>, ServiceError> {
        Ok(self
            .addresses
            .get(email)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn remember(
        &self,
        email: &str,
        destination: &Destination,
    ) -> Result<String, ServiceError> {
        let mut entry = self.addresses.entry(email.to_string()).or_default();
        if let Some(existing) = entry.iter().find(|d| d.same_address(destination)) {
            return Ok(existing.id.clone());
        }
        let mut stored = destination.clone();
        if stored.id.is_empty() {
            stored.id = Uuid::new_v4().to_string();
        }
        let id = stored.id.clone();
        entry.push(stored);
        Ok(id)
    }
}

/// Mock authorizer: token string equality against a fixed table. Card
/// credentials pass through as authorized.
#[derive(Default)]
pub struct MockPaymentAuthorizer;

impl MockPaymentAuthorizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentAuthorizer for MockPaymentAuthorizer {
    async fn authorize(
        &self,
        instrument: &PaymentInstrument,
        _risk_signals: Option<&serde_json::Value>,
    ) -> Result<(), ServiceError> {
        match &instrument.credential {
            Some(PaymentCredential::Card { number }) => {
                let tail = number
                    .get(number.len().saturating_sub(4)..)
                    .unwrap_or("unknown");
                info!("Authorizing card payment for card ending in {}", tail);
                Ok(())
            }
            Some(PaymentCredential::Token { token }) => match token.as_str() {
                "success_token" => Ok(()),
                "fail_token" => Err(ServiceError::PaymentDeclined {
                    code: "INSUFFICIENT_FUNDS".to_string(),
                    message: "Payment Failed: Insufficient Funds (Mock)".to_string(),
                }),
                "fraud_token" => Err(ServiceError::PaymentDeclined {
                    code: "FRAUD_DETECTED".to_string(),
                    message: "Payment Failed: Fraud Detected (Mock)".to_string(),
                }),
                other => Err(ServiceError::PaymentDeclined {
                    code: "UNKNOWN_TOKEN".to_string(),
                    message: format!("Unknown mock token: {}", other),
                }),
            },
            None => Err(ServiceError::ValidationError(
                "Missing credentials in instrument".to_string(),
            )),
        }
    }
}

/// Seeds the flower-shop sample data the demo server and the integration
/// tests run against.
pub fn seed_flower_shop() -> CheckoutStores {
    let catalog = InMemoryCatalog::new();
    catalog.insert(CatalogProduct {
        id: "bouquet_roses".to_string(),
        title: "Bouquet of Red Roses".to_string(),
        price: 3500,
        image_url: None,
    });
    catalog.insert(CatalogProduct {
        id: "pot_ceramic".to_string(),
        title: "Ceramic Pot".to_string(),
        price: 1500,
        image_url: None,
    });
    catalog.insert(CatalogProduct {
        id: "tulip".to_string(),
        title: "White Tulip".to_string(),
        price: 800,
        image_url: None,
    });

    let discount_rules = InMemoryDiscountRules::new();
    discount_rules.insert(DiscountRule {
        code: "10OFF".to_string(),
        title: "10% off your order".to_string(),
        kind: DiscountKind::Percentage,
        value: 10,
        eligible_item_ids: None,
    });
    discount_rules.insert(DiscountRule {
        code: "ROSES5".to_string(),
        title: "5 off roses".to_string(),
        kind: DiscountKind::FixedAmount,
        value: 500,
        eligible_item_ids: Some(vec!["bouquet_roses".to_string()]),
    });

    let shipping_rates = InMemoryShippingRates::new(
        vec![
            ShippingRate {
                id: "std-ship".to_string(),
                country_code: "US".to_string(),
                service_level: "standard".to_string(),
                price: 0,
                title: "Standard Shipping".to_string(),
            },
            ShippingRate {
                id: "exp-ship".to_string(),
                country_code: "US".to_string(),
                service_level: "express".to_string(),
                price: 1500,
                title: "Express Shipping".to_string(),
            },
            ShippingRate {
                id: "intl-ship".to_string(),
                country_code: "default".to_string(),
                service_level: "standard".to_string(),
                price: 2500,
                title: "International Shipping".to_string(),
            },
        ],
        vec![],
    );

    let inventory = InMemoryInventory::new();
    inventory.set("bouquet_roses", 25);
    inventory.set("pot_ceramic", 50);
    inventory.set("tulip", 10);

    CheckoutStores {
        catalog: Arc::new(catalog),
        discount_rules: Arc::new(discount_rules),
        shipping_rates: Arc::new(shipping_rates),
        inventory: Arc::new(inventory),
        address_book: Arc::new(InMemoryAddressBook::new()),
        authorizer: Arc::new(MockPaymentAuthorizer::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us_destination() -> Destination {
        Destination {
            id: "dest_1".to_string(),
            street_address: Some("123 Main St".to_string()),
            address_locality: Some("Anytown".to_string()),
            address_region: Some("CA".to_string()),
            postal_code: Some("12345".to_string()),
            address_country: "US".to_string(),
        }
    }

    #[tokio::test]
    async fn country_specific_rates_shadow_the_default_row() {
        let stores = seed_flower_shop();
        let options = stores
            .shipping_rates
            .options_for(&us_destination(), &[], 3500)
            .await
            .unwrap();
        let ids: Vec<_> = options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["std-ship", "exp-ship"]);
        assert_eq!(options[0].total(), 0);
    }

    #[tokio::test]
    async fn default_rate_serves_other_countries() {
        let stores = seed_flower_shop();
        let dest = Destination {
            address_country: "DE".to_string(),
            ..us_destination()
        };
        let options = stores
            .shipping_rates
            .options_for(&dest, &[], 3500)
            .await
            .unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].id, "intl-ship");
        assert_eq!(options[0].total(), 2500);
    }

    #[tokio::test]
    async fn free_shipping_promotion_zeroes_the_standard_level() {
        let rates = InMemoryShippingRates::new(
            vec![ShippingRate {
                id: "std".to_string(),
                country_code: "US".to_string(),
                service_level: "standard".to_string(),
                price: 700,
                title: "Standard".to_string(),
            }],
            vec![Promotion {
                id: "free-ship-50".to_string(),
                min_subtotal: Some(5000),
                eligible_item_ids: None,
                description: "Free shipping over 50".to_string(),
            }],
        );
        let options = rates.options_for(&us_destination(), &[], 6000).await.unwrap();
        assert_eq!(options[0].total(), 0);
        assert_eq!(options[0].title, "Standard (Free)");

        let options = rates.options_for(&us_destination(), &[], 3000).await.unwrap();
        assert_eq!(options[0].total(), 700);
    }

    #[tokio::test]
    async fn inventory_reserve_is_all_or_nothing() {
        let inventory = InMemoryInventory::new();
        inventory.set("rose", 3);
        assert!(inventory.reserve("rose", 2).await.unwrap());
        assert!(!inventory.reserve("rose", 2).await.unwrap());
        assert_eq!(inventory.available("rose").await.unwrap(), Some(1));
        inventory.release("rose", 2).await.unwrap();
        assert_eq!(inventory.available("rose").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn address_book_dedupes_by_content() {
        let book = InMemoryAddressBook::new();
        let first = book
            .remember("ada@example.com", &us_destination())
            .await
            .unwrap();
        let second = book
            .remember(
                "ada@example.com",
                &Destination {
                    id: String::new(),
                    ..us_destination()
                },
            )
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(book.addresses_for("ada@example.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mock_authorizer_token_table() {
        let authorizer = MockPaymentAuthorizer::new();
        let mut instrument = PaymentInstrument {
            id: "instr_1".to_string(),
            handler_id: "mock_payment_handler".to_string(),
            instrument_type: "card".to_string(),
            brand: None,
            last_digits: None,
            credential: Some(PaymentCredential::Token {
                token: "success_token".to_string(),
            }),
            billing_address: None,
        };
        assert!(authorizer.authorize(&instrument, None).await.is_ok());

        instrument.credential = Some(PaymentCredential::Token {
            token: "fail_token".to_string(),
        });
        let err = authorizer.authorize(&instrument, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::PaymentDeclined { ref code, .. } if code == "INSUFFICIENT_FUNDS"));
    }
}
