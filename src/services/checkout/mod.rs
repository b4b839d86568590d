//! Checkout session state machine.
//!
//! Owns the `Checkout` aggregate: applies partial updates by merging them
//! against current state, re-invokes the discount and fulfillment resolvers
//! and the pricing fold in order, re-derives status, and gates the
//! completion transition behind payment authorization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::validate_email;

pub mod discounts;
pub mod fulfillment;
pub mod payment;
pub mod pricing;

use crate::cache::InMemoryCache;
use crate::config::DiscountReapplication;
use crate::errors::{ResolutionError, ServiceError};
use crate::events::{Event, EventSender};
use crate::models::checkout::{
    Buyer, Checkout, CheckoutStatus, Item, LineItem, Message, PlatformConfig,
};
use crate::models::fulfillment::FulfillmentMethod;
use crate::models::order::{
    Expectation, ExpectationLineItem, Order, OrderConfirmation, OrderFulfillment, OrderLineItem,
    OrderQuantity,
};
use crate::models::payment::{Payment, PaymentHandler};
use crate::models::requests::{
    CheckoutCompleteRequest, CheckoutCreateRequest, CheckoutUpdateRequest, DestinationInput,
    FulfillmentInput, FulfillmentMethodInput, LineItemInput,
};
use crate::services::orders::OrderService;
use crate::stores::CheckoutStores;

const MAX_LINE_ITEMS: usize = 50;
const MAX_ITEM_QUANTITY: i32 = 99;
const MAX_ITEM_ID_LENGTH: usize = 128;
const MAX_NAME_LENGTH: usize = 120;
const MAX_EMAIL_LENGTH: usize = 254;
const MIN_IDEMPOTENCY_KEY_LENGTH: usize = 8;
const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 255;

/// Engine configuration snapshot handed to the service at construction.
#[derive(Clone)]
pub struct CheckoutConfig {
    pub base_url: String,
    pub session_ttl: Duration,
    pub discount_reapplication: DiscountReapplication,
    pub default_handlers: Vec<PaymentHandler>,
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutResult {
    pub checkout: Checkout,
    pub was_created: bool,
}

/// Replay record for an idempotency key: the canonical hash of the request
/// that produced it plus the checkout state that was returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdempotencyRecord {
    request_hash: String,
    checkout: Checkout,
}

#[derive(Clone)]
pub struct CheckoutService {
    stores: Arc<CheckoutStores>,
    cache: Arc<InMemoryCache>,
    orders: Arc<OrderService>,
    event_sender: EventSender,
    config: CheckoutConfig,
    session_locks: Arc<AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    idempotency_locks: Arc<AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl CheckoutService {
    pub fn new(
        stores: Arc<CheckoutStores>,
        cache: Arc<InMemoryCache>,
        orders: Arc<OrderService>,
        event_sender: EventSender,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            stores,
            cache,
            orders,
            event_sender,
            config,
            session_locks: Arc::new(AsyncMutex::new(HashMap::new())),
            idempotency_locks: Arc::new(AsyncMutex::new(HashMap::new())),
        }
    }

    /// Create a checkout session.
    #[instrument(skip(self, request))]
    pub async fn create_checkout(
        &self,
        request: CheckoutCreateRequest,
        idempotency_key: Option<&str>,
        platform: Option<PlatformConfig>,
    ) -> Result<CreateCheckoutResult, ServiceError> {
        self.validate_create_request(&request)?;

        match idempotency_key {
            Some(key) => {
                let hashed = Self::hash_idempotency_key(key)?;
                let request_hash = Self::request_hash(&request)?;
                let lock = Self::acquire(&self.idempotency_locks, &hashed).await;
                let guard = lock.lock().await;
                let result = self
                    .create_checkout_idempotent(&hashed, &request_hash, request, platform)
                    .await;
                drop(guard);
                Self::release(&self.idempotency_locks, &hashed, lock).await;
                result
            }
            None => {
                let checkout = self.create_checkout_inner(request, platform).await?;
                Ok(CreateCheckoutResult {
                    checkout,
                    was_created: true,
                })
            }
        }
    }

    async fn create_checkout_idempotent(
        &self,
        hashed_key: &str,
        request_hash: &str,
        request: CheckoutCreateRequest,
        platform: Option<PlatformConfig>,
    ) -> Result<CreateCheckoutResult, ServiceError> {
        if let Some(checkout) = self.idempotent_replay(hashed_key, request_hash).await? {
            return Ok(CreateCheckoutResult {
                checkout,
                was_created: false,
            });
        }
        let created = self.create_checkout_inner(request, platform).await?;
        self.record_idempotency(hashed_key, request_hash, &created)
            .await?;
        Ok(CreateCheckoutResult {
            checkout: created,
            was_created: true,
        })
    }

    async fn create_checkout_inner(
        &self,
        request: CheckoutCreateRequest,
        platform: Option<PlatformConfig>,
    ) -> Result<Checkout, ServiceError> {
        let now = Utc::now();
        let checkout_id = request
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let line_items = self.merge_line_items(&[], &request.line_items).await?;

        let payment = match &request.payment {
            Some(input) => Payment {
                handlers: input
                    .handlers
                    .clone()
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| self.config.default_handlers.clone()),
                instruments: input.instruments.clone(),
                selected_instrument_id: input.selected_instrument_id.clone(),
            },
            None => Payment {
                handlers: self.config.default_handlers.clone(),
                instruments: vec![],
                selected_instrument_id: None,
            },
        };

        let mut checkout = Checkout {
            id: checkout_id,
            status: CheckoutStatus::InProgress,
            currency: request.currency.trim().to_uppercase(),
            line_items,
            buyer: request.buyer.clone(),
            discounts: Default::default(),
            fulfillment: Default::default(),
            payment,
            totals: vec![],
            messages: vec![],
            order: None,
            platform,
            created_at: now,
            updated_at: None,
            expires_at: now + chrono::Duration::from_std(self.config.session_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(3600)),
            completed_at: None,
            canceled_at: None,
        };
        if let Some(discounts) = &request.discounts {
            checkout.discounts.codes = discounts.codes.clone();
        }

        self.recompute(&mut checkout, request.fulfillment.as_ref())
            .await?;
        self.validate_inventory(&checkout).await?;
        checkout.status = Self::derive_status(&checkout);

        self.save_checkout(&checkout).await?;
        self.event_sender
            .send_or_log(Event::CheckoutCreated {
                checkout_id: checkout.id.clone(),
            })
            .await;

        info!("Created checkout session: {}", checkout.id);
        Ok(checkout)
    }

    /// Get a checkout session, surfacing expiry as the `expired` status.
    #[instrument(skip(self))]
    pub async fn get_checkout(&self, checkout_id: &str) -> Result<Checkout, ServiceError> {
        let mut checkout = self.load_checkout(checkout_id).await?;
        if !checkout.status.is_terminal() && checkout.expires_at <= Utc::now() {
            checkout.status = CheckoutStatus::Expired;
            self.save_checkout(&checkout).await?;
        }
        Ok(checkout)
    }

    /// Update a checkout session. Each supplied section carries full-document
    /// replace semantics; omitted sections are left untouched.
    #[instrument(skip(self, request))]
    pub async fn update_checkout(
        &self,
        checkout_id: &str,
        request: CheckoutUpdateRequest,
        idempotency_key: Option<&str>,
        platform: Option<PlatformConfig>,
    ) -> Result<Checkout, ServiceError> {
        self.validate_update_request(&request)?;

        let lock = Self::acquire(&self.session_locks, checkout_id).await;
        let guard = lock.lock().await;
        let result = self
            .update_checkout_locked(checkout_id, request, idempotency_key, platform)
            .await;
        drop(guard);
        Self::release(&self.session_locks, checkout_id, lock).await;

        if let Ok(checkout) = &result {
            info!("Updated checkout session: {}", checkout.id);
        }
        result
    }

    async fn update_checkout_locked(
        &self,
        checkout_id: &str,
        request: CheckoutUpdateRequest,
        idempotency_key: Option<&str>,
        platform: Option<PlatformConfig>,
    ) -> Result<Checkout, ServiceError> {
        let idempotency = match idempotency_key {
            Some(key) => {
                let hashed = Self::hash_idempotency_key(key)?;
                let request_hash = Self::request_hash(&request)?;
                if let Some(checkout) = self.idempotent_replay(&hashed, &request_hash).await? {
                    return Ok(checkout);
                }
                Some((hashed, request_hash))
            }
            None => None,
        };

        let mut checkout = self.load_checkout(checkout_id).await?;
        self.ensure_open(&mut checkout).await?;

        if let Some(currency) = &request.currency {
            if !currency.trim().eq_ignore_ascii_case(&checkout.currency) {
                return Err(ServiceError::ValidationError(
                    "Currency is fixed at checkout creation".to_string(),
                ));
            }
        }

        if let Some(items) = &request.line_items {
            checkout.line_items = self.merge_line_items(&checkout.line_items, items).await?;
        }

        if let Some(buyer) = request.buyer {
            checkout.buyer = Some(buyer);
        }

        if let Some(payment) = &request.payment {
            // Handler configs are read-only after creation; only the
            // instrument side of the section is replaced.
            checkout.payment.instruments = payment.instruments.clone();
            checkout.payment.selected_instrument_id = payment.selected_instrument_id.clone();
        }

        if let Some(discounts) = &request.discounts {
            checkout.discounts.codes = discounts.codes.clone();
        }

        if platform.is_some() {
            checkout.platform = platform;
        }

        self.recompute(&mut checkout, request.fulfillment.as_ref())
            .await?;
        self.validate_inventory(&checkout).await?;

        checkout.status = Self::derive_status(&checkout);
        let now = Utc::now();
        checkout.updated_at = Some(now);
        checkout.expires_at = now
            + chrono::Duration::from_std(self.config.session_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(3600));

        self.save_checkout(&checkout).await?;
        if let Some((hashed, request_hash)) = idempotency {
            self.record_idempotency(&hashed, &request_hash, &checkout)
                .await?;
        }

        self.event_sender
            .send_or_log(Event::CheckoutUpdated {
                checkout_id: checkout.id.clone(),
            })
            .await;

        Ok(checkout)
    }

    /// Complete a checkout session: authorize payment, reserve stock, mint
    /// the order, and freeze the aggregate — atomically under the per-id
    /// lock.
    #[instrument(skip(self, request))]
    pub async fn complete_checkout(
        &self,
        checkout_id: &str,
        request: CheckoutCompleteRequest,
        idempotency_key: Option<&str>,
    ) -> Result<Checkout, ServiceError> {
        self.validate_complete_request(&request)?;

        let lock = Self::acquire(&self.session_locks, checkout_id).await;
        let guard = lock.lock().await;
        let result = self
            .complete_checkout_locked(checkout_id, request, idempotency_key)
            .await;
        drop(guard);
        Self::release(&self.session_locks, checkout_id, lock).await;

        if let Ok(checkout) = &result {
            info!("Completed checkout session: {}", checkout.id);
        }
        result
    }

    async fn complete_checkout_locked(
        &self,
        checkout_id: &str,
        request: CheckoutCompleteRequest,
        idempotency_key: Option<&str>,
    ) -> Result<Checkout, ServiceError> {
        let idempotency = match idempotency_key {
            Some(key) => {
                let hashed = Self::hash_idempotency_key(key)?;
                let request_hash = Self::request_hash(&request)?;
                if let Some(checkout) = self.idempotent_replay(&hashed, &request_hash).await? {
                    return Ok(checkout);
                }
                Some((hashed, request_hash))
            }
            None => None,
        };

        let mut checkout = self.load_checkout(checkout_id).await?;
        self.ensure_open(&mut checkout).await?;

        if checkout.status != CheckoutStatus::ReadyForComplete {
            return Err(ServiceError::InvalidState(format!(
                "Checkout {} is not ready for completion",
                checkout.id
            )));
        }

        if let Some(buyer) = request.buyer {
            checkout.buyer = Some(buyer);
        }

        payment::authorize(
            self.stores.authorizer.as_ref(),
            &checkout.payment,
            &request.payment_data,
            request.risk_signals.as_ref(),
        )
        .await?;

        self.reserve_inventory(&checkout).await?;

        checkout.payment.instruments.push(request.payment_data.clone());
        checkout.payment.selected_instrument_id = Some(request.payment_data.id.clone());

        let order_id = Uuid::new_v4().to_string();
        let permalink_url = format!(
            "{}/orders/{}",
            self.config.base_url.trim_end_matches('/'),
            order_id
        );
        let order = Self::build_order(&checkout, &order_id, &permalink_url);
        self.orders.save_order(&order).await?;

        let now = Utc::now();
        checkout.order = Some(OrderConfirmation {
            id: order_id.clone(),
            permalink_url: permalink_url.clone(),
        });
        checkout.status = CheckoutStatus::Completed;
        checkout.completed_at = Some(now);
        checkout.updated_at = Some(now);
        self.save_checkout(&checkout).await?;

        if let Some((hashed, request_hash)) = idempotency {
            self.record_idempotency(&hashed, &request_hash, &checkout)
                .await?;
        }

        let webhook_url = checkout
            .platform
            .as_ref()
            .and_then(|p| p.webhook_url.clone());
        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                checkout_id: checkout.id.clone(),
                order_id: order_id.clone(),
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id,
                checkout_id: checkout.id.clone(),
                permalink_url,
                webhook_url,
            })
            .await;

        Ok(checkout)
    }

    /// Cancel a checkout session (terminal, invalid once completed).
    #[instrument(skip(self))]
    pub async fn cancel_checkout(
        &self,
        checkout_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Checkout, ServiceError> {
        let lock = Self::acquire(&self.session_locks, checkout_id).await;
        let guard = lock.lock().await;
        let result = self
            .cancel_checkout_locked(checkout_id, idempotency_key)
            .await;
        drop(guard);
        Self::release(&self.session_locks, checkout_id, lock).await;

        if let Ok(checkout) = &result {
            info!("Canceled checkout session: {}", checkout.id);
        }
        result
    }

    async fn cancel_checkout_locked(
        &self,
        checkout_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Checkout, ServiceError> {
        let idempotency = match idempotency_key {
            Some(key) => {
                let hashed = Self::hash_idempotency_key(key)?;
                let request_hash = Self::request_hash(&serde_json::json!({}))?;
                if let Some(checkout) = self.idempotent_replay(&hashed, &request_hash).await? {
                    return Ok(checkout);
                }
                Some((hashed, request_hash))
            }
            None => None,
        };

        let mut checkout = self.load_checkout(checkout_id).await?;
        self.ensure_open(&mut checkout).await?;

        let now = Utc::now();
        checkout.status = CheckoutStatus::Canceled;
        checkout.canceled_at = Some(now);
        checkout.updated_at = Some(now);
        self.save_checkout(&checkout).await?;

        if let Some((hashed, request_hash)) = idempotency {
            self.record_idempotency(&hashed, &request_hash, &checkout)
                .await?;
        }

        self.event_sender
            .send_or_log(Event::CheckoutCanceled {
                checkout_id: checkout.id.clone(),
            })
            .await;

        Ok(checkout)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.orders.get_order(order_id).await
    }

    /// Simulates a shipping event on a completed order and notifies the
    /// platform webhook.
    #[instrument(skip(self))]
    pub async fn ship_order(&self, order_id: &str) -> Result<Order, ServiceError> {
        let order = self.orders.record_shipment(order_id).await?;

        let webhook_url = match self.load_checkout(&order.checkout_id).await {
            Ok(checkout) => checkout.platform.and_then(|p| p.webhook_url),
            Err(_) => None,
        };
        self.event_sender
            .send_or_log(Event::OrderShipped {
                order_id: order.id.clone(),
                checkout_id: order.checkout_id.clone(),
                webhook_url,
            })
            .await;

        Ok(order)
    }

    // -- recomputation ----------------------------------------------------

    /// Re-runs the resolvers and the pricing fold: discounts, then
    /// fulfillment, then totals. Recoverable resolver failures land in
    /// `checkout.messages`; the merge still commits.
    async fn recompute(
        &self,
        checkout: &mut Checkout,
        fulfillment_request: Option<&FulfillmentInput>,
    ) -> Result<(), ServiceError> {
        let mut errors: Vec<ResolutionError> = Vec::new();

        let outcome = discounts::resolve(
            self.stores.discount_rules.as_ref(),
            &checkout.line_items,
            &checkout.discounts.codes,
            &checkout.discounts.applied,
            self.config.discount_reapplication,
        )
        .await?;
        checkout.discounts.applied = outcome.applications;
        errors.extend(outcome.errors);

        let buyer_email = checkout.buyer.as_ref().map(|b| b.email.clone());
        let outcome = fulfillment::resolve(
            self.stores.shipping_rates.as_ref(),
            self.stores.address_book.as_ref(),
            &checkout.line_items,
            fulfillment_request,
            &checkout.fulfillment,
            buyer_email.as_deref(),
        )
        .await?;
        checkout.fulfillment = outcome.fulfillment;
        errors.extend(outcome.errors);

        pricing::recompute(checkout, None);

        checkout.messages = errors
            .into_iter()
            .map(|e| Message::error(e.code(), e.param(), e.message()))
            .collect();

        Ok(())
    }

    fn derive_status(checkout: &Checkout) -> CheckoutStatus {
        if checkout.status.is_terminal() {
            return checkout.status;
        }
        let fulfillment_ready = checkout
            .fulfillment
            .methods
            .iter()
            .all(FulfillmentMethod::is_fully_selected);
        if !checkout.line_items.is_empty() && !checkout.currency.is_empty() && fulfillment_ready {
            CheckoutStatus::ReadyForComplete
        } else {
            CheckoutStatus::InProgress
        }
    }

    /// Merges the caller's line-item list against current state by id:
    /// echoed ids update in place, fresh or unknown ids insert new lines,
    /// omitted ids are removed. Prices and titles come from the catalog.
    async fn merge_line_items(
        &self,
        existing: &[LineItem],
        inputs: &[LineItemInput],
    ) -> Result<Vec<LineItem>, ServiceError> {
        let mut merged = Vec::with_capacity(inputs.len());
        for input in inputs {
            let product = self
                .stores
                .catalog
                .product(&input.item.id)
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!("Product {} not found", input.item.id))
                })?;

            let id = input
                .id
                .as_ref()
                .filter(|id| existing.iter().any(|li| &li.id == *id))
                .cloned()
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            merged.push(LineItem {
                id,
                item: Item {
                    id: product.id,
                    title: product.title,
                    price: product.price,
                },
                quantity: input.quantity,
                totals: vec![],
                parent_id: input.parent_id.clone(),
            });
        }
        Ok(merged)
    }

    async fn validate_inventory(&self, checkout: &Checkout) -> Result<(), ServiceError> {
        for line in &checkout.line_items {
            let available = self
                .stores
                .inventory
                .available(&line.item.id)
                .await?
                .unwrap_or(0);
            if available < i64::from(line.quantity) {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient stock for item {}",
                    line.item.id
                )));
            }
        }
        Ok(())
    }

    /// Reserves stock for every line, releasing partial reservations when a
    /// later line runs dry.
    async fn reserve_inventory(&self, checkout: &Checkout) -> Result<(), ServiceError> {
        let mut reserved: Vec<(&str, i64)> = Vec::new();
        for line in &checkout.line_items {
            let quantity = i64::from(line.quantity);
            if self.stores.inventory.reserve(&line.item.id, quantity).await? {
                reserved.push((line.item.id.as_str(), quantity));
            } else {
                for (item_id, qty) in reserved {
                    self.stores.inventory.release(item_id, qty).await?;
                }
                return Err(ServiceError::InsufficientStock(format!(
                    "Item {} is out of stock",
                    line.item.id
                )));
            }
        }
        Ok(())
    }

    fn build_order(checkout: &Checkout, order_id: &str, permalink_url: &str) -> Order {
        let mut expectations = Vec::new();
        for method in &checkout.fulfillment.methods {
            let FulfillmentMethod::Shipping(shipping) = method;
            let destination = shipping
                .selected_destination()
                .map(|d| d.postal_address());

            for group in &shipping.groups {
                let Some(option) = group.selected_option() else {
                    continue;
                };
                expectations.push(Expectation {
                    id: format!("exp_{}", Uuid::new_v4()),
                    line_items: checkout
                        .line_items
                        .iter()
                        .filter(|li| group.line_item_ids.contains(&li.id))
                        .map(|li| ExpectationLineItem {
                            id: li.id.clone(),
                            quantity: li.quantity,
                        })
                        .collect(),
                    method_type: "shipping".to_string(),
                    destination: destination.clone(),
                    description: option.title.clone(),
                });
            }
        }

        Order {
            id: order_id.to_string(),
            checkout_id: checkout.id.clone(),
            permalink_url: permalink_url.to_string(),
            line_items: checkout
                .line_items
                .iter()
                .map(|li| OrderLineItem {
                    id: li.id.clone(),
                    item: li.item.clone(),
                    quantity: OrderQuantity {
                        total: li.quantity,
                        fulfilled: 0,
                    },
                    totals: li.totals.clone(),
                    status: "processing".to_string(),
                    parent_id: li.parent_id.clone(),
                })
                .collect(),
            totals: checkout.totals.clone(),
            fulfillment: OrderFulfillment {
                expectations,
                events: vec![],
            },
            created_at: Utc::now(),
        }
    }

    // -- persistence and idempotency --------------------------------------

    fn session_key(checkout_id: &str) -> String {
        format!("checkout_session:{}", checkout_id)
    }

    fn idempotency_key_slot(hashed: &str) -> String {
        format!("checkout_idem:{}", hashed)
    }

    async fn load_checkout(&self, checkout_id: &str) -> Result<Checkout, ServiceError> {
        self.cache
            .get_json::<Checkout>(&Self::session_key(checkout_id))
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Checkout session {} not found", checkout_id))
            })
    }

    async fn save_checkout(&self, checkout: &Checkout) -> Result<(), ServiceError> {
        self.cache
            .set_json(&Self::session_key(&checkout.id), checkout, None)
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))
    }

    /// Terminal and timed-out checkouts reject mutation. Expiry observed
    /// here is committed before the error returns so later reads surface
    /// the `expired` status.
    async fn ensure_open(&self, checkout: &mut Checkout) -> Result<(), ServiceError> {
        match checkout.status {
            CheckoutStatus::Completed => Err(ServiceError::InvalidState(
                "Checkout already completed".to_string(),
            )),
            CheckoutStatus::Canceled => Err(ServiceError::InvalidState(
                "Checkout is canceled".to_string(),
            )),
            CheckoutStatus::Expired => Err(ServiceError::InvalidState(
                "Checkout session has expired".to_string(),
            )),
            _ if checkout.expires_at <= Utc::now() => {
                checkout.status = CheckoutStatus::Expired;
                self.save_checkout(checkout).await?;
                Err(ServiceError::InvalidState(
                    "Checkout session has expired".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn idempotent_replay(
        &self,
        hashed_key: &str,
        request_hash: &str,
    ) -> Result<Option<Checkout>, ServiceError> {
        let record = self
            .cache
            .get_json::<IdempotencyRecord>(&Self::idempotency_key_slot(hashed_key))
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?;
        match record {
            Some(record) if record.request_hash == request_hash => Ok(Some(record.checkout)),
            Some(_) => Err(ServiceError::IdempotencyConflict(
                "Idempotency key reused with different parameters".to_string(),
            )),
            None => Ok(None),
        }
    }

    async fn record_idempotency(
        &self,
        hashed_key: &str,
        request_hash: &str,
        checkout: &Checkout,
    ) -> Result<(), ServiceError> {
        let record = IdempotencyRecord {
            request_hash: request_hash.to_string(),
            checkout: checkout.clone(),
        };
        self.cache
            .set_json(
                &Self::idempotency_key_slot(hashed_key),
                &record,
                Some(self.config.session_ttl),
            )
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))
    }

    fn hash_idempotency_key(key: &str) -> Result<String, ServiceError> {
        let key = key.trim();
        if key.len() < MIN_IDEMPOTENCY_KEY_LENGTH {
            return Err(ServiceError::ValidationError(format!(
                "Idempotency key must be at least {} characters long",
                MIN_IDEMPOTENCY_KEY_LENGTH
            )));
        }
        if key.len() > MAX_IDEMPOTENCY_KEY_LENGTH {
            return Err(ServiceError::ValidationError(format!(
                "Idempotency key must be {} characters or fewer",
                MAX_IDEMPOTENCY_KEY_LENGTH
            )));
        }
        if !key.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ServiceError::ValidationError(
                "Idempotency key must contain visible ASCII characters only".to_string(),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Canonical hash of a request body for idempotent replay detection.
    fn request_hash<T: Serialize>(value: &T) -> Result<String, ServiceError> {
        let json = serde_json::to_string(value)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    async fn acquire(
        locks: &Arc<AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
        key: &str,
    ) -> Arc<AsyncMutex<()>> {
        let mut locks = locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn release(
        locks: &Arc<AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
        key: &str,
        lock: Arc<AsyncMutex<()>>,
    ) {
        if Arc::strong_count(&lock) == 1 {
            let mut locks = locks.lock().await;
            if let Some(existing) = locks.get(key) {
                if Arc::ptr_eq(existing, &lock) {
                    locks.remove(key);
                }
            }
        }
    }

    // -- request validation ------------------------------------------------

    fn validate_create_request(&self, request: &CheckoutCreateRequest) -> Result<(), ServiceError> {
        Self::validate_currency(&request.currency)?;
        Self::validate_items(&request.line_items)?;
        if let Some(buyer) = &request.buyer {
            Self::validate_buyer(buyer)?;
        }
        if let Some(fulfillment) = &request.fulfillment {
            Self::validate_fulfillment_input(fulfillment)?;
        }
        Ok(())
    }

    fn validate_update_request(&self, request: &CheckoutUpdateRequest) -> Result<(), ServiceError> {
        if request.currency.is_none()
            && request.line_items.is_none()
            && request.buyer.is_none()
            && request.payment.is_none()
            && request.discounts.is_none()
            && request.fulfillment.is_none()
        {
            return Err(ServiceError::ValidationError(
                "At least one field must be supplied to update a checkout session".to_string(),
            ));
        }
        if let Some(items) = &request.line_items {
            Self::validate_items(items)?;
        }
        if let Some(buyer) = &request.buyer {
            Self::validate_buyer(buyer)?;
        }
        if let Some(fulfillment) = &request.fulfillment {
            Self::validate_fulfillment_input(fulfillment)?;
        }
        Ok(())
    }

    fn validate_complete_request(
        &self,
        request: &CheckoutCompleteRequest,
    ) -> Result<(), ServiceError> {
        if let Some(buyer) = &request.buyer {
            Self::validate_buyer(buyer)?;
        }
        Self::ensure_ascii_identifier(
            "payment_data.handler_id",
            &request.payment_data.handler_id,
            64,
        )?;
        Ok(())
    }

    fn validate_currency(currency: &str) -> Result<(), ServiceError> {
        let trimmed = currency.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ServiceError::ValidationError(
                "currency must be a three-letter ISO code".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_items(items: &[LineItemInput]) -> Result<(), ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one line item is required".to_string(),
            ));
        }
        if items.len() > MAX_LINE_ITEMS {
            return Err(ServiceError::ValidationError(format!(
                "A maximum of {} line items are supported",
                MAX_LINE_ITEMS
            )));
        }
        for item in items {
            if item.quantity < 1 || item.quantity > MAX_ITEM_QUANTITY {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for item {} must be between 1 and {}",
                    item.item.id, MAX_ITEM_QUANTITY
                )));
            }
            Self::ensure_ascii_identifier("line_items.item.id", &item.item.id, MAX_ITEM_ID_LENGTH)?;
        }
        Ok(())
    }

    fn validate_buyer(buyer: &Buyer) -> Result<(), ServiceError> {
        Self::ensure_non_empty("buyer.first_name", &buyer.first_name, MAX_NAME_LENGTH)?;
        Self::ensure_non_empty("buyer.last_name", &buyer.last_name, MAX_NAME_LENGTH)?;
        Self::ensure_non_empty("buyer.email", &buyer.email, MAX_EMAIL_LENGTH)?;
        if !validate_email(&buyer.email) {
            return Err(ServiceError::ValidationError(
                "buyer.email is not a valid email address".to_string(),
            ));
        }
        if let Some(phone) = &buyer.phone_number {
            if !Self::is_valid_phone(phone) {
                return Err(ServiceError::ValidationError(
                    "buyer.phone_number is not a valid phone number".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn validate_fulfillment_input(input: &FulfillmentInput) -> Result<(), ServiceError> {
        for method in &input.methods {
            let FulfillmentMethodInput::Shipping(shipping) = method;
            if let Some(destinations) = &shipping.destinations {
                for destination in destinations {
                    Self::validate_destination_input(destination)?;
                }
            }
        }
        Ok(())
    }

    fn validate_destination_input(destination: &DestinationInput) -> Result<(), ServiceError> {
        let country = destination.address_country.trim();
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ServiceError::ValidationError(
                "destination.address_country must be a two-character ISO country code".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_non_empty(field: &str, value: &str, max_len: usize) -> Result<(), ServiceError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Self::ensure_length(field, trimmed, max_len)
    }

    fn ensure_length(field: &str, value: &str, max_len: usize) -> Result<(), ServiceError> {
        if value.chars().count() > max_len {
            return Err(ServiceError::ValidationError(format!(
                "{} must be {} characters or fewer",
                field, max_len
            )));
        }
        Ok(())
    }

    fn ensure_ascii_identifier(field: &str, value: &str, max_len: usize) -> Result<(), ServiceError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/' | '#'))
        {
            return Err(ServiceError::ValidationError(format!(
                "{} contains unsupported characters",
                field
            )));
        }
        Self::ensure_length(field, trimmed, max_len)
    }

    fn is_valid_phone(phone: &str) -> bool {
        if phone.trim().is_empty() {
            return false;
        }
        if !phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')' | '.'))
        {
            return false;
        }
        let digit_count = phone.chars().filter(|c| c.is_ascii_digit()).count();
        (7..=16).contains(&digit_count)
    }
}
