//! Order store: persists the aggregate minted at checkout completion and
//! records post-completion fulfillment events.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::cache::InMemoryCache;
use crate::errors::ServiceError;
use crate::models::order::{FulfillmentEvent, Order};

#[derive(Clone)]
pub struct OrderService {
    cache: Arc<InMemoryCache>,
}

impl OrderService {
    pub fn new(cache: Arc<InMemoryCache>) -> Self {
        Self { cache }
    }

    fn order_key(order_id: &str) -> String {
        format!("order:{}", order_id)
    }

    pub async fn save_order(&self, order: &Order) -> Result<(), ServiceError> {
        self.cache
            .set_json(&Self::order_key(&order.id), order, None)
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.cache
            .get_json::<Order>(&Self::order_key(order_id))
            .await
            .map_err(|e| ServiceError::CacheError(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Simulates a carrier shipment: appends a `shipped` fulfillment event
    /// and returns the updated order.
    #[instrument(skip(self))]
    pub async fn record_shipment(&self, order_id: &str) -> Result<Order, ServiceError> {
        let mut order = self.get_order(order_id).await?;

        order.fulfillment.events.push(FulfillmentEvent {
            id: format!("evt_{}", Uuid::new_v4()),
            event_type: "shipped".to_string(),
            timestamp: Utc::now(),
        });

        self.save_order(&order).await?;
        info!("Recorded shipment event for order {}", order.id);
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::OrderFulfillment;

    fn order(id: &str) -> Order {
        Order {
            id: id.to_string(),
            checkout_id: "chk_1".to_string(),
            permalink_url: format!("http://localhost:8182/orders/{}", id),
            line_items: vec![],
            totals: vec![],
            fulfillment: OrderFulfillment::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let service = OrderService::new(Arc::new(InMemoryCache::new()));
        service.save_order(&order("ord_1")).await.unwrap();
        let loaded = service.get_order("ord_1").await.unwrap();
        assert_eq!(loaded.checkout_id, "chk_1");
    }

    #[tokio::test]
    async fn missing_order_is_not_found() {
        let service = OrderService::new(Arc::new(InMemoryCache::new()));
        let err = service.get_order("nope").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn shipment_appends_a_shipped_event() {
        let service = OrderService::new(Arc::new(InMemoryCache::new()));
        service.save_order(&order("ord_2")).await.unwrap();

        let shipped = service.record_shipment("ord_2").await.unwrap();
        assert_eq!(shipped.fulfillment.events.len(), 1);
        assert_eq!(shipped.fulfillment.events[0].event_type, "shipped");

        let again = service.record_shipment("ord_2").await.unwrap();
        assert_eq!(again.fulfillment.events.len(), 2);
    }
}
