use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::webhooks::WebhookNotifier;

/// Events emitted by the checkout engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutCreated {
        checkout_id: String,
    },
    CheckoutUpdated {
        checkout_id: String,
    },
    CheckoutCompleted {
        checkout_id: String,
        order_id: String,
    },
    CheckoutCanceled {
        checkout_id: String,
    },
    OrderPlaced {
        order_id: String,
        checkout_id: String,
        permalink_url: String,
        webhook_url: Option<String>,
    },
    OrderShipped {
        order_id: String,
        checkout_id: String,
        webhook_url: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of propagating failures. Event
    /// delivery is best-effort and never fails the request path.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            error!("Failed to send event {:?}: {}", event, e);
        }
    }
}

/// Drains the event channel, forwarding order lifecycle events to the
/// platform webhook when one was negotiated.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Option<Arc<WebhookNotifier>>) {
    while let Some(event) = rx.recv().await {
        info!("Processing event: {:?}", event);
        match &event {
            Event::OrderPlaced {
                order_id,
                checkout_id,
                permalink_url,
                webhook_url: Some(url),
            } => {
                if let Some(notifier) = &notifier {
                    notifier
                        .notify_order_event(
                            url,
                            "order_placed",
                            checkout_id,
                            order_id,
                            Some(permalink_url.as_str()),
                        )
                        .await;
                }
            }
            Event::OrderShipped {
                order_id,
                checkout_id,
                webhook_url: Some(url),
            } => {
                if let Some(notifier) = &notifier {
                    notifier
                        .notify_order_event(url, "order_shipped", checkout_id, order_id, None)
                        .await;
                }
            }
            _ => {}
        }
    }
    info!("Event channel closed; event processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel_errors() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender
            .send_or_log(Event::CheckoutCreated {
                checkout_id: "chk_1".to_string(),
            })
            .await;
    }

    #[tokio::test]
    async fn events_round_trip_through_the_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .send(Event::CheckoutCompleted {
                checkout_id: "chk_1".to_string(),
                order_id: "ord_1".to_string(),
            })
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::CheckoutCompleted { .. }));
    }
}
