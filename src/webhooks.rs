use std::time::Duration;

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tracing::{error, info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// HMAC-SHA256 signer for outbound webhook payloads.
pub struct SignatureGenerator {
    secret: String,
}

impl SignatureGenerator {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Signature over `"{timestamp}.{body}"`, hex-encoded.
    pub fn sign_payload(&self, timestamp: &str, body: &str) -> String {
        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Delivers order lifecycle notifications to the platform-negotiated
/// webhook endpoint. Delivery is best-effort with bounded retries; failures
/// are logged and never propagate to the request path.
pub struct WebhookNotifier {
    client: reqwest::Client,
    signer: Option<SignatureGenerator>,
}

impl WebhookNotifier {
    pub fn new(webhook_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            signer: webhook_secret.map(SignatureGenerator::new),
        }
    }

    #[instrument(skip(self))]
    pub async fn notify_order_event(
        &self,
        webhook_url: &str,
        event_type: &str,
        checkout_id: &str,
        order_id: &str,
        permalink_url: Option<&str>,
    ) {
        let payload = json!({
            "event_type": event_type,
            "checkout_id": checkout_id,
            "order": {
                "id": order_id,
                "permalink_url": permalink_url,
            },
        });
        let body = payload.to_string();

        for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
            let mut request = self
                .client
                .post(webhook_url)
                .header("Content-Type", "application/json");

            if let Some(signer) = &self.signer {
                let timestamp = chrono::Utc::now().timestamp().to_string();
                let signature = signer.sign_payload(&timestamp, &body);
                request = request
                    .header("Webhook-Timestamp", timestamp)
                    .header("Webhook-Signature", signature);
            }

            match request.body(body.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(%event_type, %order_id, "webhook delivered");
                    return;
                }
                Ok(response) => {
                    warn!(
                        %event_type,
                        status = %response.status(),
                        attempt,
                        "webhook endpoint returned an error"
                    );
                }
                Err(e) => {
                    warn!(%event_type, attempt, "webhook delivery failed: {}", e);
                }
            }

            if attempt < MAX_DELIVERY_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }
        }

        error!(%event_type, %order_id, "webhook delivery exhausted retries");
    }
}
