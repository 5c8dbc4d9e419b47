//! The worker loop that drains [`WebhookQueue`] entries, signs them, and
//! POSTs them to subscriber endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::models::WebhookDelivery;
use crate::storage::StorageGateway;

use super::queue::WebhookQueue;
use super::signer::WebhookSigner;

pub struct DeliveryWorker {
    queue: Arc<WebhookQueue>,
    storage: Arc<dyn StorageGateway>,
    http: Client,
    config: WebhookConfig,
}

impl DeliveryWorker {
    pub fn new(queue: Arc<WebhookQueue>, storage: Arc<dyn StorageGateway>, config: WebhookConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.delivery_timeout_secs))
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self { queue, storage, http, config }
    }

    /// Spawns one polling loop per tenant. Tenants are discovered lazily
    /// as events arrive — `WebhookNotifier` calls this the first time it
    /// enqueues a delivery for a given tenant, rather than this worker
    /// knowing the full tenant list up front.
    pub fn spawn_tenant_loop(self: &Arc<Self>, tenant_id: Uuid) {
        let worker = self.clone();
        tokio::spawn(async move {
            loop {
                if !worker.drain_tenant_once(tenant_id).await {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
        });
    }

    /// Pops and attempts a single delivery for `tenant_id`. Returns
    /// `false` when the queue was empty (caller should back off).
    pub async fn drain_tenant_once(&self, tenant_id: Uuid) -> bool {
        let Some(delivery) = self.queue.dequeue(tenant_id) else { return false };
        self.attempt_delivery(delivery).await;
        true
    }

    async fn attempt_delivery(&self, delivery: WebhookDelivery) {
        let subscription = match self.storage.get_subscription(delivery.subscription_id).await {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::error!(error = %err, delivery_id = %delivery.id, "webhook subscription vanished, dropping to dead-letter");
                let _ = self.queue.move_to_dlq(delivery).await;
                return;
            }
        };

        let signer = WebhookSigner::new(&subscription.secret);
        let (header_name, header_value) = match signer.signature_header(&delivery.payload) {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!(error = %err, delivery_id = %delivery.id, "failed to sign webhook payload");
                let _ = self.queue.move_to_dlq(delivery).await;
                return;
            }
        };

        let response = self
            .http
            .post(&subscription.target_url)
            .header(header_name, header_value)
            .json(&delivery.payload)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let status = resp.status().as_u16();
                crate::metrics::record_webhook_delivery(&delivery.event_type, "delivered");
                let _ = self.queue.mark_delivered(delivery, status).await;
            }
            Ok(resp) => {
                // Every non-2xx response schedules a retry, not just
                // throttling (429) — a subscriber's 4xx can be transient
                // (token refresh in flight, endpoint mid-deploy), and the
                // backoff/DLQ-after-max_attempts path already bounds how
                // long a permanently broken endpoint keeps retrying.
                let status_code = resp.status().as_u16();
                crate::metrics::record_webhook_delivery(&delivery.event_type, "retry");
                let _ = self
                    .queue
                    .enqueue_retry(delivery, &format!("http {status_code}"), Some(status_code))
                    .await;
            }
            Err(err) => {
                crate::metrics::record_webhook_delivery(&delivery.event_type, "retry");
                let _ = self.queue.enqueue_retry(delivery, &err.to_string(), None).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryStatus, QueuePriority, WebhookSubscription};
    use crate::storage::InMemoryStorage;
    use chrono::Utc;
    use serde_json::json;

    fn sample_delivery(subscription: &WebhookSubscription) -> WebhookDelivery {
        WebhookDelivery {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            tenant_id: subscription.tenant_id,
            event_type: "match.found".to_string(),
            payload: json!({"ok": true}),
            request_headers: Vec::new(),
            priority: QueuePriority::Normal,
            status: DeliveryStatus::Pending,
            attempt: 0,
            max_attempts: subscription.max_retries,
            last_error: None,
            error_code: None,
            last_status_code: None,
            response_body: None,
            next_retry_at: None,
            created_at: Utc::now(),
            sent_at: None,
            completed_at: None,
        }
    }

    fn sample_subscription(tenant_id: Uuid, target_url: &str) -> WebhookSubscription {
        WebhookSubscription {
            id: Uuid::new_v4(),
            tenant_id,
            event_type_set: ["match.found".to_string()].into_iter().collect(),
            target_url: target_url.to_string(),
            secret: "test_secret".to_string(),
            active: true,
            max_retries: 5,
            retry_base_seconds: 1,
            description: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn drain_tenant_once_returns_false_when_empty() {
        let storage = Arc::new(InMemoryStorage::new());
        let queue = Arc::new(WebhookQueue::new(storage.clone(), WebhookConfig::default()));
        let worker = Arc::new(DeliveryWorker::new(queue, storage, WebhookConfig::default()));
        assert!(!worker.drain_tenant_once(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn unreachable_target_schedules_a_retry() {
        let storage = Arc::new(InMemoryStorage::new());
        let tenant_id = Uuid::new_v4();
        let subscription = sample_subscription(tenant_id, "https://hooks.invalid.test/example");
        storage.put_subscription(subscription.clone());

        let mut config = WebhookConfig::default();
        config.base_retry_delay_secs = 0;
        let queue = Arc::new(WebhookQueue::new(storage.clone(), config.clone()));
        queue.enqueue(sample_delivery(&subscription)).await.unwrap();

        let worker = Arc::new(DeliveryWorker::new(queue.clone(), storage, config));
        assert!(worker.drain_tenant_once(tenant_id).await);

        // The dummy host doesn't resolve, so the delivery should have
        // been re-enqueued as a retry with attempt = 1 rather than
        // dropped.
        let requeued = queue.dequeue(tenant_id).unwrap();
        assert_eq!(requeued.attempt, 1);
    }

    #[tokio::test]
    async fn missing_subscription_drops_straight_to_dlq() {
        let storage = Arc::new(InMemoryStorage::new());
        let tenant_id = Uuid::new_v4();
        let subscription = sample_subscription(tenant_id, "https://hooks.invalid.test/example");
        // Deliberately not persisted via `put_subscription`.
        let delivery = sample_delivery(&subscription);

        let queue = Arc::new(WebhookQueue::new(storage.clone(), WebhookConfig::default()));
        queue.enqueue(delivery).await.unwrap();

        let worker = Arc::new(DeliveryWorker::new(queue.clone(), storage, WebhookConfig::default()));
        assert!(worker.drain_tenant_once(tenant_id).await);

        assert_eq!(queue.get_dlq_items(tenant_id, 10).len(), 1);
    }
}
