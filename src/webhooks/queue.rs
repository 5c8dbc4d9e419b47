//! Per-tenant priority queues with exponential-backoff retry and a
//! dead-letter queue.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::models::{DeliveryStatus, QueuePriority, WebhookDelivery};
use crate::storage::StorageGateway;

#[derive(Debug, Default)]
struct TenantQueues {
    critical: VecDeque<WebhookDelivery>,
    high: VecDeque<WebhookDelivery>,
    normal: VecDeque<WebhookDelivery>,
    low: VecDeque<WebhookDelivery>,
    dead_letters: Vec<WebhookDelivery>,
}

impl TenantQueues {
    fn bucket_mut(&mut self, priority: QueuePriority) -> &mut VecDeque<WebhookDelivery> {
        match priority {
            QueuePriority::Critical => &mut self.critical,
            QueuePriority::High => &mut self.high,
            QueuePriority::Normal => &mut self.normal,
            QueuePriority::Low => &mut self.low,
        }
    }

    fn depth(&self) -> usize {
        self.critical.len() + self.high.len() + self.normal.len() + self.low.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub critical: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
    pub dead_letter: usize,
    pub enqueued_total: u64,
    pub delivered_total: u64,
    pub failed_total: u64,
}

pub struct WebhookQueue {
    storage: Arc<dyn StorageGateway>,
    config: WebhookConfig,
    tenants: DashMap<Uuid, Mutex<TenantQueues>>,
    stats: DashMap<Uuid, Mutex<QueueStats>>,
}

impl WebhookQueue {
    pub fn new(storage: Arc<dyn StorageGateway>, config: WebhookConfig) -> Self {
        Self { storage, config, tenants: DashMap::new(), stats: DashMap::new() }
    }

    fn with_tenant_queues<R>(&self, tenant_id: Uuid, f: impl FnOnce(&mut TenantQueues) -> R) -> R {
        let entry = self.tenants.entry(tenant_id).or_default();
        let mut guard = entry.lock();
        f(&mut guard)
    }

    fn with_stats<R>(&self, tenant_id: Uuid, f: impl FnOnce(&mut QueueStats) -> R) -> R {
        let entry = self.stats.entry(tenant_id).or_default();
        let mut guard = entry.lock();
        f(&mut guard)
    }

    pub async fn enqueue(&self, delivery: WebhookDelivery) -> Result<(), crate::storage::StorageError> {
        self.storage.insert_webhook_delivery(delivery.clone()).await?;
        let tenant_id = delivery.tenant_id;
        let priority = delivery.priority;
        self.with_tenant_queues(tenant_id, |q| q.bucket_mut(priority).push_back(delivery));
        self.with_stats(tenant_id, |s| s.enqueued_total += 1);
        self.record_depth_metric(tenant_id);
        Ok(())
    }

    /// Scans strictly Critical -> High -> Normal -> Low and pops FIFO
    /// within the chosen bucket.
    pub fn dequeue(&self, tenant_id: Uuid) -> Option<WebhookDelivery> {
        let result = self.with_tenant_queues(tenant_id, |q| {
            q.critical
                .pop_front()
                .or_else(|| q.high.pop_front())
                .or_else(|| q.normal.pop_front())
                .or_else(|| q.low.pop_front())
        });
        if result.is_some() {
            self.record_depth_metric(tenant_id);
        }
        result
    }

    pub async fn mark_delivered(&self, mut delivery: WebhookDelivery, status_code: u16) -> Result<(), crate::storage::StorageError> {
        delivery.status = DeliveryStatus::Success;
        delivery.last_status_code = Some(status_code);
        delivery.sent_at = Some(Utc::now());
        delivery.completed_at = Some(Utc::now());
        self.with_stats(delivery.tenant_id, |s| s.delivered_total += 1);
        self.storage.update_webhook_delivery(delivery).await
    }

    pub async fn mark_failed(&self, mut delivery: WebhookDelivery, error: &str, status_code: Option<u16>) -> Result<(), crate::storage::StorageError> {
        delivery.status = DeliveryStatus::Failed;
        delivery.last_error = Some(error.to_string());
        delivery.last_status_code = status_code;
        self.with_stats(delivery.tenant_id, |s| s.failed_total += 1);
        self.storage.update_webhook_delivery(delivery).await
    }

    /// Increments `attempt`; moves to the DLQ once the delivery's own
    /// `max_attempts` (set from the subscription at creation time) is
    /// reached, otherwise sleeps `min(base * 2^(attempt-1), max)` and
    /// re-enqueues at High priority.
    pub async fn enqueue_retry(&self, mut delivery: WebhookDelivery, error: &str, status_code: Option<u16>) -> Result<(), crate::storage::StorageError> {
        delivery.attempt += 1;
        delivery.last_error = Some(error.to_string());
        delivery.error_code = status_code.map(|code| code.to_string());
        delivery.last_status_code = status_code;

        if delivery.attempt >= delivery.max_attempts {
            return self.move_to_dlq(delivery).await;
        }

        delivery.status = DeliveryStatus::Retrying;
        let delay_secs = (self.config.base_retry_delay_secs * 2u64.pow(delivery.attempt - 1))
            .min(self.config.max_retry_delay_secs);
        delivery.next_retry_at = Some(Utc::now() + chrono::Duration::seconds(delay_secs as i64));
        self.storage.update_webhook_delivery(delivery.clone()).await?;
        tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;

        delivery.priority = crate::models::QueuePriority::High;
        delivery.status = DeliveryStatus::Pending;
        self.storage.update_webhook_delivery(delivery.clone()).await?;
        let tenant_id = delivery.tenant_id;
        self.with_tenant_queues(tenant_id, |q| q.high.push_back(delivery));
        self.record_depth_metric(tenant_id);
        Ok(())
    }

    pub async fn move_to_dlq(&self, mut delivery: WebhookDelivery) -> Result<(), crate::storage::StorageError> {
        delivery.status = DeliveryStatus::DeadLetter;
        delivery.completed_at = Some(Utc::now());
        self.storage.update_webhook_delivery(delivery.clone()).await?;
        let tenant_id = delivery.tenant_id;
        self.with_tenant_queues(tenant_id, |q| q.dead_letters.push(delivery));
        self.with_stats(tenant_id, |s| s.failed_total += 1);
        Ok(())
    }

    pub fn get_dlq_items(&self, tenant_id: Uuid, limit: usize) -> Vec<WebhookDelivery> {
        self.with_tenant_queues(tenant_id, |q| q.dead_letters.iter().take(limit).cloned().collect())
    }

    /// Resets `attempt` to zero, clears error fields, and re-enqueues at
    /// Normal priority.
    pub async fn retry_dlq_item(&self, tenant_id: Uuid, delivery_id: Uuid) -> Result<bool, crate::storage::StorageError> {
        let found = self.with_tenant_queues(tenant_id, |q| {
            let index = q.dead_letters.iter().position(|d| d.id == delivery_id)?;
            Some(q.dead_letters.remove(index))
        });
        let Some(mut delivery) = found else { return Ok(false) };

        delivery.attempt = 0;
        delivery.last_error = None;
        delivery.error_code = None;
        delivery.last_status_code = None;
        delivery.response_body = None;
        delivery.next_retry_at = None;
        delivery.status = DeliveryStatus::Pending;
        delivery.priority = QueuePriority::Normal;
        delivery.completed_at = None;

        self.storage.update_webhook_delivery(delivery.clone()).await?;
        self.with_tenant_queues(tenant_id, |q| q.normal.push_back(delivery));
        self.record_depth_metric(tenant_id);
        Ok(true)
    }

    pub fn get_queue_stats(&self, tenant_id: Uuid) -> QueueStats {
        let (critical, high, normal, low, dead_letter) = self.with_tenant_queues(tenant_id, |q| {
            (q.critical.len(), q.high.len(), q.normal.len(), q.low.len(), q.dead_letters.len())
        });
        let base = self.with_stats(tenant_id, |s| s.clone());
        QueueStats { critical, high, normal, low, dead_letter, ..base }
    }

    fn record_depth_metric(&self, tenant_id: Uuid) {
        let depth = self.with_tenant_queues(tenant_id, |q| q.depth() as i64);
        crate::metrics::set_webhook_queue_depth(&tenant_id.to_string(), depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use serde_json::json;

    fn delivery(tenant_id: Uuid, priority: QueuePriority) -> WebhookDelivery {
        WebhookDelivery {
            id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            tenant_id,
            event_type: "match.found".to_string(),
            payload: json!({"ok": true}),
            request_headers: Vec::new(),
            priority,
            status: DeliveryStatus::Pending,
            attempt: 0,
            max_attempts: 3,
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

    #[tokio::test]
    async fn dequeue_honors_strict_priority_order() {
        let storage = Arc::new(InMemoryStorage::new());
        let queue = WebhookQueue::new(storage, WebhookConfig::default());
        let tenant_id = Uuid::new_v4();

        queue.enqueue(delivery(tenant_id, QueuePriority::Low)).await.unwrap();
        queue.enqueue(delivery(tenant_id, QueuePriority::Critical)).await.unwrap();
        queue.enqueue(delivery(tenant_id, QueuePriority::Normal)).await.unwrap();

        let first = queue.dequeue(tenant_id).unwrap();
        assert_eq!(first.priority, QueuePriority::Critical);
        let second = queue.dequeue(tenant_id).unwrap();
        assert_eq!(second.priority, QueuePriority::Normal);
        let third = queue.dequeue(tenant_id).unwrap();
        assert_eq!(third.priority, QueuePriority::Low);
        assert!(queue.dequeue(tenant_id).is_none());
    }

    #[tokio::test]
    async fn retry_exhaustion_moves_to_dlq() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut config = WebhookConfig::default();
        config.base_retry_delay_secs = 0;
        let queue = WebhookQueue::new(storage, config);
        let tenant_id = Uuid::new_v4();
        let mut d = delivery(tenant_id, QueuePriority::Normal);
        d.max_attempts = 1;

        queue.enqueue_retry(d, "timeout", None).await.unwrap();
        let dlq = queue.get_dlq_items(tenant_id, 10);
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].status, DeliveryStatus::DeadLetter);
    }

    #[tokio::test]
    async fn retry_dlq_item_resets_and_requeues() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut config = WebhookConfig::default();
        config.base_retry_delay_secs = 0;
        let queue = WebhookQueue::new(storage, config);
        let tenant_id = Uuid::new_v4();
        let mut d = delivery(tenant_id, QueuePriority::Normal);
        d.max_attempts = 1;
        let id = d.id;

        queue.enqueue_retry(d, "timeout", Some(500)).await.unwrap();
        let retried = queue.retry_dlq_item(tenant_id, id).await.unwrap();
        assert!(retried);

        let requeued = queue.dequeue(tenant_id).unwrap();
        assert_eq!(requeued.attempt, 0);
        assert!(requeued.last_error.is_none());
        assert_eq!(requeued.priority, QueuePriority::Normal);
    }
}
