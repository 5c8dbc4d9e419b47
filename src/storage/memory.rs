//! In-memory `StorageGateway` reference implementation.
//!
//! Grounded on the matching engine's own concurrent-state idiom
//! (`DashMap` for keyed lookup, `parking_lot::Mutex` for row-level
//! locking) rather than on any real persistence driver.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Availability, AvailabilityStatus, MatchAuditRecord, Requirement, WebhookDelivery,
    WebhookSubscription,
};

use super::{AvailabilityLock, StorageError, StorageGateway, StorageResult};

#[derive(Default)]
pub struct InMemoryStorage {
    requirements: DashMap<Uuid, Requirement>,
    availabilities: DashMap<Uuid, Arc<Mutex<Availability>>>,
    audit_records: DashMap<Uuid, MatchAuditRecord>,
    subscriptions: DashMap<Uuid, WebhookSubscription>,
    deliveries: DashMap<Uuid, WebhookDelivery>,
    last_notification: DashMap<Uuid, i64>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_requirement(&self, requirement: Requirement) {
        self.requirements.insert(requirement.id, requirement);
    }

    pub fn put_availability(&self, availability: Availability) {
        self.availabilities
            .insert(availability.id, Arc::new(Mutex::new(availability)));
    }

    pub fn put_subscription(&self, subscription: WebhookSubscription) {
        self.subscriptions.insert(subscription.id, subscription);
    }
}

struct MemoryAvailabilityLock {
    id: Uuid,
    snapshot: Availability,
    store: Arc<Mutex<Availability>>,
}

#[async_trait]
impl AvailabilityLock for MemoryAvailabilityLock {
    fn availability(&self) -> &Availability {
        &self.snapshot
    }

    async fn commit(self: Box<Self>, allocated: Decimal) -> StorageResult<()> {
        let mut guard = self.store.lock();
        guard.available_quantity -= allocated;
        guard.sold_quantity += allocated;

        if !guard.quantity_invariant_holds() {
            return Err(StorageError::InvalidState(format!(
                "quantity invariant violated committing availability {}",
                self.id
            )));
        }

        if guard.available_quantity <= Decimal::ZERO {
            guard.availability_status = if guard.reserved_quantity > Decimal::ZERO {
                AvailabilityStatus::Reserved
            } else {
                AvailabilityStatus::Sold
            };
        }
        Ok(())
    }
}

#[async_trait]
impl StorageGateway for InMemoryStorage {
    async fn get_requirement(&self, id: Uuid) -> StorageResult<Requirement> {
        self.requirements
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| StorageError::NotFound(format!("requirement {id}")))
    }

    async fn get_availability(&self, id: Uuid) -> StorageResult<Availability> {
        self.availabilities
            .get(&id)
            .map(|a| a.lock().clone())
            .ok_or_else(|| StorageError::NotFound(format!("availability {id}")))
    }

    async fn search_availability_by_location(
        &self,
        location_ids: &[Uuid],
        commodity_id: Uuid,
    ) -> StorageResult<Vec<Availability>> {
        Ok(self
            .availabilities
            .iter()
            .map(|entry| entry.value().lock().clone())
            .filter(|a| a.commodity_id == commodity_id && a.has_remaining())
            .filter(|a| {
                location_ids.is_empty()
                    || a.dispatch_location
                        .location_id
                        .map_or(true, |id| location_ids.contains(&id))
            })
            .collect())
    }

    async fn search_requirements_by_location(
        &self,
        location_ids: &[Uuid],
        commodity_id: Uuid,
    ) -> StorageResult<Vec<Requirement>> {
        Ok(self
            .requirements
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|r| r.commodity_id == commodity_id)
            .filter(|r| {
                location_ids.is_empty()
                    || r.location_ids().iter().any(|id| location_ids.contains(id))
            })
            .collect())
    }

    async fn lock_availability_for_update(&self, id: Uuid) -> StorageResult<Box<dyn AvailabilityLock>> {
        let store = self
            .availabilities
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(format!("availability {id}")))?;
        let snapshot = store.lock().clone();
        Ok(Box::new(MemoryAvailabilityLock { id, snapshot, store }))
    }

    async fn insert_match_audit_record(&self, record: MatchAuditRecord) -> StorageResult<()> {
        self.audit_records.insert(record.id, record);
        Ok(())
    }

    async fn get_subscription(&self, id: Uuid) -> StorageResult<WebhookSubscription> {
        self.subscriptions
            .get(&id)
            .map(|s| s.clone())
            .ok_or_else(|| StorageError::NotFound(format!("webhook subscription {id}")))
    }

    async fn find_subscriptions(
        &self,
        tenant_id: Uuid,
        event_type: &str,
    ) -> StorageResult<Vec<WebhookSubscription>> {
        Ok(self
            .subscriptions
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|s| s.tenant_id == tenant_id && s.subscribes_to(event_type) && s.active)
            .collect())
    }

    async fn insert_webhook_delivery(&self, delivery: WebhookDelivery) -> StorageResult<()> {
        self.deliveries.insert(delivery.id, delivery);
        Ok(())
    }

    async fn update_webhook_delivery(&self, delivery: WebhookDelivery) -> StorageResult<()> {
        if !self.deliveries.contains_key(&delivery.id) {
            return Err(StorageError::NotFound(format!("webhook delivery {}", delivery.id)));
        }
        self.deliveries.insert(delivery.id, delivery);
        Ok(())
    }

    async fn list_dead_letters(&self, tenant_id: Uuid, limit: usize) -> StorageResult<Vec<WebhookDelivery>> {
        Ok(self
            .deliveries
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|d| d.tenant_id == tenant_id && d.status == crate::models::DeliveryStatus::DeadLetter)
            .take(limit)
            .collect())
    }

    async fn swap_last_notification_time(&self, entity_id: Uuid, now_millis: i64) -> StorageResult<Option<i64>> {
        let previous = self.last_notification.insert(entity_id, now_millis);
        Ok(previous)
    }
}
