//! Bridges the domain event bus onto the webhook queue: every
//! `MatchFound`/`MatchAllocated` event is turned into a delivery for each
//! active subscription belonging to the buyer's and seller's
//! organizations, the way the matching dispatcher turns the same events
//! into re-match work.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use uuid::Uuid;

use crate::events::DomainEvent;
use crate::models::{QueuePriority, WebhookDelivery};
use crate::storage::StorageGateway;

use super::delivery::DeliveryWorker;
use super::queue::WebhookQueue;

pub struct WebhookNotifier {
    queue: Arc<WebhookQueue>,
    storage: Arc<dyn StorageGateway>,
    delivery_worker: Arc<DeliveryWorker>,
    /// Tenants whose delivery loop has already been spawned. A fresh
    /// deployment has no registered-tenant list to iterate at startup, so
    /// instead the first delivery enqueued for a tenant starts that
    /// tenant's `DeliveryWorker` loop.
    started_tenants: DashMap<Uuid, ()>,
}

impl WebhookNotifier {
    pub fn new(queue: Arc<WebhookQueue>, storage: Arc<dyn StorageGateway>, delivery_worker: Arc<DeliveryWorker>) -> Arc<Self> {
        Arc::new(Self { queue, storage, delivery_worker, started_tenants: DashMap::new() })
    }

    pub fn subscribe_events(self: &Arc<Self>, mut receiver: tokio::sync::broadcast::Receiver<DomainEvent>) {
        let notifier = self.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(DomainEvent::MatchFound { requirement_id, availability_id, score }) => {
                        let payload = json!({
                            "requirement_id": requirement_id,
                            "availability_id": availability_id,
                            "score": score,
                        });
                        notifier
                            .notify(requirement_id, availability_id, "match.found", payload, QueuePriority::Normal)
                            .await;
                    }
                    Ok(DomainEvent::MatchAllocated { requirement_id, availability_id }) => {
                        let payload = json!({
                            "requirement_id": requirement_id,
                            "availability_id": availability_id,
                        });
                        notifier
                            .notify(requirement_id, availability_id, "match.allocated", payload, QueuePriority::High)
                            .await;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "webhook notifier lagged behind event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn notify(
        &self,
        requirement_id: Uuid,
        availability_id: Uuid,
        event_type: &str,
        data: serde_json::Value,
        priority: QueuePriority,
    ) {
        let Some((buyer_tenant, seller_tenant)) = self.resolve_tenants(requirement_id, availability_id).await else {
            tracing::warn!(%requirement_id, %availability_id, "could not resolve tenants for webhook notification");
            return;
        };

        let tenants: HashSet<Uuid> = [buyer_tenant, seller_tenant].into_iter().collect();
        for tenant_id in tenants {
            let subscriptions = match self.storage.find_subscriptions(tenant_id, event_type).await {
                Ok(subs) => subs,
                Err(err) => {
                    tracing::warn!(error = %err, %tenant_id, "failed to look up webhook subscriptions");
                    continue;
                }
            };
            // Every subscriber receives the same envelope shape regardless
            // of event type: a raw domain payload would force each
            // consumer to special-case every event instead of reading
            // `event_type` off a stable top-level contract.
            let envelope = json!({
                "id": Uuid::new_v4(),
                "event_type": event_type,
                "timestamp": chrono::Utc::now(),
                "data": data,
                "organization_id": tenant_id,
                "user_id": serde_json::Value::Null,
            });
            if subscriptions.is_empty() {
                continue;
            }
            for subscription in subscriptions {
                let delivery = WebhookDelivery::new(&subscription, event_type, envelope.clone(), priority);
                if let Err(err) = self.queue.enqueue(delivery).await {
                    tracing::warn!(error = %err, subscription_id = %subscription.id, "failed to enqueue webhook delivery");
                }
            }
            if self.started_tenants.insert(tenant_id, ()).is_none() {
                self.delivery_worker.spawn_tenant_loop(tenant_id);
                tracing::info!(%tenant_id, "started webhook delivery loop for tenant");
            }
        }
    }

    async fn resolve_tenants(&self, requirement_id: Uuid, availability_id: Uuid) -> Option<(Uuid, Uuid)> {
        let requirement = self.storage.get_requirement(requirement_id).await.ok()?;
        let availability = self.storage.get_availability(availability_id).await.ok()?;
        Some((requirement.organization_id, availability.organization_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;
    use crate::events::EventBus;
    use crate::models::{Availability, AvailabilityStatus, DeliveryLocation, PartyStatus, Requirement, WebhookSubscription};
    use crate::storage::InMemoryStorage;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_requirement(organization_id: Uuid) -> Requirement {
        Requirement {
            id: Uuid::new_v4(),
            buyer_partner_id: Uuid::new_v4(),
            organization_id,
            commodity_id: Uuid::new_v4(),
            status: PartyStatus::Active,
            requirement_status: crate::models::RequirementStatus::Active,
            intent: crate::models::Intent::Buy,
            visibility: crate::models::Visibility::Public,
            invited_seller_ids: vec![],
            preferred_quantity: dec!(100),
            min_quantity: None,
            max_quantity: None,
            max_budget: dec!(1000),
            buyer_target_price: None,
            preferred_incoterm: None,
            destination_country: None,
            delivery_locations: vec![],
            quality_constraints: vec![],
            ai_recommended_sellers: None,
            ai_suggested_max_price: None,
            ai_price_alert: false,
            ai_alert_reason: None,
            ai_confidence: None,
            market_context_embedding: None,
            buyer_trust_score: None,
            fulfilled_quantity: dec!(0),
            fulfillment_count: 0,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_availability(organization_id: Uuid) -> Availability {
        Availability {
            id: Uuid::new_v4(),
            seller_partner_id: Uuid::new_v4(),
            organization_id,
            commodity_id: Uuid::new_v4(),
            status: PartyStatus::Active,
            availability_status: AvailabilityStatus::Available,
            total_quantity: dec!(100),
            available_quantity: dec!(100),
            reserved_quantity: dec!(0),
            sold_quantity: dec!(0),
            asking_price: dec!(500),
            available_incoterms: vec![],
            dispatch_location: DeliveryLocation {
                location_id: None,
                state: "TX".into(),
                city: "Houston".into(),
                lat: None,
                lon: None,
                max_distance_km: None,
            },
            quality_offers: vec![],
            ai_recommended_buyers: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_subscription(tenant_id: Uuid, event_type: &str) -> WebhookSubscription {
        WebhookSubscription {
            id: Uuid::new_v4(),
            tenant_id,
            event_type_set: [event_type.to_string()].into_iter().collect(),
            target_url: "https://hooks.invalid.test/example".to_string(),
            secret: "test_secret".to_string(),
            active: true,
            max_retries: 5,
            retry_base_seconds: 1,
            description: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn match_found_event_enqueues_delivery_for_both_tenants() {
        let storage = Arc::new(InMemoryStorage::new());
        let buyer_org = Uuid::new_v4();
        let seller_org = Uuid::new_v4();

        let requirement = sample_requirement(buyer_org);
        let availability = sample_availability(seller_org);
        let requirement_id = requirement.id;
        let availability_id = availability.id;
        storage.put_requirement(requirement);
        storage.put_availability(availability);
        storage.put_subscription(sample_subscription(buyer_org, "match.found"));
        storage.put_subscription(sample_subscription(seller_org, "match.found"));

        let queue = Arc::new(WebhookQueue::new(storage.clone(), WebhookConfig::default()));
        let delivery_worker = Arc::new(DeliveryWorker::new(queue.clone(), storage.clone(), WebhookConfig::default()));
        let notifier = WebhookNotifier::new(queue.clone(), storage, delivery_worker);

        let bus = EventBus::new(16);
        notifier.subscribe_events(bus.subscribe());
        bus.publish(DomainEvent::MatchFound { requirement_id, availability_id, score: 0.9 });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(queue.dequeue(buyer_org).is_some());
        assert!(queue.dequeue(seller_org).is_some());
    }

    #[tokio::test]
    async fn no_matching_subscription_enqueues_nothing() {
        let storage = Arc::new(InMemoryStorage::new());
        let buyer_org = Uuid::new_v4();
        let seller_org = Uuid::new_v4();

        let requirement = sample_requirement(buyer_org);
        let availability = sample_availability(seller_org);
        let requirement_id = requirement.id;
        let availability_id = availability.id;
        storage.put_requirement(requirement);
        storage.put_availability(availability);

        let queue = Arc::new(WebhookQueue::new(storage.clone(), WebhookConfig::default()));
        let delivery_worker = Arc::new(DeliveryWorker::new(queue.clone(), storage.clone(), WebhookConfig::default()));
        let notifier = WebhookNotifier::new(queue.clone(), storage, delivery_worker);

        let bus = EventBus::new(16);
        notifier.subscribe_events(bus.subscribe());
        bus.publish(DomainEvent::MatchFound { requirement_id, availability_id, score: 0.9 });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(queue.dequeue(buyer_org).is_none());
        assert!(queue.dequeue(seller_org).is_none());
    }
}
