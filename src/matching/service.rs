//! Event-driven dispatcher: priority queue, in-flight dedup, rate-limited
//! notification, and a safety-sweep cron that re-enqueues entities that
//! might have been dropped between publish and dispatch.

use std::collections::BinaryHeap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::events::{DomainEvent, EventBus, RiskStatus};
use crate::storage::StorageGateway;

use super::engine::MatchingEngine;
use super::types::{MatchPriority, MatchRequest, MatchTarget};

#[derive(Debug, Default, Clone)]
pub struct DispatcherMetrics {
    pub total_processed: u64,
    pub high_priority: u64,
    pub medium_priority: u64,
    pub low_priority: u64,
    pub throttled: u64,
    pub notifications_sent: u64,
    pub notifications_skipped: u64,
}

pub struct MatchingService {
    engine: Arc<MatchingEngine>,
    storage: Arc<dyn StorageGateway>,
    config: MatchingConfig,
    queue: Mutex<BinaryHeap<MatchRequest>>,
    processing: DashMap<Uuid, ()>,
    /// Entities the dispatcher has seen at least once; scanned by the
    /// safety cron so an event dropped between publish and dispatch still
    /// gets a retry.
    tracked: DashMap<Uuid, MatchTarget>,
    metrics: Mutex<DispatcherMetrics>,
}

impl MatchingService {
    pub fn new(engine: Arc<MatchingEngine>, storage: Arc<dyn StorageGateway>, config: MatchingConfig) -> Arc<Self> {
        Arc::new(Self {
            engine,
            storage,
            config,
            queue: Mutex::new(BinaryHeap::new()),
            processing: DashMap::new(),
            tracked: DashMap::new(),
            metrics: Mutex::new(DispatcherMetrics::default()),
        })
    }

    pub fn metrics(&self) -> DispatcherMetrics {
        self.metrics.lock().clone()
    }

    pub fn on_requirement_created(&self, requirement_id: Uuid) {
        self.enqueue(MatchTarget::Requirement(requirement_id), MatchPriority::Medium);
    }

    pub fn on_availability_created(&self, availability_id: Uuid) {
        self.enqueue(MatchTarget::Availability(availability_id), MatchPriority::Medium);
    }

    pub fn on_risk_status_changed(&self, requirement_id: Option<Uuid>, availability_id: Option<Uuid>, _status: RiskStatus) {
        if let Some(id) = requirement_id {
            self.enqueue(MatchTarget::Requirement(id), MatchPriority::High);
        }
        if let Some(id) = availability_id {
            self.enqueue(MatchTarget::Availability(id), MatchPriority::High);
        }
    }

    fn enqueue(&self, target: MatchTarget, priority: MatchPriority) {
        let entity_id = target.entity_id();
        if self.processing.contains_key(&entity_id) {
            let mut metrics = self.metrics.lock();
            metrics.throttled += 1;
            return;
        }
        self.processing.insert(entity_id, ());
        self.tracked.insert(entity_id, target);
        self.queue
            .lock()
            .push(MatchRequest { target, priority, created_at: Utc::now() });
    }

    /// Spawns the worker loop and, if enabled, the safety-sweep cron.
    /// Returns immediately; both loops run until the process exits.
    pub fn start(self: &Arc<Self>) {
        let worker_self = self.clone();
        tokio::spawn(async move { worker_self.run_worker_loop().await });

        if self.config.enable_safety_cron {
            let cron_self = self.clone();
            tokio::spawn(async move { cron_self.run_safety_cron().await });
        }
    }

    pub fn subscribe_events(self: &Arc<Self>, mut receiver: tokio::sync::broadcast::Receiver<DomainEvent>) {
        let handler_self = self.clone();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(DomainEvent::RequirementCreated { requirement_id }) => {
                        handler_self.on_requirement_created(requirement_id)
                    }
                    Ok(DomainEvent::AvailabilityCreated { availability_id }) => {
                        handler_self.on_availability_created(availability_id)
                    }
                    Ok(DomainEvent::RiskStatusChanged { requirement_id, availability_id, status }) => {
                        handler_self.on_risk_status_changed(requirement_id, availability_id, status)
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "matching service dispatcher lagged behind event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn run_worker_loop(self: Arc<Self>) {
        loop {
            let request = self.queue.lock().pop();
            let Some(request) = request else {
                tokio::time::sleep(std::time::Duration::from_millis(self.config.match_batch_delay_ms.min(200))).await;
                continue;
            };
            self.process_request(request).await;
        }
    }

    async fn process_request(&self, request: MatchRequest) {
        {
            let mut metrics = self.metrics.lock();
            metrics.total_processed += 1;
            match request.priority {
                MatchPriority::High => metrics.high_priority += 1,
                MatchPriority::Medium => metrics.medium_priority += 1,
                MatchPriority::Low => metrics.low_priority += 1,
            }
        }

        let entity_id = request.target.entity_id();
        let result = match request.target {
            MatchTarget::Requirement(id) => {
                self.engine.find_matches_for_requirement(id, None, true, self.config.max_matches_to_notify).await
            }
            MatchTarget::Availability(id) => {
                self.engine.find_matches_for_availability(id, None, true, self.config.max_matches_to_notify).await
            }
        };

        match result {
            Ok(matches) if !matches.is_empty() => {
                self.maybe_notify(entity_id).await;
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, entity_id = %entity_id, "matching run failed"),
        }

        self.processing.remove(&entity_id);
    }

    async fn maybe_notify(&self, buyer_entity_id: Uuid) {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .storage
            .swap_last_notification_time(buyer_entity_id, now)
            .await
            .unwrap_or(None);

        let rate_limited = previous.map_or(false, |prev| {
            now - prev < self.config.notification_rate_limit_seconds * 1000
        });

        let mut metrics = self.metrics.lock();
        if rate_limited {
            metrics.notifications_skipped += 1;
        } else {
            metrics.notifications_sent += 1;
        }
    }

    async fn run_safety_cron(self: Arc<Self>) {
        let interval = std::time::Duration::from_secs(self.config.safety_cron_interval_seconds);
        loop {
            tokio::time::sleep(interval).await;
            let targets: Vec<MatchTarget> = self.tracked.iter().map(|entry| *entry.value()).collect();
            for target in targets {
                let entity_id = target.entity_id();
                if !self.processing.contains_key(&entity_id) {
                    self.enqueue(target, MatchPriority::Low);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::risk::RiskOrchestrator;
    use crate::storage::InMemoryStorage;

    fn service() -> Arc<MatchingService> {
        let storage = Arc::new(InMemoryStorage::new());
        let risk = Arc::new(RiskOrchestrator::new(RiskConfig::default(), None));
        let engine = Arc::new(MatchingEngine::new(storage.clone(), MatchingConfig::default(), risk, EventBus::new(16)));
        MatchingService::new(engine, storage, MatchingConfig::default())
    }

    #[test]
    fn duplicate_enqueue_is_throttled() {
        let svc = service();
        let id = Uuid::new_v4();
        svc.on_requirement_created(id);
        svc.on_requirement_created(id);
        assert_eq!(svc.metrics().throttled, 1);
        assert_eq!(svc.queue.lock().len(), 1);
    }

    #[test]
    fn risk_status_changed_enqueues_both_sides_at_high_priority() {
        let svc = service();
        let req_id = Uuid::new_v4();
        let avail_id = Uuid::new_v4();
        svc.on_risk_status_changed(Some(req_id), Some(avail_id), RiskStatus::Warn);
        assert_eq!(svc.queue.lock().len(), 2);
        let popped = svc.queue.lock().pop().unwrap();
        assert_eq!(popped.priority, MatchPriority::High);
    }
}
