//! Persistence boundary.
//!
//! Everything above this trait is persistence-agnostic. This repository
//! ships only an in-memory reference implementation, sufficient to
//! exercise every component in tests; a production implementation backed
//! by Postgres/Redis is a mechanical addition behind the same trait, not a
//! redesign of any caller.

mod memory;

pub use memory::InMemoryStorage;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Availability, MatchAuditRecord, Requirement, WebhookDelivery, WebhookSubscription,
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("storage dependency unavailable: {0}")]
    DependencyUnavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A lock guard over a single availability row, held for the duration of
/// an atomic allocation attempt. Dropping it without calling `commit`
/// releases the lock without persisting any change.
#[async_trait]
pub trait AvailabilityLock: Send {
    fn availability(&self) -> &Availability;

    /// Moves `allocated` from `available_quantity` to `sold_quantity`,
    /// preserving the `total = available + reserved + sold` invariant,
    /// and re-derives `availability_status` from the resulting split.
    async fn commit(self: Box<Self>, allocated: rust_decimal::Decimal) -> StorageResult<()>;
}

#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn get_requirement(&self, id: Uuid) -> StorageResult<Requirement>;
    async fn get_availability(&self, id: Uuid) -> StorageResult<Availability>;
    async fn search_availability_by_location(
        &self,
        location_ids: &[Uuid],
        commodity_id: Uuid,
    ) -> StorageResult<Vec<Availability>>;
    async fn search_requirements_by_location(
        &self,
        location_ids: &[Uuid],
        commodity_id: Uuid,
    ) -> StorageResult<Vec<Requirement>>;

    /// Row-locks an availability for update (`SELECT ... FOR UPDATE` in a
    /// real backend). The returned guard must be committed to persist the
    /// new remaining quantity and release the lock.
    async fn lock_availability_for_update(&self, id: Uuid) -> StorageResult<Box<dyn AvailabilityLock>>;

    async fn insert_match_audit_record(&self, record: MatchAuditRecord) -> StorageResult<()>;

    async fn get_subscription(&self, id: Uuid) -> StorageResult<WebhookSubscription>;
    async fn find_subscriptions(
        &self,
        tenant_id: Uuid,
        event_type: &str,
    ) -> StorageResult<Vec<WebhookSubscription>>;
    async fn insert_webhook_delivery(&self, delivery: WebhookDelivery) -> StorageResult<()>;
    async fn update_webhook_delivery(&self, delivery: WebhookDelivery) -> StorageResult<()>;
    async fn list_dead_letters(&self, tenant_id: Uuid, limit: usize) -> StorageResult<Vec<WebhookDelivery>>;

    /// Generic per-entity counter used for notification rate limiting;
    /// returns the previous recorded instant in epoch millis, if any, and
    /// records `now_millis` as the new value.
    async fn swap_last_notification_time(&self, entity_id: Uuid, now_millis: i64) -> StorageResult<Option<i64>>;
}
