//! Webhook subscription and delivery attempt records.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "webhook_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueuePriority {
    Critical,
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Success,
    Failed,
    Retrying,
    DeadLetter,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Event types this subscription should receive. A bare `event_type`
    /// field would only ever match one type per subscription; a tenant
    /// that wants `match.found` and `match.allocated` delivered to the
    /// same endpoint needs this to be a set.
    #[sqlx(skip)]
    pub event_type_set: HashSet<String>,
    pub target_url: String,
    pub secret: String,
    pub active: bool,
    pub max_retries: u32,
    pub retry_base_seconds: u64,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WebhookSubscription {
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.event_type_set.contains(event_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub tenant_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    #[sqlx(skip)]
    pub request_headers: Vec<(String, String)>,
    pub priority: QueuePriority,
    pub status: DeliveryStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub error_code: Option<String>,
    pub last_status_code: Option<u16>,
    pub response_body: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WebhookDelivery {
    pub fn new(subscription: &WebhookSubscription, event_type: &str, payload: serde_json::Value, priority: QueuePriority) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id: subscription.id,
            tenant_id: subscription.tenant_id,
            event_type: event_type.to_string(),
            payload,
            request_headers: Vec::new(),
            priority,
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
}
