//! Buyer requirement aggregate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::common::{
    AiRecommendations, DeliveryLocation, Incoterm, Intent, PartyStatus, QualityConstraint,
    RequirementStatus, Visibility,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Requirement {
    pub id: Uuid,
    pub buyer_partner_id: Uuid,
    pub organization_id: Uuid,
    pub commodity_id: Uuid,
    pub status: PartyStatus,
    pub requirement_status: RequirementStatus,
    pub intent: Intent,
    pub visibility: Visibility,
    /// Populated only when `visibility` is `InvitedOnly`; sellers outside
    /// this set never see the requirement in a candidate search.
    pub invited_seller_ids: Vec<Uuid>,
    pub preferred_quantity: Decimal,
    /// Explicit floor on acceptable match quantity. When absent the
    /// validator falls back to 10% of `preferred_quantity`.
    pub min_quantity: Option<Decimal>,
    /// Explicit ceiling on acceptable match quantity. When absent any
    /// quantity up to the full availability is acceptable.
    pub max_quantity: Option<Decimal>,
    pub max_budget: Decimal,
    pub buyer_target_price: Option<Decimal>,
    pub preferred_incoterm: Option<Incoterm>,
    pub destination_country: Option<String>,
    pub delivery_locations: Vec<DeliveryLocation>,
    pub quality_constraints: Vec<QualityConstraint>,
    pub ai_recommended_sellers: Option<AiRecommendations>,
    pub ai_suggested_max_price: Option<Decimal>,
    pub ai_price_alert: bool,
    /// Human-readable reason for `ai_price_alert`, e.g. "asking prices in
    /// this corridor have risen 12% in the last 7 days". `None` when no
    /// alert is active.
    pub ai_alert_reason: Option<String>,
    pub ai_confidence: Option<f64>,
    /// Embedding over the requirement's free-text/quality description,
    /// used by an upstream recommendation feed for similarity search.
    /// Opaque to the matching core itself.
    pub market_context_embedding: Option<Vec<f32>>,
    /// Buyer's trust score as maintained by the partner registry,
    /// 0.0-100.0. Consulted by the validator as an additional risk
    /// signal alongside the orchestrator's own checks.
    pub buyer_trust_score: Option<f64>,
    pub fulfilled_quantity: Decimal,
    pub fulfillment_count: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Requirement {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| exp <= now)
    }

    /// The effective minimum acceptable matched quantity, per the
    /// fallback-chain rule: explicit `min_quantity` wins, otherwise 10% of
    /// `preferred_quantity`.
    pub fn effective_min_quantity(&self) -> Decimal {
        self.min_quantity
            .unwrap_or(self.preferred_quantity * Decimal::new(10, 2))
    }

    /// The effective maximum acceptable matched quantity, per the
    /// fallback-chain rule: explicit `max_quantity` wins, otherwise
    /// `preferred_quantity` itself is the ceiling.
    pub fn effective_max_quantity(&self) -> Decimal {
        self.max_quantity.unwrap_or(self.preferred_quantity)
    }

    pub fn location_ids(&self) -> Vec<Uuid> {
        self.delivery_locations
            .iter()
            .filter_map(|l| l.location_id)
            .collect()
    }

    /// Whether `seller_partner_id` is permitted to see/match this
    /// requirement, per `visibility`.
    pub fn visible_to_seller(&self, seller_partner_id: Uuid) -> bool {
        match self.visibility {
            Visibility::Public => true,
            Visibility::InvitedOnly => self.invited_seller_ids.contains(&seller_partner_id),
            Visibility::Private => false,
        }
    }
}
