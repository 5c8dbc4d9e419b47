//! Output of the matching pipeline and its durable audit trail.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::events::RiskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "allocation_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AllocationKind {
    Full,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub requirement_id: Uuid,
    pub availability_id: Uuid,
    pub buyer_partner_id: Uuid,
    pub seller_partner_id: Uuid,
    pub commodity_id: Uuid,
    /// Weighted sub-score sum before the WARN penalty and AI boost are
    /// applied; `total_score` is derived from this.
    pub base_score: f64,
    pub total_score: f64,
    pub quality_score: f64,
    pub price_score: f64,
    pub delivery_score: f64,
    pub risk_score: f64,
    pub ai_boost_applied: bool,
    pub ai_boost_value: f64,
    pub warn_penalty_applied: bool,
    pub warn_penalty_value: f64,
    pub pass_fail: bool,
    pub risk_status: RiskStatus,
    pub risk_details: Option<String>,
    /// The `(commodity_id, buyer_partner_id, seller_partner_id)` dedup
    /// key this match was recorded under for this run, rendered for the
    /// audit trail.
    pub duplicate_key: String,
    pub warnings: Vec<String>,
    pub matched_at: DateTime<Utc>,
}

impl MatchResult {
    pub fn blocked(requirement_id: Uuid, availability_id: Uuid, reason: &str) -> Self {
        Self {
            requirement_id,
            availability_id,
            buyer_partner_id: Uuid::nil(),
            seller_partner_id: Uuid::nil(),
            commodity_id: Uuid::nil(),
            base_score: 0.0,
            total_score: 0.0,
            quality_score: 0.0,
            price_score: 0.0,
            delivery_score: 0.0,
            risk_score: 0.0,
            ai_boost_applied: false,
            ai_boost_value: 0.0,
            warn_penalty_applied: false,
            warn_penalty_value: 0.0,
            pass_fail: false,
            risk_status: RiskStatus::Fail,
            risk_details: Some(reason.to_string()),
            duplicate_key: String::new(),
            warnings: vec![reason.to_string()],
            matched_at: Utc::now(),
        }
    }
}

/// Why a candidate did or did not become a `MatchResult`, independent of
/// whether a `MatchResult` was ever constructed for it. Every candidate
/// the engine considers gets exactly one of these persisted, pass or
/// reject, so the audit trail is complete rather than survivor-biased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Accepted,
    RejectedLocation,
    RejectedDuplicate,
    RejectedRiskBlocked,
    RejectedBelowThreshold,
    RejectedValidation,
}

/// Durable record of a considered candidate, independent of whether it
/// was eventually allocated or even accepted. Distinct from `MatchResult`
/// (the in-flight computation output) since the audit trail must survive
/// both matches superseded later and candidates rejected outright.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchAuditRecord {
    pub id: Uuid,
    pub requirement_id: Uuid,
    pub availability_id: Uuid,
    pub outcome: AuditOutcome,
    pub reason: Option<String>,
    pub total_score: f64,
    pub quality_score: f64,
    pub price_score: f64,
    pub delivery_score: f64,
    pub risk_score: f64,
    pub allocation_kind: Option<AllocationKind>,
    pub allocated_quantity: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl MatchAuditRecord {
    pub fn rejected(requirement_id: Uuid, availability_id: Uuid, outcome: AuditOutcome, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            requirement_id,
            availability_id,
            outcome,
            reason: Some(reason.into()),
            total_score: 0.0,
            quality_score: 0.0,
            price_score: 0.0,
            delivery_score: 0.0,
            risk_score: 0.0,
            allocation_kind: None,
            allocated_quantity: None,
            created_at: Utc::now(),
        }
    }
}

impl From<&MatchResult> for MatchAuditRecord {
    fn from(result: &MatchResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            requirement_id: result.requirement_id,
            availability_id: result.availability_id,
            outcome: AuditOutcome::Accepted,
            reason: None,
            total_score: result.total_score,
            quality_score: result.quality_score,
            price_score: result.price_score,
            delivery_score: result.delivery_score,
            risk_score: result.risk_score,
            allocation_kind: None,
            allocated_quantity: None,
            created_at: result.matched_at,
        }
    }
}
