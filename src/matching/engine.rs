//! Candidate search, scoring/validation orchestration, and atomic
//! quantity allocation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::events::{DomainEvent, EventBus, RiskStatus};
use crate::models::{
    Availability, AllocationKind, AuditOutcome, AvailabilityStatus, DeliveryLocation,
    MatchAuditRecord, Requirement,
};
use crate::risk::{RiskCheckResult, RiskOrchestrator, TradeContext};

use super::scorer::{calculate_distance_km, Scorer};
use super::types::MatchingError;
use super::validator::Validator;

#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    pub kind: AllocationKind,
    pub allocated_quantity: Decimal,
    pub remaining_quantity: Decimal,
}

const MAX_ALLOCATION_ATTEMPTS: u32 = 3;

/// A trivially-passing risk result used when a caller disables the risk
/// check via `include_risk: false`. Carries no real signal — never used
/// to justify a match, only to skip the orchestrator's work.
fn risk_check_disabled() -> RiskCheckResult {
    RiskCheckResult {
        status: RiskStatus::Pass,
        final_score: 100,
        rule_score: 100,
        ml_score: None,
        ml_available: false,
        blocked: false,
        blocking_reason: None,
        violation_type: None,
        blocked_at_tier: None,
    }
}

pub struct MatchingEngine {
    storage: Arc<dyn crate::storage::StorageGateway>,
    config: MatchingConfig,
    risk: Arc<RiskOrchestrator>,
    event_bus: EventBus,
}

impl MatchingEngine {
    pub fn new(storage: Arc<dyn crate::storage::StorageGateway>, config: MatchingConfig, risk: Arc<RiskOrchestrator>, event_bus: EventBus) -> Self {
        Self { storage, config, risk, event_bus }
    }

    fn commodity_key(&self, commodity_id: Uuid) -> String {
        // A real deployment resolves this from a commodity catalog; tests
        // and the in-memory storage gateway key scoring weights by name,
        // so callers that care about a specific commodity's weights pass
        // a name directly via `find_matches_for_requirement_with_key`.
        let _ = commodity_id;
        "default".to_string()
    }

    fn spawn_audit(&self, record: MatchAuditRecord) {
        let storage = self.storage.clone();
        tokio::spawn(async move {
            if let Err(err) = storage.insert_match_audit_record(record).await {
                tracing::warn!(error = %err, "failed to persist match audit record");
            }
        });
    }

    pub async fn find_matches_for_requirement(
        &self,
        requirement_id: Uuid,
        min_score: Option<f64>,
        include_risk: bool,
        max_results: usize,
    ) -> Result<Vec<crate::models::MatchResult>, MatchingError> {
        let requirement = self
            .storage
            .get_requirement(requirement_id)
            .await
            .map_err(|_| MatchingError::RequirementNotFound(requirement_id))?;

        if !requirement.requirement_status.is_matchable() {
            return Err(MatchingError::InvalidState(format!(
                "requirement {requirement_id} is {:?}, not ACTIVE/PARTIALLY_FULFILLED",
                requirement.requirement_status
            )));
        }

        let location_ids = requirement.location_ids();
        if location_ids.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self
            .storage
            .search_availability_by_location(&location_ids, requirement.commodity_id)
            .await?;

        let min_score = min_score.unwrap_or_else(|| self.config.min_score_threshold_for(&self.commodity_key(requirement.commodity_id)));
        let mut seen_pairs: HashSet<(Uuid, Uuid, Uuid)> = HashSet::new();
        let mut matches = Vec::new();

        for availability in candidates {
            if !location_matches(&requirement, &availability, &self.config) {
                self.spawn_audit(MatchAuditRecord::rejected(
                    requirement.id,
                    availability.id,
                    AuditOutcome::RejectedLocation,
                    "no buyer delivery location accepted this availability",
                ));
                continue;
            }

            let dedup_key = (requirement.commodity_id, requirement.buyer_partner_id, availability.seller_partner_id);
            if seen_pairs.contains(&dedup_key) {
                self.spawn_audit(MatchAuditRecord::rejected(
                    requirement.id,
                    availability.id,
                    AuditOutcome::RejectedDuplicate,
                    "duplicate buyer/seller/commodity pair already matched this run",
                ));
                continue;
            }

            let risk_ctx = self.build_risk_context(&requirement, &availability);
            let risk_result = if include_risk { self.risk.comprehensive_check(&risk_ctx).await } else { risk_check_disabled() };

            let scorer = Scorer::new(&self.config);
            let breakdown = scorer.calculate_match_score(&self.commodity_key(requirement.commodity_id), &requirement, &availability, &risk_result);

            if breakdown.blocked {
                self.spawn_audit(MatchAuditRecord::rejected(
                    requirement.id,
                    availability.id,
                    AuditOutcome::RejectedRiskBlocked,
                    breakdown.warnings.first().cloned().unwrap_or_else(|| "blocked by risk orchestrator".to_string()),
                ));
                continue;
            }
            if breakdown.final_score < min_score {
                self.spawn_audit(MatchAuditRecord::rejected(
                    requirement.id,
                    availability.id,
                    AuditOutcome::RejectedBelowThreshold,
                    format!("score {} below threshold {}", breakdown.final_score, min_score),
                ));
                continue;
            }

            let validator = Validator::new(&self.config);
            let validation = validator.validate_match_eligibility(&requirement, &availability, &risk_result);
            if !validation.is_valid {
                self.spawn_audit(MatchAuditRecord::rejected(
                    requirement.id,
                    availability.id,
                    AuditOutcome::RejectedValidation,
                    validation.reasons.join("; "),
                ));
                continue;
            }

            let duplicate_key = format!("{}:{}:{}", dedup_key.0, dedup_key.1, dedup_key.2);
            let result = crate::models::MatchResult {
                requirement_id: requirement.id,
                availability_id: availability.id,
                buyer_partner_id: requirement.buyer_partner_id,
                seller_partner_id: availability.seller_partner_id,
                commodity_id: requirement.commodity_id,
                base_score: breakdown.base_score,
                total_score: breakdown.final_score,
                quality_score: breakdown.quality_score,
                price_score: breakdown.price_score,
                delivery_score: breakdown.delivery_score,
                risk_score: breakdown.risk_score,
                ai_boost_applied: breakdown.ai_boost_applied,
                ai_boost_value: breakdown.ai_boost_value,
                warn_penalty_applied: breakdown.warn_penalty_applied,
                warn_penalty_value: breakdown.warn_penalty_value,
                pass_fail: true,
                risk_status: breakdown.risk_status,
                risk_details: risk_result.blocking_reason.clone(),
                duplicate_key,
                warnings: validation.warnings,
                matched_at: chrono::Utc::now(),
            };

            self.spawn_audit(MatchAuditRecord::from(&result));
            seen_pairs.insert(dedup_key);
            matches.push(result);
        }

        matches.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(max_results);

        for result in &matches {
            self.event_bus.publish(DomainEvent::MatchFound {
                requirement_id: result.requirement_id,
                availability_id: result.availability_id,
                score: result.total_score,
            });
        }

        crate::metrics::record_match_found(&self.commodity_key(requirement.commodity_id));
        Ok(matches)
    }

    pub async fn find_matches_for_availability(
        &self,
        availability_id: Uuid,
        min_score: Option<f64>,
        include_risk: bool,
        max_results: usize,
    ) -> Result<Vec<crate::models::MatchResult>, MatchingError> {
        let availability = self
            .storage
            .get_availability(availability_id)
            .await
            .map_err(|_| MatchingError::AvailabilityNotFound(availability_id))?;

        if availability.availability_status != AvailabilityStatus::Available {
            return Err(MatchingError::InvalidState(format!(
                "availability {availability_id} is {:?}, not ACTIVE/AVAILABLE",
                availability.availability_status
            )));
        }

        let location_ids = availability
            .dispatch_location
            .location_id
            .into_iter()
            .collect::<Vec<_>>();

        let candidates = self
            .storage
            .search_requirements_by_location(&location_ids, availability.commodity_id)
            .await?;

        let min_score = min_score.unwrap_or_else(|| self.config.min_score_threshold_for(&self.commodity_key(availability.commodity_id)));
        let mut seen_pairs: HashSet<(Uuid, Uuid, Uuid)> = HashSet::new();
        let mut matches = Vec::new();

        for requirement in candidates {
            if !location_matches(&requirement, &availability, &self.config) {
                self.spawn_audit(MatchAuditRecord::rejected(
                    requirement.id,
                    availability.id,
                    AuditOutcome::RejectedLocation,
                    "no buyer delivery location accepted this availability",
                ));
                continue;
            }

            let dedup_key = (requirement.commodity_id, requirement.buyer_partner_id, availability.seller_partner_id);
            if seen_pairs.contains(&dedup_key) {
                self.spawn_audit(MatchAuditRecord::rejected(
                    requirement.id,
                    availability.id,
                    AuditOutcome::RejectedDuplicate,
                    "duplicate buyer/seller/commodity pair already matched this run",
                ));
                continue;
            }

            let risk_ctx = self.build_risk_context(&requirement, &availability);
            let risk_result = if include_risk { self.risk.comprehensive_check(&risk_ctx).await } else { risk_check_disabled() };

            let scorer = Scorer::new(&self.config);
            let breakdown = scorer.calculate_match_score(&self.commodity_key(availability.commodity_id), &requirement, &availability, &risk_result);

            if breakdown.blocked {
                self.spawn_audit(MatchAuditRecord::rejected(
                    requirement.id,
                    availability.id,
                    AuditOutcome::RejectedRiskBlocked,
                    breakdown.warnings.first().cloned().unwrap_or_else(|| "blocked by risk orchestrator".to_string()),
                ));
                continue;
            }
            if breakdown.final_score < min_score {
                self.spawn_audit(MatchAuditRecord::rejected(
                    requirement.id,
                    availability.id,
                    AuditOutcome::RejectedBelowThreshold,
                    format!("score {} below threshold {}", breakdown.final_score, min_score),
                ));
                continue;
            }

            let validator = Validator::new(&self.config);
            let validation = validator.validate_match_eligibility(&requirement, &availability, &risk_result);
            if !validation.is_valid {
                self.spawn_audit(MatchAuditRecord::rejected(
                    requirement.id,
                    availability.id,
                    AuditOutcome::RejectedValidation,
                    validation.reasons.join("; "),
                ));
                continue;
            }

            let duplicate_key = format!("{}:{}:{}", dedup_key.0, dedup_key.1, dedup_key.2);
            let result = crate::models::MatchResult {
                requirement_id: requirement.id,
                availability_id: availability.id,
                buyer_partner_id: requirement.buyer_partner_id,
                seller_partner_id: availability.seller_partner_id,
                commodity_id: availability.commodity_id,
                base_score: breakdown.base_score,
                total_score: breakdown.final_score,
                quality_score: breakdown.quality_score,
                price_score: breakdown.price_score,
                delivery_score: breakdown.delivery_score,
                risk_score: breakdown.risk_score,
                ai_boost_applied: breakdown.ai_boost_applied,
                ai_boost_value: breakdown.ai_boost_value,
                warn_penalty_applied: breakdown.warn_penalty_applied,
                warn_penalty_value: breakdown.warn_penalty_value,
                pass_fail: true,
                risk_status: breakdown.risk_status,
                risk_details: risk_result.blocking_reason.clone(),
                duplicate_key,
                warnings: validation.warnings,
                matched_at: chrono::Utc::now(),
            };

            self.spawn_audit(MatchAuditRecord::from(&result));
            seen_pairs.insert(dedup_key);
            matches.push(result);
        }

        matches.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(max_results);

        for result in &matches {
            self.event_bus.publish(DomainEvent::MatchFound {
                requirement_id: result.requirement_id,
                availability_id: result.availability_id,
                score: result.total_score,
            });
        }

        Ok(matches)
    }

    /// Row-locks the availability and decrements its remaining quantity by
    /// up to `requested`, retrying with exponential backoff
    /// (`0.1 * 2^attempt` seconds) on a transient lock/transaction
    /// failure.
    pub async fn allocate_quantity_atomic(
        &self,
        requirement_id: Uuid,
        availability_id: Uuid,
        requested: Decimal,
    ) -> Result<AllocationOutcome, MatchingError> {
        let mut last_err = None;
        for attempt in 0..MAX_ALLOCATION_ATTEMPTS {
            match self.try_allocate_once(availability_id, requested).await {
                Ok(outcome) => {
                    crate::metrics::record_allocation_attempt("success");
                    self.event_bus.publish(DomainEvent::MatchAllocated { requirement_id, availability_id });
                    self.record_settled_trade(requirement_id, availability_id, outcome.allocated_quantity).await;
                    return Ok(outcome);
                }
                Err(err) => {
                    last_err = Some(err);
                    let backoff = Duration::from_secs_f64(0.1 * 2f64.powi(attempt as i32));
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        crate::metrics::record_allocation_attempt("exhausted");
        Err(last_err.unwrap_or(MatchingError::AllocationRetriesExhausted))
    }

    async fn try_allocate_once(
        &self,
        availability_id: Uuid,
        requested: Decimal,
    ) -> Result<AllocationOutcome, MatchingError> {
        let lock = self.storage.lock_availability_for_update(availability_id).await?;
        let current_available = lock.availability().available_quantity;

        if current_available <= Decimal::ZERO {
            return Err(MatchingError::NoQuantityAvailable);
        }

        let (kind, allocated) = if current_available < requested {
            (AllocationKind::Partial, current_available)
        } else {
            (AllocationKind::Full, requested)
        };

        let remaining_quantity = current_available - allocated;
        lock.commit(allocated).await?;

        Ok(AllocationOutcome { kind, allocated_quantity: allocated, remaining_quantity })
    }

    /// Feeds the risk orchestrator's circular/wash-trading history from a
    /// committed allocation. Best-effort: a lookup failure here must not
    /// unwind an allocation that has already landed.
    async fn record_settled_trade(&self, requirement_id: Uuid, availability_id: Uuid, allocated: Decimal) {
        let (requirement, availability) = match tokio::try_join!(
            self.storage.get_requirement(requirement_id),
            self.storage.get_availability(availability_id)
        ) {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "failed to resolve parties for trade history after allocation");
                return;
            }
        };

        self.risk.record_trade(crate::risk::TradeRecord {
            buyer_id: requirement.buyer_partner_id,
            seller_id: availability.seller_partner_id,
            notional: availability.asking_price * allocated,
            traded_at: chrono::Utc::now(),
        });
    }

    fn build_risk_context(&self, requirement: &Requirement, availability: &Availability) -> TradeContext {
        // Party compliance attributes live outside the matching core's own
        // aggregates; a real deployment resolves them from the partner
        // registry through the storage gateway. Tests construct a
        // `TradeContext` directly against `RiskOrchestrator` instead of
        // going through this helper when they need specific profiles.
        TradeContext {
            buyer: crate::risk::PartyProfile {
                party_id: requirement.buyer_partner_id,
                organization_id: requirement.organization_id,
                country: "IN".to_string(),
                state: requirement.delivery_locations.first().map(|l| l.state.clone()),
                is_sanctioned: false,
                has_export_import_license: true,
                gst_registered: true,
                has_pan_card: true,
            },
            seller: crate::risk::PartyProfile {
                party_id: availability.seller_partner_id,
                organization_id: availability.organization_id,
                country: "IN".to_string(),
                state: Some(availability.dispatch_location.state.clone()),
                is_sanctioned: false,
                has_export_import_license: true,
                gst_registered: true,
                has_pan_card: true,
            },
            commodity_id: requirement.commodity_id,
            notional: availability.asking_price * requirement.preferred_quantity,
            counterparty_id: None,
        }
    }
}

/// Location predicate: exact location id match short-circuits to true;
/// otherwise each buyer delivery location is checked independently — a
/// state mismatch moves on to the next buyer location rather than
/// rejecting the whole candidate, an exact case-insensitive city match
/// succeeds, and otherwise a Haversine distance within the effective
/// `max_distance_km` (location override, else config default) succeeds.
pub fn location_matches(requirement: &Requirement, availability: &Availability, config: &MatchingConfig) -> bool {
    let seller_loc = &availability.dispatch_location;

    if let Some(seller_location_id) = seller_loc.location_id {
        if requirement
            .delivery_locations
            .iter()
            .any(|l| l.location_id == Some(seller_location_id))
        {
            return true;
        }
    }

    for buyer_loc in &requirement.delivery_locations {
        if !states_compatible(buyer_loc, seller_loc, config) {
            continue;
        }

        if buyer_loc.city.trim().eq_ignore_ascii_case(seller_loc.city.trim()) {
            return true;
        }

        if let (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) =
            (buyer_loc.lat, buyer_loc.lon, seller_loc.lat, seller_loc.lon)
        {
            let max_distance = buyer_loc.max_distance_km.unwrap_or(config.max_distance_km);
            if calculate_distance_km(lat1, lon1, lat2, lon2) <= max_distance {
                return true;
            }
        }
    }

    false
}

fn states_compatible(buyer_loc: &DeliveryLocation, seller_loc: &DeliveryLocation, config: &MatchingConfig) -> bool {
    let same_state = buyer_loc.state.eq_ignore_ascii_case(&seller_loc.state);
    if same_state {
        config.allow_same_state_matching
    } else {
        config.allow_cross_state_matching
    }
}
