//! Fail-fast eligibility validation. Produces a structured result rather
//! than raising on ineligibility — only a truly unexpected condition
//! reaches `Result::Err` from code that calls into this module.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::config::MatchingConfig;
use crate::models::{Availability, PartyStatus, Requirement};
use crate::risk::RiskCheckResult;
use crate::events::RiskStatus;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub ai_alerts: Vec<String>,
    pub risk_status: Option<RiskStatus>,
    pub risk_score: Option<i64>,
}

impl ValidationResult {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_ai_alerts(&self) -> bool {
        !self.ai_alerts.is_empty()
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self { is_valid: false, reasons: vec![reason.into()], ..Default::default() }
    }
}

pub struct Validator<'a> {
    config: &'a MatchingConfig,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a MatchingConfig) -> Self {
        Self { config }
    }

    pub fn validate_match_eligibility(
        &self,
        requirement: &Requirement,
        availability: &Availability,
        risk_result: &RiskCheckResult,
    ) -> ValidationResult {
        if requirement.commodity_id != availability.commodity_id {
            return ValidationResult::fail("commodity mismatch");
        }

        let min_quantity = requirement.effective_min_quantity();
        if availability.available_quantity < min_quantity {
            return ValidationResult::fail(format!(
                "available quantity {} below minimum {}",
                availability.available_quantity, min_quantity
            ));
        }

        if availability.asking_price > requirement.max_budget {
            return ValidationResult::fail(format!(
                "asking price {} exceeds max budget {}",
                availability.asking_price, requirement.max_budget
            ));
        }

        if requirement.status != PartyStatus::Active || availability.status != PartyStatus::Active {
            return ValidationResult::fail("one or both parties are not active");
        }

        let now = Utc::now();
        if requirement.is_expired(now) || availability.is_expired(now) {
            return ValidationResult::fail("requirement or availability has expired");
        }

        let mut result = ValidationResult { is_valid: true, ..Default::default() };

        if self.config.enable_ai_price_alerts && requirement.ai_price_alert {
            result.ai_alerts.push("buyer has an active AI price alert".to_string());
        }

        if self.config.enable_ai_recommendations {
            if let Some(confidence) = requirement.ai_confidence {
                if confidence < self.config.min_ai_confidence_threshold {
                    result.warnings.push(format!(
                        "AI confidence {confidence} below threshold {}",
                        self.config.min_ai_confidence_threshold
                    ));
                }
            }

            if let Some(suggested_max) = requirement.ai_suggested_max_price {
                if !suggested_max.is_zero() {
                    let deviation = ((availability.asking_price - suggested_max) / suggested_max
                        * Decimal::from(100))
                    .abs();
                    let warn_threshold = Decimal::try_from(self.config.ai_price_deviation_warn_percent)
                        .unwrap_or_default();
                    if deviation > warn_threshold {
                        result.warnings.push(format!(
                            "asking price deviates {deviation}% from AI-suggested max price"
                        ));
                    }
                }
            }

            if let Some(recommended) = &requirement.ai_recommended_sellers {
                if recommended.recommends_seller(availability.seller_partner_id) {
                    result.ai_alerts.push("seller is AI-recommended for this requirement".to_string());
                } else if !recommended.recommendations.is_empty() {
                    result
                        .ai_alerts
                        .push("seller is not among the AI-recommended sellers".to_string());
                }
            }
        }

        result.risk_status = Some(risk_result.status);
        result.risk_score = Some(risk_result.final_score);

        match risk_result.status {
            RiskStatus::Fail => {
                return ValidationResult::fail(
                    risk_result
                        .blocking_reason
                        .clone()
                        .unwrap_or_else(|| "risk compliance check failed".to_string()),
                );
            }
            RiskStatus::Warn => {
                result.warnings.push("risk compliance returned a WARN status".to_string());
            }
            RiskStatus::Pass => {}
        }
        if risk_result.final_score < 60 {
            return ValidationResult::fail(format!(
                "risk score {} below minimum 60",
                risk_result.final_score
            ));
        } else if risk_result.final_score < 80 {
            result.warnings.push(format!("risk score {} in WARN band", risk_result.final_score));
        }

        if self.config.block_internal_branch_trading
            && requirement.organization_id == availability.organization_id
        {
            return ValidationResult::fail("internal branch trading is blocked by configuration");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AvailabilityStatus, DeliveryLocation};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn requirement() -> Requirement {
        Requirement {
            id: Uuid::new_v4(),
            buyer_partner_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
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

    fn availability_for(req: &Requirement) -> Availability {
        Availability {
            id: Uuid::new_v4(),
            seller_partner_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            commodity_id: req.commodity_id,
            status: PartyStatus::Active,
            availability_status: AvailabilityStatus::Available,
            total_quantity: dec!(100),
            available_quantity: dec!(50),
            reserved_quantity: dec!(0),
            sold_quantity: dec!(50),
            asking_price: dec!(900),
            available_incoterms: vec![],
            dispatch_location: DeliveryLocation { location_id: None, state: "TX".into(), city: "Houston".into(), lat: None, lon: None, max_distance_km: None },
            quality_offers: vec![],
            ai_recommended_buyers: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn passing_risk() -> RiskCheckResult {
        RiskCheckResult {
            status: RiskStatus::Pass,
            final_score: 90,
            rule_score: 85,
            ml_score: None,
            ml_available: false,
            blocked: false,
            blocking_reason: None,
            violation_type: None,
            blocked_at_tier: None,
        }
    }

    #[test]
    fn passes_when_all_checks_clear() {
        let config = MatchingConfig::default();
        let validator = Validator::new(&config);
        let req = requirement();
        let avail = availability_for(&req);
        let result = validator.validate_match_eligibility(&req, &avail, &passing_risk());
        assert!(result.is_valid);
    }

    #[test]
    fn fails_on_commodity_mismatch() {
        let config = MatchingConfig::default();
        let validator = Validator::new(&config);
        let req = requirement();
        let mut avail = availability_for(&req);
        avail.commodity_id = Uuid::new_v4();
        let result = validator.validate_match_eligibility(&req, &avail, &passing_risk());
        assert!(!result.is_valid);
    }

    #[test]
    fn fails_on_internal_branch_trading() {
        let config = MatchingConfig::default();
        let validator = Validator::new(&config);
        let mut req = requirement();
        let mut avail = availability_for(&req);
        avail.organization_id = req.organization_id;
        req.organization_id = avail.organization_id;
        let result = validator.validate_match_eligibility(&req, &avail, &passing_risk());
        assert!(!result.is_valid);
    }

    #[test]
    fn fails_on_risk_block() {
        let config = MatchingConfig::default();
        let validator = Validator::new(&config);
        let req = requirement();
        let avail = availability_for(&req);
        let risk = RiskCheckResult {
            status: RiskStatus::Fail,
            final_score: 0,
            rule_score: 0,
            ml_score: None,
            ml_available: false,
            blocked: true,
            blocking_reason: Some("sanctions".to_string()),
            violation_type: Some("sanctions".to_string()),
            blocked_at_tier: Some("tier1_sanctions"),
        };
        let result = validator.validate_match_eligibility(&req, &avail, &risk);
        assert!(!result.is_valid);
    }

    #[test]
    fn warns_on_risk_warn_band() {
        let config = MatchingConfig::default();
        let validator = Validator::new(&config);
        let req = requirement();
        let avail = availability_for(&req);
        let risk = RiskCheckResult {
            status: RiskStatus::Warn,
            final_score: 65,
            rule_score: 65,
            ml_score: None,
            ml_available: false,
            blocked: false,
            blocking_reason: None,
            violation_type: None,
            blocked_at_tier: None,
        };
        let result = validator.validate_match_eligibility(&req, &avail, &risk);
        assert!(result.is_valid);
        assert!(result.has_warnings());
    }
}
