//! Quality/price/delivery/risk sub-scoring and score fusion.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::MatchingConfig;
use crate::events::RiskStatus;
use crate::models::{Availability, Incoterm, QualityConstraint, Requirement};
use crate::risk::RiskCheckResult;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub quality_score: f64,
    pub price_score: f64,
    pub delivery_score: f64,
    pub risk_score: f64,
    pub base_score: f64,
    pub final_score: f64,
    pub ai_boost_applied: bool,
    pub ai_boost_value: f64,
    pub warn_penalty_applied: bool,
    pub warn_penalty_value: f64,
    pub blocked: bool,
    pub risk_status: RiskStatus,
    pub warnings: Vec<String>,
}

pub struct Scorer<'a> {
    config: &'a MatchingConfig,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a MatchingConfig) -> Self {
        Self { config }
    }

    /// Combines the quality/price/delivery sub-scores with a risk result
    /// the caller already computed. Scoring itself never triggers a risk
    /// check — `MatchingEngine` decides once, per its own `include_risk`
    /// gate, and passes the outcome in here and to the validator alike.
    pub fn calculate_match_score(
        &self,
        commodity_key: &str,
        requirement: &Requirement,
        availability: &Availability,
        risk_result: &RiskCheckResult,
    ) -> ScoreBreakdown {
        let started_at = std::time::Instant::now();
        let breakdown = self.calculate_match_score_inner(commodity_key, requirement, availability, risk_result);
        crate::metrics::record_scoring_duration(started_at.elapsed().as_secs_f64());
        if breakdown.blocked {
            crate::metrics::record_match_blocked(
                breakdown.warnings.first().map(String::as_str).unwrap_or("blocked"),
            );
        }
        breakdown
    }

    fn calculate_match_score_inner(
        &self,
        commodity_key: &str,
        requirement: &Requirement,
        availability: &Availability,
        risk_result: &RiskCheckResult,
    ) -> ScoreBreakdown {
        let weights = self.config.scoring_weights_for(commodity_key);
        let quality_score = calculate_quality_score(requirement, availability);
        let price_score = calculate_price_score(requirement, availability);
        let delivery_score = calculate_delivery_score(requirement, availability);

        let (risk_score, warn_penalty, risk_status) = risk_sub_score(risk_result, self.config.risk_warn_global_penalty);

        if risk_result.blocked {
            return ScoreBreakdown {
                quality_score,
                price_score,
                delivery_score,
                risk_score: 0.0,
                base_score: 0.0,
                final_score: 0.0,
                ai_boost_applied: false,
                ai_boost_value: 0.0,
                warn_penalty_applied: false,
                warn_penalty_value: 0.0,
                blocked: true,
                risk_status: RiskStatus::Fail,
                warnings: vec![risk_result
                    .blocking_reason
                    .clone()
                    .unwrap_or_else(|| "blocked by risk orchestrator".to_string())],
            };
        }

        let base_score = weights.quality * quality_score
            + weights.price * price_score
            + weights.delivery * delivery_score
            + weights.risk * risk_score;

        let mut final_score = base_score * (1.0 - warn_penalty);
        let mut ai_boost_applied = false;
        let mut ai_boost_value = 0.0;

        if self.config.enable_ai_score_boost {
            if let Some(recommended) = &requirement.ai_recommended_sellers {
                if recommended.recommends_seller(availability.seller_partner_id) {
                    final_score = (final_score + self.config.ai_recommendation_score_boost).min(1.0);
                    ai_boost_applied = true;
                    ai_boost_value = self.config.ai_recommendation_score_boost;
                }
            }
        }

        ScoreBreakdown {
            quality_score,
            price_score,
            delivery_score,
            risk_score,
            base_score,
            final_score,
            ai_boost_applied,
            ai_boost_value,
            warn_penalty_applied: warn_penalty > 0.0,
            warn_penalty_value: warn_penalty,
            blocked: false,
            risk_status,
            warnings: Vec::new(),
        }
    }
}

fn risk_sub_score(result: &RiskCheckResult, warn_penalty: f64) -> (f64, f64, RiskStatus) {
    match result.status {
        RiskStatus::Pass => (1.0, 0.0, RiskStatus::Pass),
        RiskStatus::Warn => (0.5, warn_penalty, RiskStatus::Warn),
        RiskStatus::Fail => (0.0, 1.0, RiskStatus::Fail),
    }
}

fn calculate_quality_score(requirement: &Requirement, availability: &Availability) -> f64 {
    if requirement.quality_constraints.is_empty() {
        return 1.0;
    }
    let scores: Vec<f64> = requirement
        .quality_constraints
        .iter()
        .map(|constraint| score_quality_parameter(constraint, availability))
        .collect();
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn score_quality_parameter(constraint: &QualityConstraint, availability: &Availability) -> f64 {
    let offer = availability
        .quality_offers
        .iter()
        .find(|o| o.parameter == constraint.parameter);
    let Some(offer) = offer else { return 0.0 };

    if constraint.exact_only {
        return match constraint.preferred {
            Some(preferred) if preferred == offer.value => 1.0,
            Some(_) => 0.8,
            None => 0.0,
        };
    }

    let in_range = constraint.min.map_or(true, |min| offer.value >= min)
        && constraint.max.map_or(true, |max| offer.value <= max);

    if !in_range {
        return 0.0;
    }

    match constraint.preferred {
        None => 1.0,
        Some(preferred) => {
            let range = match (constraint.min, constraint.max) {
                (Some(min), Some(max)) if max > min => max - min,
                _ => Decimal::ONE,
            };
            let distance = (offer.value - preferred).abs();
            let penalty = (distance / range).to_f64().unwrap_or(0.0).min(1.0) * 0.5;
            (1.0 - penalty).max(0.0)
        }
    }
}

fn calculate_price_score(requirement: &Requirement, availability: &Availability) -> f64 {
    let target = requirement
        .buyer_target_price
        .unwrap_or(requirement.max_budget * Decimal::new(90, 2));

    if availability.asking_price > requirement.max_budget {
        return 0.0;
    }
    if availability.asking_price == target {
        return 1.0;
    }

    let deviation_percent = if target.is_zero() {
        Decimal::ZERO
    } else {
        ((availability.asking_price - target) / target * Decimal::from(100)).abs()
    };

    let score = if deviation_percent <= Decimal::from(2) {
        0.95
    } else if deviation_percent <= Decimal::from(5) {
        0.85
    } else if deviation_percent <= Decimal::from(10) {
        0.70
    } else if availability.asking_price <= requirement.max_budget {
        0.60
    } else {
        0.0
    };
    score
}

fn calculate_delivery_score(requirement: &Requirement, availability: &Availability) -> f64 {
    let location_score = 1.0; // candidates are already location-filtered upstream
    let timeline_score = 1.0; // no timeline negotiation modeled yet
    let terms_score = 1.0;
    let incoterm_score = incoterm_match_score(requirement, availability);
    let port_distance_score = port_distance_score(requirement, availability);

    if requirement.destination_country.is_some() {
        location_score * 0.25
            + timeline_score * 0.20
            + terms_score * 0.20
            + incoterm_score * 0.20
            + port_distance_score * 0.15
    } else {
        location_score * 0.40 + timeline_score * 0.30 + terms_score * 0.30
    }
}

fn incoterm_match_score(requirement: &Requirement, availability: &Availability) -> f64 {
    let Some(preferred) = requirement.preferred_incoterm else { return 1.0 };
    if availability.available_incoterms.is_empty() {
        return 0.5;
    }
    if availability.available_incoterms.contains(&preferred) {
        1.0
    } else {
        0.3
    }
}

fn port_distance_score(requirement: &Requirement, availability: &Availability) -> f64 {
    let Some(dest) = &requirement.destination_country else { return 0.8 };
    if dest.eq_ignore_ascii_case(&availability.dispatch_location.state) {
        1.0
    } else {
        0.7
    }
}

pub fn calculate_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AiRecommendation, AiRecommendations, DeliveryLocation, PartyStatus, QualityOffer};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn base_requirement() -> Requirement {
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
            buyer_target_price: Some(dec!(900)),
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

    fn base_availability() -> Availability {
        Availability {
            id: Uuid::new_v4(),
            seller_partner_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            commodity_id: Uuid::new_v4(),
            status: PartyStatus::Active,
            availability_status: crate::models::AvailabilityStatus::Available,
            total_quantity: dec!(100),
            available_quantity: dec!(100),
            reserved_quantity: dec!(0),
            sold_quantity: dec!(0),
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

    #[test]
    fn price_score_exact_match_is_one() {
        let req = base_requirement();
        let avail = base_availability();
        assert_eq!(calculate_price_score(&req, &avail), 1.0);
    }

    #[test]
    fn price_score_over_budget_is_zero() {
        let req = base_requirement();
        let mut avail = base_availability();
        avail.asking_price = dec!(1500);
        assert_eq!(calculate_price_score(&req, &avail), 0.0);
    }

    #[test]
    fn quality_score_defaults_to_one_without_constraints() {
        let req = base_requirement();
        let avail = base_availability();
        assert_eq!(calculate_quality_score(&req, &avail), 1.0);
    }

    #[test]
    fn quality_score_out_of_range_is_zero() {
        let mut req = base_requirement();
        req.quality_constraints.push(QualityConstraint {
            parameter: "staple_length".into(),
            min: Some(dec!(28)),
            max: Some(dec!(34)),
            preferred: Some(dec!(30)),
            exact_only: false,
        });
        let mut avail = base_availability();
        avail.quality_offers.push(QualityOffer { parameter: "staple_length".into(), value: dec!(20) });
        assert_eq!(calculate_quality_score(&req, &avail), 0.0);
    }

    #[test]
    fn ai_recommendation_boost_is_set_membership() {
        let mut req = base_requirement();
        let avail = base_availability();
        req.ai_recommended_sellers = Some(AiRecommendations {
            recommendations: vec![AiRecommendation { seller_id: Some(avail.seller_partner_id), availability_id: None, confidence: 0.4 }],
        });
        assert!(req.ai_recommended_sellers.unwrap().recommends_seller(avail.seller_partner_id));
    }

    #[test]
    fn haversine_same_point_is_zero() {
        assert!(calculate_distance_km(29.76, -95.36, 29.76, -95.36) < 0.001);
    }

    #[test]
    fn haversine_known_distance_is_reasonable() {
        // Houston to Dallas, roughly 362 km great-circle
        let d = calculate_distance_km(29.76, -95.36, 32.78, -96.80);
        assert!((300.0..420.0).contains(&d), "distance was {d}");
    }
}
