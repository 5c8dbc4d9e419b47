//! Two-tier risk orchestrator: rule-based compliance checks fused with an
//! optional ML risk score behind a circuit breaker.

mod ml;
mod rules;

pub use ml::{MlRiskModel, StubMlRiskModel};
pub use rules::{PartyProfile, TradeContext, TradeRecord};

use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RiskConfig;
use crate::events::RiskStatus;

#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    #[error("ml risk model failed: {0}")]
    MlUnavailable(String),
}

/// The standardized shape of a blocked result, regardless of which Tier 1
/// check produced it.
#[derive(Debug, Clone)]
pub struct RiskCheckResult {
    pub status: RiskStatus,
    pub final_score: i64,
    pub rule_score: i64,
    pub ml_score: Option<i64>,
    pub ml_available: bool,
    pub blocked: bool,
    pub blocking_reason: Option<String>,
    pub violation_type: Option<String>,
    pub blocked_at_tier: Option<&'static str>,
}

impl RiskCheckResult {
    fn blocked(tier: &'static str, violation_type: &str, reason: &str) -> Self {
        Self {
            status: RiskStatus::Fail,
            final_score: 0,
            rule_score: 0,
            ml_score: None,
            ml_available: false,
            blocked: true,
            blocking_reason: Some(reason.to_string()),
            violation_type: Some(violation_type.to_string()),
            blocked_at_tier: Some(tier),
        }
    }
}

/// Tracks consecutive ML failures and trips once `max_failures` is
/// reached; cleared on the next success.
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    max_failures: u32,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32) -> Self {
        Self { failure_count: AtomicU32::new(0), max_failures }
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, AtomicOrdering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, AtomicOrdering::SeqCst);
    }

    pub fn should_skip_ml(&self) -> bool {
        self.failure_count.load(AtomicOrdering::SeqCst) >= self.max_failures
    }
}

/// Combines a rule-based score with an optional ML score. A blocked rule
/// result always wins; a missing ML score degrades gracefully to the rule
/// score alone.
pub struct FusionLayer {
    rule_weight: f64,
    ml_weight: f64,
}

impl FusionLayer {
    pub fn new(rule_weight: f64, ml_weight: f64) -> Self {
        Self { rule_weight, ml_weight }
    }

    pub fn combine_scores(&self, rule_score: i64, ml_score: Option<i64>, rule_blocked: bool) -> (i64, bool) {
        if rule_blocked {
            return (0, false);
        }
        match ml_score {
            None => (rule_score, false),
            Some(ml) => {
                let combined = (rule_score as f64 * self.rule_weight) as i64
                    + (ml as f64 * self.ml_weight) as i64;
                (combined, true)
            }
        }
    }
}

pub struct RiskOrchestrator {
    config: RiskConfig,
    fusion: FusionLayer,
    circuit_breaker: Arc<CircuitBreaker>,
    ml_model: Option<Arc<dyn MlRiskModel>>,
    // Recent trades, kept for circular/wash-trading detection. A bounded
    // in-memory window; a production deployment would source this from
    // the storage gateway instead.
    recent_trades: Mutex<Vec<rules::TradeRecord>>,
}

impl RiskOrchestrator {
    pub fn new(config: RiskConfig, ml_model: Option<Arc<dyn MlRiskModel>>) -> Self {
        let circuit_breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker_max_failures));
        let fusion = FusionLayer::new(config.rule_weight, config.ml_weight);
        Self { config, fusion, circuit_breaker, ml_model, recent_trades: Mutex::new(Vec::new()) }
    }

    pub fn record_trade(&self, trade: rules::TradeRecord) {
        let mut trades = self.recent_trades.lock();
        trades.push(trade);
        let len = trades.len();
        if len > 500 {
            trades.drain(0..len - 500);
        }
    }

    pub async fn comprehensive_check(&self, ctx: &TradeContext) -> RiskCheckResult {
        let is_international = ctx.buyer.country != ctx.seller.country;

        if is_international {
            if let Some(reason) = rules::sanctions_check(&ctx.buyer, &ctx.seller) {
                return RiskCheckResult::blocked("tier1_sanctions", "sanctions", &reason);
            }
            if let Some(reason) = rules::export_import_license_check(&ctx.buyer, &ctx.seller) {
                return RiskCheckResult::blocked("tier1_export_import", "export_import_license", &reason);
            }
        } else {
            if ctx.buyer.state.is_some() && ctx.seller.state.is_some() {
                if let Some(reason) = rules::gst_registration_check(&ctx.buyer, &ctx.seller) {
                    return RiskCheckResult::blocked("tier1_gst", "gst_registration", &reason);
                }
            }
            if let Some(reason) = rules::pan_card_check(&ctx.buyer, &ctx.seller) {
                return RiskCheckResult::blocked("tier1_pan", "pan_card", &reason);
            }
        }

        let trades = self.recent_trades.lock().clone();
        if let Some(reason) = rules::circular_trading_check(ctx, &trades) {
            return RiskCheckResult::blocked("tier1_circular", "circular_trading", &reason);
        }
        if let Some(reason) = rules::wash_trading_check(ctx, &trades) {
            return RiskCheckResult::blocked("tier1_wash", "wash_trading", &reason);
        }
        if ctx.counterparty_id.is_some() {
            if let Some(reason) = rules::party_links_check(ctx) {
                return RiskCheckResult::blocked("tier1_party_links", "party_links", &reason);
            }
        }

        let rule_score: i64 = 85;

        let (ml_score, ml_available) = if let Some(model) = &self.ml_model {
            if self.circuit_breaker.should_skip_ml() {
                (None, false)
            } else {
                match model.score(ctx).await {
                    Ok(score) => {
                        self.circuit_breaker.record_success();
                        (Some(score), true)
                    }
                    Err(_) => {
                        self.circuit_breaker.record_failure();
                        (None, false)
                    }
                }
            }
        } else {
            (None, false)
        };

        let (final_score, combined_available) = self.fusion.combine_scores(rule_score, ml_score, false);
        let ml_available = ml_available && combined_available;

        let status = if final_score >= self.config.pass_threshold {
            RiskStatus::Pass
        } else if final_score >= self.config.warn_threshold {
            RiskStatus::Warn
        } else {
            RiskStatus::Fail
        };

        RiskCheckResult {
            status,
            final_score,
            rule_score,
            ml_score,
            ml_available,
            blocked: false,
            blocking_reason: None,
            violation_type: None,
            blocked_at_tier: None,
        }
    }
}
