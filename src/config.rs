//! Application configuration.
//!
//! Loaded once at startup from environment variables (via `dotenvy` +
//! the `config` crate) into a single `AppConfig`, then passed down to
//! every component explicitly. Nothing here is a module-level singleton;
//! `get_matching_config()`-style global accessors are deliberately absent.

use std::collections::HashMap;

use config::{Config, ConfigError, Environment};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringWeights {
    pub quality: f64,
    pub price: f64,
    pub delivery: f64,
    pub risk: f64,
}

impl ScoringWeights {
    pub fn is_normalized(&self) -> bool {
        (self.quality + self.price + self.delivery + self.risk - 1.0).abs() < 0.001
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    pub scoring_weights: HashMap<String, ScoringWeights>,
    pub min_score_threshold: HashMap<String, f64>,
    pub duplicate_time_window_minutes: i64,
    pub duplicate_similarity_threshold: f64,
    pub max_matches_to_notify: usize,
    pub notification_rate_limit_seconds: i64,
    pub enable_partial_matching: bool,
    pub min_partial_quantity_percent: f64,
    pub match_batch_size: usize,
    pub match_batch_delay_ms: u64,
    pub max_concurrent_matches: usize,
    pub risk_warn_global_penalty: f64,
    pub allow_cross_state_matching: bool,
    pub allow_same_state_matching: bool,
    pub max_distance_km: f64,
    pub block_internal_branch_trading: bool,
    pub min_ai_confidence_threshold: f64,
    pub enable_ai_price_alerts: bool,
    pub enable_ai_recommendations: bool,
    pub ai_price_deviation_warn_percent: f64,
    pub enable_ai_score_boost: bool,
    pub ai_recommendation_score_boost: f64,
    pub safety_cron_interval_seconds: u64,
    pub enable_safety_cron: bool,
}

impl MatchingConfig {
    pub fn scoring_weights_for(&self, commodity: &str) -> &ScoringWeights {
        self.scoring_weights
            .get(commodity)
            .or_else(|| self.scoring_weights.get("default"))
            .expect("default scoring weights entry must always be present")
    }

    pub fn min_score_threshold_for(&self, commodity: &str) -> f64 {
        self.min_score_threshold
            .get(commodity)
            .copied()
            .or_else(|| self.min_score_threshold.get("default").copied())
            .unwrap_or(0.6)
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        let mut scoring_weights = HashMap::new();
        scoring_weights.insert(
            "default".to_string(),
            ScoringWeights { quality: 0.40, price: 0.30, delivery: 0.15, risk: 0.15 },
        );
        scoring_weights.insert(
            "cotton".to_string(),
            ScoringWeights { quality: 0.40, price: 0.30, delivery: 0.15, risk: 0.15 },
        );
        scoring_weights.insert(
            "gold".to_string(),
            ScoringWeights { quality: 0.30, price: 0.40, delivery: 0.10, risk: 0.20 },
        );
        scoring_weights.insert(
            "wheat".to_string(),
            ScoringWeights { quality: 0.35, price: 0.35, delivery: 0.20, risk: 0.10 },
        );
        scoring_weights.insert(
            "rice".to_string(),
            ScoringWeights { quality: 0.35, price: 0.35, delivery: 0.20, risk: 0.10 },
        );
        scoring_weights.insert(
            "oil".to_string(),
            ScoringWeights { quality: 0.40, price: 0.35, delivery: 0.15, risk: 0.10 },
        );

        let mut min_score_threshold = HashMap::new();
        min_score_threshold.insert("default".to_string(), 0.6);
        min_score_threshold.insert("cotton".to_string(), 0.6);
        min_score_threshold.insert("gold".to_string(), 0.7);
        min_score_threshold.insert("wheat".to_string(), 0.5);
        min_score_threshold.insert("rice".to_string(), 0.5);
        min_score_threshold.insert("oil".to_string(), 0.6);

        Self {
            scoring_weights,
            min_score_threshold,
            duplicate_time_window_minutes: 5,
            duplicate_similarity_threshold: 0.95,
            max_matches_to_notify: 5,
            notification_rate_limit_seconds: 60,
            enable_partial_matching: true,
            min_partial_quantity_percent: 0.10,
            match_batch_size: 100,
            match_batch_delay_ms: 1000,
            max_concurrent_matches: 50,
            risk_warn_global_penalty: 0.10,
            allow_cross_state_matching: false,
            allow_same_state_matching: true,
            max_distance_km: 50.0,
            block_internal_branch_trading: true,
            min_ai_confidence_threshold: 60.0,
            enable_ai_price_alerts: true,
            enable_ai_recommendations: true,
            ai_price_deviation_warn_percent: 10.0,
            enable_ai_score_boost: true,
            ai_recommendation_score_boost: 0.05,
            safety_cron_interval_seconds: 30,
            enable_safety_cron: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    pub rule_weight: f64,
    pub ml_weight: f64,
    pub circuit_breaker_max_failures: u32,
    pub pass_threshold: i64,
    pub warn_threshold: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            rule_weight: 0.70,
            ml_weight: 0.30,
            circuit_breaker_max_failures: 5,
            pass_threshold: 80,
            warn_threshold: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub max_retries: u32,
    pub base_retry_delay_secs: u64,
    pub max_retry_delay_secs: u64,
    pub delivery_timeout_secs: u64,
    pub dlq_page_size: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_secs: 60,
            max_retry_delay_secs: 3600,
            delivery_timeout_secs: 10,
            dlq_page_size: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default)]
    pub metrics_port: u16,
    #[serde(default = "MatchingConfig::default")]
    pub matching: MatchingConfig,
    #[serde(default = "RiskConfig::default")]
    pub risk: RiskConfig,
    #[serde(default = "WebhookConfig::default")]
    pub webhooks: WebhookConfig,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost/trade_desk".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings = Config::builder()
            .set_default("environment", "development")?
            .set_default("database_url", default_database_url())?
            .set_default("redis_url", default_redis_url())?
            .set_default("metrics_port", 9100)?
            .add_source(Environment::with_prefix("TRADE_DESK").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize().unwrap_or(AppConfig {
            environment: default_environment(),
            database_url: default_database_url(),
            redis_url: default_redis_url(),
            metrics_port: 9100,
            matching: MatchingConfig::default(),
            risk: RiskConfig::default(),
            webhooks: WebhookConfig::default(),
        });

        if app_config.metrics_port == 0 {
            app_config.metrics_port = 9100;
        }

        Ok(app_config)
    }

    pub fn risk_warn_penalty_decimal(&self) -> Decimal {
        Decimal::from_f64_retain(self.matching.risk_warn_global_penalty).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matching_config_weights_are_normalized() {
        let config = MatchingConfig::default();
        for (commodity, weights) in &config.scoring_weights {
            assert!(
                weights.is_normalized(),
                "weights for {commodity} do not sum to 1.0"
            );
        }
    }

    #[test]
    fn scoring_weights_fall_back_to_default() {
        let config = MatchingConfig::default();
        let weights = config.scoring_weights_for("unknown_commodity");
        assert!(weights.is_normalized());
    }
}
