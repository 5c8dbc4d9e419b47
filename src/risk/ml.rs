//! ML risk scoring interface.
//!
//! The upstream ML risk engine is a separate service this repository does
//! not own; `MlRiskModel` is the seam it plugs into. `StubMlRiskModel`
//! stands in for tests and for deployments that have not wired a real
//! model yet.

use async_trait::async_trait;

use super::rules::TradeContext;

#[async_trait]
pub trait MlRiskModel: Send + Sync {
    async fn score(&self, ctx: &TradeContext) -> Result<i64, super::RiskError>;
}

/// Always reports a neutral-to-good score. Useful for local development
/// and for tests that want the ML path exercised without a real model.
pub struct StubMlRiskModel {
    pub fixed_score: i64,
}

impl Default for StubMlRiskModel {
    fn default() -> Self {
        Self { fixed_score: 75 }
    }
}

#[async_trait]
impl MlRiskModel for StubMlRiskModel {
    async fn score(&self, _ctx: &TradeContext) -> Result<i64, super::RiskError> {
        Ok(self.fixed_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::rules::PartyProfile;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn ctx() -> TradeContext {
        let profile = |country: &str| PartyProfile {
            party_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            country: country.to_string(),
            state: None,
            is_sanctioned: false,
            has_export_import_license: true,
            gst_registered: true,
            has_pan_card: true,
        };
        TradeContext {
            buyer: profile("IN"),
            seller: profile("IN"),
            commodity_id: Uuid::new_v4(),
            notional: dec!(1000),
            counterparty_id: None,
        }
    }

    #[tokio::test]
    async fn stub_model_returns_fixed_score() {
        let model = StubMlRiskModel::default();
        let score = model.score(&ctx()).await.unwrap();
        assert_eq!(score, 75);
    }
}
