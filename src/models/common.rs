//! Shared value types used across requirements, availabilities, and matches.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "party_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Active,
    Inactive,
    Suspended,
}

/// Lifecycle of a buyer requirement, independent of `PartyStatus` (which
/// tracks the buyer's own account standing). `Draft` requirements are
/// never visible to the matching engine; `Fulfilled`, `Expired`, and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "requirement_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    Draft,
    Active,
    PartiallyFulfilled,
    Fulfilled,
    Expired,
    Cancelled,
}

impl RequirementStatus {
    /// Whether the matching engine may still search for new matches
    /// against a requirement in this state.
    pub fn is_matchable(self) -> bool {
        matches!(self, RequirementStatus::Active | RequirementStatus::PartiallyFulfilled)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequirementStatus::Fulfilled | RequirementStatus::Expired | RequirementStatus::Cancelled)
    }
}

/// Who may see and match against a requirement or availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "visibility", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    InvitedOnly,
    Private,
}

/// Buyer's stated intent, used to calibrate how aggressively the scorer
/// and validator should treat price/quality deviations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "intent", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Buy,
    Sell,
    Explore,
}

/// A buyer delivery site or seller dispatch site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLocation {
    pub location_id: Option<Uuid>,
    pub state: String,
    pub city: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Overrides `MatchingConfig::max_distance_km` for this location only.
    pub max_distance_km: Option<f64>,
}

/// One entry from an upstream AI recommendation feed: either a recommended
/// seller (on a requirement) or a recommended availability (on an
/// availability), keyed loosely since the upstream shape varies by side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiRecommendation {
    pub seller_id: Option<Uuid>,
    pub availability_id: Option<Uuid>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AiRecommendations {
    pub recommendations: Vec<AiRecommendation>,
}

impl AiRecommendations {
    pub fn recommends_seller(&self, seller_id: Uuid) -> bool {
        self.recommendations
            .iter()
            .any(|r| r.seller_id == Some(seller_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "incoterm", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Incoterm {
    Exw,
    Fob,
    Cif,
    Ddp,
    Fca,
}

/// Per-unit quality parameters, e.g. staple length, moisture content,
/// purity. Keyed by parameter name to avoid a fixed schema per commodity.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QualityConstraint {
    pub parameter: String,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub preferred: Option<Decimal>,
    /// When true, only an exact match to `preferred` is acceptable.
    pub exact_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QualityOffer {
    pub parameter: String,
    pub value: Decimal,
}
