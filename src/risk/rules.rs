//! Tier 1 rule-based compliance checks.
//!
//! Circular-trading and wash-trading detection are unspecified placeholders
//! upstream (a `# TODO` guarding a constant `false`); the thresholds below
//! are this repository's own conservative defaults, not a source value:
//! a party appearing on both sides of a chain of depth <= 3 within the
//! lookback window counts as circular; three or more trades between the
//! same buyer/seller pair within the window, each within 2% notional of
//! the others, counts as wash trading.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

const CIRCULAR_CHAIN_DEPTH: usize = 3;
const WASH_TRADE_MIN_OCCURRENCES: usize = 3;
const WASH_TRADE_NOTIONAL_TOLERANCE_PERCENT: f64 = 2.0;
const WASH_TRADE_LOOKBACK_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct PartyProfile {
    pub party_id: Uuid,
    pub organization_id: Uuid,
    pub country: String,
    pub state: Option<String>,
    pub is_sanctioned: bool,
    pub has_export_import_license: bool,
    pub gst_registered: bool,
    pub has_pan_card: bool,
}

#[derive(Debug, Clone)]
pub struct TradeContext {
    pub buyer: PartyProfile,
    pub seller: PartyProfile,
    pub commodity_id: Uuid,
    pub notional: Decimal,
    pub counterparty_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub notional: Decimal,
    pub traded_at: DateTime<Utc>,
}

pub fn sanctions_check(buyer: &PartyProfile, seller: &PartyProfile) -> Option<String> {
    if buyer.is_sanctioned {
        return Some(format!("buyer {} is on a sanctions list", buyer.party_id));
    }
    if seller.is_sanctioned {
        return Some(format!("seller {} is on a sanctions list", seller.party_id));
    }
    None
}

pub fn export_import_license_check(buyer: &PartyProfile, seller: &PartyProfile) -> Option<String> {
    if !seller.has_export_import_license {
        return Some(format!("seller {} lacks an export license", seller.party_id));
    }
    if !buyer.has_export_import_license {
        return Some(format!("buyer {} lacks an import license", buyer.party_id));
    }
    None
}

pub fn gst_registration_check(buyer: &PartyProfile, seller: &PartyProfile) -> Option<String> {
    if !buyer.gst_registered {
        return Some(format!("buyer {} is not GST registered", buyer.party_id));
    }
    if !seller.gst_registered {
        return Some(format!("seller {} is not GST registered", seller.party_id));
    }
    None
}

pub fn pan_card_check(buyer: &PartyProfile, seller: &PartyProfile) -> Option<String> {
    if !buyer.has_pan_card {
        return Some(format!("buyer {} has no PAN card on file", buyer.party_id));
    }
    if !seller.has_pan_card {
        return Some(format!("seller {} has no PAN card on file", seller.party_id));
    }
    None
}

/// Detects a short cycle of recent trades that routes value back to its
/// origin: buyer A -> seller B -> ... -> seller A within
/// `CIRCULAR_CHAIN_DEPTH` hops.
pub fn circular_trading_check(ctx: &TradeContext, recent: &[TradeRecord]) -> Option<String> {
    let mut frontier = vec![ctx.seller.party_id];
    for _ in 0..CIRCULAR_CHAIN_DEPTH {
        let mut next = Vec::new();
        for party in &frontier {
            for trade in recent.iter().filter(|t| t.buyer_id == *party) {
                if trade.seller_id == ctx.buyer.party_id {
                    return Some(format!(
                        "trade chain from {} back to {} within {} hops",
                        ctx.seller.party_id, ctx.buyer.party_id, CIRCULAR_CHAIN_DEPTH
                    ));
                }
                next.push(trade.seller_id);
            }
        }
        frontier = next;
        if frontier.is_empty() {
            break;
        }
    }
    None
}

/// Detects repeated trades between the same pair at near-identical
/// notional within the lookback window.
pub fn wash_trading_check(ctx: &TradeContext, recent: &[TradeRecord]) -> Option<String> {
    let cutoff = Utc::now() - chrono::Duration::hours(WASH_TRADE_LOOKBACK_HOURS);
    let matches: Vec<&TradeRecord> = recent
        .iter()
        .filter(|t| t.traded_at >= cutoff)
        .filter(|t| t.buyer_id == ctx.buyer.party_id && t.seller_id == ctx.seller.party_id)
        .filter(|t| notional_within_tolerance(t.notional, ctx.notional))
        .collect();

    if matches.len() + 1 >= WASH_TRADE_MIN_OCCURRENCES {
        return Some(format!(
            "{} near-identical trades between {} and {} within {}h",
            matches.len() + 1,
            ctx.buyer.party_id,
            ctx.seller.party_id,
            WASH_TRADE_LOOKBACK_HOURS
        ));
    }
    None
}

fn notional_within_tolerance(a: Decimal, b: Decimal) -> bool {
    if b.is_zero() {
        return a.is_zero();
    }
    let diff_percent = ((a - b) / b * Decimal::from(100)).abs();
    diff_percent <= Decimal::try_from(WASH_TRADE_NOTIONAL_TOLERANCE_PERCENT).unwrap_or_default()
}

pub fn party_links_check(ctx: &TradeContext) -> Option<String> {
    let counterparty_id = ctx.counterparty_id?;
    if counterparty_id == ctx.buyer.organization_id || counterparty_id == ctx.seller.organization_id {
        return Some(format!(
            "counterparty {counterparty_id} is linked to one of the trading organizations"
        ));
    }
    None
}
