//! Seller availability aggregate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::common::{AiRecommendations, DeliveryLocation, Incoterm, PartyStatus, QualityOffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "availability_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Available,
    Reserved,
    Sold,
    Withdrawn,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Availability {
    pub id: Uuid,
    pub seller_partner_id: Uuid,
    pub organization_id: Uuid,
    pub commodity_id: Uuid,
    pub status: PartyStatus,
    pub availability_status: AvailabilityStatus,
    /// Total quantity ever listed. Invariant: `total_quantity ==
    /// available_quantity + reserved_quantity + sold_quantity`, enforced
    /// by every allocator/reservation call.
    pub total_quantity: Decimal,
    pub available_quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub sold_quantity: Decimal,
    pub asking_price: Decimal,
    pub available_incoterms: Vec<Incoterm>,
    pub dispatch_location: DeliveryLocation,
    pub quality_offers: Vec<QualityOffer>,
    pub ai_recommended_buyers: Option<AiRecommendations>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Availability {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| exp <= now)
    }

    pub fn has_remaining(&self) -> bool {
        self.available_quantity > Decimal::ZERO
            && self.availability_status == AvailabilityStatus::Available
    }

    /// `total_quantity = available + reserved + sold`, and each component
    /// is non-negative. Checked before and after every allocator call.
    pub fn quantity_invariant_holds(&self) -> bool {
        self.available_quantity >= Decimal::ZERO
            && self.reserved_quantity >= Decimal::ZERO
            && self.sold_quantity >= Decimal::ZERO
            && self.total_quantity == self.available_quantity + self.reserved_quantity + self.sold_quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base(status: AvailabilityStatus, available: Decimal, reserved: Decimal, sold: Decimal) -> Availability {
        Availability {
            id: Uuid::new_v4(),
            seller_partner_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            commodity_id: Uuid::new_v4(),
            status: PartyStatus::Active,
            availability_status: status,
            total_quantity: available + reserved + sold,
            available_quantity: available,
            reserved_quantity: reserved,
            sold_quantity: sold,
            asking_price: dec!(500),
            available_incoterms: vec![],
            dispatch_location: DeliveryLocation {
                location_id: None,
                state: "TX".into(),
                city: "Houston".into(),
                lat: None,
                lon: None,
                max_distance_km: None,
            },
            quality_offers: vec![],
            ai_recommended_buyers: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn has_remaining_false_when_sold() {
        let mut avail = base(AvailabilityStatus::Sold, dec!(0), dec!(0), dec!(100));
        assert!(!avail.has_remaining());
        avail.availability_status = AvailabilityStatus::Available;
        avail.available_quantity = dec!(10);
        avail.sold_quantity = dec!(90);
        assert!(avail.has_remaining());
    }

    #[test]
    fn invariant_holds_for_well_formed_split() {
        let avail = base(AvailabilityStatus::Available, dec!(40), dec!(30), dec!(30));
        assert!(avail.quantity_invariant_holds());
    }

    #[test]
    fn invariant_fails_when_total_mismatched() {
        let mut avail = base(AvailabilityStatus::Available, dec!(40), dec!(30), dec!(30));
        avail.total_quantity = dec!(90);
        assert!(!avail.quantity_invariant_holds());
    }
}
