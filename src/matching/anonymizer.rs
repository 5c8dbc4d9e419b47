//! Disclosure-level projection of requirement/availability/contact data.

use uuid::Uuid;

use crate::models::{Availability, DeliveryLocation, Requirement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisclosureLevel {
    None,
    Region,
    City,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisclosureContext {
    Browse,
    Matched,
    Negotiating,
    Trade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    None,
    ActiveTrade,
    CompletedTrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStatus {
    None,
    Initiated,
    InProgress,
    Accepted,
}

#[derive(Debug, Clone)]
pub struct AnonymizedLocation {
    pub region: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnonymizedParty {
    pub display_name: String,
    pub rating: Option<f64>,
    pub location: AnonymizedLocation,
    pub contact: Option<String>,
}

pub struct Anonymizer;

impl Anonymizer {
    /// Derives the disclosure context from trade/negotiation status. An
    /// active or completed trade always wins; an in-progress or accepted
    /// negotiation is `Negotiating`; a merely initiated one is `Matched`;
    /// anything else is `Browse`.
    pub fn disclosure_context(trade: TradeStatus, negotiation: NegotiationStatus) -> DisclosureContext {
        match trade {
            TradeStatus::ActiveTrade | TradeStatus::CompletedTrade => return DisclosureContext::Trade,
            TradeStatus::None => {}
        }
        match negotiation {
            NegotiationStatus::InProgress | NegotiationStatus::Accepted => DisclosureContext::Negotiating,
            NegotiationStatus::Initiated => DisclosureContext::Matched,
            NegotiationStatus::None => DisclosureContext::Browse,
        }
    }

    pub fn anonymize_location(location: &DeliveryLocation, level: DisclosureLevel) -> AnonymizedLocation {
        match level {
            DisclosureLevel::None => AnonymizedLocation { region: None, city: None },
            DisclosureLevel::Region => AnonymizedLocation { region: Some(location.state.clone()), city: None },
            DisclosureLevel::City | DisclosureLevel::Full => {
                AnonymizedLocation { region: Some(location.state.clone()), city: Some(location.city.clone()) }
            }
        }
    }

    /// `is_own` escalates the effective context to `Trade` regardless of
    /// the derived context: the owner of an entity always sees it in full.
    fn effective_context(context: DisclosureContext, is_own: bool) -> DisclosureContext {
        if is_own {
            DisclosureContext::Trade
        } else {
            context
        }
    }

    pub fn anonymize_availability(
        availability: &Availability,
        context: DisclosureContext,
        is_own: bool,
        display_name: &str,
        contact: &str,
    ) -> AnonymizedParty {
        let context = Self::effective_context(context, is_own);
        match context {
            DisclosureContext::Browse => AnonymizedParty {
                display_name: "Seller".to_string(),
                rating: None,
                location: Self::anonymize_location(&availability.dispatch_location, DisclosureLevel::Region),
                contact: None,
            },
            DisclosureContext::Matched => AnonymizedParty {
                display_name: "Verified Seller".to_string(),
                rating: Some(4.5),
                location: Self::anonymize_location(&availability.dispatch_location, DisclosureLevel::City),
                contact: None,
            },
            DisclosureContext::Negotiating => AnonymizedParty {
                display_name: display_name.to_string(),
                rating: Some(4.5),
                location: Self::anonymize_location(&availability.dispatch_location, DisclosureLevel::City),
                contact: Some("contact available on deal acceptance".to_string()),
            },
            DisclosureContext::Trade => AnonymizedParty {
                display_name: display_name.to_string(),
                rating: Some(4.5),
                location: Self::anonymize_location(&availability.dispatch_location, DisclosureLevel::Full),
                contact: Some(contact.to_string()),
            },
        }
    }

    pub fn anonymize_requirement(
        requirement: &Requirement,
        context: DisclosureContext,
        is_own: bool,
        display_name: &str,
        contact: &str,
    ) -> AnonymizedParty {
        let context = Self::effective_context(context, is_own);
        let location = requirement
            .delivery_locations
            .first()
            .cloned()
            .unwrap_or(DeliveryLocation { location_id: None, state: String::new(), city: String::new(), lat: None, lon: None, max_distance_km: None });

        match context {
            DisclosureContext::Browse => AnonymizedParty {
                display_name: "Buyer".to_string(),
                rating: None,
                location: Self::anonymize_location(&location, DisclosureLevel::Region),
                contact: None,
            },
            DisclosureContext::Matched => AnonymizedParty {
                display_name: "Verified Buyer".to_string(),
                rating: Some(4.5),
                location: Self::anonymize_location(&location, DisclosureLevel::City),
                contact: None,
            },
            DisclosureContext::Negotiating => AnonymizedParty {
                display_name: display_name.to_string(),
                rating: Some(4.5),
                location: Self::anonymize_location(&location, DisclosureLevel::City),
                contact: Some("contact available on deal acceptance".to_string()),
            },
            DisclosureContext::Trade => AnonymizedParty {
                display_name: display_name.to_string(),
                rating: Some(4.5),
                location: Self::anonymize_location(&location, DisclosureLevel::Full),
                contact: Some(contact.to_string()),
            },
        }
    }

    /// Only the matched buyer or seller may view a match.
    pub fn can_view_match(viewer_id: Uuid, buyer_partner_id: Uuid, seller_partner_id: Uuid) -> bool {
        viewer_id == buyer_partner_id || viewer_id == seller_partner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn location() -> DeliveryLocation {
        DeliveryLocation { location_id: None, state: "TX".into(), city: "Houston".into(), lat: None, lon: None, max_distance_km: None }
    }

    fn availability() -> Availability {
        Availability {
            id: Uuid::new_v4(),
            seller_partner_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            commodity_id: Uuid::new_v4(),
            status: crate::models::PartyStatus::Active,
            availability_status: crate::models::AvailabilityStatus::Available,
            total_quantity: dec!(100),
            available_quantity: dec!(100),
            reserved_quantity: dec!(0),
            sold_quantity: dec!(0),
            asking_price: dec!(500),
            available_incoterms: vec![],
            dispatch_location: location(),
            quality_offers: vec![],
            ai_recommended_buyers: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn browse_context_hides_identity() {
        let avail = availability();
        let result = Anonymizer::anonymize_availability(&avail, DisclosureContext::Browse, false, "Acme Cotton Co", "seller@acme.test");
        assert_eq!(result.display_name, "Seller");
        assert!(result.contact.is_none());
        assert!(result.location.city.is_none());
    }

    #[test]
    fn trade_context_reveals_contact() {
        let avail = availability();
        let result = Anonymizer::anonymize_availability(&avail, DisclosureContext::Trade, false, "Acme Cotton Co", "seller@acme.test");
        assert_eq!(result.display_name, "Acme Cotton Co");
        assert_eq!(result.contact, Some("seller@acme.test".to_string()));
    }

    #[test]
    fn owner_always_sees_trade_level() {
        let avail = availability();
        let result = Anonymizer::anonymize_availability(&avail, DisclosureContext::Browse, true, "Acme Cotton Co", "seller@acme.test");
        assert_eq!(result.display_name, "Acme Cotton Co");
        assert!(result.contact.is_some());
    }

    #[test]
    fn disclosure_context_derivation() {
        assert_eq!(
            Anonymizer::disclosure_context(TradeStatus::ActiveTrade, NegotiationStatus::None),
            DisclosureContext::Trade
        );
        assert_eq!(
            Anonymizer::disclosure_context(TradeStatus::None, NegotiationStatus::Accepted),
            DisclosureContext::Negotiating
        );
        assert_eq!(
            Anonymizer::disclosure_context(TradeStatus::None, NegotiationStatus::Initiated),
            DisclosureContext::Matched
        );
        assert_eq!(
            Anonymizer::disclosure_context(TradeStatus::None, NegotiationStatus::None),
            DisclosureContext::Browse
        );
    }

    #[test]
    fn can_view_match_restricted_to_participants() {
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        assert!(Anonymizer::can_view_match(buyer, buyer, seller));
        assert!(!Anonymizer::can_view_match(stranger, buyer, seller));
    }
}
