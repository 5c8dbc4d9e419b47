use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskStatus {
    Pass,
    Warn,
    Fail,
}

/// Events published across the matching core. Kept as a single flat enum
/// (rather than per-aggregate event structs implementing a shared trait)
/// so a `broadcast::Receiver<DomainEvent>` can be handed to any component
/// without that component depending on every aggregate's crate.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    RequirementCreated { requirement_id: Uuid },
    AvailabilityCreated { availability_id: Uuid },
    RiskStatusChanged {
        requirement_id: Option<Uuid>,
        availability_id: Option<Uuid>,
        status: RiskStatus,
    },
    MatchFound { requirement_id: Uuid, availability_id: Uuid, score: f64 },
    MatchAllocated { requirement_id: Uuid, availability_id: Uuid },
}
