use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    #[error("requirement not found: {0}")]
    RequirementNotFound(Uuid),
    #[error("availability not found: {0}")]
    AvailabilityNotFound(Uuid),
    #[error("no quantity available to allocate")]
    NoQuantityAvailable,
    #[error("allocation retries exhausted")]
    AllocationRetriesExhausted,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPriority {
    High,
    Medium,
    Low,
}

impl MatchPriority {
    fn order(self) -> u8 {
        match self {
            MatchPriority::High => 0,
            MatchPriority::Medium => 1,
            MatchPriority::Low => 2,
        }
    }
}

/// Entity a match request is queued for: either side can trigger a
/// re-match search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTarget {
    Requirement(Uuid),
    Availability(Uuid),
}

impl MatchTarget {
    pub fn entity_id(&self) -> Uuid {
        match self {
            MatchTarget::Requirement(id) | MatchTarget::Availability(id) => *id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub target: MatchTarget,
    pub priority: MatchPriority,
    pub created_at: DateTime<Utc>,
}

impl PartialEq for MatchRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.created_at == other.created_at
    }
}
impl Eq for MatchRequest {}

/// Orders by priority first, then FIFO (earlier `created_at` first). Used
/// inside a `BinaryHeap`, which is a max-heap, so this `Ord` is reversed
/// relative to "natural" priority order — `BinaryHeap::pop` then yields
/// the highest-priority, oldest request.
impl Ord for MatchRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .order()
            .cmp(&self.priority.order())
            .then_with(|| other.created_at.cmp(&self.created_at))
    }
}

impl PartialOrd for MatchRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
