//! Bilateral matching core: scoring, eligibility validation, candidate
//! search, atomic allocation, and the event-driven dispatcher that ties
//! them together.

pub mod anonymizer;
pub mod engine;
pub mod scorer;
pub mod service;
pub mod types;
pub mod validator;

pub use anonymizer::Anonymizer;
pub use engine::MatchingEngine;
pub use scorer::Scorer;
pub use service::MatchingService;
pub use types::{MatchPriority, MatchingError};
pub use validator::{ValidationResult, Validator};
