//! Domain event bus.
//!
//! A shared, dependency-free events package: aggregates publish through
//! this module instead of importing one another directly, and components
//! that react to another aggregate's lifecycle subscribe here rather than
//! reaching into that aggregate's internals.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{DomainEvent, RiskStatus};
