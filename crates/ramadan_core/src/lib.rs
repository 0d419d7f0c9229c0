pub mod clock;
pub mod error;
pub mod ledger;
pub mod plan;
pub mod planner;
pub mod report;
pub mod schedule;
pub mod service;
pub mod session;
pub mod store;
pub mod time;

pub use crate::error::{EngineError, Result};
pub use crate::service::{CompanionService, CompanionServiceBuilder, TasbeehTally};
