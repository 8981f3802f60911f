//! Core engine: creation scanning, curve valuation, sell decisions, and the
//! scheduler loop that ties them together.

pub mod clock;
pub mod curve;
pub mod decision;
pub mod policy;
pub mod scanner;
pub mod scheduler;

pub use clock::{Clock, SystemClock};
pub use decision::{DecisionEngine, TokenOutcome};
pub use scheduler::{CycleReport, Scheduler};
