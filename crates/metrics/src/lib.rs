pub mod counters;
pub mod health;
pub mod report;
pub mod snapshot;

pub use counters::{Metrics, Snapshot};
pub use health::HealthThresholds;
