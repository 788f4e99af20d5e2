//! Dispatch engine and tick loop for the Muster service dispatcher.
//!
//! [`TickEngine`] is the context object a host drives once per tick. It
//! scans the due slice of the population into the category indices, then
//! runs one greedy [`DispatchEngine`] pass per category, matching free
//! units to the highest-priority targets in range. Repeated fatal
//! failures open a circuit breaker that stops dispatch while scanning
//! continues.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod stage;
pub mod tick;

pub use config::{CategoryConfig, ConfigError, DispatchConfig, MAX_BUCKET_MASK};
pub use dispatch::{priority_order, Assignment, DispatchEngine, PassReport};
pub use metrics::TickMetrics;
pub use stage::{CheckStage, CheckStagePreset, SpareUnitPolicy, Stages, TargetFilter};
pub use tick::{TickEngine, TickError, TickOutcome, TickReport};
