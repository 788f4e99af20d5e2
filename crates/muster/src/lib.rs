//! Muster: an incremental service dispatcher for city simulations.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Muster sub-crates. For most hosts, adding `muster` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use muster::prelude::*;
//! use muster_test_utils::{fixtures, MockHost};
//!
//! // One cemetery with a hearse, and one house that needs it.
//! let mut host = MockHost::new();
//! let cemetery = host.add_object(fixtures::provider(
//!     Category::DeathCare,
//!     Position::flat(0.0, 0.0),
//!     500.0,
//!     4,
//! ));
//! host.add_unit_to(cemetery);
//! let house = host.add_object(fixtures::target(
//!     Category::DeathCare,
//!     Position::flat(40.0, 0.0),
//!     50,
//!     1,
//! ));
//!
//! let mut engine = TickEngine::new(DispatchConfig::default()).unwrap();
//! let report = engine.execute_tick(&mut host).unwrap();
//! assert_eq!(report.assignments.len(), 1);
//! assert_eq!(report.assignments[0].target, house);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `muster-core` | IDs, snapshots, the `Host` trait, error enums |
//! | [`index`] | `muster-index` | Bucket scanner, debounce timers, records, keepers |
//! | [`engine`] | `muster-engine` | Configuration, dispatch passes, tick engine |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`muster-core`).
///
/// Contains the host snapshots, the [`types::Host`] trait a simulation
/// implements, and the error enums of every subsystem.
pub use muster_core as types;

/// Scanning and indexing (`muster-index`).
///
/// [`index::BucketScanner`] walks the population a slice per tick and
/// [`index::Keepers`] hold one [`index::CategoryIndex`] per category.
pub use muster_index as index;

/// Dispatch and the tick loop (`muster-engine`).
///
/// [`engine::TickEngine`] is the per-session context object;
/// [`engine::DispatchConfig`] configures it.
pub use muster_engine as engine;

/// Common imports for typical Muster usage.
///
/// ```rust
/// use muster::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use muster_core::{
        Category, Condition, DistrictId, Host, ObjectId, ObjectSnapshot, Population, Position,
        ProviderSnapshot, TickId, UnitId, UnitSnapshot,
    };

    // Errors
    pub use muster_core::{DispatchError, EngineError, HostError, ScanError, SnapshotError};

    // Engine
    pub use muster_engine::{
        Assignment, CategoryConfig, CheckStage, CheckStagePreset, ConfigError, DispatchConfig,
        SpareUnitPolicy, TargetFilter, TickEngine, TickError, TickMetrics, TickOutcome,
        TickReport,
    };
}
