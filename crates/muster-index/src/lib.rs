//! Incremental population scanning and categorized object indices.
//!
//! The [`BucketScanner`] walks the host's object address space a slice at
//! a time; each slice is fed to [`Keepers`], which re-read those objects
//! and keep one [`CategoryIndex`] per service category up to date. The
//! dispatch engine reads the indices; only the keepers mutate membership.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod capability;
pub mod cursor;
pub mod keeper;
pub mod record;
pub mod rules;
pub mod timer;

pub use capability::{
    capability_for, DeathCareService, GarbageService, HealthCareService, ServiceCapability,
};
pub use cursor::{BucketCursor, BucketScanner, ScanProgress};
pub use keeper::{CategoryIndex, Change, Keepers, ProviderKeeper, RefreshStats, TargetKeeper};
pub use record::{MobileUnit, ProviderFacility, TargetFacility};
pub use rules::{KeeperRules, TargetRules};
pub use timer::TimedFlag;
