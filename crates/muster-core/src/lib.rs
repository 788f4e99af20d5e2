//! Core types and traits for the Muster service dispatcher.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the rest of the workspace: strongly typed
//! object and unit IDs, positions, service categories, the snapshots a
//! host simulation hands out, the [`Host`] trait itself, and the error
//! enums for every subsystem.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod category;
pub mod error;
pub mod geometry;
pub mod id;
pub mod snapshot;
pub mod traits;

pub use category::Category;
pub use error::{DispatchError, EngineError, HostError, ScanError, SnapshotError};
pub use geometry::Position;
pub use id::{DistrictId, ObjectId, TickId, UnitId};
pub use snapshot::{Condition, ObjectFlags, ObjectSnapshot, ProviderSnapshot, UnitSnapshot};
pub use traits::{Host, Population};
