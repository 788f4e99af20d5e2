//! The narrow read/write contract between the dispatcher and its host.

use crate::category::Category;
use crate::error::HostError;
use crate::geometry::Position;
use crate::id::{DistrictId, ObjectId, TickId, UnitId};
use crate::snapshot::{ObjectSnapshot, UnitSnapshot};

/// Address spaces the host exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Population {
    /// Facilities: both targets and providers live here.
    Objects,
    /// Mobile units owned by providers.
    Units,
}

/// Host simulation access.
///
/// Implemented by the embedding simulation. The dispatcher calls into it
/// from a single thread, once per tick: all reads happen during the scan,
/// all writes during the dispatch pass. Implementations must not panic on
/// out-of-range IDs; return an empty snapshot or `Ok(None)` instead.
pub trait Host {
    /// Current simulation tick. Must be monotonically non-decreasing;
    /// the same value may be returned for several calls.
    fn current_tick(&self) -> TickId;

    /// Size of the addressable ID range for `population`.
    fn population_size(&self, population: Population) -> u32;

    /// Read one facility slot.
    ///
    /// Empty or deleted slots are reported through
    /// [`ObjectSnapshot::flags`], not as errors. `HostError::Malformed`
    /// excludes the object for this tick; `HostError::Unavailable`
    /// aborts the scan.
    fn read_object(&self, id: ObjectId) -> Result<ObjectSnapshot, HostError>;

    /// Read one unit. `Ok(None)` means the unit no longer exists.
    fn read_unit(&self, id: UnitId) -> Result<Option<UnitSnapshot>, HostError>;

    /// District containing `position`.
    fn district_at(&self, position: Position) -> DistrictId;

    /// Point `unit` at `target`.
    ///
    /// Must be idempotent: writing the same target twice is a no-op.
    fn write_assignment(&mut self, unit: UnitId, target: ObjectId) -> Result<(), HostError>;

    /// Manufacture a spare unit at `provider`.
    ///
    /// Returns `None` when the host has no budget or capacity for it.
    fn create_spare_unit(&mut self, provider: ObjectId, category: Category) -> Option<UnitId>;
}
