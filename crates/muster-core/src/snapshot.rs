//! Host object snapshots.
//!
//! A snapshot is a by-value copy of the handful of host fields the
//! dispatcher reads for one object or unit. The core never holds a
//! reference into host storage; everything it knows about the world
//! arrives through these types.

use smallvec::SmallVec;

use crate::category::Category;
use crate::error::SnapshotError;
use crate::geometry::Position;
use crate::id::{ObjectId, UnitId};

/// Structural lifecycle flags of a host object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectFlags {
    /// The object slot holds a constructed object.
    pub created: bool,
    /// The object is being or has been deleted.
    pub deleted: bool,
    /// The object is hidden from the simulation (e.g. under a placement preview).
    pub hidden: bool,
    /// The object has been abandoned by its occupants.
    pub abandoned: bool,
}

impl ObjectFlags {
    /// Flags of a live, visible, occupied object.
    pub const ACTIVE: ObjectFlags = ObjectFlags {
        created: true,
        deleted: false,
        hidden: false,
        abandoned: false,
    };

    /// Flags of an empty object slot.
    pub const EMPTY: ObjectFlags = ObjectFlags {
        created: false,
        deleted: false,
        hidden: false,
        abandoned: false,
    };

    /// Whether the object may belong to any category at all.
    pub fn is_valid(&self) -> bool {
        self.created && !self.deleted && !self.hidden && !self.abandoned
    }
}

/// A pending condition on an object, for one category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Condition {
    /// Category that can resolve this condition.
    pub category: Category,
    /// Ordinal problem timer: grows while the condition stays unresolved.
    pub severity: u32,
    /// Magnitude of the condition (bodies, garbage units, patients).
    pub amount: u32,
    /// The host itself flags this object as problematic.
    pub reported_problem: bool,
}

/// Provider-side fields of a service facility.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSnapshot {
    /// Category this facility serves.
    pub category: Category,
    /// Unscaled service radius, in world units.
    pub raw_range: f32,
    /// Number of units the facility may own at once.
    pub unit_capacity: u16,
    /// Units currently owned by the facility.
    pub units: SmallVec<[UnitId; 8]>,
    /// The facility is switched on and staffed.
    pub active: bool,
    /// The facility has a road connection its units can leave by.
    pub road_connected: bool,
    /// The facility is scheduled for demolition.
    pub demolishing: bool,
    /// The facility's storage is full.
    pub at_capacity: bool,
    /// The facility is emptying its storage into another facility.
    pub emptying: bool,
}

/// Everything the dispatcher reads for one host object.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSnapshot {
    /// Structural lifecycle flags.
    pub flags: ObjectFlags,
    /// World position of the object.
    pub position: Position,
    /// Pending conditions, at most one per category.
    pub conditions: SmallVec<[Condition; 2]>,
    /// Provider fields, if the object is a service facility.
    pub provider: Option<ProviderSnapshot>,
}

impl ObjectSnapshot {
    /// Snapshot of an unused object slot.
    pub fn empty() -> Self {
        Self {
            flags: ObjectFlags::EMPTY,
            position: Position::default(),
            conditions: SmallVec::new(),
            provider: None,
        }
    }

    /// Whether the object is structurally eligible for any category.
    pub fn is_structurally_valid(&self) -> bool {
        self.flags.is_valid()
    }

    /// The pending condition for `category`, if any.
    pub fn condition(&self, category: Category) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.category == category)
    }

    /// Check the snapshot for shapes the dispatcher cannot interpret.
    ///
    /// Only called on structurally valid snapshots; an empty slot may
    /// carry garbage in its numeric fields.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if !self.position.is_finite() {
            return Err(SnapshotError::NonFinitePosition);
        }
        for (i, condition) in self.conditions.iter().enumerate() {
            if self.conditions[..i]
                .iter()
                .any(|c| c.category == condition.category)
            {
                return Err(SnapshotError::DuplicateCondition {
                    category: condition.category,
                });
            }
        }
        if let Some(provider) = &self.provider {
            if !provider.raw_range.is_finite() || provider.raw_range < 0.0 {
                return Err(SnapshotError::NonFiniteRange {
                    value: provider.raw_range,
                });
            }
        }
        Ok(())
    }
}

/// Everything the dispatcher reads for one mobile unit.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitSnapshot {
    /// Facility that owns the unit.
    pub owner: ObjectId,
    /// Current world position.
    pub position: Position,
    /// The host reports an unfinished task (heading to a target, not returning).
    pub on_task: bool,
    /// Remaining load the unit can take on.
    pub free_capacity: u32,
    /// Fraction of total capacity in use, in `[0, 1]`.
    pub used_capacity_fraction: f32,
}

impl UnitSnapshot {
    /// Check the snapshot for shapes the dispatcher cannot interpret.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if !self.position.is_finite() {
            return Err(SnapshotError::NonFinitePosition);
        }
        if !self.used_capacity_fraction.is_finite() {
            return Err(SnapshotError::NonFiniteLoad {
                value: self.used_capacity_fraction,
            });
        }
        Ok(())
    }
}
