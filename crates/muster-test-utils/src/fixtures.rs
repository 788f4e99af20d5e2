//! Snapshot builders for common test objects.
//!
//! - [`target`]: an active object with one pending condition.
//! - [`provider`]: an active, road-connected facility with no units yet.
//! - [`idle_unit`]: a unit parked at its owner with free capacity.

use smallvec::{smallvec, SmallVec};

use muster_core::{
    Category, Condition, ObjectFlags, ObjectId, ObjectSnapshot, Position, ProviderSnapshot,
    UnitSnapshot,
};

/// Free capacity given to every fixture unit.
pub const UNIT_CAPACITY: u32 = 20;

/// An active object with one `category` condition.
pub fn target(category: Category, position: Position, severity: u32, amount: u32) -> ObjectSnapshot {
    ObjectSnapshot {
        flags: ObjectFlags::ACTIVE,
        position,
        conditions: smallvec![Condition {
            category,
            severity,
            amount,
            reported_problem: false,
        }],
        provider: None,
    }
}

/// An active provider facility of `category` owning no units.
pub fn provider(
    category: Category,
    position: Position,
    raw_range: f32,
    unit_capacity: u16,
) -> ObjectSnapshot {
    ObjectSnapshot {
        flags: ObjectFlags::ACTIVE,
        position,
        conditions: SmallVec::new(),
        provider: Some(ProviderSnapshot {
            category,
            raw_range,
            unit_capacity,
            units: SmallVec::new(),
            active: true,
            road_connected: true,
            demolishing: false,
            at_capacity: false,
            emptying: false,
        }),
    }
}

/// An idle unit owned by `owner`.
pub fn idle_unit(owner: ObjectId, position: Position) -> UnitSnapshot {
    UnitSnapshot {
        owner,
        position,
        on_task: false,
        free_capacity: UNIT_CAPACITY,
        used_capacity_fraction: 0.0,
    }
}
