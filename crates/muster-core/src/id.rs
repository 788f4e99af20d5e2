//! Strongly-typed identifiers for host objects, units, districts and ticks.

use std::fmt;

/// Identifies a facility object in the host's object address space.
///
/// IDs are dense indices in `[0, population_size)`. The same ID may be
/// reused by the host after the original object is deleted, so records
/// keyed by `ObjectId` are re-validated on every refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ObjectId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a mobile unit (vehicle) in the host's unit address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for UnitId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies an administrative district.
///
/// `DistrictId(0)` is the host's "no district" area; it still compares
/// equal to itself, so two facilities outside any district share it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DistrictId(pub u8);

impl fmt::Display for DistrictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for DistrictId {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

/// Host simulation tick counter.
///
/// Supplied by the host and expected to be monotonically non-decreasing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickId(pub u64);

impl TickId {
    /// Ticks elapsed since `earlier`, saturating at zero.
    pub fn since(self, earlier: TickId) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TickId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_since_saturates() {
        assert_eq!(TickId(10).since(TickId(4)), 6);
        assert_eq!(TickId(4).since(TickId(10)), 0);
    }

    #[test]
    fn ids_display_as_raw_value() {
        assert_eq!(ObjectId(17).to_string(), "17");
        assert_eq!(UnitId(3).to_string(), "3");
        assert_eq!(DistrictId(2).to_string(), "2");
        assert_eq!(TickId(99).to_string(), "99");
    }
}
