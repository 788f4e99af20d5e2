//! Service categories.

use std::fmt;

/// A service category pairs one kind of target condition with the
/// provider facilities (and their unit type) able to resolve it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Deceased occupants collected by hearses from cemeteries and crematoria.
    DeathCare,
    /// Accumulated garbage collected by trucks from landfills and incinerators.
    Garbage,
    /// Sick occupants collected by ambulances from clinics and hospitals.
    HealthCare,
}

impl Category {
    /// All categories, in dispatch order.
    pub const ALL: [Category; 3] = [Category::DeathCare, Category::Garbage, Category::HealthCare];

    /// Short lowercase name used in log lines and metrics.
    pub fn name(self) -> &'static str {
        match self {
            Self::DeathCare => "deathcare",
            Self::Garbage => "garbage",
            Self::HealthCare => "healthcare",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
