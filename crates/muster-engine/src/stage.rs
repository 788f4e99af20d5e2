//! Check stages, stage presets and the spare-unit policy.
//!
//! A dispatch pass walks its category's targets once per check stage.
//! Each stage narrows the candidates with a [`TargetFilter`] and decides
//! whether provider range applies. Presets are fixed stage orderings
//! from least to most aggressive prioritization.

use smallvec::{smallvec, SmallVec};

use muster_index::TargetFacility;

/// Which targets a stage considers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetFilter {
    /// Every target with a pending condition.
    Any,
    /// Targets with a problem.
    Problematic,
    /// Targets past the forgotten threshold.
    Forgotten,
}

impl TargetFilter {
    /// Whether `target` passes this filter.
    pub fn accepts(self, target: &TargetFacility) -> bool {
        match self {
            Self::Any => true,
            Self::Problematic => target.has_problem,
            Self::Forgotten => target.forgotten,
        }
    }
}

/// One step of a dispatch pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CheckStage {
    /// Candidate filter.
    pub filter: TargetFilter,
    /// Every provider counts as in range.
    pub ignore_distance: bool,
}

impl CheckStage {
    /// Stage over `filter`, honouring provider range.
    pub const fn in_range(filter: TargetFilter) -> Self {
        Self {
            filter,
            ignore_distance: false,
        }
    }

    /// Stage over `filter`, ignoring provider range.
    pub const fn ignoring_range(filter: TargetFilter) -> Self {
        Self {
            filter,
            ignore_distance: true,
        }
    }
}

/// Inline storage for a stage list; no preset has more than five.
pub type Stages = SmallVec<[CheckStage; 5]>;

/// Selectable stage orderings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CheckStagePreset {
    /// Any target ignoring range. No prioritization at all.
    FirstFirst,
    /// Any in range, then problems anywhere.
    InRange,
    /// Any in range, then any anywhere.
    InRangeFirst,
    /// Problems in range, problems anywhere, then any in range.
    #[default]
    ProblematicFirst,
    /// Forgotten in range, forgotten anywhere, any in range, problems anywhere.
    ForgottenFirst,
    /// Forgotten, then problems (each in range before anywhere), then any in range.
    VeryProblematicFirst,
    /// An explicit ordering.
    Custom(Vec<CheckStage>),
}

impl CheckStagePreset {
    /// The stages this preset runs, in order.
    pub fn stages(&self) -> Stages {
        use CheckStage as S;
        use TargetFilter::{Any, Forgotten, Problematic};
        match self {
            Self::FirstFirst => smallvec![S::ignoring_range(Any)],
            Self::InRange => smallvec![S::in_range(Any), S::ignoring_range(Problematic)],
            Self::InRangeFirst => smallvec![S::in_range(Any), S::ignoring_range(Any)],
            Self::ProblematicFirst => smallvec![
                S::in_range(Problematic),
                S::ignoring_range(Problematic),
                S::in_range(Any),
            ],
            Self::ForgottenFirst => smallvec![
                S::in_range(Forgotten),
                S::ignoring_range(Forgotten),
                S::in_range(Any),
                S::ignoring_range(Problematic),
            ],
            Self::VeryProblematicFirst => smallvec![
                S::in_range(Forgotten),
                S::ignoring_range(Forgotten),
                S::in_range(Problematic),
                S::ignoring_range(Problematic),
                S::in_range(Any),
            ],
            Self::Custom(stages) => stages.iter().copied().collect(),
        }
    }
}

/// Whether a provider with no free unit may manufacture one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpareUnitPolicy {
    /// Never create units; move on to the next provider.
    #[default]
    Never,
    /// Create a unit whenever the provider has none free.
    WhenNoFree,
    /// Create a unit when the provider is closer to the target than the
    /// nearest free unit anywhere in the category.
    WhenBuildingIsCloser,
}
