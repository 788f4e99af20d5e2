//! Dispatcher configuration, validation, and error types.
//!
//! [`DispatchConfig`] is the immutable configuration snapshot the tick
//! engine runs under. [`validate()`](DispatchConfig::validate) checks
//! every structural invariant before the engine accepts it, both at
//! construction and at every [`apply_config`](crate::TickEngine::apply_config).

use std::error::Error;
use std::fmt;

use muster_core::Category;
use muster_index::{KeeperRules, TargetRules};

use crate::stage::{CheckStagePreset, SpareUnitPolicy};

/// Largest supported bucket mask (256 buckets).
pub const MAX_BUCKET_MASK: u32 = 255;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`DispatchConfig::validate()`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// The bucket mask is not `2^k - 1` or exceeds [`MAX_BUCKET_MASK`].
    InvalidBucketMask {
        /// The rejected mask.
        mask: u32,
    },
    /// Range scaling is non-finite, negative, or inverted.
    InvalidRange {
        /// Which constraint was violated.
        reason: String,
    },
    /// A timer that must run for at least one tick is zero.
    ZeroInterval {
        /// Name of the offending option.
        name: &'static str,
    },
    /// `recheck_handled_interval` is shorter than `recheck_interval`.
    HandledShorterThanChecked,
    /// `max_consecutive_failures` is zero.
    ZeroFailureBudget,
    /// `min_candidates_per_pass` is zero.
    ZeroCandidateCap,
    /// No categories are configured.
    NoCategories,
    /// A category is configured twice.
    DuplicateCategory {
        /// The repeated category.
        category: Category,
    },
    /// A custom stage list is empty.
    EmptyCustomStages {
        /// The category with no stages.
        category: Category,
    },
    /// A modifier or threshold is NaN, infinite where not allowed, or negative.
    InvalidModifier {
        /// The offending category.
        category: Category,
        /// Which constraint was violated.
        reason: String,
    },
    /// The forgotten severity threshold is below the problem threshold.
    ThresholdOrder {
        /// The offending category.
        category: Category,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBucketMask { mask } => write!(
                f,
                "bucket_mask {mask} must be 2^k - 1 and at most {MAX_BUCKET_MASK}"
            ),
            Self::InvalidRange { reason } => write!(f, "invalid range config: {reason}"),
            Self::ZeroInterval { name } => write!(f, "{name} must be at least 1 tick"),
            Self::HandledShorterThanChecked => {
                write!(f, "recheck_handled_interval must be >= recheck_interval")
            }
            Self::ZeroFailureBudget => write!(f, "max_consecutive_failures must be at least 1"),
            Self::ZeroCandidateCap => write!(f, "min_candidates_per_pass must be at least 1"),
            Self::NoCategories => write!(f, "no categories configured"),
            Self::DuplicateCategory { category } => {
                write!(f, "category {category} configured more than once")
            }
            Self::EmptyCustomStages { category } => {
                write!(f, "category {category} has an empty custom stage list")
            }
            Self::InvalidModifier { category, reason } => {
                write!(f, "category {category}: {reason}")
            }
            Self::ThresholdOrder { category } => write!(
                f,
                "category {category}: forgotten_severity_threshold is below problem_threshold"
            ),
        }
    }
}

impl Error for ConfigError {}

// ── CategoryConfig ─────────────────────────────────────────────────

/// Options for one service category.
#[derive(Clone, Debug, PartialEq)]
pub struct CategoryConfig {
    /// The category configured.
    pub category: Category,
    /// Run dispatch passes for this category. Scanning continues either way.
    pub dispatch_enabled: bool,
    /// Stage ordering for dispatch passes.
    pub check_stages: CheckStagePreset,
    /// When providers may manufacture units on demand.
    pub spare_units: SpareUnitPolicy,
    /// Minimum condition amount for a target to join the index.
    pub min_amount: u32,
    /// Severity at or above which a target has a problem. Default: 30.
    pub problem_threshold: u32,
    /// Scaled severity at which a target is forgotten. Default: 90.
    pub forgotten_severity_threshold: f32,
    /// Scaled amount at which a target is forgotten. Default: infinite (off).
    pub forgotten_amount_threshold: f32,
    /// Severity scale for the forgotten comparison. Default: 1.0.
    pub severity_modifier: f32,
    /// Amount scale for the forgotten comparison. Default: 1.0.
    pub amount_modifier: f32,
}

impl CategoryConfig {
    /// Defaults for `category`.
    pub fn new(category: Category) -> Self {
        let (min_amount, forgotten_amount_threshold) = match category {
            // Garbage accumulates continuously; a near-empty bin is not a target.
            Category::Garbage => (100, 2500.0),
            Category::DeathCare | Category::HealthCare => (1, f32::INFINITY),
        };
        Self {
            category,
            dispatch_enabled: true,
            check_stages: CheckStagePreset::default(),
            spare_units: SpareUnitPolicy::default(),
            min_amount,
            problem_threshold: 30,
            forgotten_severity_threshold: 90.0,
            forgotten_amount_threshold,
            severity_modifier: 1.0,
            amount_modifier: 1.0,
        }
    }

    /// The index-side thresholds for this category.
    pub fn target_rules(&self) -> TargetRules {
        TargetRules {
            min_amount: self.min_amount,
            problem_threshold: self.problem_threshold,
            forgotten_severity_threshold: self.forgotten_severity_threshold,
            forgotten_amount_threshold: self.forgotten_amount_threshold,
            severity_modifier: self.severity_modifier,
            amount_modifier: self.amount_modifier,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let category = self.category;
        if let CheckStagePreset::Custom(stages) = &self.check_stages {
            if stages.is_empty() {
                return Err(ConfigError::EmptyCustomStages { category });
            }
        }
        for (name, value) in [
            ("severity_modifier", self.severity_modifier),
            ("amount_modifier", self.amount_modifier),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidModifier {
                    category,
                    reason: format!("{name} must be finite and >= 0, got {value}"),
                });
            }
        }
        for (name, value) in [
            ("forgotten_severity_threshold", self.forgotten_severity_threshold),
            ("forgotten_amount_threshold", self.forgotten_amount_threshold),
        ] {
            // Infinity disables the comparison; NaN would disable it silently.
            if value.is_nan() || value < 0.0 {
                return Err(ConfigError::InvalidModifier {
                    category,
                    reason: format!("{name} must be >= 0, got {value}"),
                });
            }
        }
        if self.forgotten_severity_threshold < self.problem_threshold as f32 {
            return Err(ConfigError::ThresholdOrder { category });
        }
        Ok(())
    }
}

// ── DispatchConfig ─────────────────────────────────────────────────

/// Complete dispatcher configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchConfig {
    /// Bucket count minus one. Default: 15.
    pub bucket_mask: u32,
    /// Providers in the target's district are always in range. Default: true.
    pub district_dispatch: bool,
    /// Providers within their service range are in range. Default: true.
    pub range_dispatch: bool,
    /// Scale applied to every provider's raw range. Default: 1.0.
    pub range_modifier: f32,
    /// Lower clamp for scaled ranges. Default: 64.
    pub range_min: f32,
    /// Upper clamp for scaled ranges. Default: 4000.
    pub range_max: f32,
    /// Ticks a target stays Checked. Default: 60.
    pub recheck_interval: u64,
    /// Ticks a target stays Handled. Default: 240.
    pub recheck_handled_interval: u64,
    /// Ticks an assigned unit stays busy. Default: 30. Zero is allowed.
    pub target_linger_delay: u64,
    /// Ticks between provider range recomputations. Default: 120.
    pub object_update_interval: u64,
    /// Consecutive failed ticks before dispatch is disabled. Default: 3.
    pub max_consecutive_failures: u32,
    /// Floor for the per-pass candidate cap. Default: 32.
    pub min_candidates_per_pass: u32,
    /// Per-category options, in dispatch order.
    pub categories: Vec<CategoryConfig>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            bucket_mask: 15,
            district_dispatch: true,
            range_dispatch: true,
            range_modifier: 1.0,
            range_min: 64.0,
            range_max: 4000.0,
            recheck_interval: 60,
            recheck_handled_interval: 240,
            target_linger_delay: 30,
            object_update_interval: 120,
            max_consecutive_failures: 3,
            min_candidates_per_pass: 32,
            categories: Category::ALL.iter().map(|&c| CategoryConfig::new(c)).collect(),
        }
    }
}

impl DispatchConfig {
    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Bucket mask is 2^k - 1 within the supported range.
        if self.bucket_mask > MAX_BUCKET_MASK || !(self.bucket_mask + 1).is_power_of_two() {
            return Err(ConfigError::InvalidBucketMask {
                mask: self.bucket_mask,
            });
        }
        // 2. Range scaling.
        if !self.range_modifier.is_finite() || self.range_modifier <= 0.0 {
            return Err(ConfigError::InvalidRange {
                reason: format!(
                    "range_modifier must be finite and > 0, got {}",
                    self.range_modifier
                ),
            });
        }
        for (name, value) in [("range_min", self.range_min), ("range_max", self.range_max)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidRange {
                    reason: format!("{name} must be finite and >= 0, got {value}"),
                });
            }
        }
        if self.range_min > self.range_max {
            return Err(ConfigError::InvalidRange {
                reason: format!(
                    "range_min ({}) exceeds range_max ({})",
                    self.range_min, self.range_max
                ),
            });
        }
        // 3. Timers. A zero linger delay frees units on the next tick.
        for (name, value) in [
            ("recheck_interval", self.recheck_interval),
            ("recheck_handled_interval", self.recheck_handled_interval),
            ("object_update_interval", self.object_update_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { name });
            }
        }
        // 4. Handled outlasts Checked.
        if self.recheck_handled_interval < self.recheck_interval {
            return Err(ConfigError::HandledShorterThanChecked);
        }
        // 5. Budgets.
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::ZeroFailureBudget);
        }
        if self.min_candidates_per_pass == 0 {
            return Err(ConfigError::ZeroCandidateCap);
        }
        // 6. Categories.
        if self.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        for (i, cat) in self.categories.iter().enumerate() {
            if self.categories[..i].iter().any(|c| c.category == cat.category) {
                return Err(ConfigError::DuplicateCategory {
                    category: cat.category,
                });
            }
            cat.validate()?;
        }
        Ok(())
    }

    /// Options for `category`, if configured.
    pub fn category(&self, category: Category) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// The index-side timers and range scaling.
    pub fn keeper_rules(&self) -> KeeperRules {
        KeeperRules {
            range_modifier: self.range_modifier,
            range_min: self.range_min,
            range_max: self.range_max,
            object_update_interval: self.object_update_interval,
            recheck_interval: self.recheck_interval,
            recheck_handled_interval: self.recheck_handled_interval,
            target_linger_delay: self.target_linger_delay,
        }
    }

    /// Whether switching from `self` to `other` requires rebuilding the
    /// indices: the bucket layout or the category set changed.
    pub fn requires_rebuild(&self, other: &DispatchConfig) -> bool {
        self.bucket_mask != other.bucket_mask
            || self.categories.len() != other.categories.len()
            || self
                .categories
                .iter()
                .zip(&other.categories)
                .any(|(a, b)| a.category != b.category)
    }
}
