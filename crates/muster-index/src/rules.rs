//! Thresholds and timers the keepers apply while refreshing records.
//!
//! These are the index-side slice of the engine configuration. The engine
//! derives them from its validated config and pushes them down whenever
//! the config changes; the index never validates them itself.

/// Timers and range scaling shared by every category.
#[derive(Clone, Debug, PartialEq)]
pub struct KeeperRules {
    /// Multiplier applied to each provider's raw range.
    pub range_modifier: f32,
    /// Lower clamp for the scaled range, in world units.
    pub range_min: f32,
    /// Upper clamp for the scaled range, in world units.
    pub range_max: f32,
    /// Ticks between provider range recomputations.
    pub object_update_interval: u64,
    /// Ticks a target stays Checked after a dispatch attempt.
    pub recheck_interval: u64,
    /// Ticks a target stays Handled after a successful assignment.
    pub recheck_handled_interval: u64,
    /// Ticks an assigned unit stays busy regardless of its host state.
    pub target_linger_delay: u64,
}

impl Default for KeeperRules {
    fn default() -> Self {
        Self {
            range_modifier: 1.0,
            range_min: 64.0,
            range_max: 4000.0,
            object_update_interval: 120,
            recheck_interval: 60,
            recheck_handled_interval: 240,
            target_linger_delay: 30,
        }
    }
}

impl KeeperRules {
    /// Effective squared service range for a raw host range.
    pub fn effective_range_sq(&self, raw_range: f32) -> f32 {
        let r = (raw_range * self.range_modifier)
            .max(self.range_min)
            .min(self.range_max);
        r * r
    }
}

/// Per-category thresholds for target membership and priority.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetRules {
    /// Minimum condition amount for category membership.
    pub min_amount: u32,
    /// Severity at or above which a target has a problem.
    pub problem_threshold: u32,
    /// Scaled severity at or above which a target is forgotten.
    pub forgotten_severity_threshold: f32,
    /// Scaled amount at or above which a target is forgotten.
    pub forgotten_amount_threshold: f32,
    /// Scale applied to severity before the forgotten comparison.
    pub severity_modifier: f32,
    /// Scale applied to amount before the forgotten comparison.
    pub amount_modifier: f32,
}

impl Default for TargetRules {
    fn default() -> Self {
        Self {
            min_amount: 1,
            problem_threshold: 30,
            forgotten_severity_threshold: 90.0,
            forgotten_amount_threshold: f32::INFINITY,
            severity_modifier: 1.0,
            amount_modifier: 1.0,
        }
    }
}

impl TargetRules {
    /// `severity >= problem_threshold` or the host flags a problem.
    pub fn has_problem(&self, severity: u32, reported: bool) -> bool {
        reported || severity >= self.problem_threshold
    }

    /// Either scaled measure reaches its forgotten threshold.
    pub fn is_forgotten(&self, severity: u32, amount: u32) -> bool {
        severity as f32 * self.severity_modifier >= self.forgotten_severity_threshold
            || amount as f32 * self.amount_modifier >= self.forgotten_amount_threshold
    }
}
