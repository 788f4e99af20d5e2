//! Per-tick metrics for the dispatch engine.
//!
//! [`TickMetrics`] captures timings and counters for a single tick so a
//! host can graph dispatcher load and spot starving categories.

use muster_core::Category;
use muster_index::RefreshStats;

use crate::dispatch::PassReport;

/// Timing and counters collected during a single tick.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickMetrics {
    /// Wall-clock time for the entire tick.
    pub total_us: u64,
    /// Time spent scanning buckets and refreshing the indices.
    pub scan_us: u64,
    /// Per-category dispatch pass times: `(category, microseconds)`.
    pub dispatch_us: Vec<(Category, u64)>,
    /// Buckets scanned this tick.
    pub buckets_scanned: u32,
    /// This tick performed the initial full scan.
    pub full_scan: bool,
    /// Objects read from the host.
    pub objects_scanned: u32,
    /// Target records created.
    pub targets_inserted: u32,
    /// Target records dropped.
    pub targets_removed: u32,
    /// Provider records created.
    pub providers_inserted: u32,
    /// Provider records dropped.
    pub providers_removed: u32,
    /// Objects and units excluded for malformed host data.
    pub refresh_failures: u32,
    /// Dispatch passes that ran.
    pub passes_run: u32,
    /// Dispatch passes skipped because nothing needed checking.
    pub passes_skipped: u32,
    /// Distinct targets attempted across all passes.
    pub candidates_evaluated: u32,
    /// Successful assignments.
    pub assignments: u32,
    /// Spare units the host manufactured.
    pub spare_units_created: u32,
    /// Spare units the host refused to manufacture.
    pub spare_units_denied: u32,
    /// Write-backs the host rejected.
    pub rejected_writes: u32,
}

impl TickMetrics {
    /// Fold the keepers' refresh counters into these metrics.
    pub fn record_refresh(&mut self, stats: &RefreshStats) {
        self.objects_scanned += stats.objects_scanned;
        self.targets_inserted += stats.targets_inserted;
        self.targets_removed += stats.targets_removed;
        self.providers_inserted += stats.providers_inserted;
        self.providers_removed += stats.providers_removed;
        self.refresh_failures += stats.refresh_failures;
    }

    /// Fold one dispatch pass into these metrics.
    pub fn record_pass(&mut self, pass: &PassReport) {
        if pass.skipped {
            self.passes_skipped += 1;
            return;
        }
        self.passes_run += 1;
        self.candidates_evaluated += pass.candidates;
        self.assignments += pass.assignments.len() as u32;
        self.spare_units_created += pass.spare_units_created;
        self.spare_units_denied += pass.spare_units_denied;
        self.rejected_writes += pass.rejected_writes;
    }
}
