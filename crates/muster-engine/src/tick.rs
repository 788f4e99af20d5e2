//! Tick engine: the per-tick scan and dispatch loop.
//!
//! [`TickEngine`] owns the configuration snapshot, the bucket scanner,
//! every category index and one [`DispatchEngine`] per category. The host
//! calls [`TickEngine::execute_tick`] once per simulation tick; all work
//! for the tick completes before it returns.
//!
//! # Circuit breaker
//!
//! A tick that fails fatally (scan error, regressed tick counter, or any
//! category's dispatch pass) counts toward a consecutive-failure budget.
//! Exhausting it disables dispatch until [`TickEngine::reset_breaker`];
//! scanning keeps the indices fresh in the meantime.

use std::fmt;
use std::time::Instant;

use log::{error, info};

use muster_core::{Category, EngineError, Host, ObjectId, Population, ScanError, TickId};
use muster_index::{
    capability_for, BucketCursor, BucketScanner, CategoryIndex, Keepers, RefreshStats,
};

use crate::config::{ConfigError, DispatchConfig};
use crate::dispatch::{Assignment, DispatchEngine};
use crate::metrics::TickMetrics;

// ── TickReport ───────────────────────────────────────────────────

/// Whether a tick call did any work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick was scanned and dispatched.
    Processed,
    /// The host reported a tick that was already processed; nothing ran.
    AlreadyProcessed,
}

/// Result of a successful tick execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Tick the host reported.
    pub tick: TickId,
    /// Whether anything ran.
    pub outcome: TickOutcome,
    /// Assignments written this tick, in dispatch order.
    pub assignments: Vec<Assignment>,
    /// Performance metrics for this tick.
    pub metrics: TickMetrics,
}

// ── TickError ────────────────────────────────────────────────────

/// Error returned from [`TickEngine::execute_tick()`].
///
/// Wraps the underlying [`EngineError`] and any assignments that healthy
/// categories wrote before the tick was declared failed. Those
/// assignments are in effect on the host; callers must not discard them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickError {
    /// The underlying error.
    pub kind: EngineError,
    /// Assignments written by categories that did not fail.
    pub assignments: Vec<Assignment>,
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for TickError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

// ── Construction helpers ─────────────────────────────────────────

/// Empty indices for every configured category.
pub(crate) fn build_keepers(config: &DispatchConfig) -> Keepers {
    Keepers::new(
        config.keeper_rules(),
        config
            .categories
            .iter()
            .map(|c| CategoryIndex::new(capability_for(c.category), c.target_rules()))
            .collect(),
    )
}

fn build_dispatchers(config: &DispatchConfig) -> Vec<DispatchEngine> {
    config
        .categories
        .iter()
        .map(|c| DispatchEngine::new(config, c))
        .collect()
}

// ── TickEngine ───────────────────────────────────────────────────

/// Single-threaded dispatch context.
///
/// Owns all dispatcher state between ticks. Constructed once per
/// session; [`reset`](Self::reset) drops the indices without discarding
/// the configuration.
pub struct TickEngine {
    config: DispatchConfig,
    scanner: BucketScanner,
    keepers: Keepers,
    dispatchers: Vec<DispatchEngine>,
    last_tick: Option<TickId>,
    consecutive_failures: u32,
    dispatch_disabled: bool,
    last_metrics: TickMetrics,
}

impl TickEngine {
    /// Construct an engine from a validated [`DispatchConfig`].
    pub fn new(config: DispatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            scanner: BucketScanner::new(config.bucket_mask),
            keepers: build_keepers(&config),
            dispatchers: build_dispatchers(&config),
            config,
            last_tick: None,
            consecutive_failures: 0,
            dispatch_disabled: false,
            last_metrics: TickMetrics::default(),
        })
    }

    /// Execute one tick against `host`.
    ///
    /// Scans the due buckets, then runs one dispatch pass per enabled
    /// category unless the breaker is open. Calling again for a tick that
    /// was already processed does nothing.
    pub fn execute_tick(&mut self, host: &mut dyn Host) -> Result<TickReport, TickError> {
        let tick_start = Instant::now();
        let now = host.current_tick();

        // 0. Guard against double processing and a regressed counter.
        if let Some(previous) = self.last_tick {
            if now == previous {
                return Ok(TickReport {
                    tick: now,
                    outcome: TickOutcome::AlreadyProcessed,
                    assignments: Vec::new(),
                    metrics: TickMetrics::default(),
                });
            }
            if now < previous {
                let e = ScanError::TickRegressed {
                    previous,
                    current: now,
                };
                error!("{e}");
                return Err(self.fail(EngineError::Scan(e), Vec::new()));
            }
        }
        self.last_tick = Some(now);
        let mut metrics = TickMetrics::default();

        // 1. Scan due buckets.
        let scan_start = Instant::now();
        let scanned = self.scan(&*host, now, &mut metrics);
        metrics.scan_us = scan_start.elapsed().as_micros() as u64;
        if let Err(e) = scanned {
            error!("tick {now}: {e}");
            if matches!(e, ScanError::Desynchronized { .. }) {
                self.scanner.invalidate();
            }
            metrics.total_us = tick_start.elapsed().as_micros() as u64;
            self.last_metrics = metrics;
            return Err(self.fail(EngineError::Scan(e), Vec::new()));
        }

        // 2. Dispatch, one isolated pass per category.
        let mut assignments = Vec::new();
        let mut failures = Vec::new();
        if !self.dispatch_disabled {
            let cap = self
                .scanner
                .cursor()
                .stride()
                .max(self.config.min_candidates_per_pass);
            for engine in self.dispatchers.iter().filter(|d| d.is_enabled()) {
                let category = engine.category();
                let Some((index, timing)) = self.keepers.index_and_timing_mut(category) else {
                    continue;
                };
                let pass_start = Instant::now();
                let result = engine.run_pass(index, timing, host, now, cap);
                metrics
                    .dispatch_us
                    .push((category, pass_start.elapsed().as_micros() as u64));
                match result {
                    Ok(pass) => {
                        metrics.record_pass(&pass);
                        assignments.extend(pass.assignments);
                    }
                    Err(e) => {
                        error!("tick {now}: {category} dispatch failed: {e}");
                        failures.push((category, e));
                    }
                }
            }
        }

        metrics.total_us = tick_start.elapsed().as_micros() as u64;
        self.last_metrics = metrics.clone();

        if !failures.is_empty() {
            return Err(self.fail(EngineError::Dispatch { failures }, assignments));
        }

        // 3. A clean tick closes the failure streak.
        self.consecutive_failures = 0;
        Ok(TickReport {
            tick: now,
            outcome: TickOutcome::Processed,
            assignments,
            metrics,
        })
    }

    fn scan(
        &mut self,
        host: &dyn Host,
        now: TickId,
        metrics: &mut TickMetrics,
    ) -> Result<(), ScanError> {
        let population = host.population_size(Population::Objects);
        let shrunk = population < self.scanner.cursor().population();
        self.scanner.set_population(population);
        let keepers = &mut self.keepers;
        let mut stats = RefreshStats::default();
        if shrunk {
            // IDs past the new end are never scanned again.
            keepers.evict_from(ObjectId(population), &mut stats);
        }
        let progress = self
            .scanner
            .scan(now, |ids| keepers.refresh(host, ids, now, &mut stats));
        metrics.record_refresh(&stats);
        let progress = progress?;
        metrics.buckets_scanned = progress.buckets;
        metrics.full_scan = progress.full_scan;
        Ok(())
    }

    /// Count a failed tick and open the breaker once the budget is spent.
    fn fail(&mut self, kind: EngineError, assignments: Vec<Assignment>) -> TickError {
        self.consecutive_failures += 1;
        if !self.dispatch_disabled
            && self.consecutive_failures >= self.config.max_consecutive_failures
        {
            self.dispatch_disabled = true;
            error!(
                "{} consecutive failed ticks, dispatch disabled until reset",
                self.consecutive_failures
            );
        }
        TickError { kind, assignments }
    }

    /// Swap in a new configuration between ticks.
    ///
    /// Changing the bucket mask or the category list drops every index
    /// and forces a full rescan. Other changes keep the indices; records
    /// pick up new thresholds on their next refresh.
    pub fn apply_config(&mut self, config: DispatchConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if config.requires_rebuild(&self.config) {
            self.keepers = build_keepers(&config);
            self.scanner = BucketScanner::new(config.bucket_mask);
            info!(
                "configuration applied; indices rebuilt for {} categories, bucket mask {}",
                config.categories.len(),
                config.bucket_mask
            );
        } else {
            self.keepers.set_timing(config.keeper_rules());
            for category in &config.categories {
                if let Some(index) = self.keepers.index_mut(category.category) {
                    index.set_rules(category.target_rules());
                }
            }
            info!("configuration applied; indices kept");
        }
        self.dispatchers = build_dispatchers(&config);
        self.config = config;
        Ok(())
    }

    /// Close the breaker and clear the failure streak.
    pub fn reset_breaker(&mut self) {
        if self.dispatch_disabled {
            info!("dispatch breaker reset");
        }
        self.dispatch_disabled = false;
        self.consecutive_failures = 0;
    }

    /// Drop all indices and breaker state. The next tick rescans the
    /// whole population.
    pub fn reset(&mut self) {
        self.keepers.clear();
        self.scanner.invalidate();
        self.last_tick = None;
        self.dispatch_disabled = false;
        self.consecutive_failures = 0;
        self.last_metrics = TickMetrics::default();
    }

    /// The index for `category`, if it is configured.
    pub fn index(&self, category: Category) -> Option<&CategoryIndex> {
        self.keepers.index(category)
    }

    /// Bucket cursor state.
    pub fn cursor(&self) -> &BucketCursor {
        self.scanner.cursor()
    }

    /// Last tick processed, if any.
    pub fn current_tick(&self) -> Option<TickId> {
        self.last_tick
    }

    /// Number of consecutive failed ticks.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether the breaker is open.
    pub fn is_dispatch_disabled(&self) -> bool {
        self.dispatch_disabled
    }

    /// Metrics from the most recent processed tick.
    pub fn last_metrics(&self) -> &TickMetrics {
        &self.last_metrics
    }

    /// Configuration in force.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}
