//! Bucketed incremental scanning of the object address space.
//!
//! The address space `[0, N)` is split into `mask + 1` contiguous buckets.
//! The bucket due at tick `t` is `t & mask`, so a host ticking once per
//! step touches every object exactly once per `mask + 1` ticks and never
//! more than one bucket's worth of objects per tick.
//!
//! ```text
//!   tick:    16   17   18  ...  31   32
//!   bucket:   0    1    2  ...  15    0
//!   ids:   [0,63) [63,126) ... [945,1000)
//! ```
//!
//! [`BucketScanner`] remembers the last bucket it scanned and catches up
//! to the due bucket one bucket at a time when the host skips ticks. A
//! gap of a whole cycle or more is covered by one full rescan instead.

use std::ops::Range;

use muster_core::{ObjectId, ScanError, TickId};

/// Hard cap on catch-up iterations, independent of the bucket count.
const MAX_CATCH_UP_ITERATIONS: u32 = 256;

// ── BucketCursor ─────────────────────────────────────────────────

/// Maps ticks to buckets and buckets to ID ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketCursor {
    mask: u32,
    population: u32,
    stride: u32,
}

impl BucketCursor {
    /// Create a cursor over `population` IDs with `mask + 1` buckets.
    ///
    /// `mask` must be a power of two minus one; configuration validation
    /// enforces this before a cursor is ever built.
    pub fn new(mask: u32, population: u32) -> Self {
        debug_assert!(
            mask.checked_add(1).is_some_and(u32::is_power_of_two),
            "bucket mask {mask} is not 2^k - 1"
        );
        Self {
            mask,
            population,
            stride: Self::stride_for(mask, population),
        }
    }

    fn stride_for(mask: u32, population: u32) -> u32 {
        let buckets = u64::from(mask) + 1;
        // Round up so the final bucket absorbs no remainder.
        (u64::from(population).div_ceil(buckets)) as u32
    }

    /// Bucket mask (`bucket_count - 1`).
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> u32 {
        self.mask + 1
    }

    /// Size of the addressed population.
    pub fn population(&self) -> u32 {
        self.population
    }

    /// IDs per bucket (the last non-empty bucket may be shorter).
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Update the population size, recomputing the stride.
    ///
    /// Returns `true` if the size changed.
    pub fn set_population(&mut self, population: u32) -> bool {
        if population == self.population {
            return false;
        }
        self.population = population;
        self.stride = Self::stride_for(self.mask, population);
        true
    }

    /// Bucket due at `tick`.
    pub fn current_due_bucket(&self, tick: TickId) -> u32 {
        (tick.0 & u64::from(self.mask)) as u32
    }

    /// Bucket following `previous`, wrapping at the bucket count.
    pub fn advance(&self, previous: u32) -> u32 {
        previous.wrapping_add(1) & self.mask
    }

    /// Half-open ID range covered by `bucket`. Empty when the population
    /// is too small to reach this bucket.
    pub fn id_range(&self, bucket: u32) -> Range<u32> {
        let first = u64::from(bucket) * u64::from(self.stride);
        let end = (first + u64::from(self.stride)).min(u64::from(self.population));
        let first = first.min(end);
        first as u32..end as u32
    }

    /// Inclusive `(first, last)` IDs of `bucket`, or `None` if it is empty.
    pub fn boundaries(&self, bucket: u32) -> Option<(ObjectId, ObjectId)> {
        let range = self.id_range(bucket);
        if range.is_empty() {
            None
        } else {
            Some((ObjectId(range.start), ObjectId(range.end - 1)))
        }
    }

    /// Maximum catch-up iterations before the scanner declares itself
    /// desynchronized.
    pub fn iteration_cap(&self) -> u32 {
        self.bucket_count().min(MAX_CATCH_UP_ITERATIONS)
    }
}

// ── BucketScanner ────────────────────────────────────────────────

/// What one call to [`BucketScanner::scan`] covered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanProgress {
    /// Buckets visited (the whole space counts as every bucket).
    pub buckets: u32,
    /// This call performed the initial full synchronous scan.
    pub full_scan: bool,
}

/// Drives a [`BucketCursor`] across ticks.
///
/// On the first scan (or after [`invalidate`](Self::invalidate)) the
/// whole address space is visited synchronously; afterwards only the
/// buckets between the last scanned one and the due one.
#[derive(Clone, Debug)]
pub struct BucketScanner {
    cursor: BucketCursor,
    last_scanned: Option<u32>,
    last_tick: Option<TickId>,
}

impl BucketScanner {
    /// Create a scanner that has not scanned anything yet.
    pub fn new(mask: u32) -> Self {
        Self {
            cursor: BucketCursor::new(mask, 0),
            last_scanned: None,
            last_tick: None,
        }
    }

    /// The underlying cursor.
    pub fn cursor(&self) -> &BucketCursor {
        &self.cursor
    }

    /// Last bucket fully scanned, if any.
    pub fn last_scanned(&self) -> Option<u32> {
        self.last_scanned
    }

    /// Whether the initial full scan has completed.
    pub fn is_initialized(&self) -> bool {
        self.last_scanned.is_some()
    }

    /// Forget the scan position; the next scan covers everything.
    pub fn invalidate(&mut self) {
        self.last_scanned = None;
    }

    /// Update the population size. Returns `true` if it changed.
    pub fn set_population(&mut self, population: u32) -> bool {
        self.cursor.set_population(population)
    }

    /// Visit every ID range due at `tick`.
    ///
    /// `visit` is called once per bucket, or once with the whole space on
    /// the initial scan and whenever a full cycle of ticks has passed since
    /// the last successful scan. If it fails, the scan position stays at
    /// the last bucket that completed and the error is returned; the
    /// failed bucket is retried on the next call.
    pub fn scan<F>(&mut self, tick: TickId, mut visit: F) -> Result<ScanProgress, ScanError>
    where
        F: FnMut(Range<u32>) -> Result<(), ScanError>,
    {
        let due = self.cursor.current_due_bucket(tick);
        let lapped = self
            .last_tick
            .is_some_and(|t| tick.since(t) >= u64::from(self.cursor.bucket_count()));
        if self.last_scanned.is_none() || lapped {
            visit(0..self.cursor.population())?;
            self.last_scanned = Some(due);
            self.last_tick = Some(tick);
            return Ok(ScanProgress {
                buckets: self.cursor.bucket_count(),
                full_scan: true,
            });
        }
        let buckets = self.catch_up(due, visit)?;
        self.last_tick = Some(tick);
        Ok(ScanProgress {
            buckets,
            full_scan: false,
        })
    }

    /// Advance bucket by bucket until `due` has been scanned.
    ///
    /// Returns the number of buckets visited. Fails with
    /// [`ScanError::Desynchronized`] if `due` is not reached within the
    /// cursor's iteration cap, which can only happen if `due` is outside
    /// the bucket range or the stored position is corrupt.
    pub fn catch_up<F>(&mut self, due: u32, mut visit: F) -> Result<u32, ScanError>
    where
        F: FnMut(Range<u32>) -> Result<(), ScanError>,
    {
        let Some(mut last) = self.last_scanned else {
            return Ok(0);
        };
        let limit = self.cursor.iteration_cap();
        let mut iterations = 0u32;
        while last != due {
            if iterations >= limit {
                return Err(ScanError::Desynchronized { iterations, limit });
            }
            let next = self.cursor.advance(last);
            visit(self.cursor.id_range(next))?;
            last = next;
            self.last_scanned = Some(last);
            iterations += 1;
        }
        Ok(iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_core::HostError;
    use proptest::prelude::*;

    fn collect_cycle(mask: u32, population: u32, start_tick: u64) -> Vec<u32> {
        let mut scanner = BucketScanner::new(mask);
        scanner.set_population(population);
        let mut seen = Vec::new();
        // Initialize without recording: the full scan is not part of the cycle.
        scanner.scan(TickId(start_tick), |_| Ok(())).unwrap();
        for t in 1..=u64::from(mask) + 1 {
            scanner
                .scan(TickId(start_tick + t), |range| {
                    seen.extend(range);
                    Ok(())
                })
                .unwrap();
        }
        seen
    }

    // ── Cursor arithmetic ────────────────────────────────────

    #[test]
    fn stride_rounds_up() {
        let cursor = BucketCursor::new(15, 1000);
        assert_eq!(cursor.stride(), 63);
        assert_eq!(cursor.bucket_count(), 16);
    }

    #[test]
    fn boundaries_are_inclusive() {
        let cursor = BucketCursor::new(15, 1000);
        assert_eq!(cursor.boundaries(0), Some((ObjectId(0), ObjectId(62))));
        assert_eq!(cursor.boundaries(1), Some((ObjectId(63), ObjectId(125))));
        // Last bucket is short: 15 * 63 = 945.
        assert_eq!(cursor.boundaries(15), Some((ObjectId(945), ObjectId(999))));
    }

    #[test]
    fn small_population_leaves_trailing_buckets_empty() {
        let cursor = BucketCursor::new(15, 5);
        assert_eq!(cursor.stride(), 1);
        assert_eq!(cursor.boundaries(4), Some((ObjectId(4), ObjectId(4))));
        assert_eq!(cursor.boundaries(5), None);
        assert!(cursor.id_range(15).is_empty());
    }

    #[test]
    fn due_bucket_uses_low_bits() {
        let cursor = BucketCursor::new(15, 1000);
        assert_eq!(cursor.current_due_bucket(TickId(5)), 5);
        assert_eq!(cursor.current_due_bucket(TickId(16)), 0);
        assert_eq!(cursor.current_due_bucket(TickId(35)), 3);
    }

    #[test]
    fn advance_wraps() {
        let cursor = BucketCursor::new(3, 100);
        assert_eq!(cursor.advance(2), 3);
        assert_eq!(cursor.advance(3), 0);
    }

    #[test]
    fn iteration_cap_is_bounded() {
        assert_eq!(BucketCursor::new(15, 10).iteration_cap(), 16);
        assert_eq!(BucketCursor::new(255, 10).iteration_cap(), 256);
    }

    #[test]
    fn population_change_recomputes_stride() {
        let mut cursor = BucketCursor::new(15, 1000);
        assert!(!cursor.set_population(1000));
        assert!(cursor.set_population(1600));
        assert_eq!(cursor.stride(), 100);
    }

    // ── Scanner ──────────────────────────────────────────────

    #[test]
    fn first_scan_covers_everything() {
        let mut scanner = BucketScanner::new(15);
        scanner.set_population(1000);
        let mut ranges = Vec::new();
        let progress = scanner
            .scan(TickId(5), |r| {
                ranges.push(r);
                Ok(())
            })
            .unwrap();
        assert!(progress.full_scan);
        assert_eq!(ranges, vec![0..1000]);
        assert_eq!(scanner.last_scanned(), Some(5));
    }

    #[test]
    fn one_bucket_per_tick() {
        let mut scanner = BucketScanner::new(15);
        scanner.set_population(1000);
        scanner.scan(TickId(5), |_| Ok(())).unwrap();
        let mut ranges = Vec::new();
        let progress = scanner
            .scan(TickId(6), |r| {
                ranges.push(r);
                Ok(())
            })
            .unwrap();
        assert_eq!(progress.buckets, 1);
        assert_eq!(ranges, vec![378..441]);
    }

    #[test]
    fn same_tick_scans_nothing() {
        let mut scanner = BucketScanner::new(15);
        scanner.set_population(1000);
        scanner.scan(TickId(5), |_| Ok(())).unwrap();
        let progress = scanner
            .scan(TickId(5), |_| panic!("nothing is due"))
            .unwrap();
        assert_eq!(progress.buckets, 0);
    }

    #[test]
    fn skipped_ticks_catch_up_in_order() {
        let mut scanner = BucketScanner::new(15);
        scanner.set_population(160);
        scanner.scan(TickId(0), |_| Ok(())).unwrap();
        let mut starts = Vec::new();
        let progress = scanner
            .scan(TickId(4), |r| {
                starts.push(r.start);
                Ok(())
            })
            .unwrap();
        assert_eq!(progress.buckets, 4);
        assert_eq!(starts, vec![10, 20, 30, 40]);
    }

    #[test]
    fn full_cycle_gap_rescans_everything() {
        let mut scanner = BucketScanner::new(15);
        scanner.set_population(160);
        scanner.scan(TickId(0), |_| Ok(())).unwrap();
        let mut ranges = Vec::new();
        let progress = scanner
            .scan(TickId(16), |r| {
                ranges.push(r);
                Ok(())
            })
            .unwrap();
        assert!(progress.full_scan);
        assert_eq!(ranges, vec![0..160]);
        assert_eq!(scanner.last_scanned(), Some(0));
    }

    #[test]
    fn single_bucket_rescans_every_tick() {
        let mut scanner = BucketScanner::new(0);
        scanner.set_population(10);
        scanner.scan(TickId(0), |_| Ok(())).unwrap();
        let mut visits = 0;
        for t in 1..4 {
            scanner
                .scan(TickId(t), |r| {
                    assert_eq!(r, 0..10);
                    visits += 1;
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(visits, 3);
    }

    #[test]
    fn out_of_range_due_bucket_desynchronizes() {
        let mut scanner = BucketScanner::new(15);
        scanner.set_population(1000);
        scanner.scan(TickId(0), |_| Ok(())).unwrap();
        match scanner.catch_up(99, |_| Ok(())) {
            Err(ScanError::Desynchronized { iterations, limit }) => {
                assert_eq!(limit, 16);
                assert_eq!(iterations, 16);
            }
            other => panic!("expected Desynchronized, got {other:?}"),
        }
    }

    #[test]
    fn failed_bucket_is_retried() {
        let mut scanner = BucketScanner::new(15);
        scanner.set_population(160);
        scanner.scan(TickId(0), |_| Ok(())).unwrap();
        let result = scanner.scan(TickId(3), |r| {
            if r.start == 20 {
                Err(ScanError::Host(HostError::Unavailable))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(scanner.last_scanned(), Some(1));

        let mut starts = Vec::new();
        scanner
            .scan(TickId(3), |r| {
                starts.push(r.start);
                Ok(())
            })
            .unwrap();
        assert_eq!(starts, vec![20, 30]);
    }

    #[test]
    fn failed_full_scan_stays_uninitialized() {
        let mut scanner = BucketScanner::new(15);
        scanner.set_population(100);
        let result = scanner.scan(TickId(0), |_| Err(ScanError::Host(HostError::Unavailable)));
        assert!(result.is_err());
        assert!(!scanner.is_initialized());
    }

    #[test]
    fn invalidate_forces_full_rescan() {
        let mut scanner = BucketScanner::new(15);
        scanner.set_population(100);
        scanner.scan(TickId(0), |_| Ok(())).unwrap();
        scanner.invalidate();
        let progress = scanner.scan(TickId(1), |_| Ok(())).unwrap();
        assert!(progress.full_scan);
    }

    // ── Coverage property ────────────────────────────────────

    proptest! {
        #[test]
        fn full_cycle_covers_each_id_exactly_once(
            population in 0u32..5000,
            k in 0u32..9,
            start in 0u64..10_000,
        ) {
            let mask = (1u32 << k) - 1;
            let mut seen = collect_cycle(mask, population, start);
            seen.sort_unstable();
            let expected: Vec<u32> = (0..population).collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
