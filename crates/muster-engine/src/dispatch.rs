//! Greedy unit-to-target matching for one category.
//!
//! A [`DispatchEngine`] runs one pass per tick over its category's
//! index. Each check stage collects eligible targets, orders them by
//! [`priority_order`], and for each target walks the in-range providers
//! nearest-first looking for a free unit (or, policy permitting, a spare
//! one). At most one unit is assigned per target per pass.
//!
//! Checked timers are stamped once the pass ends, so a target that finds
//! nothing in an early stage is still tried by later stages.

use std::cmp::Ordering;

use indexmap::IndexSet;
use log::{debug, warn};

use muster_core::{
    Category, DispatchError, DistrictId, Host, HostError, ObjectId, Position, TickId, UnitId,
};
use muster_index::{
    CategoryIndex, KeeperRules, MobileUnit, ProviderKeeper, TargetFacility, TargetKeeper,
};

use crate::config::{CategoryConfig, DispatchConfig};
use crate::stage::{CheckStage, SpareUnitPolicy, Stages};

// ── Reports ──────────────────────────────────────────────────────

/// One unit pointed at one target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    /// Category of the pass that made the assignment.
    pub category: Category,
    /// Tick the assignment was written.
    pub tick: TickId,
    /// The dispatched unit.
    pub unit: UnitId,
    /// The target it was sent to.
    pub target: ObjectId,
    /// The provider owning the unit.
    pub provider: ObjectId,
    /// Index of the check stage that produced the match.
    pub stage: usize,
    /// The unit was manufactured for this assignment.
    pub spare: bool,
}

/// What one dispatch pass did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassReport {
    /// Category of the pass.
    pub category: Category,
    /// Nothing needed checking; the pass did no work.
    pub skipped: bool,
    /// Distinct targets attempted.
    pub candidates: u32,
    /// Assignments written, in order.
    pub assignments: Vec<Assignment>,
    /// Spare units manufactured.
    pub spare_units_created: u32,
    /// Spare units the host refused.
    pub spare_units_denied: u32,
    /// Write-backs the host rejected.
    pub rejected_writes: u32,
    /// Providers visited across all targets and stages.
    pub iterations: u64,
}

impl PassReport {
    /// An empty report for `category`.
    pub fn new(category: Category) -> Self {
        Self {
            category,
            skipped: false,
            candidates: 0,
            assignments: Vec::new(),
            spare_units_created: 0,
            spare_units_denied: 0,
            rejected_writes: 0,
            iterations: 0,
        }
    }
}

/// Candidate ordering: problems first, then higher severity, then larger
/// amount, then lower ID.
pub fn priority_order(a: &TargetFacility, b: &TargetFacility) -> Ordering {
    b.has_problem
        .cmp(&a.has_problem)
        .then(b.severity.cmp(&a.severity))
        .then(b.amount.cmp(&a.amount))
        .then(a.id.cmp(&b.id))
}

// ── Pass state ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
struct Candidate {
    id: ObjectId,
    position: Position,
    district: DistrictId,
}

#[derive(Clone, Copy, Debug)]
struct RankedProvider {
    id: ObjectId,
    in_district: bool,
    distance_sq: f32,
}

struct Pass<'a> {
    targets: &'a mut TargetKeeper,
    providers: &'a mut ProviderKeeper,
    host: &'a mut dyn Host,
    timing: &'a KeeperRules,
    now: TickId,
    available: Vec<ObjectId>,
    iterations: u64,
    limit: u64,
    report: PassReport,
}

impl Pass<'_> {
    fn candidates(&self, stage: &CheckStage) -> Vec<Candidate> {
        let mut eligible: Vec<&TargetFacility> = self
            .targets
            .iter()
            .filter(|t| stage.filter.accepts(t) && t.is_eligible(self.now, self.timing))
            .collect();
        eligible.sort_by(|a, b| priority_order(a, b));
        eligible
            .into_iter()
            .map(|t| Candidate {
                id: t.id,
                position: t.position,
                district: t.district,
            })
            .collect()
    }

    fn linger(&self) -> u64 {
        self.timing.target_linger_delay
    }
}

// ── DispatchEngine ───────────────────────────────────────────────

/// Matching rules for one category.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchEngine {
    category: Category,
    enabled: bool,
    stages: Stages,
    spare_units: SpareUnitPolicy,
    district_dispatch: bool,
    range_dispatch: bool,
}

impl DispatchEngine {
    /// Build the engine for one configured category.
    pub fn new(config: &DispatchConfig, category: &CategoryConfig) -> Self {
        Self {
            category: category.category,
            enabled: category.dispatch_enabled,
            stages: category.check_stages.stages(),
            spare_units: category.spare_units,
            district_dispatch: config.district_dispatch,
            range_dispatch: config.range_dispatch,
        }
    }

    /// The category this engine dispatches for.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Whether passes run for this category.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check stages in order.
    pub fn stages(&self) -> &[CheckStage] {
        &self.stages
    }

    /// Hard cap on provider visits for one pass.
    pub fn iteration_limit(&self, targets: usize, providers: usize) -> u64 {
        (targets as u64 + 1)
            .saturating_mul(providers as u64 + 1)
            .saturating_mul(self.stages.len().max(1) as u64)
    }

    /// Whether a provider counts as in range for a target under `stage`.
    pub fn is_in_range(
        &self,
        stage: &CheckStage,
        in_district: bool,
        distance_sq: f32,
        range_sq: f32,
    ) -> bool {
        stage.ignore_distance
            || in_district
            || (!self.district_dispatch && !self.range_dispatch)
            || (self.range_dispatch && distance_sq < range_sq)
    }

    /// Run one pass over `index`.
    ///
    /// Skips all work unless some target asked for a check. Attempts at
    /// most `candidate_cap` distinct targets. Fails only if the host
    /// becomes unavailable or the provider walk exceeds its iteration
    /// limit; targets attempted before the failure are still stamped
    /// Checked and assignments already written stay in effect.
    pub fn run_pass(
        &self,
        index: &mut CategoryIndex,
        timing: &KeeperRules,
        host: &mut dyn Host,
        now: TickId,
        candidate_cap: u32,
    ) -> Result<PassReport, DispatchError> {
        let category = self.category;
        let mut report = PassReport::new(category);
        let (targets, providers) = index.parts_mut();
        if !targets.has_any_to_check() {
            debug!("{category}: nothing to check at tick {now}, pass skipped");
            report.skipped = true;
            return Ok(report);
        }

        let mut available: Vec<ObjectId> = providers
            .iter()
            .filter(|p| p.can_receive_more)
            .map(|p| p.id)
            .collect();
        available.sort_unstable();
        let limit = self.iteration_limit(targets.len(), available.len());

        let mut pass = Pass {
            targets,
            providers,
            host,
            timing,
            now,
            available,
            iterations: 0,
            limit,
            report,
        };
        let mut attempted: IndexSet<ObjectId> = IndexSet::new();
        let result = self.walk_stages(&mut pass, &mut attempted, candidate_cap as usize);

        for id in &attempted {
            if let Some(target) = pass.targets.get_mut(*id) {
                target.mark_checked(now);
            }
        }
        pass.targets
            .clear_check_unless(|t| self.stages.iter().any(|s| s.filter.accepts(t)));
        pass.targets.recompute_has_any_to_check();
        pass.report.candidates = attempted.len() as u32;
        pass.report.iterations = pass.iterations;
        result.map(|()| pass.report)
    }

    fn walk_stages(
        &self,
        pass: &mut Pass<'_>,
        attempted: &mut IndexSet<ObjectId>,
        cap: usize,
    ) -> Result<(), DispatchError> {
        for (stage_no, stage) in self.stages.iter().enumerate() {
            for candidate in pass.candidates(stage) {
                if !attempted.contains(&candidate.id) {
                    if attempted.len() >= cap {
                        return Ok(());
                    }
                    attempted.insert(candidate.id);
                }
                self.assign_target(pass, stage_no, stage, &candidate)?;
            }
        }
        Ok(())
    }

    fn rank_providers(
        &self,
        pass: &Pass<'_>,
        stage: &CheckStage,
        candidate: &Candidate,
    ) -> Vec<RankedProvider> {
        let mut ranked: Vec<RankedProvider> = pass
            .available
            .iter()
            .filter_map(|id| pass.providers.get(*id))
            .filter_map(|p| {
                let in_district = self.district_dispatch && p.district == candidate.district;
                let distance_sq = p.distance_sq(&candidate.position);
                self.is_in_range(stage, in_district, distance_sq, p.range)
                    .then_some(RankedProvider {
                        id: p.id,
                        in_district,
                        distance_sq,
                    })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.in_district
                .cmp(&a.in_district)
                .then(a.distance_sq.total_cmp(&b.distance_sq))
                .then(a.id.cmp(&b.id))
        });
        ranked
    }

    fn assign_target(
        &self,
        pass: &mut Pass<'_>,
        stage_no: usize,
        stage: &CheckStage,
        candidate: &Candidate,
    ) -> Result<(), DispatchError> {
        let category = self.category;
        for provider in self.rank_providers(pass, stage, candidate) {
            pass.iterations += 1;
            if pass.iterations > pass.limit {
                return Err(DispatchError::IterationLimit { limit: pass.limit });
            }

            let nearest = pass.providers.nearest_free_unit(
                provider.id,
                &candidate.position,
                pass.now,
                pass.linger(),
            );
            let (unit, spare) = match nearest {
                Some((unit, _)) => (unit, false),
                None => match self.acquire_spare(pass, &provider, candidate) {
                    Some(unit) => (unit, true),
                    None => continue,
                },
            };

            match pass.host.write_assignment(unit, candidate.id) {
                Ok(()) => {
                    if let Some(record) = pass.providers.unit_mut(unit) {
                        record.assign(candidate.id, pass.now);
                    }
                    if let Some(target) = pass.targets.get_mut(candidate.id) {
                        target.mark_handled(pass.now);
                    }
                    debug!(
                        "{category}: unit {unit} of provider {} -> target {} (stage {stage_no}{})",
                        provider.id,
                        candidate.id,
                        if spare { ", spare" } else { "" }
                    );
                    pass.report.assignments.push(Assignment {
                        category,
                        tick: pass.now,
                        unit,
                        target: candidate.id,
                        provider: provider.id,
                        stage: stage_no,
                        spare,
                    });
                    return Ok(());
                }
                Err(HostError::Unavailable) => {
                    return Err(DispatchError::Host(HostError::Unavailable));
                }
                Err(e) => {
                    warn!(
                        "{category}: write-back of unit {unit} to target {} rejected: {e}",
                        candidate.id
                    );
                    pass.report.rejected_writes += 1;
                    // No retry in later stages of this pass.
                    if let Some(target) = pass.targets.get_mut(candidate.id) {
                        target.mark_checked(pass.now);
                    }
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Ask the host for a spare unit at `provider` if the policy allows.
    fn acquire_spare(
        &self,
        pass: &mut Pass<'_>,
        provider: &RankedProvider,
        candidate: &Candidate,
    ) -> Option<UnitId> {
        let wanted = match self.spare_units {
            SpareUnitPolicy::Never => false,
            SpareUnitPolicy::WhenNoFree => true,
            SpareUnitPolicy::WhenBuildingIsCloser => pass
                .providers
                .nearest_free_unit_anywhere(&candidate.position, pass.now, pass.linger())
                .is_none_or(|unit_distance| provider.distance_sq < unit_distance),
        };
        if !wanted {
            return None;
        }
        let record = pass.providers.get(provider.id)?;
        if record.spare_unit_count == 0 {
            return None;
        }
        let position = record.position;

        match pass.host.create_spare_unit(provider.id, self.category) {
            Some(unit) => {
                pass.providers
                    .insert_spare_unit(provider.id, MobileUnit::spare(unit, provider.id, position));
                pass.report.spare_units_created += 1;
                Some(unit)
            }
            None => {
                warn!(
                    "{}: provider {} was denied a spare unit",
                    self.category, provider.id
                );
                pass.report.spare_units_denied += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{CheckStagePreset, TargetFilter};
    use crate::tick::build_keepers;
    use muster_core::{Condition, Population};
    use muster_index::{Keepers, RefreshStats, TargetRules};
    use muster_test_utils::{fixtures, MockHost};
    use proptest::prelude::*;

    const CAT: Category = Category::DeathCare;

    fn config(stages: CheckStagePreset, spare: SpareUnitPolicy) -> DispatchConfig {
        let mut cfg = DispatchConfig {
            categories: vec![CategoryConfig::new(CAT)],
            ..DispatchConfig::default()
        };
        cfg.categories[0].check_stages = stages;
        cfg.categories[0].spare_units = spare;
        cfg
    }

    fn refreshed(host: &MockHost, cfg: &DispatchConfig) -> Keepers {
        let mut keepers = build_keepers(cfg);
        let mut stats = RefreshStats::default();
        keepers
            .refresh(
                host,
                0..host.population_size(Population::Objects),
                host.current_tick(),
                &mut stats,
            )
            .unwrap();
        keepers
    }

    fn run(
        cfg: &DispatchConfig,
        keepers: &mut Keepers,
        host: &mut MockHost,
        cap: u32,
    ) -> Result<PassReport, DispatchError> {
        let engine = DispatchEngine::new(cfg, &cfg.categories[0]);
        let now = host.current_tick();
        let (index, timing) = keepers.index_and_timing_mut(CAT).unwrap();
        engine.run_pass(index, timing, host, now, cap)
    }

    fn provider_with_units(host: &mut MockHost, x: f32, units: usize) -> ObjectId {
        let p = host.add_object(fixtures::provider(CAT, Position::flat(x, 0.0), 100.0, 4));
        for _ in 0..units {
            host.add_unit_to(p);
        }
        p
    }

    fn record(id: u32, severity: u32, amount: u32, reported: bool) -> TargetFacility {
        TargetFacility::new(
            ObjectId(id),
            Position::default(),
            DistrictId(0),
            &Condition {
                category: CAT,
                severity,
                amount,
                reported_problem: reported,
            },
            &TargetRules::default(),
            TickId(0),
        )
    }

    // ── Priority ─────────────────────────────────────────────

    #[test]
    fn priority_problem_then_severity() {
        let t1 = record(1, 10, 1, true);
        let t2 = record(2, 20, 1, true);
        let t3 = record(3, 25, 9, false);
        let mut all = [&t3, &t1, &t2];
        all.sort_by(|a, b| priority_order(a, b));
        let ids: Vec<u32> = all.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn priority_ties_break_by_amount_then_id() {
        let a = record(5, 40, 2, false);
        let b = record(4, 40, 2, false);
        let c = record(6, 40, 3, false);
        let mut all = [&a, &b, &c];
        all.sort_by(|x, y| priority_order(x, y));
        let ids: Vec<u32> = all.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![6, 4, 5]);
    }

    // ── Matching ─────────────────────────────────────────────

    #[test]
    fn assigns_free_unit_and_marks_handled() {
        let mut host = MockHost::new();
        let p = provider_with_units(&mut host, 0.0, 1);
        let t = host.add_object(fixtures::target(CAT, Position::flat(30.0, 0.0), 50, 2));
        host.set_tick(5);
        let cfg = config(CheckStagePreset::ProblematicFirst, SpareUnitPolicy::Never);
        let mut keepers = refreshed(&host, &cfg);

        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert_eq!(report.assignments.len(), 1);
        assert_eq!(report.assignments[0].provider, p);
        assert_eq!(report.assignments[0].target, t);
        assert_eq!(host.assignments_to(t), 1);

        let index = keepers.index(CAT).unwrap();
        let timing = keepers.timing();
        assert!(index.targets().get(t).unwrap().is_handled(TickId(5), timing));
        assert!(!index.targets().has_any_to_check());
    }

    #[test]
    fn skips_pass_without_work() {
        let mut host = MockHost::new();
        provider_with_units(&mut host, 0.0, 1);
        let cfg = config(CheckStagePreset::InRange, SpareUnitPolicy::Never);
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert!(report.skipped);
        assert!(host.assignments().is_empty());
    }

    #[test]
    fn prefers_provider_with_free_unit_under_never_policy() {
        let mut host = MockHost::new();
        let _p1 = provider_with_units(&mut host, 10.0, 0);
        let p2 = provider_with_units(&mut host, 40.0, 1);
        let t = host.add_object(fixtures::target(CAT, Position::flat(0.0, 0.0), 50, 1));
        host.set_spare_budget(10);
        let cfg = config(CheckStagePreset::InRange, SpareUnitPolicy::Never);
        let mut keepers = refreshed(&host, &cfg);

        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert_eq!(report.assignments[0].provider, p2);
        assert_eq!(host.assignments_to(t), 1);
        assert!(host.spares().is_empty());
        assert_eq!(host.spare_denials(), 0);
    }

    #[test]
    fn district_outranks_distance() {
        let mut host = MockHost::new();
        host.set_district_fn(|p| DistrictId(if p.x < 0.0 { 1 } else { 2 }));
        let near = provider_with_units(&mut host, 10.0, 1);
        let same_district = provider_with_units(&mut host, -300.0, 1);
        host.add_object(fixtures::target(CAT, Position::flat(-1.0, 0.0), 50, 1));
        let cfg = config(
            CheckStagePreset::Custom(vec![CheckStage::in_range(TargetFilter::Any)]),
            SpareUnitPolicy::Never,
        );
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert_ne!(report.assignments[0].provider, near);
        assert_eq!(report.assignments[0].provider, same_district);
    }

    #[test]
    fn out_of_range_provider_never_chosen_over_in_range() {
        let mut host = MockHost::new();
        host.set_district_fn(|p| DistrictId(if p.z > 0.0 { 1 } else { 2 }));
        // Closer, but its clamped range (64) does not reach the target.
        let short = host.add_object(fixtures::provider(CAT, Position::flat(100.0, -70.0), 10.0, 4));
        host.add_unit_to(short);
        // Farther, with a range that does.
        let long = host.add_object(fixtures::provider(CAT, Position::flat(100.0, -150.0), 500.0, 4));
        host.add_unit_to(long);
        host.add_object(fixtures::target(CAT, Position::flat(100.0, 10.0), 50, 1));
        let cfg = config(
            CheckStagePreset::Custom(vec![CheckStage::in_range(TargetFilter::Any)]),
            SpareUnitPolicy::Never,
        );
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert_eq!(report.assignments[0].provider, long);
    }

    #[test]
    fn range_gate_is_open_when_both_modes_are_off() {
        let cfg = DispatchConfig {
            district_dispatch: false,
            range_dispatch: false,
            ..config(CheckStagePreset::InRange, SpareUnitPolicy::Never)
        };
        let engine = DispatchEngine::new(&cfg, &cfg.categories[0]);
        let stage = CheckStage::in_range(TargetFilter::Any);
        assert!(engine.is_in_range(&stage, false, 1.0e9, 1.0));
    }

    #[test]
    fn range_gate_ignores_range_when_range_dispatch_is_off() {
        let cfg = DispatchConfig {
            range_dispatch: false,
            ..config(CheckStagePreset::InRange, SpareUnitPolicy::Never)
        };
        let engine = DispatchEngine::new(&cfg, &cfg.categories[0]);
        let stage = CheckStage::in_range(TargetFilter::Any);
        assert!(!engine.is_in_range(&stage, false, 1.0, 100.0));
        assert!(engine.is_in_range(&stage, true, 1.0e9, 100.0));
        assert!(engine.is_in_range(&CheckStage::ignoring_range(TargetFilter::Any), false, 1.0e9, 1.0));
    }

    #[test]
    fn one_unit_serves_one_target_per_pass() {
        let mut host = MockHost::new();
        provider_with_units(&mut host, 0.0, 1);
        let a = host.add_object(fixtures::target(CAT, Position::flat(10.0, 0.0), 50, 1));
        let b = host.add_object(fixtures::target(CAT, Position::flat(20.0, 0.0), 40, 1));
        let cfg = config(CheckStagePreset::ProblematicFirst, SpareUnitPolicy::Never);
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert_eq!(report.assignments.len(), 1);
        assert_eq!(host.assignments_to(a), 1);
        assert_eq!(host.assignments_to(b), 0);

        // The unassigned target was attempted, so it is Checked now.
        let timing = keepers.timing().clone();
        let index = keepers.index(CAT).unwrap();
        assert!(index.targets().get(b).unwrap().is_checked(TickId(0), &timing));
        assert_eq!(report.candidates, 2);
    }

    // ── Failures ─────────────────────────────────────────────

    #[test]
    fn rejected_write_leaves_target_unhandled() {
        let mut host = MockHost::new();
        let p = provider_with_units(&mut host, 0.0, 1);
        let t = host.add_object(fixtures::target(CAT, Position::flat(10.0, 0.0), 50, 1));
        host.set_reject_writes(true);
        let cfg = config(CheckStagePreset::InRange, SpareUnitPolicy::Never);
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert!(report.assignments.is_empty());
        assert_eq!(report.rejected_writes, 1);

        let timing = keepers.timing().clone();
        let providers = keepers.index(CAT).unwrap().providers();
        let targets = keepers.index(CAT).unwrap().targets();
        assert!(!targets.get(t).unwrap().is_handled(TickId(0), &timing));
        assert!(providers
            .nearest_free_unit(p, &Position::default(), TickId(0), timing.target_linger_delay)
            .is_some());
    }

    #[test]
    fn unavailable_host_fails_the_pass() {
        let mut host = MockHost::new();
        provider_with_units(&mut host, 0.0, 1);
        let t = host.add_object(fixtures::target(CAT, Position::flat(10.0, 0.0), 50, 1));
        let cfg = config(CheckStagePreset::InRange, SpareUnitPolicy::Never);
        let mut keepers = refreshed(&host, &cfg);
        host.set_unavailable(true);
        match run(&cfg, &mut keepers, &mut host, 32) {
            Err(DispatchError::Host(HostError::Unavailable)) => {}
            other => panic!("expected Host(Unavailable), got {other:?}"),
        }
        let timing = keepers.timing().clone();
        let target = keepers.index(CAT).unwrap().targets().get(t).unwrap().clone();
        assert!(target.is_checked(TickId(0), &timing));
    }

    // ── Spare units ──────────────────────────────────────────

    #[test]
    fn when_no_free_creates_at_first_in_range_provider() {
        let mut host = MockHost::new();
        let p1 = provider_with_units(&mut host, 10.0, 0);
        let _p2 = provider_with_units(&mut host, 40.0, 1);
        let t = host.add_object(fixtures::target(CAT, Position::flat(0.0, 0.0), 50, 1));
        host.set_spare_budget(1);
        let cfg = config(CheckStagePreset::InRange, SpareUnitPolicy::WhenNoFree);
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        let a = report.assignments[0];
        assert_eq!(a.provider, p1);
        assert!(a.spare);
        assert_eq!(host.spares().len(), 1);
        assert_eq!(host.assignments_to(t), 1);
        let providers = keepers.index(CAT).unwrap().providers();
        assert_eq!(providers.unit(a.unit).and_then(|u| u.assigned_target), Some(t));
        assert_eq!(providers.get(p1).map(|p| p.spare_unit_count), Some(3));
    }

    #[test]
    fn denied_spare_falls_through_to_next_provider() {
        let mut host = MockHost::new();
        let _p1 = provider_with_units(&mut host, 10.0, 0);
        let p2 = provider_with_units(&mut host, 40.0, 1);
        host.add_object(fixtures::target(CAT, Position::flat(0.0, 0.0), 50, 1));
        host.set_spare_budget(0);
        let cfg = config(CheckStagePreset::InRange, SpareUnitPolicy::WhenNoFree);
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert_eq!(report.spare_units_denied, 1);
        assert_eq!(report.assignments[0].provider, p2);
        assert!(!report.assignments[0].spare);
    }

    #[test]
    fn building_closer_than_free_unit_creates_spare() {
        let mut host = MockHost::new();
        let near = provider_with_units(&mut host, 10.0, 0);
        provider_with_units(&mut host, 60.0, 1);
        host.add_object(fixtures::target(CAT, Position::flat(0.0, 0.0), 50, 1));
        host.set_spare_budget(1);
        let cfg = config(CheckStagePreset::InRange, SpareUnitPolicy::WhenBuildingIsCloser);
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert_eq!(report.assignments[0].provider, near);
        assert!(report.assignments[0].spare);
    }

    #[test]
    fn free_unit_closer_than_building_prevents_spare() {
        let mut host = MockHost::new();
        provider_with_units(&mut host, 30.0, 0);
        let far = provider_with_units(&mut host, 60.0, 0);
        let unit = host.add_unit_to(far);
        // The free unit is out on the road, right next to the target.
        host.unit_mut(unit).position = Position::flat(5.0, 0.0);
        host.add_object(fixtures::target(CAT, Position::flat(0.0, 0.0), 50, 1));
        host.set_spare_budget(1);
        let cfg = config(CheckStagePreset::InRange, SpareUnitPolicy::WhenBuildingIsCloser);
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert!(host.spares().is_empty());
        assert_eq!(report.assignments[0].provider, far);
        assert_eq!(report.assignments[0].unit, unit);
    }

    // ── Bookkeeping ──────────────────────────────────────────

    #[test]
    fn candidate_cap_bounds_the_pass() {
        let mut host = MockHost::new();
        provider_with_units(&mut host, 0.0, 0);
        for i in 0..5 {
            host.add_object(fixtures::target(CAT, Position::flat(i as f32, 0.0), 50, 1));
        }
        let cfg = config(CheckStagePreset::InRange, SpareUnitPolicy::Never);
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 2).unwrap();
        assert_eq!(report.candidates, 2);
        assert!(keepers.index(CAT).unwrap().targets().has_any_to_check());
    }

    #[test]
    fn target_no_stage_accepts_stops_requesting_passes() {
        let mut host = MockHost::new();
        provider_with_units(&mut host, 0.0, 1);
        let plain = host.add_object(fixtures::target(CAT, Position::flat(5.0, 0.0), 10, 1));
        let cfg = config(
            CheckStagePreset::Custom(vec![CheckStage::ignoring_range(TargetFilter::Forgotten)]),
            SpareUnitPolicy::Never,
        );
        let mut keepers = refreshed(&host, &cfg);
        assert!(keepers.index(CAT).unwrap().targets().has_any_to_check());

        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert!(!report.skipped);
        assert_eq!(report.candidates, 0);
        let targets = keepers.index(CAT).unwrap().targets();
        assert!(!targets.get(plain).unwrap().check_this);
        assert!(!targets.has_any_to_check());

        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert!(report.skipped);
        assert!(host.assignments().is_empty());
    }

    #[test]
    fn forgotten_target_still_served_by_forgotten_only_stages() {
        let mut host = MockHost::new();
        provider_with_units(&mut host, 0.0, 1);
        host.add_object(fixtures::target(CAT, Position::flat(5.0, 0.0), 10, 1));
        let old = host.add_object(fixtures::target(CAT, Position::flat(8.0, 0.0), 120, 1));
        let cfg = config(
            CheckStagePreset::Custom(vec![CheckStage::ignoring_range(TargetFilter::Forgotten)]),
            SpareUnitPolicy::Never,
        );
        let mut keepers = refreshed(&host, &cfg);
        let report = run(&cfg, &mut keepers, &mut host, 32).unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.assignments[0].target, old);
        assert!(!keepers.index(CAT).unwrap().targets().has_any_to_check());
    }

    #[test]
    fn iteration_limit_formula() {
        let cfg = config(CheckStagePreset::ForgottenFirst, SpareUnitPolicy::Never);
        let engine = DispatchEngine::new(&cfg, &cfg.categories[0]);
        assert_eq!(engine.iteration_limit(9, 4), 10 * 5 * 4);
        assert_eq!(engine.iteration_limit(0, 0), 4);
    }

    // ── Ordering property ────────────────────────────────────

    mod proptests {
        use super::*;

        proptest! {
            #[test]
            fn sorted_candidates_respect_priority(
                specs in prop::collection::vec((0u32..100, 0u32..50, any::<bool>()), 1..40),
            ) {
                let records: Vec<TargetFacility> = specs
                    .iter()
                    .enumerate()
                    .map(|(i, &(sev, amt, rep))| record(i as u32, sev, amt, rep))
                    .collect();
                let mut sorted: Vec<&TargetFacility> = records.iter().collect();
                sorted.sort_by(|a, b| priority_order(a, b));
                for pair in sorted.windows(2) {
                    let (a, b) = (pair[0], pair[1]);
                    prop_assert!(a.has_problem >= b.has_problem);
                    if a.has_problem == b.has_problem {
                        prop_assert!(a.severity >= b.severity);
                        if a.severity == b.severity {
                            prop_assert!(a.amount >= b.amount);
                            if a.amount == b.amount {
                                prop_assert!(a.id < b.id);
                            }
                        }
                    }
                }
            }
        }
    }
}
