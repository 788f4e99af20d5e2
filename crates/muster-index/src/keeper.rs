//! Categorized indices of targets, providers and units.
//!
//! [`Keepers`] owns one [`CategoryIndex`] per service category and is
//! the only thing that mutates index membership. For every object ID in
//! a scanned range it reads the host once, then lets each category decide
//! whether the object is a target, a provider, both, or neither.
//!
//! Per-object failures never escape a refresh: a malformed object is
//! logged and evicted from every index for this tick. Only an
//! unavailable host aborts the refresh.

use std::fmt;
use std::ops::Range;

use indexmap::IndexMap;
use log::warn;
use smallvec::SmallVec;

use muster_core::{
    Category, Condition, DistrictId, Host, HostError, ObjectId, ObjectSnapshot, Position,
    ProviderSnapshot, ScanError, TickId, UnitId,
};

use crate::capability::ServiceCapability;
use crate::record::{MobileUnit, ProviderFacility, TargetFacility};
use crate::rules::{KeeperRules, TargetRules};

/// What a refresh did to one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    /// A new record was created.
    Inserted,
    /// An existing record was refreshed.
    Updated,
    /// An existing record was dropped.
    Removed,
    /// No record before or after.
    Absent,
}

/// Counters accumulated across one or more refreshes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Object IDs read from the host.
    pub objects_scanned: u32,
    /// Target records created.
    pub targets_inserted: u32,
    /// Target records dropped.
    pub targets_removed: u32,
    /// Provider records created.
    pub providers_inserted: u32,
    /// Provider records dropped.
    pub providers_removed: u32,
    /// Objects or units excluded because the host data was unusable.
    pub refresh_failures: u32,
}

// ── TargetKeeper ─────────────────────────────────────────────────

/// Target records of one category.
#[derive(Clone, Debug, Default)]
pub struct TargetKeeper {
    records: IndexMap<ObjectId, TargetFacility>,
    has_any_to_check: bool,
}

impl TargetKeeper {
    /// Create an empty keeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no targets.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether `id` is a target.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.records.contains_key(&id)
    }

    /// The record for `id`.
    pub fn get(&self, id: ObjectId) -> Option<&TargetFacility> {
        self.records.get(&id)
    }

    /// The record for `id`, mutably.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut TargetFacility> {
        self.records.get_mut(&id)
    }

    /// All targets, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &TargetFacility> {
        self.records.values()
    }

    /// Some target was inserted or asked for a re-check since the last
    /// dispatch pass.
    pub fn has_any_to_check(&self) -> bool {
        self.has_any_to_check
    }

    /// Recompute [`has_any_to_check`](Self::has_any_to_check) from the records.
    pub fn recompute_has_any_to_check(&mut self) {
        self.has_any_to_check = self.records.values().any(|t| t.check_this);
    }

    /// Insert, refresh or drop the record for `id` given its current
    /// condition (`None` when it no longer needs service).
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &mut self,
        id: ObjectId,
        position: Position,
        district: DistrictId,
        condition: Option<&Condition>,
        rules: &TargetRules,
        timing: &KeeperRules,
        now: TickId,
    ) -> Change {
        let Some(condition) = condition else {
            return if self.remove(id) {
                Change::Removed
            } else {
                Change::Absent
            };
        };
        if let Some(record) = self.records.get_mut(&id) {
            if record.update(position, district, condition, rules, timing, now) {
                self.has_any_to_check = true;
            }
            return Change::Updated;
        }
        self.records.insert(
            id,
            TargetFacility::new(id, position, district, condition, rules, now),
        );
        self.has_any_to_check = true;
        Change::Inserted
    }

    /// Drop the record for `id`. Returns `true` if there was one.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        self.records.swap_remove(&id).is_some()
    }

    /// Drop every record with an ID at or past `first`. Returns how many
    /// were dropped.
    pub fn remove_from(&mut self, first: ObjectId) -> usize {
        let before = self.records.len();
        self.records.retain(|id, _| *id < first);
        self.recompute_has_any_to_check();
        before - self.records.len()
    }

    /// Clear `check_this` on every record `reachable` rejects.
    ///
    /// Such a record is never a candidate.
    pub fn clear_check_unless<F>(&mut self, reachable: F)
    where
        F: Fn(&TargetFacility) -> bool,
    {
        for record in self.records.values_mut() {
            if record.check_this && !reachable(record) {
                record.check_this = false;
            }
        }
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
        self.has_any_to_check = false;
    }
}

// ── ProviderKeeper ───────────────────────────────────────────────

/// Provider records of one category and the units they own.
#[derive(Clone, Debug, Default)]
pub struct ProviderKeeper {
    providers: IndexMap<ObjectId, ProviderFacility>,
    units: IndexMap<UnitId, MobileUnit>,
}

impl ProviderKeeper {
    /// Create an empty keeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether there are no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// The provider record for `id`.
    pub fn get(&self, id: ObjectId) -> Option<&ProviderFacility> {
        self.providers.get(&id)
    }

    /// The provider record for `id`, mutably.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ProviderFacility> {
        self.providers.get_mut(&id)
    }

    /// All providers, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderFacility> {
        self.providers.values()
    }

    /// Number of tracked units.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// The unit record for `id`.
    pub fn unit(&self, id: UnitId) -> Option<&MobileUnit> {
        self.units.get(&id)
    }

    /// The unit record for `id`, mutably.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut MobileUnit> {
        self.units.get_mut(&id)
    }

    /// All tracked units.
    pub fn units(&self) -> impl Iterator<Item = &MobileUnit> {
        self.units.values()
    }

    /// Insert, refresh or drop the provider record for `id`, then
    /// refresh the units it owns.
    ///
    /// `provider` carries the snapshot and the category's verdict on
    /// whether it can accept more work, or `None` if `id` is not a
    /// provider of this category.
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &mut self,
        host: &dyn Host,
        id: ObjectId,
        position: Position,
        district: DistrictId,
        provider: Option<(&ProviderSnapshot, bool)>,
        timing: &KeeperRules,
        now: TickId,
        stats: &mut RefreshStats,
    ) -> Result<Change, HostError> {
        let Some((snapshot, can_receive_more)) = provider else {
            return Ok(if self.remove(id) {
                Change::Removed
            } else {
                Change::Absent
            });
        };
        let (change, previous) = if let Some(record) = self.providers.get_mut(&id) {
            let previous = record.unit_ids.clone();
            record.update(position, district, snapshot, can_receive_more, timing, now);
            (Change::Updated, previous)
        } else {
            self.providers.insert(
                id,
                ProviderFacility::new(id, position, district, snapshot, can_receive_more, timing, now),
            );
            (Change::Inserted, SmallVec::new())
        };
        self.refresh_units(host, id, &previous, now, timing.target_linger_delay, stats)?;
        Ok(change)
    }

    /// Re-read every unit the provider lists. Units the host no longer
    /// reports, reports under another owner, or reports malformed are
    /// dropped from the provider's list; units of `previous` this
    /// provider still owns but no longer keeps are evicted.
    fn refresh_units(
        &mut self,
        host: &dyn Host,
        provider: ObjectId,
        previous: &[UnitId],
        now: TickId,
        linger: u64,
        stats: &mut RefreshStats,
    ) -> Result<(), HostError> {
        let Some(record) = self.providers.get(&provider) else {
            return Ok(());
        };
        let listed = record.unit_ids.clone();
        let mut kept: SmallVec<[UnitId; 8]> = SmallVec::with_capacity(listed.len());
        for unit_id in listed {
            let snapshot = match host.read_unit(unit_id) {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(HostError::Unavailable) => return Err(HostError::Unavailable),
                Err(e) => {
                    warn!("unit {unit_id} of provider {provider} excluded: {e}");
                    stats.refresh_failures += 1;
                    continue;
                }
            };
            if let Err(e) = snapshot.validate() {
                warn!("unit {unit_id} of provider {provider} excluded: {e}");
                stats.refresh_failures += 1;
                continue;
            }
            if snapshot.owner != provider {
                continue;
            }
            match self.units.get_mut(&unit_id) {
                Some(unit) => unit.update(&snapshot, now, linger),
                None => {
                    self.units
                        .insert(unit_id, MobileUnit::from_snapshot(unit_id, &snapshot));
                }
            }
            kept.push(unit_id);
        }
        self.evict_units(
            provider,
            previous.iter().filter(|unit_id| !kept.contains(*unit_id)),
        );
        if let Some(record) = self.providers.get_mut(&provider) {
            record.unit_ids = kept;
        }
        Ok(())
    }

    /// Drop the records of `ids` that `owner` still owns. A unit another
    /// provider has since adopted is left alone.
    fn evict_units<'a, I>(&mut self, owner: ObjectId, ids: I)
    where
        I: IntoIterator<Item = &'a UnitId>,
    {
        for unit_id in ids {
            if self.units.get(unit_id).is_some_and(|u| u.owner == owner) {
                self.units.swap_remove(unit_id);
            }
        }
    }

    /// Drop the provider and its units. Returns `true` if there was one.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        match self.providers.swap_remove(&id) {
            Some(record) => {
                self.evict_units(id, &record.unit_ids);
                true
            }
            None => false,
        }
    }

    /// Drop every provider with an ID at or past `first`, with its units.
    /// Returns how many providers were dropped.
    pub fn remove_from(&mut self, first: ObjectId) -> usize {
        let stale: Vec<ObjectId> = self
            .providers
            .keys()
            .copied()
            .filter(|id| *id >= first)
            .collect();
        for id in &stale {
            self.remove(*id);
        }
        stale.len()
    }

    /// Register a unit the host manufactured at `provider` this tick.
    ///
    /// Returns `false` if the provider is not tracked.
    pub fn insert_spare_unit(&mut self, provider: ObjectId, unit: MobileUnit) -> bool {
        let Some(record) = self.providers.get_mut(&provider) else {
            return false;
        };
        record.adopt_spare_unit(unit.id);
        self.units.insert(unit.id, unit);
        true
    }

    /// Nearest free unit owned by `provider`, with its squared distance
    /// to `position`. Ties go to the lower unit ID.
    pub fn nearest_free_unit(
        &self,
        provider: ObjectId,
        position: &Position,
        now: TickId,
        linger: u64,
    ) -> Option<(UnitId, f32)> {
        let record = self.providers.get(&provider)?;
        record
            .unit_ids
            .iter()
            .filter_map(|id| self.units.get(id))
            .filter(|u| u.owner == provider && u.is_free(now, linger))
            .map(|u| (u.id, u.position.distance_sq(position)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
    }

    /// Squared distance from `position` to the nearest free unit of any
    /// provider that can currently accept work.
    pub fn nearest_free_unit_anywhere(
        &self,
        position: &Position,
        now: TickId,
        linger: u64,
    ) -> Option<f32> {
        self.units
            .values()
            .filter(|u| u.is_free(now, linger))
            .filter(|u| {
                self.providers
                    .get(&u.owner)
                    .is_some_and(|p| p.can_receive_more)
            })
            .map(|u| u.position.distance_sq(position))
            .min_by(f32::total_cmp)
    }

    /// Drop every provider and unit.
    pub fn clear(&mut self) {
        self.providers.clear();
        self.units.clear();
    }
}

// ── CategoryIndex ────────────────────────────────────────────────

/// The targets, providers and units of one service category.
pub struct CategoryIndex {
    capability: Box<dyn ServiceCapability>,
    rules: TargetRules,
    targets: TargetKeeper,
    providers: ProviderKeeper,
}

impl fmt::Debug for CategoryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryIndex")
            .field("category", &self.category())
            .field("targets", &self.targets.len())
            .field("providers", &self.providers.len())
            .field("units", &self.providers.unit_count())
            .finish_non_exhaustive()
    }
}

impl CategoryIndex {
    /// Create an empty index driven by `capability`.
    pub fn new(capability: Box<dyn ServiceCapability>, rules: TargetRules) -> Self {
        Self {
            capability,
            rules,
            targets: TargetKeeper::new(),
            providers: ProviderKeeper::new(),
        }
    }

    /// The category this index serves.
    pub fn category(&self) -> Category {
        self.capability.category()
    }

    /// Target thresholds in force.
    pub fn rules(&self) -> &TargetRules {
        &self.rules
    }

    /// Replace the target thresholds. Existing records pick them up on
    /// their next refresh.
    pub fn set_rules(&mut self, rules: TargetRules) {
        self.rules = rules;
    }

    /// Target records.
    pub fn targets(&self) -> &TargetKeeper {
        &self.targets
    }

    /// Provider and unit records.
    pub fn providers(&self) -> &ProviderKeeper {
        &self.providers
    }

    /// Both keepers, mutably, for a dispatch pass.
    pub fn parts_mut(&mut self) -> (&mut TargetKeeper, &mut ProviderKeeper) {
        (&mut self.targets, &mut self.providers)
    }

    /// Classify one freshly read, valid object.
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &mut self,
        host: &dyn Host,
        id: ObjectId,
        snapshot: &ObjectSnapshot,
        district: DistrictId,
        timing: &KeeperRules,
        now: TickId,
        stats: &mut RefreshStats,
    ) -> Result<(), HostError> {
        let condition = self.capability.needs_service(snapshot, &self.rules);
        match self.targets.observe(
            id,
            snapshot.position,
            district,
            condition,
            &self.rules,
            timing,
            now,
        ) {
            Change::Inserted => stats.targets_inserted += 1,
            Change::Removed => stats.targets_removed += 1,
            Change::Updated | Change::Absent => {}
        }

        let provider = self
            .capability
            .provides_service(snapshot)
            .map(|p| (p, self.capability.can_receive_more(p)));
        match self.providers.observe(
            host,
            id,
            snapshot.position,
            district,
            provider,
            timing,
            now,
            stats,
        )? {
            Change::Inserted => stats.providers_inserted += 1,
            Change::Removed => stats.providers_removed += 1,
            Change::Updated | Change::Absent => {}
        }
        Ok(())
    }

    /// Drop `id` from this category entirely.
    pub fn evict(&mut self, id: ObjectId, stats: &mut RefreshStats) {
        if self.targets.remove(id) {
            stats.targets_removed += 1;
        }
        if self.providers.remove(id) {
            stats.providers_removed += 1;
        }
    }

    /// Drop every record with an ID at or past `first`.
    pub fn evict_from(&mut self, first: ObjectId, stats: &mut RefreshStats) {
        stats.targets_removed += self.targets.remove_from(first) as u32;
        stats.providers_removed += self.providers.remove_from(first) as u32;
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.targets.clear();
        self.providers.clear();
    }
}

// ── Keepers ──────────────────────────────────────────────────────

/// Every category index plus the timers they share.
#[derive(Debug)]
pub struct Keepers {
    indices: Vec<CategoryIndex>,
    timing: KeeperRules,
}

impl Keepers {
    /// Create keepers over `indices`, one per category.
    pub fn new(timing: KeeperRules, indices: Vec<CategoryIndex>) -> Self {
        Self { indices, timing }
    }

    /// Shared timers and range scaling.
    pub fn timing(&self) -> &KeeperRules {
        &self.timing
    }

    /// Replace the shared timers. Provider ranges pick up new scaling on
    /// their next scheduled recomputation.
    pub fn set_timing(&mut self, timing: KeeperRules) {
        self.timing = timing;
    }

    /// The index for `category`, if it is configured.
    pub fn index(&self, category: Category) -> Option<&CategoryIndex> {
        self.indices.iter().find(|i| i.category() == category)
    }

    /// The index for `category`, mutably.
    pub fn index_mut(&mut self, category: Category) -> Option<&mut CategoryIndex> {
        self.indices.iter_mut().find(|i| i.category() == category)
    }

    /// The index for `category` together with the shared timers, for a
    /// dispatch pass that mutates one while reading the other.
    pub fn index_and_timing_mut(
        &mut self,
        category: Category,
    ) -> Option<(&mut CategoryIndex, &KeeperRules)> {
        let timing = &self.timing;
        self.indices
            .iter_mut()
            .find(|i| i.category() == category)
            .map(|index| (index, timing))
    }

    /// All indices, in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &CategoryIndex> {
        self.indices.iter()
    }

    /// Re-read every object in `ids` and update every index.
    ///
    /// Stops at the first [`HostError::Unavailable`]; objects already
    /// refreshed keep their new state.
    pub fn refresh(
        &mut self,
        host: &dyn Host,
        ids: Range<u32>,
        now: TickId,
        stats: &mut RefreshStats,
    ) -> Result<(), ScanError> {
        for raw in ids {
            let id = ObjectId(raw);
            stats.objects_scanned += 1;
            let snapshot = match host.read_object(id) {
                Ok(snapshot) => snapshot,
                Err(HostError::Unavailable) => {
                    return Err(ScanError::Host(HostError::Unavailable))
                }
                Err(e) => {
                    warn!("object {id} excluded: {e}");
                    stats.refresh_failures += 1;
                    self.evict(id, stats);
                    continue;
                }
            };
            if !snapshot.is_structurally_valid() {
                self.evict(id, stats);
                continue;
            }
            if let Err(e) = snapshot.validate() {
                warn!("object {id} excluded: {e}");
                stats.refresh_failures += 1;
                self.evict(id, stats);
                continue;
            }
            let district = host.district_at(snapshot.position);
            for index in &mut self.indices {
                index.observe(host, id, &snapshot, district, &self.timing, now, stats)?;
            }
        }
        Ok(())
    }

    /// Drop `id` from every index.
    pub fn evict(&mut self, id: ObjectId, stats: &mut RefreshStats) {
        for index in &mut self.indices {
            index.evict(id, stats);
        }
    }

    /// Drop every record at or past `first` from every index. Used when
    /// the host population shrinks and those IDs will not be scanned again.
    pub fn evict_from(&mut self, first: ObjectId, stats: &mut RefreshStats) {
        for index in &mut self.indices {
            index.evict_from(first, stats);
        }
    }

    /// Drop every record in every index.
    pub fn clear(&mut self) {
        for index in &mut self.indices {
            index.clear();
        }
    }
}
