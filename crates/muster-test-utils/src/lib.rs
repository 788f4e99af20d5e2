//! Test utilities and a mock host for Muster development.
//!
//! [`MockHost`] is an in-memory [`Host`] with dense object and unit
//! tables, a settable tick counter and failure injection. The
//! [`fixtures`] module builds the snapshots it stores.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::cell::Cell;
use std::collections::HashSet;

use muster_core::{
    Category, DistrictId, Host, HostError, ObjectId, ObjectSnapshot, Population, Position, TickId,
    UnitId, UnitSnapshot,
};

/// One successful write-back recorded by [`MockHost`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub tick: TickId,
    pub unit: UnitId,
    pub target: ObjectId,
}

/// In-memory host simulation.
///
/// Object and unit IDs are indices into dense tables, so the population
/// size is the table length. Removed objects become empty slots; removed
/// units read as `None`.
#[derive(Clone, Debug)]
pub struct MockHost {
    tick: TickId,
    objects: Vec<ObjectSnapshot>,
    units: Vec<Option<UnitSnapshot>>,
    district_fn: fn(Position) -> DistrictId,
    assignments: Vec<Assignment>,
    spares: Vec<(ObjectId, UnitId)>,
    spare_budget: u32,
    spare_denials: u32,
    malformed: HashSet<ObjectId>,
    malformed_units: HashSet<UnitId>,
    unavailable: bool,
    reject_writes: bool,
    object_reads: Cell<u64>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            tick: TickId(0),
            objects: Vec::new(),
            units: Vec::new(),
            district_fn: |_| DistrictId(0),
            assignments: Vec::new(),
            spares: Vec::new(),
            spare_budget: 0,
            spare_denials: 0,
            malformed: HashSet::new(),
            malformed_units: HashSet::new(),
            unavailable: false,
            reject_writes: false,
            object_reads: Cell::new(0),
        }
    }

    // ── Time ─────────────────────────────────────────────────

    pub fn set_tick(&mut self, tick: u64) {
        self.tick = TickId(tick);
    }

    /// Advance the tick counter by `n`.
    pub fn advance(&mut self, n: u64) {
        self.tick = TickId(self.tick.0 + n);
    }

    // ── Objects ──────────────────────────────────────────────

    /// Append an object and return its ID.
    pub fn add_object(&mut self, snapshot: ObjectSnapshot) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(snapshot);
        id
    }

    /// Grow the object table with empty slots up to `size`.
    pub fn pad_objects(&mut self, size: u32) {
        while (self.objects.len() as u32) < size {
            self.objects.push(ObjectSnapshot::empty());
        }
    }

    /// Replace the object at `id`, growing the table if needed.
    pub fn set_object(&mut self, id: ObjectId, snapshot: ObjectSnapshot) {
        self.pad_objects(id.0 + 1);
        self.objects[id.0 as usize] = snapshot;
    }

    pub fn object(&self, id: ObjectId) -> &ObjectSnapshot {
        &self.objects[id.0 as usize]
    }

    pub fn object_mut(&mut self, id: ObjectId) -> &mut ObjectSnapshot {
        &mut self.objects[id.0 as usize]
    }

    /// Shrink the object table to `size` slots.
    pub fn truncate_objects(&mut self, size: u32) {
        self.objects.truncate(size as usize);
    }

    /// Turn `id` into an empty slot.
    pub fn remove_object(&mut self, id: ObjectId) {
        self.objects[id.0 as usize] = ObjectSnapshot::empty();
    }

    /// Number of `read_object` calls so far.
    pub fn object_reads(&self) -> u64 {
        self.object_reads.get()
    }

    // ── Units ────────────────────────────────────────────────

    /// Create an idle unit owned by `provider`, positioned at it, and
    /// list it on the provider.
    pub fn add_unit_to(&mut self, provider: ObjectId) -> UnitId {
        let position = self.object(provider).position;
        let id = UnitId(self.units.len() as u32);
        self.units.push(Some(fixtures::idle_unit(provider, position)));
        if let Some(p) = self.object_mut(provider).provider.as_mut() {
            p.units.push(id);
        }
        id
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitSnapshot> {
        self.units.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> &mut UnitSnapshot {
        match self.units.get_mut(id.0 as usize).and_then(Option::as_mut) {
            Some(unit) => unit,
            None => panic!("unit {id} does not exist"),
        }
    }

    /// Delete a unit and unlist it from its owner.
    pub fn remove_unit(&mut self, id: UnitId) {
        let Some(unit) = self.units.get_mut(id.0 as usize).and_then(Option::take) else {
            return;
        };
        if let Some(p) = self.objects[unit.owner.0 as usize].provider.as_mut() {
            p.units.retain(|u| *u != id);
        }
    }

    /// The unit finished its task and is idle again.
    pub fn complete_task(&mut self, id: UnitId) {
        self.unit_mut(id).on_task = false;
    }

    // ── Districts ────────────────────────────────────────────

    pub fn set_district_fn(&mut self, f: fn(Position) -> DistrictId) {
        self.district_fn = f;
    }

    // ── Write-backs ──────────────────────────────────────────

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Successful writes that pointed a unit at `target`.
    pub fn assignments_to(&self, target: ObjectId) -> usize {
        self.assignments.iter().filter(|a| a.target == target).count()
    }

    /// Spare units created so far, with their provider.
    pub fn spares(&self) -> &[(ObjectId, UnitId)] {
        &self.spares
    }

    /// Spare-unit requests refused for lack of budget.
    pub fn spare_denials(&self) -> u32 {
        self.spare_denials
    }

    pub fn set_spare_budget(&mut self, budget: u32) {
        self.spare_budget = budget;
    }

    // ── Failure injection ────────────────────────────────────

    /// Make every read and write fail with `HostError::Unavailable`.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Make `write_assignment` fail with `HostError::Rejected`.
    pub fn set_reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }

    /// Make reads of `id` fail with `HostError::Malformed`.
    pub fn mark_malformed(&mut self, id: ObjectId) {
        self.malformed.insert(id);
    }

    /// Make reads of unit `id` fail with `HostError::Malformed`.
    pub fn mark_unit_malformed(&mut self, id: UnitId) {
        self.malformed_units.insert(id);
    }

    pub fn clear_malformed(&mut self) {
        self.malformed.clear();
        self.malformed_units.clear();
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for MockHost {
    fn current_tick(&self) -> TickId {
        self.tick
    }

    fn population_size(&self, population: Population) -> u32 {
        match population {
            Population::Objects => self.objects.len() as u32,
            Population::Units => self.units.len() as u32,
        }
    }

    fn read_object(&self, id: ObjectId) -> Result<ObjectSnapshot, HostError> {
        self.object_reads.set(self.object_reads.get() + 1);
        if self.unavailable {
            return Err(HostError::Unavailable);
        }
        if self.malformed.contains(&id) {
            return Err(HostError::Malformed {
                reason: format!("object {id} has no service info"),
            });
        }
        Ok(self
            .objects
            .get(id.0 as usize)
            .cloned()
            .unwrap_or_else(ObjectSnapshot::empty))
    }

    fn read_unit(&self, id: UnitId) -> Result<Option<UnitSnapshot>, HostError> {
        if self.unavailable {
            return Err(HostError::Unavailable);
        }
        if self.malformed_units.contains(&id) {
            return Err(HostError::Malformed {
                reason: format!("unit {id} has no AI info"),
            });
        }
        Ok(self.unit(id).cloned())
    }

    fn district_at(&self, position: Position) -> DistrictId {
        (self.district_fn)(position)
    }

    fn write_assignment(&mut self, unit: UnitId, target: ObjectId) -> Result<(), HostError> {
        if self.unavailable {
            return Err(HostError::Unavailable);
        }
        if self.reject_writes {
            return Err(HostError::Rejected {
                reason: format!("unit {unit} cannot path to {target}"),
            });
        }
        let Some(snapshot) = self.units.get_mut(unit.0 as usize).and_then(Option::as_mut) else {
            return Err(HostError::Rejected {
                reason: format!("unit {unit} does not exist"),
            });
        };
        snapshot.on_task = true;
        self.assignments.push(Assignment {
            tick: self.tick,
            unit,
            target,
        });
        Ok(())
    }

    fn create_spare_unit(&mut self, provider: ObjectId, _category: Category) -> Option<UnitId> {
        if self.spare_budget == 0 || self.objects.get(provider.0 as usize)?.provider.is_none() {
            self.spare_denials += 1;
            return None;
        }
        self.spare_budget -= 1;
        let id = self.add_unit_to(provider);
        self.spares.push((provider, id));
        Some(id)
    }
}
