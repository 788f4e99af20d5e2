//! Derived-state records cached per object and unit ID.
//!
//! Records hold copies of the host fields the dispatcher needs plus the
//! state only the dispatcher knows about (debounce timers, assignments).
//! They reference each other by ID only; the keepers own them.

use smallvec::SmallVec;

use muster_core::{Condition, DistrictId, ObjectId, Position, ProviderSnapshot, TickId, UnitId, UnitSnapshot};

use crate::rules::{KeeperRules, TargetRules};
use crate::timer::TimedFlag;

// ── TargetFacility ───────────────────────────────────────────────

/// An object with a pending condition for one category.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetFacility {
    /// Host object ID.
    pub id: ObjectId,
    /// World position.
    pub position: Position,
    /// District containing the object.
    pub district: DistrictId,
    /// Ordinal problem timer.
    pub severity: u32,
    /// Magnitude of the condition.
    pub amount: u32,
    /// Severity reached the problem threshold or the host flags a problem.
    pub has_problem: bool,
    /// A scaled severity or amount reached its forgotten threshold.
    pub forgotten: bool,
    /// Tick of the last refresh.
    pub last_seen: TickId,
    /// The record wants a dispatch attempt.
    pub check_this: bool,
    checked: TimedFlag,
    handled: TimedFlag,
}

impl TargetFacility {
    /// Build a fresh record. New targets always want a dispatch attempt.
    pub fn new(
        id: ObjectId,
        position: Position,
        district: DistrictId,
        condition: &Condition,
        rules: &TargetRules,
        now: TickId,
    ) -> Self {
        Self {
            id,
            position,
            district,
            severity: condition.severity,
            amount: condition.amount,
            has_problem: rules.has_problem(condition.severity, condition.reported_problem),
            forgotten: rules.is_forgotten(condition.severity, condition.amount),
            last_seen: now,
            check_this: true,
            checked: TimedFlag::new(),
            handled: TimedFlag::new(),
        }
    }

    /// Refresh derived state from a new host reading.
    ///
    /// Returns the resulting `check_this`.
    pub fn update(
        &mut self,
        position: Position,
        district: DistrictId,
        condition: &Condition,
        rules: &TargetRules,
        timing: &KeeperRules,
        now: TickId,
    ) -> bool {
        let grew = condition.severity > self.severity || condition.amount > self.amount;
        let has_problem = rules.has_problem(condition.severity, condition.reported_problem);
        let newly_problem = has_problem && !self.has_problem;

        self.position = position;
        self.district = district;
        self.severity = condition.severity;
        self.amount = condition.amount;
        self.has_problem = has_problem;
        self.forgotten = rules.is_forgotten(condition.severity, condition.amount);
        self.last_seen = now;

        if self.is_handled(now, timing) {
            self.check_this = false;
        } else if grew || newly_problem || !self.is_checked(now, timing) {
            self.check_this = true;
        }
        self.check_this
    }

    /// Whether the Checked timer is running at `now`.
    pub fn is_checked(&self, now: TickId, timing: &KeeperRules) -> bool {
        self.checked.is_set(now, timing.recheck_interval)
    }

    /// Whether the Handled timer is running at `now`.
    pub fn is_handled(&self, now: TickId, timing: &KeeperRules) -> bool {
        self.handled.is_set(now, timing.recheck_handled_interval)
    }

    /// Whether neither debounce timer excludes the target at `now`.
    pub fn is_eligible(&self, now: TickId, timing: &KeeperRules) -> bool {
        !self.is_handled(now, timing) && !self.is_checked(now, timing)
    }

    /// Record a dispatch attempt, successful or not.
    pub fn mark_checked(&mut self, now: TickId) {
        self.checked.set(now);
        self.check_this = false;
    }

    /// Record a successful assignment.
    pub fn mark_handled(&mut self, now: TickId) {
        self.handled.set(now);
        self.check_this = false;
    }

    /// Tick of the last successful assignment, if any.
    pub fn handled_at(&self) -> Option<TickId> {
        self.handled.set_at()
    }
}

// ── ProviderFacility ─────────────────────────────────────────────

/// A service facility that owns units of one category.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderFacility {
    /// Host object ID.
    pub id: ObjectId,
    /// World position.
    pub position: Position,
    /// District containing the facility.
    pub district: DistrictId,
    /// Effective service range, squared.
    pub range: f32,
    /// Tick `range` was last computed.
    pub range_updated_at: TickId,
    /// The facility can accept more work.
    pub can_receive_more: bool,
    /// Units the facility may own at once.
    pub total_unit_capacity: u16,
    /// Units the facility could still create.
    pub spare_unit_count: u16,
    /// Owned units. Weak references into the unit map.
    pub unit_ids: SmallVec<[UnitId; 8]>,
}

impl ProviderFacility {
    /// Build a fresh record, computing the range immediately.
    pub fn new(
        id: ObjectId,
        position: Position,
        district: DistrictId,
        snapshot: &ProviderSnapshot,
        can_receive_more: bool,
        rules: &KeeperRules,
        now: TickId,
    ) -> Self {
        Self {
            id,
            position,
            district,
            range: rules.effective_range_sq(snapshot.raw_range),
            range_updated_at: now,
            can_receive_more,
            total_unit_capacity: snapshot.unit_capacity,
            spare_unit_count: spare_count(snapshot),
            unit_ids: snapshot.units.clone(),
        }
    }

    /// Refresh from a new host reading. The range is only recomputed once
    /// `object_update_interval` ticks have passed since the last time.
    ///
    /// Returns `true` if the range was recomputed.
    pub fn update(
        &mut self,
        position: Position,
        district: DistrictId,
        snapshot: &ProviderSnapshot,
        can_receive_more: bool,
        rules: &KeeperRules,
        now: TickId,
    ) -> bool {
        self.position = position;
        self.district = district;
        self.can_receive_more = can_receive_more;
        self.total_unit_capacity = snapshot.unit_capacity;
        self.spare_unit_count = spare_count(snapshot);
        self.unit_ids.clone_from(&snapshot.units);

        if now.since(self.range_updated_at) >= rules.object_update_interval {
            self.range = rules.effective_range_sq(snapshot.raw_range);
            self.range_updated_at = now;
            true
        } else {
            false
        }
    }

    /// Squared distance from the facility to `position`.
    pub fn distance_sq(&self, position: &Position) -> f32 {
        self.position.distance_sq(position)
    }

    /// Take ownership of a unit the host just manufactured here.
    pub fn adopt_spare_unit(&mut self, unit: UnitId) {
        if !self.unit_ids.contains(&unit) {
            self.unit_ids.push(unit);
        }
        self.spare_unit_count = self.spare_unit_count.saturating_sub(1);
    }
}

fn spare_count(snapshot: &ProviderSnapshot) -> u16 {
    let owned = u16::try_from(snapshot.units.len()).unwrap_or(u16::MAX);
    snapshot.unit_capacity.saturating_sub(owned)
}

// ── MobileUnit ───────────────────────────────────────────────────

/// A dispatchable unit owned by a provider.
#[derive(Clone, Debug, PartialEq)]
pub struct MobileUnit {
    /// Host unit ID.
    pub id: UnitId,
    /// Owning facility.
    pub owner: ObjectId,
    /// Current position.
    pub position: Position,
    /// Target of the live assignment, if any.
    pub assigned_target: Option<ObjectId>,
    /// Tick of the most recent assignment.
    pub last_assigned: TickId,
    /// The host reports an unfinished task.
    pub host_on_task: bool,
    /// Remaining load the unit can take on.
    pub free_capacity: u32,
    /// Fraction of total capacity in use.
    pub used_capacity_fraction: f32,
}

impl MobileUnit {
    /// Build a record from a host reading.
    pub fn from_snapshot(id: UnitId, snapshot: &UnitSnapshot) -> Self {
        Self {
            id,
            owner: snapshot.owner,
            position: snapshot.position,
            assigned_target: None,
            last_assigned: TickId::default(),
            host_on_task: snapshot.on_task,
            free_capacity: snapshot.free_capacity,
            used_capacity_fraction: snapshot.used_capacity_fraction,
        }
    }

    /// Record for a unit manufactured this tick, before the host has
    /// reported anything about it. Its load is unknown until the next
    /// refresh, so it is not free on its own account.
    pub fn spare(id: UnitId, owner: ObjectId, position: Position) -> Self {
        Self {
            id,
            owner,
            position,
            assigned_target: None,
            last_assigned: TickId::default(),
            host_on_task: false,
            free_capacity: 0,
            used_capacity_fraction: 0.0,
        }
    }

    /// Refresh host-owned fields. A finished assignment past its linger
    /// delay is released here.
    pub fn update(&mut self, snapshot: &UnitSnapshot, now: TickId, linger: u64) {
        self.owner = snapshot.owner;
        self.position = snapshot.position;
        self.host_on_task = snapshot.on_task;
        self.free_capacity = snapshot.free_capacity;
        self.used_capacity_fraction = snapshot.used_capacity_fraction;
        if self.assigned_target.is_some() && !self.is_lingering(now, linger) && !self.host_on_task {
            self.assigned_target = None;
        }
    }

    /// Point the unit at `target`. The unit counts as on task until the
    /// host says otherwise.
    pub fn assign(&mut self, target: ObjectId, now: TickId) {
        self.assigned_target = Some(target);
        self.last_assigned = now;
        self.host_on_task = true;
    }

    /// The unit holds an assignment made no more than `linger` ticks ago.
    pub fn is_lingering(&self, now: TickId, linger: u64) -> bool {
        self.assigned_target.is_some() && now.since(self.last_assigned) <= linger
    }

    /// Whether the unit may be handed a new target at `now`.
    pub fn is_free(&self, now: TickId, linger: u64) -> bool {
        !self.is_lingering(now, linger) && !self.host_on_task && self.free_capacity > 0
    }
}
