//! Per-category membership predicates.
//!
//! Each category decides from a snapshot whether an object needs its
//! service and whether it provides it. The keepers hold one boxed
//! capability per category and never branch on the category themselves.

use muster_core::{Category, Condition, ObjectSnapshot, ProviderSnapshot};

use crate::rules::TargetRules;

/// Category membership rules.
pub trait ServiceCapability: Send {
    /// The category these rules belong to.
    fn category(&self) -> Category;

    /// The condition that makes `snapshot` a target, if any.
    fn needs_service<'a>(
        &self,
        snapshot: &'a ObjectSnapshot,
        rules: &TargetRules,
    ) -> Option<&'a Condition>;

    /// The provider fields of `snapshot` if it serves this category.
    fn provides_service<'a>(&self, snapshot: &'a ObjectSnapshot) -> Option<&'a ProviderSnapshot> {
        snapshot
            .provider
            .as_ref()
            .filter(|p| p.category == self.category())
    }

    /// Whether a provider can accept more work right now.
    fn can_receive_more(&self, provider: &ProviderSnapshot) -> bool {
        provider.active && provider.road_connected && !provider.demolishing && !provider.at_capacity
    }
}

/// Hearses collecting deceased occupants.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeathCareService;

impl ServiceCapability for DeathCareService {
    fn category(&self) -> Category {
        Category::DeathCare
    }

    fn needs_service<'a>(
        &self,
        snapshot: &'a ObjectSnapshot,
        rules: &TargetRules,
    ) -> Option<&'a Condition> {
        snapshot
            .condition(Category::DeathCare)
            .filter(|c| c.amount >= rules.min_amount.max(1))
    }
}

/// Trucks collecting accumulated garbage.
#[derive(Clone, Copy, Debug, Default)]
pub struct GarbageService;

impl ServiceCapability for GarbageService {
    fn category(&self) -> Category {
        Category::Garbage
    }

    fn needs_service<'a>(
        &self,
        snapshot: &'a ObjectSnapshot,
        rules: &TargetRules,
    ) -> Option<&'a Condition> {
        snapshot
            .condition(Category::Garbage)
            .filter(|c| c.amount >= rules.min_amount)
    }

    fn can_receive_more(&self, provider: &ProviderSnapshot) -> bool {
        // A landfill emptying into an incinerator sends its trucks elsewhere.
        provider.active
            && provider.road_connected
            && !provider.demolishing
            && !provider.at_capacity
            && !provider.emptying
    }
}

/// Ambulances collecting sick occupants.
#[derive(Clone, Copy, Debug, Default)]
pub struct HealthCareService;

impl ServiceCapability for HealthCareService {
    fn category(&self) -> Category {
        Category::HealthCare
    }

    fn needs_service<'a>(
        &self,
        snapshot: &'a ObjectSnapshot,
        rules: &TargetRules,
    ) -> Option<&'a Condition> {
        snapshot
            .condition(Category::HealthCare)
            .filter(|c| c.reported_problem || c.amount >= rules.min_amount.max(1))
    }

    fn provides_service<'a>(&self, snapshot: &'a ObjectSnapshot) -> Option<&'a ProviderSnapshot> {
        snapshot
            .provider
            .as_ref()
            .filter(|p| p.category == Category::HealthCare && p.unit_capacity > 0)
    }
}

/// The capability implementing `category`.
pub fn capability_for(category: Category) -> Box<dyn ServiceCapability> {
    match category {
        Category::DeathCare => Box::new(DeathCareService),
        Category::Garbage => Box::new(GarbageService),
        Category::HealthCare => Box::new(HealthCareService),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_core::{ObjectFlags, Position};
    use smallvec::{smallvec, SmallVec};

    fn with_condition(category: Category, amount: u32, reported: bool) -> ObjectSnapshot {
        ObjectSnapshot {
            flags: ObjectFlags::ACTIVE,
            position: Position::default(),
            conditions: smallvec![Condition {
                category,
                severity: 0,
                amount,
                reported_problem: reported,
            }],
            provider: None,
        }
    }

    fn with_provider(category: Category, unit_capacity: u16) -> ObjectSnapshot {
        ObjectSnapshot {
            flags: ObjectFlags::ACTIVE,
            position: Position::default(),
            conditions: SmallVec::new(),
            provider: Some(ProviderSnapshot {
                category,
                raw_range: 100.0,
                unit_capacity,
                units: SmallVec::new(),
                active: true,
                road_connected: true,
                demolishing: false,
                at_capacity: false,
                emptying: false,
            }),
        }
    }

    #[test]
    fn deathcare_needs_at_least_one_body() {
        let rules = TargetRules {
            min_amount: 0,
            ..TargetRules::default()
        };
        let svc = DeathCareService;
        assert!(svc
            .needs_service(&with_condition(Category::DeathCare, 0, false), &rules)
            .is_none());
        assert!(svc
            .needs_service(&with_condition(Category::DeathCare, 1, false), &rules)
            .is_some());
    }

    #[test]
    fn garbage_honours_min_amount() {
        let rules = TargetRules {
            min_amount: 100,
            ..TargetRules::default()
        };
        let svc = GarbageService;
        assert!(svc
            .needs_service(&with_condition(Category::Garbage, 99, false), &rules)
            .is_none());
        assert!(svc
            .needs_service(&with_condition(Category::Garbage, 100, false), &rules)
            .is_some());
    }

    #[test]
    fn healthcare_reported_problem_is_enough() {
        let svc = HealthCareService;
        let snap = with_condition(Category::HealthCare, 0, true);
        assert!(svc.needs_service(&snap, &TargetRules::default()).is_some());
    }

    #[test]
    fn condition_of_other_category_is_ignored() {
        let snap = with_condition(Category::Garbage, 500, true);
        assert!(DeathCareService
            .needs_service(&snap, &TargetRules::default())
            .is_none());
    }

    #[test]
    fn provider_category_must_match() {
        let snap = with_provider(Category::Garbage, 2);
        assert!(GarbageService.provides_service(&snap).is_some());
        assert!(DeathCareService.provides_service(&snap).is_none());
    }

    #[test]
    fn healthcare_provider_needs_unit_capacity() {
        assert!(HealthCareService
            .provides_service(&with_provider(Category::HealthCare, 0))
            .is_none());
        assert!(HealthCareService
            .provides_service(&with_provider(Category::HealthCare, 1))
            .is_some());
    }

    #[test]
    fn emptying_blocks_only_garbage() {
        let mut snap = with_provider(Category::Garbage, 2);
        if let Some(p) = snap.provider.as_mut() {
            p.emptying = true;
        }
        let provider = snap.provider.as_ref().unwrap();
        assert!(!GarbageService.can_receive_more(provider));
        assert!(DeathCareService.can_receive_more(provider));
    }

    #[test]
    fn capability_for_matches_category() {
        for category in Category::ALL {
            assert_eq!(capability_for(category).category(), category);
        }
    }
}
