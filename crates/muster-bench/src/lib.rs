//! Benchmark profiles and utilities for the Muster service dispatcher.
//!
//! Provides seeded city populations loaded into a [`MockHost`]:
//!
//! - [`reference_profile`]: 10K objects, 8 providers per category
//! - [`stress_profile`]: 60K objects, 40 providers per category
//! - [`populate`]: deterministic city generation from a profile and seed

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use muster_core::{Category, DistrictId, Host, Population, Position, UnitId};
use muster_engine::{DispatchConfig, TickEngine};
use muster_test_utils::{fixtures, MockHost};

/// Side length of one square district, in world units.
const DISTRICT_SIZE: f32 = 1000.0;

/// Shape of a generated city.
#[derive(Clone, Debug, PartialEq)]
pub struct CityProfile {
    /// Total objects, providers included.
    pub objects: u32,
    /// Providers generated for each category.
    pub providers_per_category: u32,
    /// Units each provider starts with.
    pub units_per_provider: u32,
    /// Objects are placed in `[0, extent)` on both axes.
    pub extent: f32,
    /// Probability that a plain object carries a condition.
    pub service_fraction: f64,
    /// Spare units the host will manufacture over the run.
    pub spare_budget: u32,
}

/// Reference profile: 10K objects on a 4x4-district map.
pub fn reference_profile() -> CityProfile {
    CityProfile {
        objects: 10_000,
        providers_per_category: 8,
        units_per_provider: 6,
        extent: 4.0 * DISTRICT_SIZE,
        service_fraction: 0.15,
        spare_budget: 64,
    }
}

/// Stress profile: 60K objects on a 10x10-district map.
pub fn stress_profile() -> CityProfile {
    CityProfile {
        objects: 60_000,
        providers_per_category: 40,
        units_per_provider: 8,
        extent: 10.0 * DISTRICT_SIZE,
        service_fraction: 0.15,
        spare_budget: 256,
    }
}

/// Square districts of [`DISTRICT_SIZE`], numbered row-major.
pub fn district_of(position: Position) -> DistrictId {
    let col = (position.x / DISTRICT_SIZE).clamp(0.0, 15.0) as u8;
    let row = (position.z / DISTRICT_SIZE).clamp(0.0, 15.0) as u8;
    DistrictId(row * 16 + col)
}

fn random_position(rng: &mut ChaCha8Rng, extent: f32) -> Position {
    Position::flat(rng.random_range(0.0..extent), rng.random_range(0.0..extent))
}

/// Build a city host from `profile`. Same profile and seed, same city.
///
/// Providers come first in the ID space, then plain objects, a
/// `service_fraction` of which need one category of service.
pub fn populate(profile: &CityProfile, seed: u64) -> MockHost {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut host = MockHost::new();
    host.set_district_fn(district_of);
    host.set_spare_budget(profile.spare_budget);

    for category in Category::ALL {
        for _ in 0..profile.providers_per_category {
            let position = random_position(&mut rng, profile.extent);
            let raw_range = rng.random_range(400.0..1600.0);
            let capacity = (profile.units_per_provider + 2) as u16;
            let p = host.add_object(fixtures::provider(category, position, raw_range, capacity));
            for _ in 0..profile.units_per_provider {
                host.add_unit_to(p);
            }
        }
    }

    while host.population_size(Population::Objects) < profile.objects {
        let position = random_position(&mut rng, profile.extent);
        let category = Category::ALL[rng.random_range(0..Category::ALL.len())];
        let severity = rng.random_range(0..120);
        let amount = match category {
            Category::Garbage => rng.random_range(50..3000),
            Category::DeathCare | Category::HealthCare => rng.random_range(1..6),
        };
        let mut snapshot = fixtures::target(category, position, severity, amount);
        if !rng.random_bool(profile.service_fraction) {
            snapshot.conditions.clear();
        }
        host.add_object(snapshot);
    }
    host
}

/// Mark every unit idle again, as if all jobs finished at once.
pub fn release_all_units(host: &mut MockHost) {
    for id in 0..host.population_size(Population::Units) {
        if host.unit(UnitId(id)).is_some() {
            host.complete_task(UnitId(id));
        }
    }
}

/// An engine with default configuration that has already run its initial
/// full scan against `host`.
pub fn warmed_engine(host: &mut MockHost) -> TickEngine {
    let mut engine = match TickEngine::new(DispatchConfig::default()) {
        Ok(engine) => engine,
        Err(e) => panic!("default configuration rejected: {e}"),
    };
    if let Err(e) = engine.execute_tick(host) {
        panic!("warm-up tick failed: {e}");
    }
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_core::ObjectId;

    fn tiny() -> CityProfile {
        CityProfile {
            objects: 500,
            providers_per_category: 2,
            units_per_provider: 2,
            extent: 2000.0,
            service_fraction: 0.5,
            spare_budget: 4,
        }
    }

    #[test]
    fn populate_hits_object_count() {
        let host = populate(&tiny(), 42);
        assert_eq!(host.population_size(Population::Objects), 500);
        assert_eq!(host.population_size(Population::Units), 12);
    }

    #[test]
    fn populate_is_deterministic() {
        let a = populate(&tiny(), 7);
        let b = populate(&tiny(), 7);
        for id in [0, 5, 100, 499] {
            assert_eq!(a.object(ObjectId(id)), b.object(ObjectId(id)));
        }
    }

    #[test]
    fn districts_tile_the_map() {
        assert_eq!(district_of(Position::flat(10.0, 10.0)), DistrictId(0));
        assert_eq!(district_of(Position::flat(1500.0, 10.0)), DistrictId(1));
        assert_eq!(district_of(Position::flat(10.0, 1500.0)), DistrictId(16));
    }

    #[test]
    fn tiny_city_dispatches() {
        let mut host = populate(&tiny(), 42);
        let mut engine = warmed_engine(&mut host);
        for _ in 0..32 {
            host.advance(1);
            engine.execute_tick(&mut host).unwrap();
        }
        assert!(!host.assignments().is_empty());
        release_all_units(&mut host);
        assert!((0..12).all(|u| host.unit(UnitId(u)).is_some_and(|s| !s.on_task)));
        assert_eq!(host.current_tick().0, 32);
    }
}
