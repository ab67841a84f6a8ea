// Run:
//   cargo test --test pool_allocation -- --nocapture

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crowd_pool::engine::allocator::{allocate, SlotFlags, VirtualEntity};
use crowd_pool::engine::random::SeededRng;
use crowd_pool::{CoreError, Execution, Frustum, PoolDriver, PriorityKey, RunConfig, SlotId};

fn entity(identity: usize, visible: bool, distance_sq: f32, slot: Option<SlotId>) -> VirtualEntity {
    VirtualEntity {
        // position.x doubles as a stable identity: allocation permutes the
        // array but never touches positions.
        position: Vec3::new(identity as f32, 0.0, 0.0),
        key: PriorityKey { visible, distance_sq },
        slot,
    }
}

fn holder_map(entities: &[VirtualEntity]) -> HashMap<i64, SlotId> {
    entities
        .iter()
        .filter_map(|e| e.slot.map(|slot| (e.position.x as i64, slot)))
        .collect()
}

/// Deterministic permutation of `0..n`, used to hand out distinct distances.
fn permutation(n: usize, rng: &mut SeededRng) -> Vec<usize> {
    let mut values: Vec<usize> = (0..n).collect();
    for i in (1..n).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        values.swap(i, j);
    }
    values
}

#[test]
fn concrete_scenario_one_leaver_one_enterer() {
    // N = 10, K = 3, distance = index, visible = index < 5.
    let mut entities: Vec<VirtualEntity> = (0..10)
        .map(|i| entity(i, i < 5, i as f32, (i < 3).then(|| i as SlotId)))
        .collect();
    let mut base = vec![Vec3::ZERO; 3];
    let mut flags = vec![SlotFlags::default(); 3];

    let churn = allocate(&mut entities, &mut base, &mut flags);
    assert_eq!(churn, 0, "initial assignment already matches the top-3");

    let before = holder_map(&entities);
    assert_eq!(
        before.keys().copied().collect::<HashSet<_>>(),
        HashSet::from([0, 1, 2]),
        "closest visible entities hold the slots"
    );

    // Entity 1 drops out of view; entity 6 becomes the closest visible among
    // the rest.
    for e in &mut entities {
        match e.position.x as i64 {
            1 => e.key.visible = false,
            6 => {
                e.key.visible = true;
                e.key.distance_sq = 2.5;
            }
            _ => {}
        }
    }

    let churn = allocate(&mut entities, &mut base, &mut flags);
    assert_eq!(churn, 1, "exactly one membership change, exactly one swap");

    let after = holder_map(&entities);
    assert_eq!(
        after.keys().copied().collect::<HashSet<_>>(),
        HashSet::from([0, 2, 6])
    );
    assert_eq!(after[&0], before[&0], "surviving member 0 keeps its slot");
    assert_eq!(after[&2], before[&2], "surviving member 2 keeps its slot");
    assert_eq!(
        after[&6], before[&1],
        "the enterer inherits the leaver's slot directly"
    );
    assert!(flags[after[&6] as usize].changed);
    assert_eq!(flags.iter().filter(|f| f.changed).count(), 1);
}

#[test]
fn churn_equals_membership_change_exactly() {
    let n = 50;
    let k = 10;
    let mut rng = SeededRng::new(7);

    let mut entities: Vec<VirtualEntity> = (0..n)
        .map(|i| entity(i, false, 0.0, (i < k).then(|| i as SlotId)))
        .collect();
    let mut base = vec![Vec3::ZERO; k];
    let mut flags = vec![SlotFlags::default(); k];

    let mut previous: Option<HashMap<i64, SlotId>> = None;
    for _ in 0..25 {
        let distances = permutation(n, &mut rng);
        for (e, &distance) in entities.iter_mut().zip(&distances) {
            // Distinct distances keep the expected top-K unambiguous; tie
            // order is deliberately left unspecified by the allocator.
            e.key = PriorityKey {
                visible: rng.next_f32() < 0.5,
                distance_sq: distance as f32,
            };
        }

        let mut ranked: Vec<(PriorityKey, i64)> = entities
            .iter()
            .map(|e| (e.key, e.position.x as i64))
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0));
        let expected: HashSet<i64> = ranked[..k].iter().map(|(_, id)| *id).collect();

        let churn = allocate(&mut entities, &mut base, &mut flags);
        let holders = holder_map(&entities);
        let actual: HashSet<i64> = holders.keys().copied().collect();
        assert_eq!(actual, expected, "pool must hold exactly the top-K set");

        if let Some(before) = previous {
            let entered = expected.iter().filter(|id| !before.contains_key(id)).count();
            assert_eq!(
                churn as usize, entered,
                "reassignments must equal membership changes, never more"
            );
            for (id, slot) in &holders {
                if let Some(previous_slot) = before.get(id) {
                    assert_eq!(slot, previous_slot, "stayer {id} lost its slot");
                }
            }
        }
        assert_eq!(
            flags.iter().filter(|f| f.changed).count(),
            churn as usize,
            "changed markers must match the reassignment count"
        );
        previous = Some(holders);
    }
}

#[test]
fn all_invisible_population_still_fills_the_pool() {
    let n = 20;
    let k = 4;
    let mut entities: Vec<VirtualEntity> = (0..n)
        .map(|i| entity(i, false, ((i * 13) % n) as f32, (i < k).then(|| i as SlotId)))
        .collect();
    let mut base = vec![Vec3::ZERO; k];
    let mut flags = vec![SlotFlags::default(); k];

    allocate(&mut entities, &mut base, &mut flags);

    let holders: Vec<&VirtualEntity> = entities.iter().filter(|e| e.slot.is_some()).collect();
    assert_eq!(holders.len(), k, "slots are never left idle while entities exist");
    let worst = holders.iter().map(|e| e.key.distance_sq).fold(f32::MIN, f32::max);
    assert!(
        entities
            .iter()
            .filter(|e| e.slot.is_none())
            .all(|e| e.key.distance_sq >= worst),
        "the K closest non-visible entities must hold the slots"
    );
    assert!(flags.iter().all(|f| !f.visible));
}

#[test]
fn driver_upholds_pool_invariants_every_tick() {
    let config = RunConfig {
        population: 300,
        slots: 24,
        execution: Execution::Inline,
        seed: 42,
        ..RunConfig::default()
    };
    let mut driver = PoolDriver::new(&config).expect("valid config");
    let frustum = Frustum::from_aabb(Vec3::new(-25.0, -60.0, -60.0), Vec3::new(25.0, 60.0, 60.0));

    for step in 0..12u32 {
        let observer = Vec3::new(step as f32 * 4.0 - 24.0, 0.0, 0.0);
        driver
            .tick(step as f32 * 0.016, 0.016, observer, frustum)
            .expect("tick");

        let entities = driver.entities();
        let holders: Vec<&VirtualEntity> =
            entities.iter().filter(|e| e.slot.is_some()).collect();

        // Conservation.
        assert_eq!(holders.len(), config.slots.min(config.population));
        let mut ids: Vec<SlotId> = holders.iter().map(|e| e.slot.unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), holders.len(), "a slot is assigned at most once");

        // Top-K boundary: no outsider outranks an insider.
        let worst_held = holders.iter().map(|e| e.key).max().unwrap();
        if let Some(best_free) = entities.iter().filter(|e| e.slot.is_none()).map(|e| e.key).min()
        {
            assert!(worst_held <= best_free);
        }

        // The adapter-facing changed markers agree with the allocator.
        let changed = driver.frames().iter().filter(|f| f.changed_this_tick).count();
        assert_eq!(changed, driver.reassigned_last_tick() as usize);
    }
}

#[test]
fn oversized_pool_never_reassigns() {
    let config = RunConfig {
        population: 5,
        slots: 8,
        execution: Execution::Inline,
        seed: 9,
        ..RunConfig::default()
    };
    let mut driver = PoolDriver::new(&config).expect("valid config");

    for step in 0..6u32 {
        // Swing the observer and the view volume around; membership cannot
        // change when every entity already holds a slot.
        let observer = Vec3::splat(step as f32 * 20.0 - 50.0);
        let frustum = Frustum::from_aabb(observer - Vec3::splat(10.0), observer + Vec3::splat(10.0));
        driver
            .tick(step as f32 * 0.016, 0.016, observer, frustum)
            .expect("tick");

        assert_eq!(driver.reassigned_last_tick(), 0);
        assert!(driver.frames().iter().all(|f| !f.changed_this_tick));
        assert_eq!(
            driver.entities().iter().filter(|e| e.slot.is_some()).count(),
            config.population
        );
    }
}

#[test]
fn same_seed_reproduces_the_run() {
    let config = RunConfig {
        population: 500,
        slots: 32,
        seed: 1337,
        ..RunConfig::default()
    };
    let mut first = PoolDriver::new(&config).expect("valid config");
    let mut second = PoolDriver::new(&config).expect("valid config");
    let frustum = Frustum::from_aabb(Vec3::splat(-30.0), Vec3::splat(30.0));

    for step in 0..4u32 {
        let observer = Vec3::new(0.0, 0.0, step as f32 * 5.0);
        first.tick(step as f32 * 0.02, 0.02, observer, frustum).expect("tick");
        second.tick(step as f32 * 0.02, 0.02, observer, frustum).expect("tick");
    }
    assert_eq!(first.frames(), second.frames());
}

#[test]
fn degenerate_configuration_is_fatal() {
    let zero_population = RunConfig { population: 0, ..RunConfig::default() };
    assert!(matches!(
        PoolDriver::new(&zero_population),
        Err(CoreError::Config(_))
    ));

    let zero_slots = RunConfig { slots: 0, ..RunConfig::default() };
    assert!(matches!(PoolDriver::new(&zero_slots), Err(CoreError::Config(_))));

    let inverted_bounds = RunConfig {
        bounds_min: [10.0, 0.0, 0.0],
        bounds_max: [-10.0, 1.0, 1.0],
        ..RunConfig::default()
    };
    assert!(matches!(
        PoolDriver::new(&inverted_bounds),
        Err(CoreError::Config(_))
    ));
}
