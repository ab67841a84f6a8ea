// Run:
//   cargo test --test flavor -- --nocapture

use glam::{Quat, Vec3};

use crowd_pool::engine::animate::{position_offset, rotation_step};
use crowd_pool::{Execution, FlavorParams, Frustum, PoolDriver, RunConfig};

fn wide_open() -> Frustum {
    Frustum::from_aabb(Vec3::splat(-1000.0), Vec3::splat(1000.0))
}

#[test]
fn composed_frames_equal_base_plus_offset() {
    let config = RunConfig {
        population: 64,
        slots: 16,
        execution: Execution::Inline,
        seed: 3,
        ..RunConfig::default()
    };
    let mut driver = PoolDriver::new(&config).expect("valid config");
    let buffers = *driver.buffers();

    // Snapshot the seeded initial offset rotations before any tick runs.
    let initial_rotations: Vec<Quat> = driver
        .registry()
        .read_idle::<Quat>(buffers.offset_rotations)
        .expect("quat buffer")
        .to_vec();

    let time = 1.75;
    let delta_time = 0.016;
    driver
        .tick(time, delta_time, Vec3::ZERO, wide_open())
        .expect("tick");

    let params: Vec<FlavorParams> = driver
        .registry()
        .read_idle::<FlavorParams>(buffers.params)
        .expect("params buffer")
        .to_vec();
    let base_positions: Vec<Vec3> = driver
        .registry()
        .read_idle::<Vec3>(buffers.base_positions)
        .expect("vec3 buffer")
        .to_vec();

    for (slot, frame) in driver.frames().iter().enumerate() {
        let expected_position = base_positions[slot] + position_offset(&params[slot], time);
        assert_eq!(frame.position, expected_position, "slot {slot} position");

        // Base rotations are identity, so the composed rotation is exactly
        // the accumulated offset: one step applied to the seeded initial yaw.
        let expected_rotation = initial_rotations[slot] * rotation_step(&params[slot], delta_time);
        assert_eq!(frame.rotation, expected_rotation, "slot {slot} rotation");
    }
}

#[test]
fn disabled_animation_keeps_the_pose_fixed() {
    let config = RunConfig {
        population: 40,
        slots: 8,
        execution: Execution::Inline,
        oscillation_height: 0.0,
        rotation_speed: 0.0,
        seed: 11,
        ..RunConfig::default()
    };
    let mut driver = PoolDriver::new(&config).expect("valid config");

    driver.tick(0.0, 0.016, Vec3::ZERO, wide_open()).expect("tick");
    let first: Vec<_> = driver.frames().to_vec();

    for step in 1..5u32 {
        driver
            .tick(step as f32 * 0.016, 0.016, Vec3::ZERO, wide_open())
            .expect("tick");
    }

    for (frame, initial) in driver.frames().iter().zip(&first) {
        assert_eq!(frame.position, initial.position, "oscillation is disabled");
        assert_eq!(frame.rotation, initial.rotation, "yaw is disabled");
    }
}

#[test]
fn frames_report_visibility_of_the_assigned_entity() {
    let config = RunConfig {
        population: 100,
        slots: 10,
        execution: Execution::Inline,
        seed: 21,
        bounds_min: [-50.0, -1.0, -1.0],
        bounds_max: [50.0, 1.0, 1.0],
        ..RunConfig::default()
    };
    let mut driver = PoolDriver::new(&config).expect("valid config");

    // Only the +x half of the spawn volume is in view.
    let frustum = Frustum::from_aabb(Vec3::new(0.0, -10.0, -10.0), Vec3::new(60.0, 10.0, 10.0));
    driver.tick(0.0, 0.016, Vec3::new(25.0, 0.0, 0.0), frustum).expect("tick");

    let radius = config.bounding_radius;
    let entities = driver.entities();
    for entity in entities.iter().filter(|e| e.slot.is_some()) {
        let frame = driver.frames()[entity.slot.unwrap() as usize];
        assert_eq!(
            frame.visible,
            entity.position.x > -radius,
            "slot visibility must mirror the owning entity's frustum test"
        );
    }
}
