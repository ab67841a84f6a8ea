// Run:
//   cargo test --test pipeline -- --nocapture

use glam::Vec3;

use crowd_pool::engine::random::SeededRng;
use crowd_pool::{
    AccessSets, BufferId, BufferRegistry, CoreError, Execution, FnStage, Frustum, Pipeline,
    PipelineError, PoolDriver, RunConfig, TickInputs,
};

const BUFFER_NAMES: [&str; 8] = ["b0", "b1", "b2", "b3", "b4", "b5", "b6", "b7"];
const STAGE_NAMES: [&str; 12] = [
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11",
];
const BUFFER_LEN: usize = 4096;

fn inputs(tick: u64) -> TickInputs {
    TickInputs {
        tick,
        time: tick as f32 * 0.016,
        delta_time: 0.016,
        observer: Vec3::ZERO,
        frustum: Frustum::from_aabb(Vec3::splat(-1.0), Vec3::splat(1.0)),
    }
}

/// Builds a pipeline over `buffer_count` u64 buffers with `stage_count`
/// randomly wired stages. Every stage writes one target buffer with a value
/// derived from its reads; readers assert their sources are internally
/// uniform, which a mid-flight write would break.
fn build_random_graph(seed: u64, execution: Execution, buffer_count: usize, stage_count: usize) -> Pipeline {
    let mut rng = SeededRng::new(seed);
    let mut registry = BufferRegistry::new();
    let buffers: Vec<BufferId> = (0..buffer_count)
        .map(|index| {
            registry
                .register(BUFFER_NAMES[index], vec![index as u64; BUFFER_LEN])
                .expect("unique buffer name")
        })
        .collect();

    let mut pipeline = Pipeline::new(registry, execution);
    for stage_index in 0..stage_count {
        let target = buffers[(rng.next_u64() % buffer_count as u64) as usize];
        let mut reads = Vec::new();
        for _ in 0..(rng.next_u64() % 3) {
            let source = buffers[(rng.next_u64() % buffer_count as u64) as usize];
            if source != target && !reads.contains(&source) {
                reads.push(source);
            }
        }

        let access = AccessSets::new(&reads, &[target]);
        let stage_value = (stage_index as u64 + 1) * 1_000_003;
        pipeline
            .register(Box::new(FnStage::new(
                STAGE_NAMES[stage_index],
                access,
                move |ctx, tick_inputs| {
                    let mut acc = stage_value.wrapping_add(tick_inputs.tick);
                    for &source in &reads {
                        let view = ctx.read::<u64>(source)?;
                        let first = view[0];
                        assert!(
                            view.iter().all(|&value| value == first),
                            "non-uniform source buffer: a write was observed mid-flight"
                        );
                        acc = acc.wrapping_mul(31).wrapping_add(first);
                    }
                    let mut out = ctx.write::<u64>(target)?;
                    for value in out.iter_mut() {
                        *value = acc;
                    }
                    Ok(())
                },
            )))
            .expect("valid stage");
    }
    pipeline
}

fn buffer_snapshot(pipeline: &Pipeline, buffer_count: usize) -> Vec<u64> {
    (0..buffer_count)
        .map(|index| {
            pipeline
                .registry()
                .read_idle::<u64>(index as BufferId)
                .expect("u64 buffer")[0]
        })
        .collect()
}

#[test]
fn random_graphs_are_sound_and_deterministic() {
    for seed in 1..=20u64 {
        let buffer_count = 4 + (seed as usize % 5);
        let stage_count = 3 + (seed as usize % 10);

        let mut parallel = build_random_graph(seed, Execution::Parallel, buffer_count, stage_count);
        let mut inline = build_random_graph(seed, Execution::Inline, buffer_count, stage_count);

        for tick in 0..5u64 {
            parallel.run_tick(&inputs(tick)).expect("parallel tick");
            inline.run_tick(&inputs(tick)).expect("inline tick");
            assert_eq!(
                buffer_snapshot(&parallel, buffer_count),
                buffer_snapshot(&inline, buffer_count),
                "parallel execution diverged from the serial reference (seed {seed}, tick {tick})"
            );
        }
    }
}

#[test]
fn write_is_visible_to_every_later_reader() {
    let mut registry = BufferRegistry::new();
    let source = registry.register("source", vec![0u64; 64]).expect("register");
    let left = registry.register("left", vec![0u64; 64]).expect("register");
    let right = registry.register("right", vec![0u64; 64]).expect("register");

    let mut pipeline = Pipeline::new(registry, Execution::Parallel);
    pipeline
        .register(Box::new(FnStage::new(
            "writer",
            AccessSets::new(&[], &[source]),
            move |ctx, _| {
                let mut out = ctx.write::<u64>(source)?;
                for value in out.iter_mut() {
                    *value = 42;
                }
                Ok(())
            },
        )))
        .expect("register writer");

    // Two independent readers; they may run concurrently with each other but
    // both must observe the completed write.
    for (name, target) in [("copy_left", left), ("copy_right", right)] {
        pipeline
            .register(Box::new(FnStage::new(
                name,
                AccessSets::new(&[source], &[target]),
                move |ctx, _| {
                    let input = ctx.read::<u64>(source)?;
                    let mut out = ctx.write::<u64>(target)?;
                    for (out_value, in_value) in out.iter_mut().zip(input.iter()) {
                        *out_value = *in_value;
                    }
                    Ok(())
                },
            )))
            .expect("register reader");
    }

    pipeline.run_tick(&inputs(0)).expect("tick");
    for id in [left, right] {
        let values = pipeline.registry().read_idle::<u64>(id).expect("u64 buffer");
        assert!(values.iter().all(|&value| value == 42));
    }
}

#[test]
fn barrier_returns_buffers_to_idle() {
    let mut registry = BufferRegistry::new();
    let data = registry.register("data", vec![0u64; 8]).expect("register");
    let mut pipeline = Pipeline::new(registry, Execution::Inline);
    pipeline
        .register(Box::new(FnStage::new(
            "touch",
            AccessSets::new(&[], &[data]),
            move |ctx, _| {
                let mut out = ctx.write::<u64>(data)?;
                out[0] += 1;
                Ok(())
            },
        )))
        .expect("register");

    assert!(pipeline.is_idle());
    pipeline.dispatch(&inputs(0)).expect("dispatch");
    assert!(
        !pipeline.is_idle(),
        "handles stay outstanding until the barrier"
    );
    pipeline.barrier();
    assert!(pipeline.is_idle());

    // A second tick resolves from a clean slate.
    pipeline.run_tick(&inputs(1)).expect("second tick");
    assert!(pipeline.is_idle());
    assert_eq!(pipeline.registry().read_idle::<u64>(data).expect("u64")[0], 2);
}

#[test]
fn declaring_read_and_write_of_one_buffer_is_rejected() {
    let mut registry = BufferRegistry::new();
    let data = registry.register("data", vec![0u64; 8]).expect("register");
    let mut pipeline = Pipeline::new(registry, Execution::Inline);

    let result = pipeline.register(Box::new(FnStage::new(
        "overlapping",
        AccessSets::new(&[data], &[data]),
        move |_, _| Ok(()),
    )));
    assert!(matches!(
        result,
        Err(CoreError::Pipeline(PipelineError::ReadWriteOverlap { .. }))
    ));
}

#[test]
fn duplicate_buffer_names_are_rejected() {
    let mut registry = BufferRegistry::new();
    registry.register("twice", vec![0u64; 8]).expect("first registration");
    assert!(matches!(
        registry.register("twice", vec![0u64; 8]),
        Err(PipelineError::DuplicateBuffer { name: "twice" })
    ));
}

#[test]
fn worker_count_does_not_change_results() {
    let base = RunConfig {
        population: 2_000,
        slots: 150,
        seed: 77,
        ..RunConfig::default()
    };
    let single = RunConfig { workers: Some(1), ..base.clone() };
    let many = RunConfig { workers: Some(8), ..base.clone() };
    let inline = RunConfig { execution: Execution::Inline, ..base.clone() };

    let mut drivers = [
        PoolDriver::new(&single).expect("single-worker driver"),
        PoolDriver::new(&many).expect("many-worker driver"),
        PoolDriver::new(&inline).expect("inline driver"),
    ];

    let frustum = Frustum::from_aabb(Vec3::splat(-20.0), Vec3::splat(20.0));
    for step in 0..6u32 {
        let observer = Vec3::new(step as f32 * 7.0 - 21.0, 1.0, -3.0);
        for driver in &mut drivers {
            driver
                .tick(step as f32 * 0.016, 0.016, observer, frustum)
                .expect("tick");
        }
        let [reference, other, serial] = &drivers;
        assert_eq!(
            reference.frames(),
            other.frames(),
            "worker-pool size changed the results"
        );
        assert_eq!(
            reference.frames(),
            serial.frames(),
            "inline fallback diverged from parallel execution"
        );
    }
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "undeclared")]
fn undeclared_access_asserts_in_debug_builds() {
    let mut registry = BufferRegistry::new();
    let data = registry.register("data", vec![0u64; 8]).expect("register");
    let mut pipeline = Pipeline::new(registry, Execution::Inline);
    pipeline
        .register(Box::new(FnStage::new(
            "rogue",
            AccessSets::default(),
            move |ctx, _| {
                let _ = ctx.read::<u64>(data)?;
                Ok(())
            },
        )))
        .expect("register");
    let _ = pipeline.run_tick(&inputs(0));
}
