use criterion::*;
use std::hint::black_box;

use glam::Vec3;

use crowd_pool::{Execution, Frustum, PoolDriver, RunConfig};

fn frustum() -> Frustum {
    Frustum::from_aabb(Vec3::new(-25.0, -60.0, -60.0), Vec3::new(25.0, 60.0, 60.0))
}

fn tick_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    group.sample_size(20);

    group.bench_function("tick_100k_pool_3k_parallel", |b| {
        let config = RunConfig::default();
        let mut driver = PoolDriver::new(&config).expect("valid config");
        let mut step = 0u32;
        b.iter(|| {
            let time = step as f32 * 0.016;
            let observer = Vec3::new((time * 0.5).sin() * 40.0, 0.0, 0.0);
            driver
                .tick(time, 0.016, observer, frustum())
                .expect("tick");
            step += 1;
            black_box(driver.reassigned_last_tick())
        })
    });

    group.bench_function("tick_100k_pool_3k_inline", |b| {
        let config = RunConfig {
            execution: Execution::Inline,
            ..RunConfig::default()
        };
        let mut driver = PoolDriver::new(&config).expect("valid config");
        let mut step = 0u32;
        b.iter(|| {
            let time = step as f32 * 0.016;
            let observer = Vec3::new((time * 0.5).sin() * 40.0, 0.0, 0.0);
            driver
                .tick(time, 0.016, observer, frustum())
                .expect("tick");
            step += 1;
            black_box(driver.reassigned_last_tick())
        })
    });

    group.finish();
}

criterion_group!(benches, tick_benchmark);
criterion_main!(benches);
