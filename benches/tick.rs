use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use siegesim::prelude::*;
use std::time::Duration;

fn flooded(targets: usize, attackers: u32) -> Simulation {
    let config = SimConfig {
        num_attackers: attackers,
        attack_start_ms: Some(0.0),
        ..SimConfig::default()
            .with_seed(1)
            .with_targets(targets, 10)
            .with_load_balancing()
    };
    let mut sim = Simulation::new(config);
    sim.start();
    // Fill the lanes before measuring
    for _ in 0..200 {
        sim.tick(16.0);
    }
    sim
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for (targets, attackers) in [(1, 1), (4, 8), (8, 32)] {
        group.bench_function(format!("{}x{}", targets, attackers), |b| {
            b.iter_batched_ref(
                || flooded(targets, attackers),
                |sim| {
                    for _ in 0..60 {
                        sim.tick(black_box(16.0));
                    }
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_headless_run(c: &mut Criterion) {
    c.bench_function("headless_30s_ddos", |b| {
        b.iter(|| {
            let config = SimConfig::default().with_seed(7).with_duration(Duration::from_secs(30));
            black_box(Simulation::new(config).run_headless())
        })
    });
}

criterion_group!(benches, bench_tick, bench_headless_run);
criterion_main!(benches);
