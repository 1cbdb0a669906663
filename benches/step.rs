use cell_list::particle::seeded_particles;
use cell_list::physics::migration::MigrationStrategy;
use cell_list::physics::reference::brute_force_accelerations;
use cell_list::physics::PhysicsSettings;
use cell_list::{ParallelScheduler, RunOptions, Scheduler, SerialScheduler, Simulation};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;

const SEED: u64 = 42;

fn seeded_sim(n: usize) -> Simulation {
    let physics = PhysicsSettings::default();
    let side = physics.domain_side(n);
    Simulation::new(seeded_particles(n, side, Some(SEED)), side, physics)
        .expect("seeded particles lie inside the domain")
}

fn ten_steps() -> RunOptions {
    RunOptions {
        steps: 10,
        save_frequency: 10,
        verify: false,
    }
}

/// Serial and parallel schedulers over growing particle counts
fn bench_step_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_scaling");
    group.measurement_time(Duration::from_secs(10));
    let options = ten_steps();

    for &n in &[1_000, 10_000, 50_000] {
        group.throughput(Throughput::Elements((n * options.steps) as u64));

        group.bench_with_input(BenchmarkId::new("serial", n), &n, |b, &n| {
            let mut sim = seeded_sim(n);
            b.iter(|| SerialScheduler.run(black_box(&mut sim), &options, None).unwrap());
        });

        let threads = num_cpus::get().max(2);
        for strategy in [MigrationStrategy::Locked, MigrationStrategy::Deferred] {
            let scheduler = ParallelScheduler::new(threads, strategy).unwrap();
            let id = BenchmarkId::new(format!("parallel_{strategy:?}").to_lowercase(), n);
            group.bench_with_input(id, &n, |b, &n| {
                let mut sim = seeded_sim(n);
                b.iter(|| scheduler.run(black_box(&mut sim), &options, None).unwrap());
            });
        }
    }
    group.finish();
}

/// Thread scaling at a fixed size
fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    group.sample_size(20);
    let options = ten_steps();
    let n = 20_000;

    for threads in [1, 2, 4, 8] {
        let scheduler = ParallelScheduler::new(threads, MigrationStrategy::Locked).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, _| {
            let mut sim = seeded_sim(n);
            b.iter(|| scheduler.run(black_box(&mut sim), &options, None).unwrap());
        });
    }
    group.finish();
}

/// One force evaluation: cell list against the O(n^2) reference
fn bench_force_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("force_evaluation");
    let physics = PhysicsSettings::default();

    for &n in &[500, 2_000] {
        let side = physics.domain_side(n);
        let particles = seeded_particles(n, side, Some(SEED));

        group.bench_with_input(BenchmarkId::new("brute_force", n), &particles, |b, particles| {
            b.iter(|| brute_force_accelerations(black_box(particles), &physics));
        });

        group.bench_with_input(BenchmarkId::new("cell_list", n), &particles, |b, particles| {
            let options = RunOptions {
                steps: 1,
                save_frequency: 1,
                verify: false,
            };
            b.iter_batched(
                || Simulation::new(particles.clone(), side, physics.clone()).unwrap(),
                |mut sim| SerialScheduler.run(&mut sim, &options, None).unwrap(),
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_step_scaling,
    bench_thread_scaling,
    bench_force_evaluation
);
criterion_main!(benches);
