//! Rendezvous round latency benchmarks.
//!
//! Measures the cost of a single-party tick (no rendezvous) and of a full
//! two-party lockstep round against the simulated world.

use criterion::{Criterion, criterion_group, criterion_main};
use simhal::drivers::simulation::SimulatedWorld;
use simhal::{StepBarrier, StepCoordinator};
use simhal_common::config::SimulationConfig;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

fn simulated_coordinator() -> Arc<StepCoordinator> {
    let world = SimulatedWorld::from_config(&SimulationConfig::default()).expect("world");
    Arc::new(StepCoordinator::new(Box::new(world)))
}

fn bench_single_party_tick(c: &mut Criterion) {
    let coordinator = simulated_coordinator();

    c.bench_function("single_party_drive_one_tick", |b| {
        b.iter(|| black_box(coordinator.drive_one_tick()));
    });
}

fn bench_single_party_barrier(c: &mut Criterion) {
    let barrier = StepBarrier::new(1);

    c.bench_function("single_party_barrier_arrive", |b| {
        b.iter(|| black_box(barrier.arrive()));
    });
}

fn bench_two_party_round(c: &mut Criterion) {
    let coordinator = simulated_coordinator();
    coordinator.set_party_count(2).expect("set parties");

    let follower = {
        let coordinator = Arc::clone(&coordinator);
        thread::spawn(move || while coordinator.wait_until_next_tick() {})
    };

    c.bench_function("two_party_lockstep_round", |b| {
        b.iter(|| black_box(coordinator.drive_one_tick()));
    });

    coordinator.shutdown().expect("shutdown");
    follower.join().expect("follower");
}

criterion_group!(
    benches,
    bench_single_party_tick,
    bench_single_party_barrier,
    bench_two_party_round
);
criterion_main!(benches);
