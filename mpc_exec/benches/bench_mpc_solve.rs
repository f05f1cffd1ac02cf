//! # MPC Solve Benchmark

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Point2;
use std::sync::Arc;

use mpc_lib::mpc::{Actuation, Mpc, MpcInput, Params};

fn mpc_solve_benchmark(c: &mut Criterion) {
    // ---- Build a cycle on a curving reference ----

    let mut params = Params::default();
    params.solver.max_solve_time_s = 10.0;

    let mut mpc = Mpc::new(Arc::new(params)).unwrap();

    let ptsx: Vec<f64> = (0..8).map(|i| -5.0 + 5.0 * i as f64).collect();
    let ptsy: Vec<f64> = ptsx.iter().map(|x| 0.02 * x * x).collect();

    let input = MpcInput {
        ptsx: &ptsx,
        ptsy: &ptsy,
        position: Point2::new(0.0, -1.0),
        heading_rad: 0.05,
        speed: 20.0,
        current: Actuation {
            steer_rad: -0.1,
            throttle: 0.3,
        },
    };

    // ---- Benchmark ----

    c.bench_function("mpc_solve", |b| b.iter(|| mpc.solve(&input)));
}

criterion_group!(benches, mpc_solve_benchmark);
criterion_main!(benches);
