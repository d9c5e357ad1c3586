//! Per-tick update benchmark for a mid-size freight consist.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use railmotive::{parse_definition, Direction, Train, DEFAULT_PIPE_CHARGING_RATE_PSI_PER_S};

const LOCO_DEF: &str = "
    wagon ( mass ( 120t ) davis_a ( 1200 ) davis_b ( 60 ) davis_c ( 10 ) maxbrakeforce ( 90kN ) )
    engine (
        maxpower ( 2000kW )
        maxforce ( 300kN )
        maxvelocity ( 40 )
        enginecontrollers (
            throttle ( 0.125 0 notch ( 0 ) notch ( 0.5 ) notch ( 1 ) )
            brake_train ( 0.1 0 notch ( 0 ) notch ( 0.5 ) notch ( 1 ) )
        )
    )
";

const WAGON_DEF: &str =
    "wagon ( mass ( 40t ) davis_a ( 600 ) davis_b ( 30 ) davis_c ( 4 ) maxbrakeforce ( 60kN ) )";

fn build_train(wagons: usize) -> Train {
    let loco = parse_definition(LOCO_DEF).unwrap();
    let wagon = parse_definition(WAGON_DEF).unwrap();
    let mut train = Train::new(DEFAULT_PIPE_CHARGING_RATE_PSI_PER_S);
    train.add_car(loco.build(30.0));
    for i in 0..wagons {
        train.add_car(wagon.build(25.0 / (1.0 + i as f32 * 0.4)));
    }
    train.set_direction(0, Direction::Forward);
    for _ in 0..4 {
        train.increase_throttle(0, 0.05);
    }
    train
}

fn bench_tick(c: &mut Criterion) {
    let mut train = build_train(20);
    c.bench_function("train_update_21_cars", |b| {
        b.iter(|| train.update(black_box(0.05)));
    });
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
