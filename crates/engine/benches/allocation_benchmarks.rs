use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use stockroom_allocation::{ReturnOutcome, ShippingMode};
use stockroom_catalog::ControlMode;
use stockroom_core::{ActorId, ConsumerId};
use stockroom_engine::{HistoryQuery, InventoryEngine, NewMaterial};

fn quantity_material(engine: &InventoryEngine, initial: u64) -> stockroom_catalog::MaterialId {
    engine
        .add_material(
            NewMaterial {
                name: "Folding Chair".to_string(),
                category: "Furniture".to_string(),
                unit_value: 2_500,
                control_mode: ControlMode::Quantity,
                initial_units: initial,
                location: "warehouse A".to_string(),
            },
            ActorId::new(),
        )
        .unwrap()
}

fn bench_reserve_latency(c: &mut Criterion) {
    stockroom_observability::init();

    let mut group = c.benchmark_group("reserve_latency");
    group.sample_size(1000);

    group.bench_function("reserve_then_cancel", |b| {
        let engine = InventoryEngine::new();
        let material_id = quantity_material(&engine, 1_000);
        let consumer_id = ConsumerId::new();
        let actor = ActorId::new();

        b.iter(|| {
            let allocation_id = engine
                .reserve(
                    material_id,
                    consumer_id,
                    black_box(5),
                    ShippingMode::WithStaff,
                    actor,
                )
                .unwrap();
            engine.cancel_allocation(allocation_id, actor).unwrap();
        });
    });

    group.bench_function("reserve_then_return", |b| {
        let engine = InventoryEngine::new();
        let material_id = quantity_material(&engine, 1_000);
        let consumer_id = ConsumerId::new();
        let actor = ActorId::new();

        b.iter(|| {
            let allocation_id = engine
                .reserve(
                    material_id,
                    consumer_id,
                    black_box(5),
                    ShippingMode::WithStaff,
                    actor,
                )
                .unwrap();
            engine
                .return_allocation(allocation_id, ReturnOutcome::ReturnedOk, 5, actor)
                .unwrap();
        });
    });

    group.finish();
}

fn bench_history_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_query");

    for trail_len in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*trail_len as u64));
        group.bench_with_input(
            BenchmarkId::new("query_by_material", trail_len),
            trail_len,
            |b, &len| {
                let engine = InventoryEngine::new();
                let material_id = quantity_material(&engine, len as u64 * 10);
                let consumer_id = ConsumerId::new();
                let actor = ActorId::new();
                for _ in 0..len {
                    let allocation_id = engine
                        .reserve(material_id, consumer_id, 1, ShippingMode::WithStaff, actor)
                        .unwrap();
                    engine
                        .return_allocation(allocation_id, ReturnOutcome::ReturnedOk, 1, actor)
                        .unwrap();
                }

                let query = HistoryQuery {
                    material_id: Some(material_id),
                    ..Default::default()
                };
                b.iter(|| black_box(engine.query_history(&query).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_reserve_latency, bench_history_query);
criterion_main!(benches);
