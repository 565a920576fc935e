use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use rust_decimal_macros::dec;
use supplyledger_core::{
    Money, OperationContext, ProductId, Quantity, ReasonId, UserId, VehicleId, WarehouseId,
};
use supplyledger_infra::{EngineConfig, InMemoryLedgerStore, LedgerEngine};
use supplyledger_transfers::{ReasonPurpose, TransferRequest, WithdrawalReason};
use supplyledger_withdrawals::{ItemUpdate, Vehicle};

type Engine = LedgerEngine<InMemoryLedgerStore>;

/// Engine with one stocked warehouse product and one open vehicle.
fn setup_withdrawals() -> (Engine, OperationContext, WarehouseId, ProductId, VehicleId) {
    let engine = LedgerEngine::in_memory(&EngineConfig::default());
    let ctx = OperationContext::now(UserId::new());
    let (warehouse, product, vehicle) = (WarehouseId::new(), ProductId::new(), VehicleId::new());
    engine
        .stock_in(
            &ctx,
            warehouse,
            product,
            Quantity::new(dec!(1000000)).unwrap(),
            Money::new(dec!(7654321.123456)).unwrap(),
        )
        .unwrap();
    engine.open_consignment::<Vehicle>(&ctx, vehicle).unwrap();
    (engine, ctx, warehouse, product, vehicle)
}

fn bench_withdrawal_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("withdrawal_latency");
    group.sample_size(1000);

    // Withdraw and fully return one line: the warehouse ends where it started.
    group.bench_function("add_then_remove_item", |b| {
        let (engine, ctx, warehouse, product, vehicle) = setup_withdrawals();
        let quantity = Quantity::new(dec!(3.25)).unwrap();
        b.iter(|| {
            let item = engine
                .add_item::<Vehicle>(&ctx, vehicle, warehouse, product, black_box(quantity))
                .unwrap();
            engine
                .update_item::<Vehicle>(
                    &ctx,
                    vehicle,
                    item.id,
                    ItemUpdate {
                        new_quantity: Some(Quantity::ZERO),
                        new_total_cost: None,
                    },
                )
                .unwrap();
        });
    });

    group.bench_function("reprice_item", |b| {
        let (engine, ctx, warehouse, product, vehicle) = setup_withdrawals();
        let item = engine
            .add_item::<Vehicle>(&ctx, vehicle, warehouse, product, Quantity::new(dec!(10)).unwrap())
            .unwrap();
        let (low, high) = (Money::new(dec!(70)).unwrap(), Money::new(dec!(80)).unwrap());
        let mut flip = false;
        b.iter(|| {
            flip = !flip;
            let total = if flip { high } else { low };
            engine
                .update_item::<Vehicle>(
                    &ctx,
                    vehicle,
                    item.id,
                    ItemUpdate {
                        new_quantity: None,
                        new_total_cost: Some(black_box(total)),
                    },
                )
                .unwrap();
        });
    });

    group.finish();
}

fn bench_consignment_return(c: &mut Criterion) {
    let mut group = c.benchmark_group("consignment_return");

    for item_count in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*item_count as u64));
        group.bench_with_input(
            BenchmarkId::new("delete_consignment", item_count),
            item_count,
            |b, &count| {
                b.iter_batched(
                    || {
                        let (engine, ctx, warehouse, product, vehicle) = setup_withdrawals();
                        for _ in 0..count {
                            engine
                                .add_item::<Vehicle>(&ctx, vehicle, warehouse, product, Quantity::new(dec!(1)).unwrap())
                                .unwrap();
                        }
                        (engine, ctx, vehicle)
                    },
                    |(engine, ctx, vehicle)| {
                        black_box(engine.delete_consignment::<Vehicle>(&ctx, vehicle).unwrap());
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_transfer_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_round_trip");

    group.bench_function("transfer_then_delete", |b| {
        let (engine, ctx, warehouse, product, _) = setup_withdrawals();
        let reason_id = ReasonId::new();
        engine
            .register_reason(WithdrawalReason::new(reason_id, "regrade", ReasonPurpose::Both))
            .unwrap();
        let target = ProductId::new();
        b.iter(|| {
            let transfer = engine
                .transfer(
                    &ctx,
                    TransferRequest {
                        warehouse_id: warehouse,
                        from_product: product,
                        to_product: target,
                        quantity: black_box(Quantity::new(dec!(12.5)).unwrap()),
                        reason_id,
                        description: None,
                    },
                )
                .unwrap();
            engine.delete_transfer(&ctx, transfer.id).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_withdrawal_latency,
    bench_consignment_return,
    bench_transfer_round_trip
);
criterion_main!(benches);
