use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, TimeZone, Utc};
use courier_core::{BranchId, CompanyId, OrderId, StatusHistoryId, UserId};
use courier_infra::InMemoryOrderRepository;
use courier_orders::{
    DeliveryAddress, EngineConfig, NewOrder, Order, OrderLifecycleEngine, OrderQueryParams,
    OrderRepository, OrderStatus, PackageDetail, PickupAddress, StatusHistoryEntry,
    TrackingNumber, TrackingNumberGenerator,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

type Engine = OrderLifecycleEngine<Arc<InMemoryOrderRepository>>;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn engine() -> Engine {
    OrderLifecycleEngine::new(Arc::new(InMemoryOrderRepository::new()), EngineConfig::default())
        .unwrap()
}

fn new_order(company_id: CompanyId) -> NewOrder {
    let pickup = Utc.with_ymd_and_hms(2025, 5, 15, 14, 30, 0).unwrap();
    NewOrder {
        company_id: Some(company_id),
        branch_id: Some(BranchId::new()),
        client_id: Some(UserId::new()),
        price: 1_500,
        distance_meters: 4_000,
        pickup_time: Some(pickup),
        delivery_deadline: Some(pickup + Duration::hours(2)),
        package: Some(PackageDetail::default()),
        pickup_address: Some(PickupAddress {
            contact_name: "Jane Smith".to_string(),
            contact_phone: "+15550100".to_string(),
            address_line1: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            ..PickupAddress::default()
        }),
        delivery_address: Some(DeliveryAddress {
            recipient_name: "John Doe".to_string(),
            recipient_phone: "+15550101".to_string(),
            address_line1: "9 Elm St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            ..DeliveryAddress::default()
        }),
        ..NewOrder::default()
    }
}

/// Repository holding `count` orders of one company, inserted directly.
fn seeded_repository(rt: &Runtime, company_id: CompanyId, count: u32) -> Arc<InMemoryOrderRepository> {
    let repo = Arc::new(InMemoryOrderRepository::new());
    let base = Utc.with_ymd_and_hms(2025, 5, 15, 8, 0, 0).unwrap();

    rt.block_on(async {
        for n in 0..count {
            let id = OrderId::new();
            let initial = StatusHistoryEntry {
                id: StatusHistoryId::new(),
                order_id: id,
                status: OrderStatus::Pending,
                recorded_at: base + Duration::seconds(i64::from(n)),
            };
            let tracking = TrackingNumber::parse(format!("DEL-250515-{n:04}")).unwrap();
            let validated = new_order(company_id).validate().unwrap();
            repo.create_order(&Order::create(id, tracking, initial, validated))
                .await
                .unwrap();
        }
    });
    repo
}

fn bench_tracking_number_generation(c: &mut Criterion) {
    let generator = TrackingNumberGenerator::default();
    let now = Utc::now();

    c.bench_function("tracking_number_generate", |b| {
        b.iter(|| black_box(generator.generate(black_box(now))));
    });
}

fn bench_create_order_latency(c: &mut Criterion) {
    let rt = runtime();
    let company_id = CompanyId::new();

    // Fresh engine per iteration: tracking numbers are not retried on collision.
    c.bench_function("create_order_in_memory", |b| {
        b.iter_batched(
            engine,
            |engine| {
                rt.block_on(engine.create_order(new_order(company_id)))
                    .unwrap()
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_full_lifecycle(c: &mut Criterion) {
    let rt = runtime();

    c.bench_function("status_walk_pending_to_delivered", |b| {
        b.iter_batched(
            || {
                let engine = engine();
                let order = rt
                    .block_on(engine.create_order(new_order(CompanyId::new())))
                    .unwrap();
                (engine, order.id)
            },
            |(engine, id)| {
                rt.block_on(async {
                    for status in ["ACCEPTED", "PICKED_UP", "IN_TRANSIT", "DELIVERED"] {
                        engine.change_status(id, status).await.unwrap();
                    }
                })
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_company_listing(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("company_listing");

    for count in [100u32, 1_000, 5_000] {
        let company_id = CompanyId::new();
        let engine = OrderLifecycleEngine::new(
            seeded_repository(&rt, company_id, count),
            EngineConfig::default(),
        )
        .unwrap();
        let params = OrderQueryParams::new(Some(2), Some(20));

        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let page = rt
                    .block_on(engine.get_orders_by_company(company_id, &params))
                    .unwrap();
                black_box(page.total)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_tracking_number_generation,
    bench_create_order_latency,
    bench_full_lifecycle,
    bench_company_listing
);
criterion_main!(benches);
