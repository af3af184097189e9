use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lazyshare::testing::scripted::ScriptedFactory;
use lazyshare::SharedResource;
use std::hint::black_box;
use tokio::runtime::Runtime;

/// One full generation: open, read, close.
fn bench_single_generation(c: &mut Criterion) {
    lazyshare_benchmarks::init_logging();
    let rt = Runtime::new().unwrap();
    let shared = SharedResource::new(ScriptedFactory::new());

    let mut group = c.benchmark_group("single_generation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("open_read_close", |b| {
        b.to_async(&rt).iter(|| async {
            let mut handle = shared.open().await.unwrap();
            black_box(handle.value().unwrap().id);
            handle.close().await.unwrap();
        });
    });

    group.finish();
}

/// Joining a resource that is already open, with `held` other handles live.
fn bench_join_open_resource(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("join_open_resource");
    group.throughput(Throughput::Elements(1));

    for held in [1_usize, 16, 256] {
        let shared = SharedResource::new(ScriptedFactory::new());
        let keep_alive: Vec<_> = rt.block_on(async {
            let mut handles = Vec::with_capacity(held);
            for _ in 0..held {
                handles.push(shared.open().await.unwrap());
            }
            handles
        });

        group.bench_with_input(BenchmarkId::from_parameter(held), &held, |b, _| {
            b.to_async(&rt).iter(|| async {
                let mut handle = shared.open().await.unwrap();
                handle.close().await.unwrap();
            });
        });

        rt.block_on(async {
            for mut handle in keep_alive {
                handle.close().await.unwrap();
            }
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_generation, bench_join_open_resource);
criterion_main!(benches);
