use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use lazyshare::testing::scripted::ScriptedFactory;
use lazyshare::SharedResource;
use tokio::runtime::Runtime;

/// `tasks` tasks racing to open and close the same resource.
fn bench_concurrent_open_close(c: &mut Criterion) {
    lazyshare_benchmarks::init_logging();
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("concurrent_open_close");

    for tasks in [2_u64, 8, 32] {
        group.throughput(Throughput::Elements(tasks));
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            let shared = SharedResource::new(ScriptedFactory::new());
            b.to_async(&rt).iter(|| {
                let shared = shared.clone();
                async move {
                    let workers = (0..tasks).map(|_| {
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            let mut handle = shared.open().await.unwrap();
                            tokio::task::yield_now().await;
                            handle.close().await.unwrap();
                        })
                    });
                    for joined in join_all(workers).await {
                        joined.unwrap();
                    }
                }
            });
        });
    }

    group.finish();
}

/// Callers queued behind a single in-flight open.
fn bench_waiter_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("waiter_dispatch");

    for waiters in [16_u64, 256, 4096] {
        group.throughput(Throughput::Elements(waiters));
        group.bench_with_input(BenchmarkId::from_parameter(waiters), &waiters, |b, &waiters| {
            b.to_async(&rt).iter(|| async move {
                let shared = SharedResource::new(ScriptedFactory::gated());
                let pending: Vec<_> = (0..waiters).map(|_| shared.open()).collect();
                shared.factory().release_open();
                for handle in join_all(pending).await {
                    handle.unwrap().close().await.unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_concurrent_open_close, bench_waiter_dispatch);
criterion_main!(benches);
