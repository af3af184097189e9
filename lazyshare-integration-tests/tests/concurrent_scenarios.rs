//! Many tasks on a multi-threaded runtime racing on the same resource.

use std::time::Duration;

use futures::future::join_all;
use lazyshare::testing::prelude::*;
use lazyshare::{SharedResource, SharedStatus};
use proptest::prelude::*;
use rand::Rng;

async fn churn(shared: SharedResource<ScriptedFactory>, rounds: usize) {
    for _ in 0..rounds {
        let mut handle = shared.open().await.unwrap();
        assert_eq!(handle.value().unwrap().id, handle.generation());

        let pause = rand::rng().random_range(0..4);
        for _ in 0..pause {
            tokio::task::yield_now().await;
        }
        handle.close().await.unwrap();
    }
}

fn assert_quiescent(shared: &SharedResource<ScriptedFactory>) {
    let factory = shared.factory();
    let stats = shared.stats();

    assert!(shared.status().is_closed());
    assert_eq!(stats.outstanding(), 0);
    assert_eq!(factory.opens(), factory.closes());
    assert_eq!(stats.generations_started, factory.opens());
    assert_eq!(stats.teardowns, factory.closes());

    // Every generation was closed exactly once.
    let mut closed = factory.closed_ids();
    closed.sort_unstable();
    let expected: Vec<u64> = (1..=factory.opens()).collect();
    assert_eq!(closed, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn open_close_churn_keeps_refcounts_balanced() {
    let shared = SharedResource::new(ScriptedFactory::new());

    let workers: Vec<_> = (0..32)
        .map(|_| tokio::spawn(churn(shared.clone(), 50)))
        .collect();
    for worker in join_all(workers).await {
        worker.unwrap();
    }

    assert_quiescent(&shared);
    assert!(shared.stats().handles_issued >= 32 * 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn burst_behind_a_slow_open_opens_once() {
    let shared = SharedResource::new(ScriptedFactory::gated());

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let shared = shared.clone();
            tokio::spawn(async move { shared.open().await })
        })
        .collect();

    tokio::time::timeout(Duration::from_secs(5), async {
        while shared.status()
            != (SharedStatus::Opening {
                generation: 1,
                waiters: 100,
            })
        {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    shared.factory().release_open();
    let mut handles = Vec::with_capacity(100);
    for task in join_all(tasks).await {
        handles.push(task.unwrap().unwrap());
    }
    assert_eq!(shared.factory().opens(), 1);

    let closers: Vec<_> = handles
        .into_iter()
        .map(|mut handle| tokio::spawn(async move { handle.close().await }))
        .collect();
    for closer in join_all(closers).await {
        closer.unwrap().unwrap();
    }

    assert_quiescent(&shared);
    assert_eq!(shared.factory().closes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clones_share_one_lifecycle() {
    let shared = SharedResource::new(ScriptedFactory::new());
    let clone = shared.clone();

    let mut first = shared.open().await.unwrap();
    let mut second = clone.open().await.unwrap();
    assert_eq!(first.generation(), second.generation());

    first.close().await.unwrap();
    second.close().await.unwrap();
    assert_eq!(clone.factory().closes(), 1);
    assert_eq!(shared.status(), clone.status());
    assert_eq!(shared.stats(), clone.stats());
}

#[test]
fn prop_contention_never_leaks_or_double_closes() {
    proptest!(ProptestConfig::with_cases(16), |(tasks in 1_usize..12, rounds in 1_usize..20)| {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(3)
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let shared = SharedResource::new(ScriptedFactory::new());
            let workers: Vec<_> = (0..tasks)
                .map(|_| tokio::spawn(churn(shared.clone(), rounds)))
                .collect();
            for worker in join_all(workers).await {
                worker.unwrap();
            }
            assert_quiescent(&shared);
        });
    });
}
