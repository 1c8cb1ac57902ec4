//! Concurrency tests
//!
//! - concurrent submits over TCP are all counted
//! - config readers never see a torn config
//! - drains racing submits never lose or double count a log

use bytes::Bytes;
use mortal_server::storage::{Area, InMemoryLogStore, LogBatch, LogStore};
use mortal_server::{CoordinatorServer, RuntimeConfig, ServerConfig, ServerState, WorkerClient};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn batch(worker: usize, round: usize, n: usize) -> LogBatch {
    (0..n)
        .map(|i| {
            (
                format!("w{}_r{}_{}.json.gz", worker, round, i),
                Bytes::from_static(b"log"),
            )
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submits_over_tcp() {
    let store = InMemoryLogStore::new();
    let state = ServerState::with_seed(store.clone(), RuntimeConfig::default(), 3);
    let config = ServerConfig {
        port: 0,
        max_connections: 4,
        ..Default::default()
    };
    let listener = CoordinatorServer::bind(&config).await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = CoordinatorServer::new(state.clone(), &config);
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        server
            .run_until(listener, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    const WORKERS: usize = 16;
    const ROUNDS: usize = 5;
    const PER_BATCH: usize = 3;

    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let client = WorkerClient::new(addr.clone());
        handles.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                client
                    .submit_replay(batch(worker, round, PER_BATCH))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = (WORKERS * ROUNDS * PER_BATCH) as u64;
    assert_eq!(state.buffer_count(), total);
    assert_eq!(store.count(Area::Buffer) as u64, total);

    let _ = tx.send(());
    server_task.await.unwrap();
}

#[test]
fn test_config_reads_are_never_torn() {
    let a = RuntimeConfig::new(0.1, 0.1, 10);
    let state = ServerState::with_seed(InMemoryLogStore::new(), a, 1);
    let b = RuntimeConfig::new(0.9, 0.9, 90);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let state = state.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut reads = 0u64;
                while !done.load(Ordering::Relaxed) {
                    let seen = state.runtime_config();
                    assert!(seen == a || seen == b, "torn config: {:?}", seen);
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for i in 0..10_000 {
        state.set_config(if i % 2 == 0 { b } else { a }).unwrap();
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_drains_racing_submits_account_for_every_log() {
    let store = InMemoryLogStore::new();
    let state = ServerState::with_seed(store.clone(), RuntimeConfig::default(), 9);

    const SUBMITTERS: usize = 4;
    const ROUNDS: usize = 50;
    const PER_BATCH: usize = 2;

    let submitters: Vec<_> = (0..SUBMITTERS)
        .map(|worker| {
            let state = state.clone();
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    state.submit(&batch(worker, round, PER_BATCH)).unwrap();
                }
            })
        })
        .collect();

    let drainer = {
        let state = state.clone();
        thread::spawn(move || {
            let mut drained = 0usize;
            for _ in 0..100 {
                drained += state.drain().unwrap().count;
                thread::yield_now();
            }
            drained
        })
    };

    for submitter in submitters {
        submitter.join().unwrap();
    }
    let drained = drainer.join().unwrap();

    let total = SUBMITTERS * ROUNDS * PER_BATCH;
    assert_eq!(drained as u64 + state.buffer_count(), total as u64);
    assert_eq!(store.count(Area::Buffer) as u64, state.buffer_count());

    let final_drain = state.drain().unwrap();
    assert_eq!(drained + final_drain.count, total);
    assert_eq!(state.buffer_count(), 0);
    assert_eq!(store.list(Area::Buffer).unwrap().len(), 0);
}
