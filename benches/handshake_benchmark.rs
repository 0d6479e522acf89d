use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rendezvous::exchange::FileAddressStore;
use rendezvous::manager::ConnectionManager;
use rendezvous::transport::MemoryTransport;

use std::path::Path;
use std::time::Duration;

use tokio::runtime::Runtime;

const POLL: Duration = Duration::from_millis(1);

fn manager(
    transport: &MemoryTransport,
    directory: &Path,
) -> ConnectionManager<MemoryTransport, FileAddressStore> {
    ConnectionManager::new(transport.clone(), FileAddressStore::new(POLL), directory)
}

/// One acceptor rank and `requesters` fan-out requesters, from nothing to closed.
async fn establish_known_group(requesters: i32) {
    let directory = tempfile::tempdir().unwrap();
    let transport = MemoryTransport::new();

    let mut acceptor = manager(&transport, directory.path());
    let mut handles = vec![];
    for rank in 0..requesters {
        let mut requester = manager(&transport, directory.path());
        handles.push(tokio::spawn(async move {
            requester.connect_fanout("bench", "clients", vec![0], rank).await.unwrap();
            requester.close().await.unwrap();
        }));
    }

    acceptor.accept_known_group("bench", "clients", 0, requesters).await.unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
    acceptor.close().await.unwrap();
}

/// One acceptor and `requesters` single-target requesters declaring their group size.
async fn establish_unbounded(requesters: i32) {
    let directory = tempfile::tempdir().unwrap();
    let transport = MemoryTransport::new();

    let mut acceptor = manager(&transport, directory.path());
    let mut handles = vec![];
    for rank in 0..requesters {
        let mut requester = manager(&transport, directory.path());
        handles.push(tokio::spawn(async move {
            requester.connect_single("bench", "clients", rank, requesters).await.unwrap();
            requester.close().await.unwrap();
        }));
    }

    acceptor.accept_unbounded("bench", "clients", 0).await.unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
    acceptor.close().await.unwrap();
}

pub fn run_handshake_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("handshake_benchmark");
    for i in [1, 8, 32].iter() {
        group.throughput(Throughput::Elements(*i as u64));

        group.bench_with_input(BenchmarkId::new("known_group", i), i, |b, i| {
            b.iter(|| runtime.block_on(establish_known_group(*i)))
        });
        group.bench_with_input(BenchmarkId::new("unbounded", i), i, |b, i| {
            b.iter(|| runtime.block_on(establish_unbounded(*i)))
        });
    }
    group.finish();
}

criterion_group!(benches, run_handshake_benchmark);
criterion_main!(benches);
