//! Directory listing and event batching benchmarks using Criterion

use std::fs;
use std::path::Path;

use assetsync_core::{FsEventType, FsObjectType};
use assetsync_server::file_store::FileStore;
use assetsync_server::file_watcher::{normalize_event, EventBatcher};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::TempDir;

/// `dirs` folders of `files` small files each under `Demo/public`
fn populate(root: &Path, dirs: usize, files: usize) {
    for d in 0..dirs {
        let dir = root.join("Demo/public").join(format!("dir_{}", d));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..files {
            fs::write(dir.join(format!("asset_{}.png", f)), b"png").unwrap();
        }
    }
}

fn listing_benchmarks(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("file_store");

    let dir = TempDir::new().unwrap();
    populate(dir.path(), 20, 50);
    let store = FileStore::new(dir.path());
    let assets = store.assets_root("Demo");

    group.throughput(Throughput::Elements(20 * 50));
    group.bench_function("read_dir_assets_recursive_1000", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(store.read_dir_assets(&assets, None, true).await.unwrap())
        })
    });

    group.bench_function("read_dir_assets_flat_20", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(store.read_dir_assets(&assets, None, false).await.unwrap())
        })
    });

    group.finish();
}

fn batching_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_batching");
    let root = Path::new("/projects");

    // A save usually fires several identical modify events in a row
    let paths: Vec<_> = (0..1000)
        .map(|i| root.join(format!("Demo/public/art/asset_{}.png", i / 4)))
        .collect();

    group.throughput(Throughput::Elements(paths.len() as u64));
    group.bench_function("normalize_and_dedup_1000", |b| {
        b.iter(|| {
            let mut batcher = EventBatcher::new();
            for path in &paths {
                if let Some(event) = normalize_event(
                    root,
                    "public",
                    path,
                    FsEventType::Change,
                    Some(FsObjectType::File),
                ) {
                    batcher.push(event);
                }
            }
            black_box(batcher.flush())
        })
    });

    group.finish();
}

criterion_group!(benches, listing_benchmarks, batching_benchmarks);
criterion_main!(benches);
