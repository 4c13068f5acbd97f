use std::fs;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use indicatif::ProgressBar;
use mediasearch::scan::{hash_bytes, hash_file, hash_files};
use rand::RngCore;

fn bench_hash(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("fingerprint");

    for size in [64 << 10, 1 << 20, 8 << 20] {
        let mut data = vec![0u8; size];
        rand::rng().fill_bytes(&mut data);
        let path = dir.path().join(format!("{size}.bin"));
        fs::write(&path, &data).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("bytes", size), &data, |b, data| b.iter(|| hash_bytes(data)));
        group.bench_with_input(BenchmarkId::new("file", size), &path, |b, path| b.iter(|| hash_file(path).unwrap()));
    }
    group.finish();

    let paths = (0..64)
        .map(|i| {
            let path = dir.path().join(format!("small-{i}.jpg"));
            fs::write(&path, vec![i as u8; 256 << 10]).unwrap();
            path
        })
        .collect::<Vec<_>>();
    c.bench_function("hash_files_parallel", |b| b.iter(|| hash_files(&paths, &ProgressBar::hidden())));
}

criterion_group!(benches, bench_hash);
criterion_main!(benches);
