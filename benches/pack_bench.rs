//! Packing benchmarks

use appx_core::archive::{pack, PackOptions};
use appx_core::progress::NoProgress;
use appx_core::strategy::CompressionLevel;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use std::fs;
use tempfile::TempDir;

/// Generate test data with specified characteristics
fn generate_test_data(dir: &TempDir, file_count: usize, file_size: usize, compressible: bool) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);

    for i in 0..file_count {
        let content: Vec<u8> = if compressible {
            (0..file_size).map(|j| b'a' + (j % 13) as u8).collect()
        } else {
            (0..file_size).map(|_| rng.gen()).collect()
        };
        fs::write(dir.path().join(format!("file_{}.dat", i)), content).unwrap();
    }
}

/// Benchmark packing many small files at each level
fn bench_small_files(c: &mut Criterion) {
    let mut group = c.benchmark_group("small_files");
    group.sample_size(10);

    for level in [CompressionLevel::None, CompressionLevel::Normal] {
        group.bench_with_input(
            BenchmarkId::new("pack_500_small_files", level),
            &level,
            |b, &level| {
                b.iter_with_setup(
                    || {
                        let temp_dir = TempDir::new().unwrap();
                        generate_test_data(&temp_dir, 500, 1024, true);
                        (temp_dir, TempDir::new().unwrap())
                    },
                    |(input_dir, output_dir)| {
                        let output = output_dir.path().join("bench.appx");
                        let options = PackOptions {
                            compression: level,
                            require_manifest: false,
                            ..Default::default()
                        };
                        pack(black_box(input_dir.path()), black_box(&output), &options, &mut NoProgress)
                            .unwrap();
                    },
                );
            },
        );
    }

    group.finish();
}

/// Benchmark packing one large incompressible file
fn bench_large_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("large_file");
    group.sample_size(10);

    group.bench_function("pack_64mb_random", |b| {
        b.iter_with_setup(
            || {
                let temp_dir = TempDir::new().unwrap();
                generate_test_data(&temp_dir, 1, 64 * 1024 * 1024, false);
                (temp_dir, TempDir::new().unwrap())
            },
            |(input_dir, output_dir)| {
                let options = PackOptions {
                    require_manifest: false,
                    ..Default::default()
                };
                pack(
                    black_box(input_dir.path()),
                    output_dir.path().join("bench.appx"),
                    &options,
                    &mut NoProgress,
                )
                .unwrap();
            },
        );
    });

    group.finish();
}

criterion_group!(benches, bench_small_files, bench_large_file);
criterion_main!(benches);
