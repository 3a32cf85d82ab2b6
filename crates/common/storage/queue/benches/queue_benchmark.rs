// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmarks for the queue file.
//!
//! Measures:
//! - Header encode and decode
//! - Single push latency on disk
//! - Batched push throughput in memory and on disk
//! - Peek and remove

use std::hint::black_box;

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use qfile_storage_queue::{
    MemoryStorage, QueueFile, QueueFileBuilder, QueueFileHeader, StorageKind,
};
use tempfile::TempDir;

/// Element sizes to benchmark (bytes)
const ELEMENT_SIZES: &[usize] = &[64, 256, 1024, 4096];

/// Number of elements for throughput tests
const BATCH_SIZE: usize = 1_000;

const MAX_SIZE: u64 = 64 * 1024 * 1024;

fn create_queue(temp_dir: &TempDir, kind: StorageKind) -> QueueFile {
    QueueFileBuilder::new(temp_dir.path().join("queue.dat"))
        .initial_size(4096)
        .max_size(MAX_SIZE)
        .storage_kind(kind)
        .build()
        .expect("Failed to create queue")
}

fn memory_queue() -> QueueFile<MemoryStorage> {
    QueueFile::with_storage(MemoryStorage::new(4096), 4096, MAX_SIZE)
        .expect("Failed to create queue")
}

fn bench_header_codec(c: &mut Criterion) {
    let mut storage = MemoryStorage::new(4096);
    let header = QueueFileHeader::open(&mut storage).unwrap();
    let block = header.encode();

    c.bench_function("header_encode", |b| b.iter(|| black_box(&header).encode()));
    c.bench_function("header_decode", |b| {
        b.iter(|| QueueFileHeader::decode(black_box(&block), 4096).unwrap());
    });
}

/// Each push ends with a flush of data and header.
fn bench_push_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_latency");

    for kind in [StorageKind::Direct, StorageKind::Mapped] {
        group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |b, &kind| {
            let temp_dir = TempDir::new().unwrap();
            let mut queue = create_queue(&temp_dir, kind);
            let element = vec![0xABu8; 256];
            b.iter(|| {
                queue.push(black_box(&element)).unwrap();
                queue.remove(1).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_push_all_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_all_memory");

    for &size in ELEMENT_SIZES {
        group.throughput(Throughput::Bytes((size * BATCH_SIZE) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let elements = vec![vec![0xABu8; size]; BATCH_SIZE];
            b.iter_batched(
                memory_queue,
                |mut queue| queue.push_all(black_box(&elements)).unwrap(),
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

fn bench_push_all_disk(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_all_disk");
    group.sample_size(20);

    for &size in ELEMENT_SIZES {
        group.throughput(Throughput::Bytes((size * BATCH_SIZE) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let elements = vec![vec![0xABu8; size]; BATCH_SIZE];
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let queue = create_queue(&temp_dir, StorageKind::Direct);
                    (temp_dir, queue)
                },
                |(temp_dir, mut queue)| {
                    queue.push_all(black_box(&elements)).unwrap();
                    queue.close().unwrap();
                    drop(temp_dir);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

fn bench_peek_and_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("peek_and_remove");
    group.throughput(Throughput::Elements(BATCH_SIZE as u64));

    let elements = vec![vec![0xCDu8; 256]; BATCH_SIZE];
    group.bench_function("drain_memory", |b| {
        b.iter_batched(
            || {
                let mut queue = memory_queue();
                queue.push_all(&elements).unwrap();
                queue
            },
            |mut queue| {
                while let Some(element) = queue.peek().unwrap() {
                    black_box(element);
                    queue.remove(1).unwrap();
                }
            },
            BatchSize::PerIteration,
        );
    });

    group.bench_function("iter_memory", |b| {
        let mut queue = memory_queue();
        queue.push_all(&elements).unwrap();
        b.iter(|| {
            for element in &queue {
                black_box(element.unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_header_codec,
    bench_push_latency,
    bench_push_all_memory,
    bench_push_all_disk,
    bench_peek_and_remove,
);

criterion_main!(benches);
