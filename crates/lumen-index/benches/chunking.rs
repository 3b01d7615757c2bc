use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use lumen_index::{Chunker, ChunkerConfig, SourceFile};
use std::hint::black_box;

fn rust_source(functions: usize) -> String {
    let mut out = String::from("use std::collections::HashMap;\nuse std::sync::Arc;\n\n");
    for i in 0..functions {
        out.push_str(&format!(
            "pub fn handler_{i}(input: &str) -> Option<usize> {{\n    \
             let mut counts = HashMap::new();\n    \
             for word in input.split_whitespace() {{\n        \
             *counts.entry(word).or_insert(0) += 1;\n    }}\n    \
             counts.values().max().copied()\n}}\n\n"
        ));
    }
    out
}

fn prose(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("Line {i}: the quick brown fox jumps over the lazy dog.\n"))
        .collect()
}

fn structural(c: &mut Criterion) {
    let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
    let mut group = c.benchmark_group("chunk_rust");

    for functions in [10, 100, 1_000] {
        let file = SourceFile::new("src/handlers.rs", rust_source(functions));
        group.throughput(Throughput::Bytes(file.size));
        group.bench_with_input(BenchmarkId::new("functions", functions), &file, |b, file| {
            b.iter(|| chunker.chunk(black_box(file)));
        });
    }

    group.finish();
}

fn sliding_window(c: &mut Criterion) {
    let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
    let mut group = c.benchmark_group("chunk_window");

    for lines in [100, 1_000, 10_000] {
        let file = SourceFile::new("docs/notes.md", prose(lines));
        group.throughput(Throughput::Bytes(file.size));
        group.bench_with_input(BenchmarkId::new("lines", lines), &file, |b, file| {
            b.iter(|| chunker.chunk(black_box(file)));
        });
    }

    group.finish();
}

criterion_group!(benches, structural, sliding_window);
criterion_main!(benches);
