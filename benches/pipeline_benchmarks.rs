//! Benchmarks for chunking, the worker pool, and nearest-token lookup.
//!
//! Run with: cargo bench
//! Run with all features: cargo bench --all-features
//!
//! The decoding benchmark requires fixture files from
//! `tests/fixtures/generate_fixtures.sh`.

use std::path::Path;

use criterion::{BenchmarkId, Criterion};
use ndarray::Array2;
use signpipe::worker_pool::{ChunkProcessor, ChunkWorkerPool};
use signpipe::{
    Chunker, ContextTracker, EmbeddingNeighborLookup, FfmpegLogLevel, FileFrameStream, Frame,
    InMemoryFrameStream, PipelineError, slice_into_clips,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn synthetic_stream(frame_count: usize) -> InMemoryFrameStream {
    let mut stream = InMemoryFrameStream::new(25.0, Some((64, 64)));
    for index in 0..frame_count {
        stream
            .write_frame(Frame::filled(64, 64, [(index % 256) as u8, 128, 64]), true)
            .unwrap();
    }
    stream.seek(0);
    stream
}

/// Stands in for a detector: sums every pixel of every frame.
struct PixelSum;

impl ChunkProcessor for PixelSum {
    type Output = u64;

    fn process_chunk(
        &mut self,
        chunk: InMemoryFrameStream,
        _start_frame: usize,
    ) -> Result<Vec<u64>, PipelineError> {
        Ok(chunk
            .as_slice()
            .iter()
            .map(|frame| frame.image().as_raw().iter().map(|&value| u64::from(value)).sum())
            .collect())
    }
}

fn benchmark_chunking(criterion: &mut Criterion) {
    let template = synthetic_stream(500);

    criterion.bench_function("chunk 500 in-memory frames (1s chunks)", |bencher| {
        bencher.iter(|| {
            let mut stream = template.clone();
            let chunks = Chunker::new(&mut stream, 1.0).unwrap().count();
            assert_eq!(chunks, 20);
        });
    });

    criterion.bench_function("slice 500 in-memory frames into clips", |bencher| {
        bencher.iter(|| {
            let mut stream = template.clone();
            let _clips = slice_into_clips(&mut stream, 2.0).unwrap();
        });
    });
}

fn benchmark_decoding(criterion: &mut Criterion) {
    signpipe::set_ffmpeg_log_level(FfmpegLogLevel::Error);

    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    criterion.bench_function("decode and chunk sample video", |bencher| {
        bencher.iter(|| {
            let mut stream = FileFrameStream::open(SAMPLE_VIDEO).unwrap();
            let _chunks = Chunker::new(&mut stream, 1.0).unwrap().count();
        });
    });
}

fn benchmark_worker_pool(criterion: &mut Criterion) {
    let template = synthetic_stream(500);
    let mut group = criterion.benchmark_group("worker pool");

    for worker_count in [1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(worker_count),
            &worker_count,
            |bencher, &worker_count| {
                bencher.iter(|| {
                    let mut stream = template.clone();
                    let pool = ChunkWorkerPool::new(worker_count, 2);
                    let results = pool
                        .run(Chunker::with_frame_count(&mut stream, 25), 500, |_| Ok(PixelSum))
                        .unwrap();
                    assert_eq!(results.len(), 500);
                });
            },
        );
    }

    group.finish();
}

fn benchmark_neighbor_lookup(criterion: &mut Criterion) {
    let vocabulary_size = 32_000;
    let dimension = 256;
    let embeddings = Array2::from_shape_fn((vocabulary_size, dimension), |(token, column)| {
        ((token * 31 + column * 17) % 97) as f32 / 97.0
    });
    let tokens = (0..vocabulary_size).map(|token| format!("tok{token}")).collect();
    let lookup = EmbeddingNeighborLookup::new(embeddings, tokens).unwrap();
    let queries = Array2::from_shape_fn((50, dimension), |(row, column)| ((row + column) % 13) as f32);

    criterion.bench_function("nearest tokens for 50 projected rows", |bencher| {
        bencher.iter(|| {
            let neighbors = lookup.find_neighbors_for(queries.view()).unwrap();
            assert_eq!(neighbors.len(), 50);
        });
    });
}

fn benchmark_context(criterion: &mut Criterion) {
    criterion.bench_function("rolling context over 1000 outputs", |bencher| {
        bencher.iter(|| {
            let mut context = ContextTracker::new(8_000);
            for index in 0..1000 {
                context.add_next_output(format!("sentence number {index} of the video"));
            }
            let _ = context.current_context();
        });
    });
}

criterion::criterion_group!(
    benches,
    benchmark_chunking,
    benchmark_decoding,
    benchmark_worker_pool,
    benchmark_neighbor_lookup,
    benchmark_context,
);
criterion::criterion_main!(benches);
