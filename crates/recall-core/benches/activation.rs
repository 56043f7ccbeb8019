//! Benchmarks for activation bookkeeping
//!
//! Tests performance of:
//! - Cosine similarity (single and batch)
//! - Decay and reinforcement arithmetic
//! - Per-turn state updates over many tracked memories

#![allow(clippy::expect_used)] // Fine in benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use recall_core::activation::{
	blend_score, cosine_similarity, decay, reinforce, ActivationConfig, ActivationState,
};
use recall_core::MemoryId;

/// Generate random unit embeddings
fn generate_embeddings(count: usize, dimensions: usize) -> Vec<Vec<f64>> {
	let mut rng = rand::thread_rng();
	(0..count)
		.map(|_| {
			let mut vec: Vec<f64> = (0..dimensions).map(|_| rng.gen::<f64>()).collect();
			let norm: f64 = vec.iter().map(|x| x * x).sum::<f64>().sqrt();
			if norm > 0.0 {
				for x in &mut vec {
					*x /= norm;
				}
			}
			vec
		})
		.collect()
}

/// State with `count` memories inserted over a spread of turns
fn generate_state(count: u64) -> ActivationState {
	let mut rng = rand::thread_rng();
	let mut state = ActivationState::new();
	for id in 1..=count {
		state.insert(MemoryId(id), rng.gen::<f64>());
		if rng.gen_bool(0.2) {
			let _ = state.advance_turn();
		}
	}
	state
}

fn bench_cosine_similarity(c: &mut Criterion) {
	let mut group = c.benchmark_group("cosine_similarity");

	for dim in &[128, 256, 384, 768, 1536] {
		let embeddings = generate_embeddings(2, *dim);
		let a = &embeddings[0];
		let b = &embeddings[1];

		let _ = group.throughput(Throughput::Elements(1));
		let _ = group.bench_with_input(BenchmarkId::new("single", dim), dim, |bench, _| {
			bench.iter(|| cosine_similarity(black_box(a), black_box(b)));
		});
	}

	group.finish();
}

fn bench_cosine_similarity_batch(c: &mut Criterion) {
	let mut group = c.benchmark_group("cosine_similarity_batch");

	for memory_count in &[100_u64, 1000, 5000] {
		let probe = generate_embeddings(1, 256)
			.pop()
			.expect("should have probe");
		#[allow(clippy::cast_possible_truncation)]
		let memories = generate_embeddings(*memory_count as usize, 256);

		let _ = group.throughput(Throughput::Elements(*memory_count));
		let _ = group.bench_with_input(
			BenchmarkId::new("memories", memory_count),
			memory_count,
			|bench, _| {
				bench.iter(|| {
					memories
						.iter()
						.map(|m| cosine_similarity(black_box(&probe), black_box(m)))
						.collect::<Vec<_>>()
				});
			},
		);
	}

	group.finish();
}

fn bench_decay_and_reinforce(c: &mut Criterion) {
	let mut group = c.benchmark_group("decay_reinforce");
	let config = ActivationConfig::default();

	for elapsed in &[1_u64, 10, 100, 1000] {
		let id = BenchmarkId::new("elapsed", elapsed);
		let _ = group.bench_with_input(id, elapsed, |bench, &elapsed| {
			bench.iter(|| {
				let decayed = decay(black_box(0.9), config.decay_factor, elapsed);
				let gain = config.reinforcement_gain;
				let reinforced = reinforce(decayed, gain, black_box(0.7), config.max_activation);
				blend_score(black_box(0.6), reinforced, config.blend)
			});
		});
	}

	group.finish();
}

fn bench_state_turn(c: &mut Criterion) {
	let mut group = c.benchmark_group("state_turn");
	let config = ActivationConfig::default();

	for count in &[100_u64, 1000, 10_000] {
		let state = generate_state(*count);

		let _ = group.throughput(Throughput::Elements(*count));
		let _ = group.bench_with_input(BenchmarkId::new("memories", count), count, |bench, &count| {
			bench.iter_batched(
				|| state.clone(),
				|mut state| {
					let _ = state.advance_turn();
					for id in (1..=count).step_by(10) {
						let _ = state.stimulate(MemoryId(id), 0.3, &config);
					}
					state.counts(&config)
				},
				criterion::BatchSize::LargeInput,
			);
		});
	}

	group.finish();
}

criterion_group!(
	benches,
	bench_cosine_similarity,
	bench_cosine_similarity_batch,
	bench_decay_and_reinforce,
	bench_state_turn,
);

criterion_main!(benches);
