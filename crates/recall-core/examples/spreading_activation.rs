//! Spreading Activation Example
//!
//! A memory that matches the query passes part of the match on to the
//! memories it is linked with. Here "coffee" reaches the Paris café directly
//! and the travel plans only through the café.
//!
//! Run with: `cargo run --example spreading_activation`

use recall_core::{
	spread_activation, ActivationConfig, ActivationState, BackendError, EdgeKind, GraphStore,
	InMemoryGraphStore, MemoryId, SpreadingConfig,
};

fn main() -> Result<(), BackendError> {
	println!("=== Spreading Activation ===\n");

	let names = [
		"coffee morning",
		"kitchen routine",
		"Paris café",
		"conversation with a friend",
		"travel plans",
	];

	// [1] coffee ←→ [2] kitchen
	//      ↓
	// [3] café   ←→ [4] conversation
	//      ↓
	// [5] travel
	let mut graph = InMemoryGraphStore::new();
	for (source, target, weight) in [
		(1, 2, 0.8),
		(2, 1, 0.6),
		(1, 3, 0.7),
		(3, 4, 0.5),
		(4, 3, 0.5),
		(3, 5, 0.6),
	] {
		graph.add_edge(MemoryId(source), MemoryId(target), weight, EdgeKind::CoOccurrence)?;
	}

	let activation = ActivationConfig::default();
	let mut state = ActivationState::new();
	for id in 1..=5 {
		state.insert(MemoryId(id), 0.2);
	}
	let _ = state.advance_turn();

	// "coffee" matched memory 1 with similarity 0.9
	let seeds = [(MemoryId(1), 0.9)];
	for depth in 1..=3 {
		let config = SpreadingConfig {
			max_depth: depth,
			..Default::default()
		};
		let result = spread_activation(&seeds, |id| graph.neighbors(id), &config);

		println!("max_depth = {depth}");
		for (hop, ids) in result.visited_by_depth.iter().enumerate().skip(1) {
			for id in ids {
				let name = usize::try_from(id.0 - 1)
					.ok()
					.and_then(|i| names.get(i))
					.unwrap_or(&"?");
				println!("  hop {hop}: {name:<28} +{:.3}", result.received[id]);
			}
		}
		println!();
	}

	let config = SpreadingConfig {
		max_depth: 2,
		..Default::default()
	};
	let result = spread_activation(&seeds, |id| graph.neighbors(id), &config);
	for (&id, &amount) in &result.received {
		let _ = state.stimulate(id, amount, &activation);
	}

	println!("Activation after one turn (threshold {}):", activation.activation_threshold);
	for (i, name) in names.iter().enumerate() {
		let id = MemoryId(i as u64 + 1);
		let value = state.activation(id, &activation).unwrap_or(0.0);
		let marker = if value >= activation.activation_threshold { "active" } else { "dormant" };
		println!("  {name:<28} {value:.3} {marker}");
	}

	Ok(())
}
