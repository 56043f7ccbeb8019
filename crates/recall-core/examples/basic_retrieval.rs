//! Basic Memory Retrieval Example
//!
//! A short conversation with one user. Each turn prints which earlier
//! messages were handed back as context and why.
//!
//! Run with: `cargo run --example basic_retrieval`

use recall_core::{EngineConfig, EngineError, MemoryEngine};

fn main() -> Result<(), EngineError> {
	println!("=== Basic Memory Retrieval ===\n");

	let engine = MemoryEngine::new(EngineConfig::default())?;

	let conversation = [
		"I adopted a cat named Miso",
		"I work as a nurse at the city hospital",
		"My sister lives in Lisbon",
		"Miso keeps scratching the sofa",
		"Should I visit Lisbon in spring?",
	];

	for text in conversation {
		let outcome = engine.process_turn("alice", text)?;
		let metrics = &outcome.metrics;

		println!("> {text}");
		if outcome.context.is_empty() {
			println!("  (nothing relevant yet)");
		}
		for entry in &outcome.context.entries {
			println!(
				"  [{}] {:<40} score {:.3} ({:?})",
				entry.id, entry.content, entry.score, entry.kind
			);
		}
		println!(
			"  {} hits, {} candidates, {} active, {:?}\n",
			metrics.memory_hits,
			metrics.candidates_considered,
			metrics.candidates_active,
			metrics.latency()
		);
	}

	if let Some(status) = engine.status("alice") {
		println!(
			"alice: {} memories ({} active, {} dormant), {} edges after {} turns",
			status.total, status.active, status.dormant, status.edges, status.turns
		);
	}

	Ok(())
}
