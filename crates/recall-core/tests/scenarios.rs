//! End-to-end turn scenarios against the default in-memory backends.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use recall_core::{
	BackendKind, BackendsConfig, ContextBudget, EngineConfig, MemoryEngine, MemoryId, RetryPolicy,
};

const SILENT: ContextBudget = ContextBudget::new(0, 0);

/// Words that share no hash bucket with each other or with the tracked memory.
const FILLERS: [&str; 4] = ["alpha bravo", "charlie delta", "echo foxtrot", "golf hotel"];

fn engine(config: EngineConfig) -> MemoryEngine {
	MemoryEngine::new(config).expect("valid config")
}

fn decay_config() -> EngineConfig {
	let mut config = EngineConfig::default();
	config.activation.decay_factor = 0.5;
	config.activation.activation_threshold = 0.1;
	// every memory starts at exactly 1.0
	config.activation.significance_weight = 0.0;
	config
}

/// Store one memory, then let `idle_turns` unrelated turns pass without using it.
fn age_memory(engine: &MemoryEngine, user: &str, idle_turns: usize) -> MemoryId {
	let stored = engine
		.process_turn(user, "Paris trip planned for spring")
		.unwrap()
		.metrics
		.stored
		.unwrap();
	for filler in FILLERS.iter().take(idle_turns) {
		let _ = engine
			.process_turn_with_budget(user, filler, &SILENT)
			.unwrap();
	}
	stored
}

#[test]
fn test_memory_above_threshold_after_three_steps() {
	let engine = engine(decay_config());
	let id = age_memory(&engine, "alice", 2);

	// third decay step happens inside this turn
	let outcome = engine.process_turn("alice", "india juliet").unwrap();
	assert!(outcome.context.ids().contains(&id));

	let status = engine.status("alice").unwrap();
	assert_eq!(status.turns, 4);
}

#[test]
fn test_memory_below_threshold_after_four_steps() {
	let engine = engine(decay_config());
	let id = age_memory(&engine, "alice", 3);
	assert!((engine.activation("alice", id).unwrap() - 0.125).abs() < 1e-12);

	let outcome = engine.process_turn("alice", "india juliet").unwrap();
	assert!(!outcome.context.ids().contains(&id));
	assert!((engine.activation("alice", id).unwrap() - 0.0625).abs() < 1e-12);
}

#[test]
fn test_matching_query_does_not_revive_dormant_memory() {
	let engine = engine(decay_config());
	let id = age_memory(&engine, "alice", 3);

	// fourth decay step, with the memory's own words as the message
	let outcome = engine
		.process_turn("alice", "Paris trip planned for spring")
		.unwrap();
	assert!(outcome.metrics.vector_hits >= 1);
	assert!(!outcome.context.ids().contains(&id));
	assert!(!outcome.context.is_empty());
	assert!((engine.activation("alice", id).unwrap() - 0.0625).abs() < 1e-12);
}

#[test]
fn test_related_memory_surfaces_over_unrelated() {
	let engine = engine(EngineConfig::default());
	for text in [
		"bob likes black coffee",
		"bob works as a pilot",
		"bob lives in Lima",
	] {
		let _ = engine.process_turn("bob", text).unwrap();
	}
	let outcome = engine
		.process_turn_with_budget("bob", "does bob still live in Lima", &ContextBudget::new(1, 200))
		.unwrap();
	assert_eq!(outcome.context.render(), "bob lives in Lima");
	assert_eq!(outcome.metrics.memory_hits, 1);
	assert_eq!(outcome.metrics.candidates_considered, 3);
}

#[test]
fn test_budget_is_respected_end_to_end() {
	let engine = engine(EngineConfig::default());
	for text in [
		"twenty chars exactly",
		"also twenty chars ok",
		"third twenty chars x",
	] {
		assert_eq!(text.chars().count(), 20);
		let _ = engine.process_turn("carol", text).unwrap();
	}
	let budget = ContextBudget::new(2, 50);
	let outcome = engine
		.process_turn_with_budget("carol", "twenty chars", &budget)
		.unwrap();
	assert_eq!(outcome.context.len(), 2);
	assert!(outcome.context.chars_used <= 50);
	assert_eq!(outcome.context.chars_used, 42);
}

#[test]
fn test_isolation_between_users() {
	let engine = engine(EngineConfig::default());
	let _ = engine.process_turn("alice", "alice likes green tea").unwrap();
	let _ = engine.process_turn("alice", "alice lives in Oslo").unwrap();
	let _ = engine.process_turn("bob", "bob likes black coffee").unwrap();

	let outcome = engine.process_turn("bob", "alice likes green tea").unwrap();
	let bob_contents: Vec<String> = engine
		.memories("bob")
		.into_iter()
		.map(|m| m.content)
		.collect();
	for entry in &outcome.context.entries {
		assert!(bob_contents.contains(&entry.content));
		assert!(!entry.content.starts_with("alice"));
	}
	assert_eq!(engine.memories("alice").len(), 2);
	assert!(engine.memories("alice").iter().all(|m| m.user_id == "alice"));
}

#[test]
fn test_vector_down_graph_only_retrieval() {
	let config = EngineConfig {
		backends: BackendsConfig {
			vector: BackendKind::Disabled,
			graph: BackendKind::Memory,
		},
		retry: RetryPolicy::none(),
		..EngineConfig::default()
	};
	let engine = engine(config);

	let first = engine.process_turn("dave", "my dog is called Rex").unwrap();
	assert!(first.metrics.degraded.vector);
	assert!(!first.metrics.degraded.graph);

	// the latest memory seeds the graph, but nothing links to it yet
	let second = engine.process_turn("dave", "Rex chewed my shoes").unwrap();
	assert!(second.metrics.degraded.vector);
	assert_eq!(second.metrics.vector_hits, 0);
	assert!(second.context.is_empty());

	// third turn reaches the first memory through the edge wired on turn two
	let third = engine.process_turn("dave", "walks in the park").unwrap();
	assert!(third.metrics.degraded.vector);
	assert_eq!(third.metrics.graph_activated, 1);
	assert_eq!(third.context.ids(), vec![MemoryId(1)]);
	assert_eq!(third.context.render(), "my dog is called Rex");
	assert_eq!(engine.stats_snapshot().degraded_turns, 3);
}

#[test]
fn test_status_counts_active_and_dormant() {
	let engine = engine(decay_config());
	let _ = age_memory(&engine, "erin", 4);
	let status = engine.status("erin").unwrap();
	assert_eq!(status.total, 5);
	assert_eq!(status.active + status.dormant, status.total);
	assert!(status.dormant >= 1);
	assert!(engine.status("nobody").is_none());

	let all = engine.status_all();
	assert_eq!(all.len(), 1);
	assert_eq!(all[0].user_id, "erin");
}

#[test]
fn test_outcome_serialises_for_callers() {
	let engine = engine(EngineConfig::default());
	let _ = engine.process_turn("frank", "I adopted a cat named Miso").unwrap();
	let outcome = engine
		.process_turn("frank", "Miso keeps scratching the sofa")
		.unwrap();

	let value = serde_json::to_value(&outcome).unwrap();
	assert_eq!(value["context"]["entries"][0]["content"], "I adopted a cat named Miso");
	assert_eq!(value["metrics"]["memory_hits"], 1);
	assert_eq!(value["metrics"]["degraded"]["vector"], false);

	let back: recall_core::TurnOutcome = serde_json::from_value(value).unwrap();
	assert_eq!(back.context.ids(), outcome.context.ids());
	assert_eq!(back.metrics.stored, outcome.metrics.stored);
}
