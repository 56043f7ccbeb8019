//! Per-turn metrics and engine-wide counters.
//!
//! [`TurnMetrics`] is returned with every turn. [`EngineStats`] aggregates them
//! with relaxed atomics; call [`EngineStats::flush`] to emit the current values
//! as a single `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::memory::MemoryId;

/// Which parts of a turn ran without their backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
	/// Vector index failed; retrieval fell back to the graph
	pub vector: bool,
	/// Graph store failed; no spreading or edge wiring
	pub graph: bool,
	/// Embedding failed; nothing retrieved or stored
	pub embedding: bool,
}

impl Degradation {
	/// Whether anything was degraded.
	#[must_use]
	pub const fn any(&self) -> bool {
		self.vector || self.graph || self.embedding
	}
}

/// What happened during one turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetrics {
	/// Turn number of the user
	pub turn: u64,
	/// Time spent retrieving and assembling, microseconds
	pub latency_us: u64,
	/// Memories selected into the context
	pub memory_hits: usize,
	/// Distinct candidates before the threshold filter
	pub candidates_considered: usize,
	/// Candidates at or above the threshold
	pub candidates_active: usize,
	/// Hits returned by the vector index
	pub vector_hits: usize,
	/// Memories reached only through graph edges
	pub graph_activated: usize,
	/// Backend degradation
	pub degraded: Degradation,
	/// Id given to this turn's text, if it was stored
	pub stored: Option<MemoryId>,
	/// Memories evicted by the retention bound
	pub evicted: usize,
}

impl TurnMetrics {
	/// Retrieval latency.
	#[must_use]
	pub const fn latency(&self) -> Duration {
		Duration::from_micros(self.latency_us)
	}

	pub(crate) fn set_latency(&mut self, elapsed: Duration) {
		self.latency_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
	}
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
	/// Turns processed
	pub turns: u64,
	/// Memories selected into contexts
	pub memory_hits: u64,
	/// Turns with any degradation
	pub degraded_turns: u64,
	/// Memories stored
	pub memories_stored: u64,
	/// Memories evicted by retention
	pub memories_evicted: u64,
	/// Memories removed on request
	pub memories_forgotten: u64,
}

/// Lock-free counters owned by one engine.
#[derive(Debug, Default)]
pub struct EngineStats {
	turns: AtomicU64,
	memory_hits: AtomicU64,
	degraded_turns: AtomicU64,
	memories_stored: AtomicU64,
	memories_evicted: AtomicU64,
	memories_forgotten: AtomicU64,
}

fn widen(n: usize) -> u64 {
	u64::try_from(n).unwrap_or(u64::MAX)
}

impl EngineStats {
	/// Zeroed counters.
	#[must_use]
	pub const fn new() -> Self {
		Self {
			turns: AtomicU64::new(0),
			memory_hits: AtomicU64::new(0),
			degraded_turns: AtomicU64::new(0),
			memories_stored: AtomicU64::new(0),
			memories_evicted: AtomicU64::new(0),
			memories_forgotten: AtomicU64::new(0),
		}
	}

	/// Fold one turn into the counters.
	pub fn record_turn(&self, metrics: &TurnMetrics) {
		let _ = self.turns.fetch_add(1, Ordering::Relaxed);
		let _ = self
			.memory_hits
			.fetch_add(widen(metrics.memory_hits), Ordering::Relaxed);
		if metrics.degraded.any() {
			let _ = self.degraded_turns.fetch_add(1, Ordering::Relaxed);
		}
		if metrics.stored.is_some() {
			let _ = self.memories_stored.fetch_add(1, Ordering::Relaxed);
		}
		let _ = self
			.memories_evicted
			.fetch_add(widen(metrics.evicted), Ordering::Relaxed);
	}

	/// Count an explicit removal.
	pub fn record_forget(&self) {
		let _ = self.memories_forgotten.fetch_add(1, Ordering::Relaxed);
	}

	/// Read all counters.
	#[must_use]
	pub fn snapshot(&self) -> StatsSnapshot {
		StatsSnapshot {
			turns: self.turns.load(Ordering::Relaxed),
			memory_hits: self.memory_hits.load(Ordering::Relaxed),
			degraded_turns: self.degraded_turns.load(Ordering::Relaxed),
			memories_stored: self.memories_stored.load(Ordering::Relaxed),
			memories_evicted: self.memories_evicted.load(Ordering::Relaxed),
			memories_forgotten: self.memories_forgotten.load(Ordering::Relaxed),
		}
	}

	/// Emit all current values as one `info!` event.
	pub fn flush(&self) {
		let s = self.snapshot();
		tracing::info!(
			metric = "flush",
			turns = s.turns,
			memory_hits = s.memory_hits,
			degraded_turns = s.degraded_turns,
			memories_stored = s.memories_stored,
			memories_evicted = s.memories_evicted,
			memories_forgotten = s.memories_forgotten,
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_record_turn() {
		let stats = EngineStats::new();
		stats.record_turn(&TurnMetrics {
			memory_hits: 2,
			stored: Some(MemoryId(1)),
			..Default::default()
		});
		stats.record_turn(&TurnMetrics {
			degraded: Degradation {
				vector: true,
				..Default::default()
			},
			evicted: 1,
			..Default::default()
		});
		stats.record_forget();

		let s = stats.snapshot();
		assert_eq!(s.turns, 2);
		assert_eq!(s.memory_hits, 2);
		assert_eq!(s.degraded_turns, 1);
		assert_eq!(s.memories_stored, 1);
		assert_eq!(s.memories_evicted, 1);
		assert_eq!(s.memories_forgotten, 1);
		stats.flush();
	}

	#[test]
	fn test_latency() {
		let mut metrics = TurnMetrics::default();
		metrics.set_latency(Duration::from_millis(3));
		assert_eq!(metrics.latency_us, 3000);
		assert_eq!(metrics.latency(), Duration::from_millis(3));
	}

	#[test]
	fn test_degradation_any() {
		assert!(!Degradation::default().any());
		assert!(Degradation {
			graph: true,
			..Default::default()
		}
		.any());
	}
}
