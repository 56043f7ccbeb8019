//! Backend adapters.
//!
//! Transient backend failures are retried here, at the adapter boundary, so
//! the activation math never sees I/O concerns. [`BackendFactory`] decides
//! which vector and graph backends each new user session gets.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BackendError, BackendResult};
use crate::graph::{GraphStore, InMemoryGraphStore, Neighbor};
use crate::memory::{EdgeKind, MemoryEdge, MemoryId};
use crate::vector::{InMemoryVectorIndex, VectorHit, VectorIndex};

// ============================================================================
// Retry
// ============================================================================

/// Bounded exponential backoff for transient backend errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Retries after the first attempt
	pub max_retries: u32,
	/// Delay before the first retry
	pub initial_delay_ms: u64,
	/// Upper bound on any single delay
	pub max_delay_ms: u64,
	/// Growth factor between consecutive delays
	pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 2,
			initial_delay_ms: 10,
			max_delay_ms: 200,
			backoff_multiplier: 2.0,
		}
	}
}

impl RetryPolicy {
	/// Policy that never retries.
	#[must_use]
	pub const fn none() -> Self {
		Self {
			max_retries: 0,
			initial_delay_ms: 0,
			max_delay_ms: 0,
			backoff_multiplier: 1.0,
		}
	}

	/// Delay before retry number `attempt` (0-based), capped at `max_delay_ms`.
	#[must_use]
	pub fn compute_delay(&self, attempt: u32) -> Duration {
		#[allow(clippy::cast_precision_loss)]
		let base = self.initial_delay_ms as f64
			* self
				.backoff_multiplier
				.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let millis = if base.is_finite() { base as u64 } else { u64::MAX };
		Duration::from_millis(millis.min(self.max_delay_ms))
	}

	/// Run `call` until it succeeds, fails permanently or retries run out.
	///
	/// # Errors
	///
	/// Returns the last error from `call`.
	pub fn run<T>(
		&self,
		backend: &'static str,
		operation: &'static str,
		mut call: impl FnMut() -> BackendResult<T>,
	) -> BackendResult<T> {
		let mut attempt = 0;
		loop {
			match call() {
				Ok(value) => return Ok(value),
				Err(err) if err.is_transient() && attempt < self.max_retries => {
					let delay = self.compute_delay(attempt);
					warn!(
						backend,
						operation,
						attempt = attempt + 1,
						max_retries = self.max_retries,
						delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
						error = %err,
						"retrying backend call"
					);
					thread::sleep(delay);
					attempt += 1;
				}
				Err(err) => return Err(err),
			}
		}
	}
}

/// Backend wrapper that retries transient failures of the inner backend.
pub struct Retrying<T> {
	inner: T,
	policy: RetryPolicy,
}

impl<T> Retrying<T> {
	/// Wrap `inner` with `policy`.
	pub const fn new(inner: T, policy: RetryPolicy) -> Self {
		Self { inner, policy }
	}
}

impl<T: VectorIndex> VectorIndex for Retrying<T> {
	fn upsert(&mut self, id: MemoryId, embedding: &[f64]) -> BackendResult<()> {
		let name = self.inner.name();
		self.policy
			.run(name, "upsert", || self.inner.upsert(id, embedding))
	}

	fn query(&self, embedding: &[f64], k: usize) -> BackendResult<Vec<VectorHit>> {
		self.policy
			.run(self.inner.name(), "query", || self.inner.query(embedding, k))
	}

	fn remove(&mut self, id: MemoryId) -> BackendResult<bool> {
		let name = self.inner.name();
		self.policy.run(name, "remove", || self.inner.remove(id))
	}

	fn len(&self) -> usize {
		self.inner.len()
	}

	fn name(&self) -> &'static str {
		self.inner.name()
	}
}

impl<T: GraphStore> GraphStore for Retrying<T> {
	fn add_edge(
		&mut self,
		source: MemoryId,
		target: MemoryId,
		weight: f64,
		kind: EdgeKind,
	) -> BackendResult<()> {
		let name = self.inner.name();
		self.policy.run(name, "add_edge", || {
			self.inner.add_edge(source, target, weight, kind)
		})
	}

	fn neighbors(&self, id: MemoryId) -> BackendResult<Vec<Neighbor>> {
		self.policy
			.run(self.inner.name(), "neighbors", || self.inner.neighbors(id))
	}

	fn edges(&self, id: MemoryId) -> BackendResult<Vec<MemoryEdge>> {
		self.policy
			.run(self.inner.name(), "edges", || self.inner.edges(id))
	}

	fn remove_node(&mut self, id: MemoryId) -> BackendResult<usize> {
		let name = self.inner.name();
		self.policy
			.run(name, "remove_node", || self.inner.remove_node(id))
	}

	fn edge_count(&self) -> usize {
		self.inner.edge_count()
	}

	fn name(&self) -> &'static str {
		self.inner.name()
	}
}

// ============================================================================
// Disabled backends
// ============================================================================

/// Vector backend that is never reachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledVector;

const VECTOR_DOWN: BackendError = BackendError::Unavailable { backend: "vector" };
const GRAPH_DOWN: BackendError = BackendError::Unavailable { backend: "graph" };

impl VectorIndex for DisabledVector {
	fn upsert(&mut self, _id: MemoryId, _embedding: &[f64]) -> BackendResult<()> {
		Err(VECTOR_DOWN)
	}

	fn query(&self, _embedding: &[f64], _k: usize) -> BackendResult<Vec<VectorHit>> {
		Err(VECTOR_DOWN)
	}

	fn remove(&mut self, _id: MemoryId) -> BackendResult<bool> {
		Err(VECTOR_DOWN)
	}

	fn len(&self) -> usize {
		0
	}

	fn name(&self) -> &'static str {
		"disabled"
	}
}

/// Graph backend that is never reachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledGraph;

impl GraphStore for DisabledGraph {
	fn add_edge(
		&mut self,
		_source: MemoryId,
		_target: MemoryId,
		_weight: f64,
		_kind: EdgeKind,
	) -> BackendResult<()> {
		Err(GRAPH_DOWN)
	}

	fn neighbors(&self, _id: MemoryId) -> BackendResult<Vec<Neighbor>> {
		Err(GRAPH_DOWN)
	}

	fn edges(&self, _id: MemoryId) -> BackendResult<Vec<MemoryEdge>> {
		Err(GRAPH_DOWN)
	}

	fn remove_node(&mut self, _id: MemoryId) -> BackendResult<usize> {
		Err(GRAPH_DOWN)
	}

	fn edge_count(&self) -> usize {
		0
	}

	fn name(&self) -> &'static str {
		"disabled"
	}
}

// ============================================================================
// Factory
// ============================================================================

/// Which implementation backs a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
	/// In-process store
	#[default]
	Memory,
	/// Switched off; every call fails with `Unavailable`
	Disabled,
}

impl BackendKind {
	/// Parse a config or environment value.
	#[must_use]
	pub fn parse(value: &str) -> Option<Self> {
		match value.trim().to_ascii_lowercase().as_str() {
			"memory" | "in-memory" | "inmemory" => Some(Self::Memory),
			"disabled" | "none" | "off" => Some(Self::Disabled),
			_ => None,
		}
	}
}

/// Backend selection, the `[backends]` config section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
	/// Vector index backend
	pub vector: BackendKind,
	/// Graph store backend
	pub graph: BackendKind,
}

/// Builds the backends of a new user session.
pub trait BackendFactory: Send + Sync {
	/// Vector index partition for `user_id`.
	fn vector_index(&self, user_id: &str) -> Box<dyn VectorIndex>;

	/// Graph store partition for `user_id`.
	fn graph_store(&self, user_id: &str) -> Box<dyn GraphStore>;
}

/// Factory driven by [`BackendsConfig`]; every backend is wrapped in [`Retrying`].
#[derive(Clone, Debug)]
pub struct ConfiguredBackends {
	backends: BackendsConfig,
	dimensions: usize,
	retry: RetryPolicy,
}

impl ConfiguredBackends {
	/// Factory for vectors of `dimensions` components.
	#[must_use]
	pub const fn new(backends: BackendsConfig, dimensions: usize, retry: RetryPolicy) -> Self {
		Self {
			backends,
			dimensions,
			retry,
		}
	}
}

impl BackendFactory for ConfiguredBackends {
	fn vector_index(&self, _user_id: &str) -> Box<dyn VectorIndex> {
		match self.backends.vector {
			BackendKind::Memory => Box::new(Retrying::new(
				InMemoryVectorIndex::new(self.dimensions),
				self.retry.clone(),
			)),
			BackendKind::Disabled => Box::new(Retrying::new(DisabledVector, self.retry.clone())),
		}
	}

	fn graph_store(&self, _user_id: &str) -> Box<dyn GraphStore> {
		match self.backends.graph {
			BackendKind::Memory => {
				Box::new(Retrying::new(InMemoryGraphStore::new(), self.retry.clone()))
			}
			BackendKind::Disabled => Box::new(Retrying::new(DisabledGraph, self.retry.clone())),
		}
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use std::cell::Cell;

	use super::*;

	#[test]
	fn test_compute_delay() {
		let policy = RetryPolicy {
			max_retries: 5,
			initial_delay_ms: 10,
			max_delay_ms: 50,
			backoff_multiplier: 2.0,
		};
		assert_eq!(policy.compute_delay(0), Duration::from_millis(10));
		assert_eq!(policy.compute_delay(1), Duration::from_millis(20));
		assert_eq!(policy.compute_delay(2), Duration::from_millis(40));
		assert_eq!(policy.compute_delay(3), Duration::from_millis(50));
	}

	#[test]
	fn test_transient_errors_retried() {
		let policy = RetryPolicy {
			initial_delay_ms: 0,
			..Default::default()
		};
		let calls = Cell::new(0);
		let result = policy.run("vector", "query", || {
			calls.set(calls.get() + 1);
			if calls.get() < 3 {
				Err(VECTOR_DOWN)
			} else {
				Ok(7)
			}
		});
		assert_eq!(result, Ok(7));
		assert_eq!(calls.get(), 3);
	}

	#[test]
	fn test_retries_bounded() {
		let policy = RetryPolicy {
			initial_delay_ms: 0,
			max_retries: 2,
			..Default::default()
		};
		let calls = Cell::new(0);
		let result: BackendResult<()> = policy.run("graph", "neighbors", || {
			calls.set(calls.get() + 1);
			Err(GRAPH_DOWN)
		});
		assert_eq!(result, Err(GRAPH_DOWN));
		assert_eq!(calls.get(), 3);
	}

	#[test]
	fn test_permanent_errors_not_retried() {
		let calls = Cell::new(0);
		let result: BackendResult<()> = RetryPolicy::default().run("graph", "add_edge", || {
			calls.set(calls.get() + 1);
			Err(BackendError::SelfLoop(MemoryId(1)))
		});
		assert!(result.is_err());
		assert_eq!(calls.get(), 1);
	}

	#[test]
	fn test_configured_backends() {
		let factory = ConfiguredBackends::new(
			BackendsConfig {
				vector: BackendKind::Memory,
				graph: BackendKind::Disabled,
			},
			3,
			RetryPolicy::none(),
		);
		let mut vector = factory.vector_index("alice");
		vector.upsert(MemoryId(1), &[1.0, 0.0, 0.0]).unwrap();
		assert_eq!(vector.query(&[1.0, 0.0, 0.0], 1).unwrap()[0].id, MemoryId(1));

		let graph = factory.graph_store("alice");
		assert_eq!(graph.neighbors(MemoryId(1)), Err(GRAPH_DOWN));
		assert_eq!(graph.name(), "disabled");
	}

	#[test]
	fn test_backend_kind_parse() {
		assert_eq!(BackendKind::parse("Memory"), Some(BackendKind::Memory));
		assert_eq!(BackendKind::parse("disabled"), Some(BackendKind::Disabled));
		assert_eq!(BackendKind::parse("redis"), None);
	}
}
