//! Association graph between one user's memories.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{BackendError, BackendResult};
use crate::memory::{EdgeKind, MemoryEdge, MemoryId};

/// Smallest weight an edge can carry after clamping.
pub const MIN_EDGE_WEIGHT: f64 = 1e-6;

/// Adjacent memory and the strongest edge weight leading to it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
	/// Neighbouring memory
	pub id: MemoryId,
	/// Edge weight in (0, 1]
	pub weight: f64,
}

/// Clamp a requested weight into (0, 1].
///
/// # Errors
///
/// Non-finite weights are rejected.
pub fn clamp_weight(weight: f64) -> BackendResult<f64> {
	if weight.is_finite() {
		Ok(weight.clamp(MIN_EDGE_WEIGHT, 1.0))
	} else {
		Err(BackendError::Rejected {
			backend: "graph",
			reason: format!("non-finite edge weight {weight}"),
		})
	}
}

/// Directed association edges between memories.
pub trait GraphStore: Send {
	/// Add an edge, or update the weight of the existing `(source, target, kind)` edge.
	///
	/// Weight is clamped to (0, 1].
	///
	/// # Errors
	///
	/// Rejects `source == target` and non-finite weights; propagates backend failures.
	fn add_edge(
		&mut self,
		source: MemoryId,
		target: MemoryId,
		weight: f64,
		kind: EdgeKind,
	) -> BackendResult<()>;

	/// Outgoing neighbours of `id`, one entry per neighbour, ordered by id.
	///
	/// When several edge kinds lead to the same neighbour the strongest weight is reported.
	///
	/// # Errors
	///
	/// Returns a [`BackendError`] if the backend is unreachable.
	fn neighbors(&self, id: MemoryId) -> BackendResult<Vec<Neighbor>>;

	/// Every outgoing edge of `id`, one per `(target, kind)`, in insertion order.
	///
	/// # Errors
	///
	/// Returns a [`BackendError`] if the backend is unreachable.
	fn edges(&self, id: MemoryId) -> BackendResult<Vec<MemoryEdge>>;

	/// Remove a node and every edge touching it. Returns the number of edges removed.
	///
	/// # Errors
	///
	/// Returns a [`BackendError`] if the backend is unreachable.
	fn remove_node(&mut self, id: MemoryId) -> BackendResult<usize>;

	/// Total number of edges.
	fn edge_count(&self) -> usize;

	/// Backend name for logs.
	fn name(&self) -> &'static str;
}

#[derive(Clone, Copy, Debug)]
struct EdgeSlot {
	target: MemoryId,
	kind: EdgeKind,
	weight: f64,
}

/// Adjacency-list graph held in process memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryGraphStore {
	outgoing: HashMap<MemoryId, SmallVec<[EdgeSlot; 4]>>,
	incoming: HashMap<MemoryId, SmallVec<[MemoryId; 4]>>,
	edges: usize,
}

impl InMemoryGraphStore {
	/// Empty graph.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

impl GraphStore for InMemoryGraphStore {
	fn add_edge(
		&mut self,
		source: MemoryId,
		target: MemoryId,
		weight: f64,
		kind: EdgeKind,
	) -> BackendResult<()> {
		if source == target {
			return Err(BackendError::SelfLoop(source));
		}
		let weight = clamp_weight(weight)?;

		let slots = self.outgoing.entry(source).or_default();
		if let Some(slot) = slots
			.iter_mut()
			.find(|slot| slot.target == target && slot.kind == kind)
		{
			slot.weight = weight;
			return Ok(());
		}

		slots.push(EdgeSlot {
			target,
			kind,
			weight,
		});
		let sources = self.incoming.entry(target).or_default();
		if !sources.contains(&source) {
			sources.push(source);
		}
		self.edges += 1;
		Ok(())
	}

	fn neighbors(&self, id: MemoryId) -> BackendResult<Vec<Neighbor>> {
		let Some(slots) = self.outgoing.get(&id) else {
			return Ok(Vec::new());
		};

		let mut strongest: BTreeMap<MemoryId, f64> = BTreeMap::new();
		for slot in slots {
			let entry = strongest.entry(slot.target).or_insert(slot.weight);
			*entry = entry.max(slot.weight);
		}
		Ok(strongest
			.into_iter()
			.map(|(id, weight)| Neighbor { id, weight })
			.collect())
	}

	fn edges(&self, id: MemoryId) -> BackendResult<Vec<MemoryEdge>> {
		let Some(slots) = self.outgoing.get(&id) else {
			return Ok(Vec::new());
		};
		Ok(slots
			.iter()
			.map(|slot| MemoryEdge {
				source: id,
				target: slot.target,
				weight: slot.weight,
				kind: slot.kind,
			})
			.collect())
	}

	fn remove_node(&mut self, id: MemoryId) -> BackendResult<usize> {
		let mut removed = 0;

		if let Some(slots) = self.outgoing.remove(&id) {
			removed += slots.len();
			for slot in &slots {
				if let Some(sources) = self.incoming.get_mut(&slot.target) {
					sources.retain(|s| *s != id);
					if sources.is_empty() {
						let _ = self.incoming.remove(&slot.target);
					}
				}
			}
		}

		if let Some(sources) = self.incoming.remove(&id) {
			for source in sources {
				if let Some(slots) = self.outgoing.get_mut(&source) {
					let before = slots.len();
					slots.retain(|slot| slot.target != id);
					removed += before - slots.len();
					if slots.is_empty() {
						let _ = self.outgoing.remove(&source);
					}
				}
			}
		}

		self.edges -= removed;
		Ok(removed)
	}

	fn edge_count(&self) -> usize {
		self.edges
	}

	fn name(&self) -> &'static str {
		"memory"
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;

	#[test]
	fn test_add_edge_is_idempotent() {
		let mut graph = InMemoryGraphStore::new();
		graph
			.add_edge(MemoryId(1), MemoryId(2), 0.4, EdgeKind::Temporal)
			.unwrap();
		graph
			.add_edge(MemoryId(1), MemoryId(2), 0.9, EdgeKind::Temporal)
			.unwrap();
		assert_eq!(graph.edge_count(), 1);
		assert_eq!(
			graph.neighbors(MemoryId(1)).unwrap(),
			vec![Neighbor {
				id: MemoryId(2),
				weight: 0.9
			}]
		);
	}

	#[test]
	fn test_distinct_kinds_coexist() {
		let mut graph = InMemoryGraphStore::new();
		graph
			.add_edge(MemoryId(1), MemoryId(2), 0.3, EdgeKind::Temporal)
			.unwrap();
		graph
			.add_edge(MemoryId(1), MemoryId(2), 0.7, EdgeKind::Reference)
			.unwrap();
		assert_eq!(graph.edge_count(), 2);
		let kinds: Vec<EdgeKind> = graph
			.edges(MemoryId(1))
			.unwrap()
			.iter()
			.map(|e| e.kind)
			.collect();
		assert_eq!(kinds, vec![EdgeKind::Temporal, EdgeKind::Reference]);

		// neighbour set reports the strongest edge once
		let neighbors = graph.neighbors(MemoryId(1)).unwrap();
		assert_eq!(neighbors.len(), 1);
		assert!((neighbors[0].weight - 0.7).abs() < f64::EPSILON);
	}

	#[test]
	fn test_weight_clamped() {
		let mut graph = InMemoryGraphStore::new();
		graph
			.add_edge(MemoryId(1), MemoryId(2), 3.0, EdgeKind::CoOccurrence)
			.unwrap();
		graph
			.add_edge(MemoryId(1), MemoryId(3), -1.0, EdgeKind::CoOccurrence)
			.unwrap();
		let neighbors = graph.neighbors(MemoryId(1)).unwrap();
		assert!((neighbors[0].weight - 1.0).abs() < f64::EPSILON);
		assert!((neighbors[1].weight - MIN_EDGE_WEIGHT).abs() < f64::EPSILON);
		assert!(graph
			.add_edge(MemoryId(1), MemoryId(4), f64::NAN, EdgeKind::Temporal)
			.is_err());
	}

	#[test]
	fn test_self_loop_rejected() {
		let mut graph = InMemoryGraphStore::new();
		assert_eq!(
			graph.add_edge(MemoryId(5), MemoryId(5), 0.5, EdgeKind::Reference),
			Err(BackendError::SelfLoop(MemoryId(5)))
		);
		assert_eq!(graph.edge_count(), 0);
	}

	#[test]
	fn test_remove_node_cascades() {
		let mut graph = InMemoryGraphStore::new();
		graph
			.add_edge(MemoryId(1), MemoryId(2), 0.5, EdgeKind::Temporal)
			.unwrap();
		graph
			.add_edge(MemoryId(2), MemoryId(1), 0.5, EdgeKind::Temporal)
			.unwrap();
		graph
			.add_edge(MemoryId(2), MemoryId(3), 0.5, EdgeKind::Reference)
			.unwrap();
		graph
			.add_edge(MemoryId(3), MemoryId(1), 0.5, EdgeKind::CoOccurrence)
			.unwrap();

		assert_eq!(graph.remove_node(MemoryId(2)).unwrap(), 3);
		assert_eq!(graph.edge_count(), 1);
		assert!(graph.neighbors(MemoryId(1)).unwrap().is_empty());
		assert!(graph.neighbors(MemoryId(2)).unwrap().is_empty());
		assert_eq!(graph.neighbors(MemoryId(3)).unwrap()[0].id, MemoryId(1));

		assert_eq!(graph.remove_node(MemoryId(2)).unwrap(), 0);
	}
}
