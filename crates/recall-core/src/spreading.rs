//! Spreading Activation
//!
//! Memories don't exist in isolation. A memory that matches the current
//! message passes part of that match on to the memories it is associated with,
//! so topically linked memories can surface without matching the message
//! themselves.
//!
//! `E_n = E_m × w_mn × h^(d − 1) × a_n`
//!
//! Where:
//! - `E_m` = energy carried by node m (for a seed, its similarity `s`)
//! - `w_mn` = edge weight from m to n
//! - `h` = per-hop decay beyond the first hop
//! - `d` = hop count (1-based)
//! - `a_n` = attention on n for the kind of message being answered, ≥ 1
//!
//! The first hop therefore delivers at least `s × w`. Traversal is one
//! breadth-first pass with a depth bound and a visited set, so it terminates
//! on cyclic graphs and never iterates to a fixpoint.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::graph::Neighbor;
use crate::memory::{MemoryId, MemoryKind};

/// Largest accepted attention multiplier.
pub const MAX_ATTENTION_WEIGHT: f64 = 4.0;

/// Extra energy for memories of kind `target` when answering a `query`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttentionRule {
	/// Kind of the incoming message
	pub query: MemoryKind,
	/// Kind of the memory receiving energy
	pub target: MemoryKind,
	/// Multiplier in [1, 4]
	pub weight: f64,
}

impl AttentionRule {
	const fn new(query: MemoryKind, target: MemoryKind, weight: f64) -> Self {
		Self {
			query,
			target,
			weight,
		}
	}
}

/// Questions lean on facts, feelings on earlier feelings and plans, plans on
/// plans.
fn default_attention() -> Vec<AttentionRule> {
	use MemoryKind::{EmotionalState, Fact, Preference, Question, Task};
	vec![
		AttentionRule::new(Question, Fact, 1.3),
		AttentionRule::new(Question, Preference, 1.2),
		AttentionRule::new(EmotionalState, EmotionalState, 1.5),
		AttentionRule::new(EmotionalState, Task, 1.3),
		AttentionRule::new(Task, Task, 1.3),
		AttentionRule::new(Task, Fact, 1.2),
		AttentionRule::new(Preference, Preference, 1.3),
	]
}

/// Configuration for spreading activation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadingConfig {
	/// Seeds below this similarity do not spread
	pub similarity_floor: f64,
	/// Maximum hops from a seed
	pub max_depth: usize,
	/// Multiplier applied per hop after the first, in (0, 1]
	pub hop_decay: f64,
	/// Maximum nodes to visit, seeds included
	pub max_nodes: usize,
	/// Nodes carrying less energy than this do not propagate further
	pub minimum_energy: f64,
	/// Per message kind boosts; pairs not listed get 1
	pub attention: Vec<AttentionRule>,
}

impl Default for SpreadingConfig {
	fn default() -> Self {
		Self {
			similarity_floor: 0.2,
			max_depth: 1,
			hop_decay: 0.5,
			max_nodes: 256,
			minimum_energy: 0.01,
			attention: default_attention(),
		}
	}
}

impl SpreadingConfig {
	/// Multiplier for energy reaching a `target` memory while answering a
	/// `query` message. The first matching rule wins.
	#[must_use]
	pub fn attention_weight(&self, query: MemoryKind, target: MemoryKind) -> f64 {
		self.attention
			.iter()
			.find(|rule| rule.query == query && rule.target == target)
			.map_or(1.0, |rule| rule.weight)
	}
}

/// Result of spreading activation.
#[derive(Clone, Debug, Default)]
pub struct SpreadingResult {
	/// Energy received by each reached node, seeds included when linked from another seed
	pub received: BTreeMap<MemoryId, f64>,
	/// Which nodes were first reached at each depth (index 0 = seeds)
	pub visited_by_depth: Vec<Vec<MemoryId>>,
	/// First neighbour lookup failure, after which traversal stopped
	pub error: Option<BackendError>,
}

impl SpreadingResult {
	/// Nodes reached through the graph that were not seeds.
	#[must_use]
	pub fn reached(&self) -> Vec<MemoryId> {
		self.visited_by_depth.iter().skip(1).flatten().copied().collect()
	}
}

/// Perform spreading activation from `seeds` through `neighbors` with no
/// attention bias.
///
/// See [`spread_activation_with_attention`].
pub fn spread_activation<F>(
	seeds: &[(MemoryId, f64)],
	neighbors: F,
	config: &SpreadingConfig,
) -> SpreadingResult
where
	F: FnMut(MemoryId) -> Result<Vec<Neighbor>, BackendError>,
{
	spread_activation_with_attention(seeds, neighbors, |_| 1.0, config)
}

/// Perform spreading activation from `seeds` through `neighbors`.
///
/// Seeds below `similarity_floor` are ignored. A failing neighbour lookup
/// stops traversal; energy delivered before the failure is kept. Once
/// `max_nodes` nodes are visited, unvisited nodes receive nothing.
///
/// # Arguments
///
/// * `seeds` - `(memory, similarity)` starting points
/// * `neighbors` - adjacency lookup, usually a [`crate::graph::GraphStore`]
/// * `attention` - multiplier on energy arriving at a node, at least 1
/// * `config` - spreading configuration
pub fn spread_activation_with_attention<F, A>(
	seeds: &[(MemoryId, f64)],
	mut neighbors: F,
	attention: A,
	config: &SpreadingConfig,
) -> SpreadingResult
where
	F: FnMut(MemoryId) -> Result<Vec<Neighbor>, BackendError>,
	A: Fn(MemoryId) -> f64,
{
	let mut frontier: Vec<(MemoryId, f64)> = seeds
		.iter()
		.copied()
		.filter(|&(_, s)| s >= config.similarity_floor && s > 0.0)
		.collect();
	frontier.sort_by_key(|&(id, _)| id);
	frontier.dedup_by_key(|&mut (id, _)| id);

	let mut result = SpreadingResult {
		visited_by_depth: vec![frontier.iter().map(|&(id, _)| id).collect()],
		..SpreadingResult::default()
	};
	let mut visited: HashSet<MemoryId> = frontier.iter().map(|&(id, _)| id).collect();

	'depth: for depth in 1..=config.max_depth {
		if frontier.is_empty() || visited.len() >= config.max_nodes {
			break;
		}

		let attenuation = config.hop_decay.powi(i32::try_from(depth - 1).unwrap_or(i32::MAX));
		let mut next_frontier: Vec<MemoryId> = Vec::new();

		for &(source, energy) in &frontier {
			if energy < config.minimum_energy {
				continue;
			}

			let edges = match neighbors(source) {
				Ok(edges) => edges,
				Err(err) => {
					result.error = Some(err);
					break 'depth;
				}
			};

			for Neighbor { id, weight } in edges {
				let seen = visited.contains(&id);
				if !seen && visited.len() >= config.max_nodes {
					continue;
				}

				let amount = energy * weight * attenuation * attention(id);
				*result.received.entry(id).or_insert(0.0) += amount;

				if !seen {
					let _ = visited.insert(id);
					next_frontier.push(id);
				}
			}
		}

		if next_frontier.is_empty() {
			break;
		}

		// Energy from later sources in the same hop also counts for propagation.
		frontier = next_frontier
			.iter()
			.map(|&id| (id, result.received.get(&id).copied().unwrap_or(0.0)))
			.collect();
		next_frontier.sort_unstable();
		result.visited_by_depth.push(next_frontier);
	}

	result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;

	type Lookup<'a> = Box<dyn FnMut(MemoryId) -> Result<Vec<Neighbor>, BackendError> + 'a>;

	fn graph(edges: &[(u64, u64, f64)]) -> Lookup<'_> {
		Box::new(move |id| {
			Ok(edges
				.iter()
				.filter(|(s, _, _)| *s == id.0)
				.map(|&(_, t, w)| Neighbor {
					id: MemoryId(t),
					weight: w,
				})
				.collect())
		})
	}

	#[test]
	fn test_one_hop_delivers_similarity_times_weight() {
		let edges = [(1, 2, 0.6)];
		let config = SpreadingConfig::default();
		let result = spread_activation(&[(MemoryId(1), 0.8)], graph(&edges), &config);
		assert!((result.received[&MemoryId(2)] - 0.48).abs() < 1e-12);
		assert_eq!(result.reached(), vec![MemoryId(2)]);
	}

	#[test]
	fn test_depth_bound() {
		// chain 1 → 2 → 3 → 4
		let edges = [(1, 2, 1.0), (2, 3, 1.0), (3, 4, 1.0)];
		let config = SpreadingConfig {
			max_depth: 2,
			hop_decay: 0.5,
			..Default::default()
		};
		let result = spread_activation(&[(MemoryId(1), 1.0)], graph(&edges), &config);
		assert!((result.received[&MemoryId(2)] - 1.0).abs() < 1e-12);
		assert!((result.received[&MemoryId(3)] - 0.5).abs() < 1e-12);
		assert!(!result.received.contains_key(&MemoryId(4)));
		assert_eq!(result.visited_by_depth.len(), 3);
	}

	#[test]
	fn test_cycle_terminates() {
		let edges = [(1, 2, 1.0), (2, 1, 1.0), (2, 3, 1.0), (3, 1, 1.0)];
		let config = SpreadingConfig {
			max_depth: 8,
			hop_decay: 1.0,
			..Default::default()
		};
		let result = spread_activation(&[(MemoryId(1), 1.0)], graph(&edges), &config);
		assert_eq!(result.reached(), vec![MemoryId(2), MemoryId(3)]);
		// seed gets energy back through the cycle but is not revisited
		assert!(result.received.contains_key(&MemoryId(1)));
	}

	#[test]
	fn test_floor_filters_seeds() {
		let edges = [(1, 2, 1.0)];
		let config = SpreadingConfig::default();
		let result = spread_activation(&[(MemoryId(1), 0.1)], graph(&edges), &config);
		assert!(result.received.is_empty());
		assert!(result.visited_by_depth[0].is_empty());
	}

	#[test]
	fn test_seed_linked_from_seed_still_receives() {
		let edges = [(1, 2, 0.5)];
		let result = spread_activation(
			&[(MemoryId(1), 0.9), (MemoryId(2), 0.4)],
			graph(&edges),
			&SpreadingConfig::default(),
		);
		assert!((result.received[&MemoryId(2)] - 0.45).abs() < 1e-12);
		assert!(result.reached().is_empty());
	}

	#[test]
	fn test_lookup_failure_stops() {
		let result = spread_activation(
			&[(MemoryId(1), 0.9)],
			|_| Err(BackendError::Unavailable { backend: "graph" }),
			&SpreadingConfig::default(),
		);
		assert!(result.received.is_empty());
		assert!(result.error.is_some());
	}

	#[test]
	fn test_max_nodes() {
		let edges = [(1, 2, 1.0), (1, 3, 1.0), (1, 4, 1.0)];
		let config = SpreadingConfig {
			max_nodes: 2,
			..Default::default()
		};
		let result = spread_activation(&[(MemoryId(1), 1.0)], graph(&edges), &config);
		assert_eq!(result.reached().len(), 1);
		// nodes past the visit budget get no energy either
		assert_eq!(result.received.len(), 1);
		assert!(result.received.contains_key(&MemoryId(2)));
	}

	#[test]
	fn test_max_nodes_still_feeds_visited() {
		// 3 is already a seed, so it keeps receiving once the budget is spent
		let edges = [(1, 2, 1.0), (1, 3, 0.5), (1, 4, 1.0)];
		let config = SpreadingConfig {
			max_nodes: 3,
			..Default::default()
		};
		let seeds = [(MemoryId(1), 1.0), (MemoryId(3), 0.5)];
		let result = spread_activation(&seeds, graph(&edges), &config);
		assert_eq!(result.reached(), vec![MemoryId(2)]);
		assert!((result.received[&MemoryId(3)] - 0.5).abs() < 1e-12);
		assert!(!result.received.contains_key(&MemoryId(4)));
	}

	#[test]
	fn test_attention_scales_energy_per_target() {
		let edges = [(1, 2, 0.6), (1, 3, 0.6)];
		let attention = |id: MemoryId| if id == MemoryId(2) { 1.5 } else { 1.0 };
		let result = spread_activation_with_attention(
			&[(MemoryId(1), 0.8)],
			graph(&edges),
			attention,
			&SpreadingConfig::default(),
		);
		assert!((result.received[&MemoryId(2)] - 0.72).abs() < 1e-12);
		assert!((result.received[&MemoryId(3)] - 0.48).abs() < 1e-12);
	}

	#[test]
	fn test_attention_table_defaults() {
		let config = SpreadingConfig::default();
		let weight = config.attention_weight(MemoryKind::Question, MemoryKind::Fact);
		assert!((weight - 1.3).abs() < f64::EPSILON);
		let weight = config.attention_weight(MemoryKind::General, MemoryKind::Fact);
		assert!((weight - 1.0).abs() < f64::EPSILON);
		assert!(config.attention.iter().all(|rule| rule.weight >= 1.0));
	}
}
