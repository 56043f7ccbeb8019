//! Retrieval Ranking
//!
//! Merges the signals gathered for one turn into a single ranked list:
//!
//! 1. Vector similarity against the query embedding
//! 2. Activation after decay and spreading from neighbours
//! 3. Threshold filter on activation
//! 4. Blend and rank

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activation::{blend_score, ActivationConfig};
use crate::memory::MemoryId;

/// Configuration for candidate generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
	/// Nearest neighbours requested from the vector index per turn
	pub candidate_pool: usize,
	/// Longest message accepted, in chars
	pub max_content_chars: usize,
}

impl Default for RetrievalConfig {
	fn default() -> Self {
		Self {
			candidate_pool: 16,
			max_content_chars: 4000,
		}
	}
}

/// A memory candidate with all ranking components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
	/// Memory id
	pub id: MemoryId,
	/// Cosine similarity to the query, 0 when unknown
	pub similarity: f64,
	/// Activation after this turn's decay and spreading
	pub activation: f64,
	/// Energy received through graph edges this turn
	pub spreading: f64,
	/// Blended score, set by [`rank_candidates`]
	pub score: f64,
	/// Last time the memory was selected into a context
	pub last_accessed_at: DateTime<Utc>,
}

impl RetrievalCandidate {
	/// Unscored candidate.
	#[must_use]
	pub const fn new(
		id: MemoryId,
		similarity: f64,
		activation: f64,
		spreading: f64,
		last_accessed_at: DateTime<Utc>,
	) -> Self {
		Self {
			id,
			similarity,
			activation,
			spreading,
			score: 0.0,
			last_accessed_at,
		}
	}
}

/// Order by score desc, then most recently accessed, then youngest id.
fn rank_order(a: &RetrievalCandidate, b: &RetrievalCandidate) -> Ordering {
	b.score
		.total_cmp(&a.score)
		.then_with(|| b.last_accessed_at.cmp(&a.last_accessed_at))
		.then_with(|| b.id.cmp(&a.id))
}

/// Drop inactive candidates, score the rest and sort them.
///
/// # Arguments
///
/// * `candidates` - merged vector and graph candidates, one per memory
/// * `config` - threshold and blend weight
///
/// # Returns
///
/// Candidates with `activation >= activation_threshold`, best first.
#[must_use]
pub fn rank_candidates(
	candidates: Vec<RetrievalCandidate>,
	config: &ActivationConfig,
) -> Vec<RetrievalCandidate> {
	let mut ranked: Vec<RetrievalCandidate> = candidates
		.into_iter()
		.filter(|c| c.activation >= config.activation_threshold)
		.map(|mut c| {
			c.score = blend_score(c.similarity, c.activation, config.blend);
			c
		})
		.collect();

	ranked.sort_by(rank_order);
	ranked
}
