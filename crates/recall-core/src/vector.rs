//! Nearest-neighbour lookup over memory embeddings.
//!
//! [`VectorIndex`] is the contract every backend satisfies. The in-memory
//! index is an exact scan; it is what tests run against and what the engine
//! uses when no external store is configured.

use std::cmp::Ordering;
use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::activation::norm;
use crate::error::{BackendError, BackendResult};
use crate::memory::MemoryId;

/// Above this many entries the scan runs on the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 2048;

/// One nearest-neighbour result.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
	/// Matched memory
	pub id: MemoryId,
	/// Cosine similarity in [-1, 1]
	pub similarity: f64,
}

/// Nearest-neighbour index over one user's memories.
///
/// Results are ordered by descending similarity; equal similarities put the
/// most recently created memory first. Memory ids grow with creation time, so
/// that is the larger id.
pub trait VectorIndex: Send {
	/// Insert or replace the embedding stored for `id`.
	///
	/// # Errors
	///
	/// Returns a [`BackendError`] if the backend is unreachable or the vector
	/// has the wrong dimensionality.
	fn upsert(&mut self, id: MemoryId, embedding: &[f64]) -> BackendResult<()>;

	/// Up to `k` nearest memories. An empty index yields an empty result.
	///
	/// # Errors
	///
	/// Returns a [`BackendError`] if the backend is unreachable or the query
	/// has the wrong dimensionality.
	fn query(&self, embedding: &[f64], k: usize) -> BackendResult<Vec<VectorHit>>;

	/// Remove `id`. Returns whether it was present.
	///
	/// # Errors
	///
	/// Returns a [`BackendError`] if the backend is unreachable.
	fn remove(&mut self, id: MemoryId) -> BackendResult<bool>;

	/// Number of indexed memories.
	fn len(&self) -> usize;

	/// True when nothing is indexed.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Backend name for logs.
	fn name(&self) -> &'static str;
}

/// Order hits by similarity desc, then id desc.
pub(crate) fn rank_hits(a: &VectorHit, b: &VectorHit) -> Ordering {
	b.similarity
		.total_cmp(&a.similarity)
		.then_with(|| b.id.cmp(&a.id))
}

#[derive(Clone, Debug)]
struct IndexedVector {
	values: Vec<f64>,
	norm: f64,
}

/// Exact in-process index with pre-computed norms.
#[derive(Clone, Debug)]
pub struct InMemoryVectorIndex {
	dimensions: usize,
	entries: HashMap<MemoryId, IndexedVector>,
}

impl InMemoryVectorIndex {
	/// Create an index for vectors of `dimensions` components.
	#[must_use]
	pub fn new(dimensions: usize) -> Self {
		Self {
			dimensions,
			entries: HashMap::new(),
		}
	}

	/// Configured dimensionality.
	#[must_use]
	pub const fn dimensions(&self) -> usize {
		self.dimensions
	}

	const fn check_dimensions(&self, actual: usize) -> BackendResult<()> {
		if actual == self.dimensions {
			Ok(())
		} else {
			Err(BackendError::DimensionMismatch {
				expected: self.dimensions,
				actual,
			})
		}
	}

	fn similarity(probe: &[f64], probe_norm: f64, entry: &IndexedVector) -> f64 {
		if entry.norm == 0.0 {
			return 0.0;
		}
		let dot = probe
			.iter()
			.zip(entry.values.iter())
			.fold(0.0, |acc, (&p, &v)| p.mul_add(v, acc));
		(dot / (probe_norm * entry.norm)).clamp(-1.0, 1.0)
	}
}

impl VectorIndex for InMemoryVectorIndex {
	fn upsert(&mut self, id: MemoryId, embedding: &[f64]) -> BackendResult<()> {
		self.check_dimensions(embedding.len())?;
		let _ = self.entries.insert(
			id,
			IndexedVector {
				values: embedding.to_vec(),
				norm: norm(embedding),
			},
		);
		Ok(())
	}

	fn query(&self, embedding: &[f64], k: usize) -> BackendResult<Vec<VectorHit>> {
		self.check_dimensions(embedding.len())?;
		if k == 0 || self.entries.is_empty() {
			return Ok(Vec::new());
		}

		let probe_norm = norm(embedding);
		let score = |(&id, entry): (&MemoryId, &IndexedVector)| VectorHit {
			id,
			similarity: if probe_norm == 0.0 {
				0.0
			} else {
				Self::similarity(embedding, probe_norm, entry)
			},
		};

		let mut hits: Vec<VectorHit> = if self.entries.len() >= PARALLEL_SCAN_THRESHOLD {
			self.entries.par_iter().map(score).collect()
		} else {
			self.entries.iter().map(score).collect()
		};

		if hits.len() > k {
			let _ = hits.select_nth_unstable_by(k - 1, rank_hits);
			hits.truncate(k);
		}
		hits.sort_unstable_by(rank_hits);
		Ok(hits)
	}

	fn remove(&mut self, id: MemoryId) -> BackendResult<bool> {
		Ok(self.entries.remove(&id).is_some())
	}

	fn len(&self) -> usize {
		self.entries.len()
	}

	fn name(&self) -> &'static str {
		"memory"
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;

	fn index_with(vectors: &[(u64, [f64; 3])]) -> InMemoryVectorIndex {
		let mut index = InMemoryVectorIndex::new(3);
		for (id, v) in vectors {
			index.upsert(MemoryId(*id), v).unwrap();
		}
		index
	}

	#[test]
	fn test_query_empty_index() {
		let index = InMemoryVectorIndex::new(3);
		assert!(index.query(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
	}

	#[test]
	fn test_query_orders_by_similarity() {
		let index = index_with(&[
			(1, [0.0, 1.0, 0.0]),
			(2, [1.0, 0.0, 0.0]),
			(3, [0.7, 0.7, 0.0]),
		]);
		let hits = index.query(&[1.0, 0.1, 0.0], 3).unwrap();
		let ids: Vec<u64> = hits.iter().map(|h| h.id.0).collect();
		assert_eq!(ids, vec![2, 3, 1]);
		assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
	}

	#[test]
	fn test_query_respects_k() {
		let index = index_with(&[
			(1, [1.0, 0.0, 0.0]),
			(2, [0.9, 0.1, 0.0]),
			(3, [0.8, 0.2, 0.0]),
			(4, [0.1, 0.9, 0.0]),
		]);
		assert_eq!(index.query(&[1.0, 0.0, 0.0], 2).unwrap().len(), 2);
		assert!(index.query(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
		assert_eq!(index.query(&[1.0, 0.0, 0.0], 10).unwrap().len(), 4);
	}

	#[test]
	fn test_ties_prefer_recent() {
		let index = index_with(&[
			(4, [0.0, 0.0, 1.0]),
			(7, [0.0, 0.0, 2.0]),
			(5, [0.0, 0.0, 3.0]),
		]);
		let hits = index.query(&[0.0, 0.0, 1.0], 2).unwrap();
		assert_eq!(hits[0].id, MemoryId(7));
		assert_eq!(hits[1].id, MemoryId(5));
	}

	#[test]
	fn test_upsert_replaces_and_remove() {
		let mut index = index_with(&[(1, [1.0, 0.0, 0.0])]);
		index.upsert(MemoryId(1), &[0.0, 1.0, 0.0]).unwrap();
		assert_eq!(index.len(), 1);
		let hits = index.query(&[0.0, 1.0, 0.0], 1).unwrap();
		assert!((hits[0].similarity - 1.0).abs() < 1e-10);

		assert!(index.remove(MemoryId(1)).unwrap());
		assert!(!index.remove(MemoryId(1)).unwrap());
		assert!(index.is_empty());
	}

	#[test]
	fn test_dimension_mismatch() {
		let mut index = InMemoryVectorIndex::new(3);
		assert_eq!(
			index.upsert(MemoryId(1), &[1.0, 0.0]),
			Err(BackendError::DimensionMismatch {
				expected: 3,
				actual: 2
			})
		);
		assert!(index.query(&[1.0], 1).is_err());
	}

	#[test]
	fn test_large_index_parallel_scan() {
		let mut index = InMemoryVectorIndex::new(3);
		for i in 0..(PARALLEL_SCAN_THRESHOLD as u64 + 10) {
			#[allow(clippy::cast_precision_loss)]
			let x = i as f64;
			index.upsert(MemoryId(i), &[1.0, x, 0.0]).unwrap();
		}
		let hits = index.query(&[1.0, 0.0, 0.0], 3).unwrap();
		assert_eq!(hits[0].id, MemoryId(0));
		assert_eq!(hits.len(), 3);
	}
}
