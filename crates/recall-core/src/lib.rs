//! # Recall Core
//!
//! Memory activation and retrieval engine for conversational agents. For every
//! incoming message it decides which past messages are relevant right now and
//! fits them into a hard size budget for the downstream model.
//!
//! ## Why Activation?
//!
//! Similarity alone returns whatever looks alike, regardless of whether the
//! conversation moved on an hour ago. Here, every memory carries an activation
//! level that:
//!
//! - **Fades between uses** - one decay step per turn of its owner
//! - **Grows when used** - memories selected into a context are reinforced
//! - **Spreads along associations** - a matching memory lifts its neighbours
//!
//! ## Core Concepts
//!
//! ### Activation
//!
//! 1. **Decay** - `A ← A × f^Δt`, `Δt` in turns, computed lazily on read
//! 2. **Reinforcement** - `A ← min(cap, A + gain × relevance)`
//! 3. **Spreading** - neighbour at hop `h` receives `s × w × hop_decay^(h−1)`,
//!    boosted for memory kinds the current message tends to need
//!
//! ### Retrieval
//!
//! 1. Vector index returns the nearest memories
//! 2. Direct hits spread activation to their neighbours through the graph
//! 3. Candidates below the activation threshold are dropped, however similar
//! 4. `score = α × similarity + (1 − α) × activation`, ranked
//! 5. Greedy fill of the item and character budget
//!
//! Afterwards the message itself is stored and linked to the previous memory,
//! to the memories it was answered with, and to memories sharing its topics.
//! How strongly it starts out depends on its significance: length, topics and
//! kind.
//!
//! ## Example
//!
//! ```rust
//! use recall_core::{EngineConfig, MemoryEngine};
//!
//! let engine = MemoryEngine::new(EngineConfig::default())?;
//!
//! engine.process_turn("alice", "I adopted a cat named Miso")?;
//! let outcome = engine.process_turn("alice", "Miso keeps scratching the sofa")?;
//!
//! assert_eq!(outcome.context.render(), "I adopted a cat named Miso");
//! println!(
//!     "{} memory hits from {} candidates in {:?}",
//!     outcome.metrics.memory_hits,
//!     outcome.metrics.candidates_considered,
//!     outcome.metrics.latency()
//! );
//! # Ok::<(), recall_core::EngineError>(())
//! ```
//!
//! ## Failure Model
//!
//! Only configuration errors and malformed input are returned to the caller.
//! An unreachable vector or graph backend degrades the turn to whatever still
//! works and is reported in [`TurnMetrics::degraded`]. With neither backend
//! available the turn returns an empty context.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod activation;
pub mod assembler;
pub mod backend;
pub mod classify;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod memory;
pub mod metrics;
pub mod retrieval;
pub mod session;
pub mod spreading;
pub mod vector;

pub use activation::{
	blend_score, cosine_similarity, decay, reinforce, ActivationConfig, ActivationState, Trace,
};
pub use assembler::{assemble, AssembledContext, ContextBudget, ContextEntry};
pub use backend::{
	BackendFactory, BackendKind, BackendsConfig, ConfiguredBackends, DisabledGraph,
	DisabledVector, RetryPolicy, Retrying,
};
pub use classify::{classify, extract_tags};
pub use config::{EmbeddingConfig, EmbeddingProvider, EngineConfig, RetentionConfig};
pub use embedding::{Embedder, HashEmbedder};
#[cfg(feature = "onnx")]
pub use embedding::{OnnxEmbedder, OnnxEmbedderConfig};
pub use engine::{MemoryEngine, TurnOutcome, UserStatus};
pub use error::{
	BackendError, BackendResult, ConfigError, EmbeddingError, EngineError, InputError, Result,
};
pub use graph::{GraphStore, InMemoryGraphStore, Neighbor};
pub use ingest::{significance, WiringConfig};
pub use memory::{EdgeKind, Embedding, MemoryEdge, MemoryId, MemoryItem, MemoryKind};
pub use metrics::{Degradation, EngineStats, StatsSnapshot, TurnMetrics};
pub use retrieval::{rank_candidates, RetrievalCandidate, RetrievalConfig};
pub use session::{SessionStore, SharedUserMemory, UserMemory};
pub use spreading::{
	spread_activation, spread_activation_with_attention, AttentionRule, SpreadingConfig,
	SpreadingResult,
};
pub use vector::{InMemoryVectorIndex, VectorHit, VectorIndex};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;

	#[test]
	fn test_basic_turn_cycle() {
		let engine = MemoryEngine::new(EngineConfig::default()).unwrap();
		let first = engine.process_turn("alice", "I adopted a cat named Miso").unwrap();
		assert!(first.context.is_empty());

		let second = engine
			.process_turn("alice", "Miso keeps scratching the sofa")
			.unwrap();
		assert_eq!(second.context.ids(), vec![MemoryId(1)]);
		assert_eq!(second.metrics.memory_hits, 1);
	}
}
