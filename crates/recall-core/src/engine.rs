//! The memory engine.
//!
//! One call to [`MemoryEngine::process_turn`] runs the whole per-turn cycle
//! under the user's lock:
//!
//! 1. Validate and embed the message
//! 2. Advance the user's turn clock (lazy decay of every memory)
//! 3. Query the vector index
//! 4. Spread activation from the hits (or from fallback seeds) to their neighbours
//! 5. Merge, threshold, rank and assemble under the budget
//! 6. Reinforce what was used
//! 7. Store the message as a new memory and wire it into the graph
//!
//! Backend failures never fail the turn. They are logged and reported in
//! [`TurnMetrics::degraded`]. With neither backend answering, the context is
//! empty.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::activation::cosine_similarity;
use crate::assembler::{assemble, AssembledContext, ContextBudget, ContextEntry};
use crate::backend::{BackendFactory, ConfiguredBackends};
use crate::classify::{classify, extract_tags};
use crate::config::EngineConfig;
use crate::embedding::Embedder;
use crate::error::{InputError, Result};
use crate::ingest::{plan_edges, significance};
use crate::memory::{content_len, Embedding, MemoryEdge, MemoryId, MemoryItem, MemoryKind};
use crate::metrics::{Degradation, EngineStats, StatsSnapshot, TurnMetrics};
use crate::retrieval::{rank_candidates, RetrievalCandidate};
use crate::session::{SessionStore, UserMemory};
use crate::spreading::spread_activation_with_attention;

/// Result of one turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
	/// Memories to hand to the generator
	pub context: AssembledContext,
	/// What happened
	pub metrics: TurnMetrics,
}

/// Operational view of one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
	/// User
	pub user_id: String,
	/// Stored memories
	pub total: usize,
	/// Memories at or above the activation threshold
	pub active: usize,
	/// Memories below the threshold
	pub dormant: usize,
	/// Graph edges
	pub edges: usize,
	/// Turns processed
	pub turns: u64,
	/// Time of the last turn
	pub last_turn_at: Option<DateTime<Utc>>,
}

/// The incoming message as seen by retrieval.
struct Query<'a> {
	/// `None` when embedding failed
	embedding: Option<&'a [f64]>,
	kind: MemoryKind,
}

/// Memory activation and retrieval engine. Shareable across threads.
pub struct MemoryEngine {
	config: Arc<EngineConfig>,
	embedder: Arc<dyn Embedder>,
	sessions: SessionStore,
	stats: EngineStats,
}

impl MemoryEngine {
	/// Engine with the configured embedder and backends.
	///
	/// # Errors
	///
	/// Returns a configuration error if `config` is invalid or its embedding
	/// provider cannot be built.
	pub fn new(config: EngineConfig) -> Result<Self> {
		config.validate()?;
		let embedder = config.embedding.build()?;
		let factory = Arc::new(ConfiguredBackends::new(
			config.backends,
			embedder.dimensions(),
			config.retry.clone(),
		));
		Self::with_backends(config, embedder, factory)
	}

	/// Engine with an explicit embedder and backend factory.
	///
	/// # Errors
	///
	/// Returns a configuration error if `config` is invalid.
	pub fn with_backends(
		config: EngineConfig,
		embedder: Arc<dyn Embedder>,
		factory: Arc<dyn BackendFactory>,
	) -> Result<Self> {
		config.validate()?;
		info!(
			version = crate::VERSION,
			embedder = embedder.name(),
			dimensions = embedder.dimensions(),
			decay_factor = config.activation.decay_factor,
			activation_threshold = config.activation.activation_threshold,
			max_items = config.budget.max_items,
			max_chars = config.budget.max_chars,
			"memory engine ready"
		);
		Ok(Self {
			config: Arc::new(config),
			embedder,
			sessions: SessionStore::new(factory),
			stats: EngineStats::new(),
		})
	}

	/// Active configuration.
	#[must_use]
	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	/// Per-user spaces.
	#[must_use]
	pub const fn sessions(&self) -> &SessionStore {
		&self.sessions
	}

	/// Engine-wide counters.
	#[must_use]
	pub const fn stats(&self) -> &EngineStats {
		&self.stats
	}

	/// Snapshot of the engine-wide counters.
	#[must_use]
	pub fn stats_snapshot(&self) -> StatsSnapshot {
		self.stats.snapshot()
	}

	/// Process one message with the configured default budget.
	///
	/// # Errors
	///
	/// Returns an [`InputError`] for an empty user id, empty or over-long text,
	/// or an embedding of the wrong size. Nothing is modified in that case.
	pub fn process_turn(&self, user_id: &str, text: &str) -> Result<TurnOutcome> {
		self.process_turn_with_budget(user_id, text, &self.config.budget)
	}

	/// Process one message with an explicit budget.
	///
	/// # Errors
	///
	/// See [`MemoryEngine::process_turn`].
	#[instrument(level = "debug", skip_all, fields(user_id = %user_id))]
	pub fn process_turn_with_budget(
		&self,
		user_id: &str,
		text: &str,
		budget: &ContextBudget,
	) -> Result<TurnOutcome> {
		let started = Instant::now();
		self.validate_input(user_id, text)?;

		let mut degraded = Degradation::default();
		let embedding = match self.embedder.embed(text) {
			Ok(embedding) if embedding.len() != self.embedder.dimensions() => {
				return Err(InputError::DimensionMismatch {
					expected: self.embedder.dimensions(),
					actual: embedding.len(),
				}
				.into());
			}
			Ok(embedding) => Some(embedding),
			Err(err) => {
				let embedder = self.embedder.name();
				warn!(user_id, embedder, error = %err, "embedding failed");
				degraded.embedding = true;
				None
			}
		};

		let space = self.sessions.get_or_create(user_id);
		let mut guard = space.lock();
		let memory: &mut UserMemory = &mut guard;
		let now = Utc::now();

		let mut metrics = TurnMetrics {
			turn: memory.activation.advance_turn(),
			..TurnMetrics::default()
		};

		let kind = classify(text);
		let query = Query {
			embedding: embedding.as_deref(),
			kind,
		};
		let context = self.retrieve(memory, &query, budget, now, &mut degraded, &mut metrics);
		metrics.set_latency(started.elapsed());

		if let Some(embedding) = embedding {
			let stored = self.ingest(memory, text, kind, embedding, &context, now, &mut degraded);
			metrics.stored = Some(stored);
			metrics.evicted = self.enforce_retention(memory);
		}
		memory.last_turn_at = Some(now);
		drop(guard);

		metrics.degraded = degraded;
		self.stats.record_turn(&metrics);
		debug!(
			turn = metrics.turn,
			latency_us = metrics.latency_us,
			memory_hits = metrics.memory_hits,
			candidates = metrics.candidates_considered,
			active = metrics.candidates_active,
			degraded = degraded.any(),
			"turn processed"
		);

		Ok(TurnOutcome { context, metrics })
	}

	fn validate_input(&self, user_id: &str, text: &str) -> std::result::Result<(), InputError> {
		if user_id.trim().is_empty() {
			return Err(InputError::EmptyUser);
		}
		if text.trim().is_empty() {
			return Err(InputError::EmptyText);
		}
		let len = content_len(text);
		let max = self.config.retrieval.max_content_chars;
		if len > max {
			return Err(InputError::TooLong { len, max });
		}
		Ok(())
	}

	/// Steps 3 to 6: candidates, spreading, ranking, assembly, reinforcement.
	///
	/// Activation only rises through energy from neighbours before the
	/// threshold filter, and through reinforcement after selection.
	fn retrieve(
		&self,
		memory: &mut UserMemory,
		query: &Query<'_>,
		budget: &ContextBudget,
		now: DateTime<Utc>,
		degraded: &mut Degradation,
		metrics: &mut TurnMetrics,
	) -> AssembledContext {
		let cfg = &*self.config;

		let mut hits: BTreeMap<MemoryId, f64> = BTreeMap::new();
		if let Some(embedding) = query.embedding {
			match memory.vector.query(embedding, cfg.retrieval.candidate_pool) {
				Ok(found) => hits.extend(
					found
						.into_iter()
						.filter(|hit| memory.items.contains_key(&hit.id))
						.map(|hit| (hit.id, hit.similarity)),
				),
				Err(err) => {
					warn!(
						user_id = %memory.user_id,
						error = %err,
						"vector query failed, falling back to graph"
					);
					degraded.vector = true;
				}
			}
		}
		metrics.vector_hits = hits.len();

		// Without similarity, the last turn's context and the latest memory seed the graph.
		let graph_only = query.embedding.is_none() || degraded.vector;
		let seeds: Vec<(MemoryId, f64)> = if graph_only {
			let mut fallback: BTreeSet<MemoryId> =
				memory.previous_selection.iter().copied().collect();
			fallback.extend(memory.last_memory);
			fallback
				.into_iter()
				.filter_map(|id| {
					let activation = memory.activation.activation(id, &cfg.activation)?;
					Some((id, activation))
				})
				.collect()
		} else {
			hits.iter().map(|(&id, &s)| (id, s)).collect()
		};

		let graph = &memory.graph;
		let items = &memory.items;
		let attention = |id: MemoryId| {
			items.get(&id).map_or(1.0, |item| {
				cfg.spreading.attention_weight(query.kind, item.kind)
			})
		};
		let spread = spread_activation_with_attention(
			&seeds,
			|id| graph.neighbors(id),
			attention,
			&cfg.spreading,
		);
		if let Some(err) = &spread.error {
			warn!(user_id = %memory.user_id, error = %err, "graph traversal failed");
			degraded.graph = true;
			if graph_only {
				memory.previous_selection.clear();
				return AssembledContext::default();
			}
		}
		for (&id, &amount) in &spread.received {
			let _ = memory.activation.stimulate(id, amount, &cfg.activation);
		}

		let mut ids: BTreeSet<MemoryId> = hits.keys().copied().collect();
		ids.extend(spread.received.keys().copied());
		ids.retain(|id| memory.items.contains_key(id));
		metrics.candidates_considered = ids.len();
		metrics.graph_activated = ids.iter().filter(|&id| !hits.contains_key(id)).count();

		let candidates: Vec<RetrievalCandidate> = ids
			.into_iter()
			.filter_map(|id| {
				let item = memory.items.get(&id)?;
				let activation = memory.activation.activation(id, &cfg.activation)?;
				let similarity = hits.get(&id).copied().unwrap_or_else(|| {
					query
						.embedding
						.map_or(0.0, |q| cosine_similarity(q, &item.embedding))
				});
				let spreading = spread.received.get(&id).copied().unwrap_or(0.0);
				Some(RetrievalCandidate::new(
					id,
					similarity,
					activation,
					spreading,
					item.last_accessed_at,
				))
			})
			.collect();

		let ranked = rank_candidates(candidates, &cfg.activation);
		metrics.candidates_active = ranked.len();

		let entries: Vec<ContextEntry> = ranked
			.iter()
			.filter_map(|c| {
				memory.items.get(&c.id).map(|item| ContextEntry {
					id: c.id,
					content: item.content.clone(),
					kind: item.kind,
					score: c.score,
				})
			})
			.collect();
		let context = assemble(&entries, budget);

		for entry in &context.entries {
			let _ = memory.activation.reinforce(entry.id, entry.score, &cfg.activation);
			if let Some(item) = memory.items.get_mut(&entry.id) {
				item.last_accessed_at = now;
			}
		}
		memory.previous_selection = context.ids();
		metrics.memory_hits = context.len();

		context
	}

	/// Step 7: store the message and wire it into the graph.
	#[allow(clippy::too_many_arguments)]
	fn ingest(
		&self,
		memory: &mut UserMemory,
		text: &str,
		kind: MemoryKind,
		embedding: Embedding,
		context: &AssembledContext,
		now: DateTime<Utc>,
		degraded: &mut Degradation,
	) -> MemoryId {
		let cfg = &*self.config;
		let id = memory.allocate_id();
		let item = MemoryItem::new(
			id,
			memory.user_id.clone(),
			text,
			embedding,
			kind,
			extract_tags(text),
			now,
		);
		let initial = cfg.activation.initial_for(significance(&item));

		if let Err(err) = memory.vector.upsert(id, &item.embedding) {
			warn!(
				user_id = %memory.user_id,
				memory_id = %id,
				error = %err,
				"vector upsert failed"
			);
			degraded.vector = true;
		}

		let selected: Vec<(MemoryId, f64)> =
			context.entries.iter().map(|e| (e.id, e.score)).collect();
		let recent = memory.items.values().rev();
		let plan = plan_edges(&item, memory.last_memory, &selected, recent, &cfg.graph);

		'wiring: for edge in plan {
			for (source, target) in [(id, edge.target), (edge.target, id)] {
				if let Err(err) = memory.graph.add_edge(source, target, edge.weight, edge.kind) {
					warn!(
						user_id = %memory.user_id,
						memory_id = %id,
						error = %err,
						"edge wiring failed"
					);
					degraded.graph = true;
					break 'wiring;
				}
			}
		}

		memory.activation.insert(id, initial);
		let _ = memory.items.insert(id, item);
		memory.last_memory = Some(id);
		id
	}

	/// Evict the weakest memories until the retention bound holds.
	fn enforce_retention(&self, memory: &mut UserMemory) -> usize {
		let max = self.config.retention.max_memories_per_user;
		let mut evicted = 0;
		while max > 0 && memory.items.len() > max {
			let Some(weakest) = memory.activation.weakest(&self.config.activation) else {
				break;
			};
			if !memory.remove_memory(weakest) {
				let _ = memory.activation.remove(weakest);
				continue;
			}
			debug!(user_id = %memory.user_id, memory_id = %weakest, "memory evicted");
			evicted += 1;
		}
		evicted
	}

	/// Remove one memory and its edges.
	///
	/// # Errors
	///
	/// [`InputError::UnknownUser`] or [`InputError::UnknownMemory`].
	pub fn forget(&self, user_id: &str, memory_id: MemoryId) -> Result<()> {
		let space = self
			.sessions
			.get(user_id)
			.ok_or_else(|| InputError::UnknownUser(user_id.to_string()))?;
		if !space.lock().remove_memory(memory_id) {
			return Err(InputError::UnknownMemory(memory_id).into());
		}
		self.stats.record_forget();
		info!(user_id, memory_id = %memory_id, "memory forgotten");
		Ok(())
	}

	/// Reset a user's activations to the initial value, keeping memories.
	///
	/// # Errors
	///
	/// [`InputError::UnknownUser`].
	pub fn reset_activation(&self, user_id: &str) -> Result<()> {
		if self
			.sessions
			.reset_activation(user_id, self.config.activation.initial_activation)
		{
			Ok(())
		} else {
			Err(InputError::UnknownUser(user_id.to_string()).into())
		}
	}

	/// Discard a user's space. Returns whether it existed.
	pub fn drop_user(&self, user_id: &str) -> bool {
		self.sessions.drop_user(user_id)
	}

	/// Active and dormant counts of one user.
	#[must_use]
	pub fn status(&self, user_id: &str) -> Option<UserStatus> {
		let space = self.sessions.get(user_id)?;
		let memory = space.lock();
		let (active, dormant) = memory.activation.counts(&self.config.activation);
		Some(UserStatus {
			user_id: memory.user_id.clone(),
			total: memory.items.len(),
			active,
			dormant,
			edges: memory.graph.edge_count(),
			turns: memory.activation.current_turn(),
			last_turn_at: memory.last_turn_at,
		})
	}

	/// Status of every user, sorted by user id.
	#[must_use]
	pub fn status_all(&self) -> Vec<UserStatus> {
		self.sessions
			.users()
			.iter()
			.filter_map(|user| self.status(user))
			.collect()
	}

	/// A user's memories, oldest first.
	#[must_use]
	pub fn memories(&self, user_id: &str) -> Vec<MemoryItem> {
		let Some(space) = self.sessions.get(user_id) else {
			return Vec::new();
		};
		let memory = space.lock();
		memory.items().cloned().collect()
	}

	/// Associations leaving one memory, one per `(target, kind)`.
	///
	/// Empty for an unknown user or memory. A graph that cannot be read is
	/// logged and also yields nothing.
	#[must_use]
	pub fn associations(&self, user_id: &str, memory_id: MemoryId) -> Vec<MemoryEdge> {
		let Some(space) = self.sessions.get(user_id) else {
			return Vec::new();
		};
		let memory = space.lock();
		if !memory.items.contains_key(&memory_id) {
			return Vec::new();
		}
		memory.graph.edges(memory_id).unwrap_or_else(|err| {
			warn!(user_id, memory_id = %memory_id, error = %err, "graph read failed");
			Vec::new()
		})
	}

	/// Current activation of one memory.
	#[must_use]
	pub fn activation(&self, user_id: &str, memory_id: MemoryId) -> Option<f64> {
		let space = self.sessions.get(user_id)?;
		let memory = space.lock();
		memory.activation.activation(memory_id, &self.config.activation)
	}
}
