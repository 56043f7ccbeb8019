//! Activation Calculation
//!
//! Every memory carries a scalar activation that fades between uses and is
//! boosted when the memory is useful again:
//!
//! 1. **Decay** (forgetting): `A ← A × f^Δt`, `Δt` in turns of the owning user
//! 2. **Reinforcement** (use): `A ← min(cap, A + gain × relevance)`
//! 3. **Blend** (ranking): `score = α × similarity + (1 − α) × A`
//!
//! Decay is lazy. A trace stores the activation it had at `last_updated_turn`
//! and the decayed value is computed whenever it is read. Writes first
//! materialise the decay, so between writes activation can only go down.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::memory::MemoryId;

/// Configuration for activation calculations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
	/// `f` in the decay equation, in (0, 1). Smaller forgets faster.
	pub decay_factor: f64,
	/// Minimum activation for a memory to be retrieval-eligible
	pub activation_threshold: f64,
	/// Multiplier on relevance when a memory is selected into the context
	pub reinforcement_gain: f64,
	/// Upper bound on activation
	pub max_activation: f64,
	/// Activation of a freshly stored memory
	pub initial_activation: f64,
	/// `α`: weight of similarity against activation in the final score
	pub blend: f64,
	/// Share of the initial activation that depends on a new memory's
	/// significance, in [0, 1]. Zero gives every memory `initial_activation`.
	pub significance_weight: f64,
}

impl Default for ActivationConfig {
	fn default() -> Self {
		Self {
			decay_factor: 0.5,
			activation_threshold: 0.1,
			reinforcement_gain: 0.5,
			max_activation: 1.0,
			initial_activation: 1.0,
			blend: 0.5,
			significance_weight: 0.25,
		}
	}
}

impl ActivationConfig {
	/// Activation of a new memory whose significance is `significance`.
	///
	/// `initial_activation × ((1 − w) + w × significance)`, significance
	/// clamped to [0, 1]. A weight of zero ignores significance.
	#[must_use]
	pub fn initial_for(&self, significance: f64) -> f64 {
		let w = self.significance_weight;
		self.initial_activation * w.mul_add(significance.clamp(0.0, 1.0), 1.0 - w)
	}
}

// ============================================================================
// Vector Similarity
// ============================================================================

/// Compute cosine similarity between two vectors.
///
/// # Returns
///
/// Cosine similarity in range [-1, 1], or 0 if vectors have different lengths
/// or either has zero magnitude.
#[inline]
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
	if a.len() != b.len() {
		return 0.0;
	}

	let (dot_product, norm_a, norm_b) = a
		.iter()
		.zip(b.iter())
		.fold((0.0, 0.0, 0.0), |(dot, na, nb), (&ai, &bi)| {
			(ai.mul_add(bi, dot), ai.mul_add(ai, na), bi.mul_add(bi, nb))
		});

	let magnitude = norm_a.sqrt() * norm_b.sqrt();
	if magnitude == 0.0 {
		0.0
	} else {
		(dot_product / magnitude).clamp(-1.0, 1.0)
	}
}

/// Euclidean norm of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f64]) -> f64 {
	v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

// ============================================================================
// Decay / Reinforcement / Blend
// ============================================================================

/// Apply exponential forgetting over `elapsed_turns`.
///
/// `A' = A × f^Δt`. Returns `activation` unchanged when `Δt = 0`.
#[inline]
#[must_use]
pub fn decay(activation: f64, decay_factor: f64, elapsed_turns: u64) -> f64 {
	if elapsed_turns == 0 {
		return activation;
	}
	#[allow(clippy::cast_precision_loss)]
	let exponent = elapsed_turns as f64;
	activation * decay_factor.powf(exponent)
}

/// Boost activation after a memory was used.
///
/// `A' = min(cap, A + gain × relevance)`. Negative relevance counts as zero,
/// so reinforcement never lowers activation. An activation already above the
/// cap is left where it is.
#[inline]
#[must_use]
pub fn reinforce(activation: f64, gain: f64, relevance: f64, cap: f64) -> f64 {
	let boost = (gain * relevance).max(0.0);
	if activation >= cap {
		return activation;
	}
	(activation + boost).min(cap)
}

/// Blend similarity and activation into one ranking score.
///
/// `score = α × similarity + (1 − α) × activation`
#[inline]
#[must_use]
pub fn blend_score(similarity: f64, activation: f64, alpha: f64) -> f64 {
	alpha.mul_add(similarity, (1.0 - alpha) * activation)
}

// ============================================================================
// Activation State
// ============================================================================

/// Stored activation of one memory.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trace {
	/// Activation as of `last_updated_turn`
	pub activation: f64,
	/// Turn at which `activation` was last materialised
	pub last_updated_turn: u64,
}

/// Per-user activation map with a turn clock.
///
/// Owned by one user's session and only mutated under that session's lock.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActivationState {
	traces: HashMap<MemoryId, Trace>,
	turn: u64,
}

impl ActivationState {
	/// Empty state at turn zero.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Current turn of the owning user.
	#[must_use]
	pub const fn current_turn(&self) -> u64 {
		self.turn
	}

	/// Start a new turn. Everything not touched this turn ages by one step.
	pub fn advance_turn(&mut self) -> u64 {
		self.turn += 1;
		self.turn
	}

	/// Register a new memory at the current turn. Overwrites an existing trace.
	pub fn insert(&mut self, id: MemoryId, initial: f64) {
		let _ = self.traces.insert(
			id,
			Trace {
				activation: initial.max(0.0),
				last_updated_turn: self.turn,
			},
		);
	}

	/// Forget a memory's activation.
	pub fn remove(&mut self, id: MemoryId) -> Option<Trace> {
		self.traces.remove(&id)
	}

	/// Decayed activation as of the current turn, without writing it back.
	#[must_use]
	pub fn activation(&self, id: MemoryId, config: &ActivationConfig) -> Option<f64> {
		self.traces.get(&id).map(|trace| self.effective(trace, config))
	}

	/// Whether a memory is at or above the retrieval threshold.
	#[must_use]
	pub fn is_active(&self, id: MemoryId, config: &ActivationConfig) -> bool {
		self.activation(id, config)
			.is_some_and(|a| a >= config.activation_threshold)
	}

	/// Add `amount` to a memory's activation, capped at `max_activation`.
	///
	/// Decay up to the current turn is materialised first. Returns the new
	/// activation, or `None` if the memory is unknown.
	pub fn stimulate(
		&mut self,
		id: MemoryId,
		amount: f64,
		config: &ActivationConfig,
	) -> Option<f64> {
		let decayed = self.activation(id, config)?;
		let turn = self.turn;
		let trace = self.traces.get_mut(&id)?;
		trace.activation = reinforce(decayed, 1.0, amount, config.max_activation);
		trace.last_updated_turn = turn;
		Some(trace.activation)
	}

	/// Reinforce a memory that was selected into the context.
	pub fn reinforce(
		&mut self,
		id: MemoryId,
		relevance: f64,
		config: &ActivationConfig,
	) -> Option<f64> {
		self.stimulate(id, config.reinforcement_gain * relevance, config)
	}

	/// Reset every trace to `initial` at the current turn.
	pub fn reset(&mut self, initial: f64) {
		let turn = self.turn;
		for trace in self.traces.values_mut() {
			trace.activation = initial.max(0.0);
			trace.last_updated_turn = turn;
		}
	}

	/// Count `(active, dormant)` memories as of the current turn.
	#[must_use]
	pub fn counts(&self, config: &ActivationConfig) -> (usize, usize) {
		self.traces.values().fold((0, 0), |(active, dormant), trace| {
			if self.effective(trace, config) >= config.activation_threshold {
				(active + 1, dormant)
			} else {
				(active, dormant + 1)
			}
		})
	}

	/// Memory with the lowest activation; ties go to the oldest id.
	#[must_use]
	pub fn weakest(&self, config: &ActivationConfig) -> Option<MemoryId> {
		self.traces
			.iter()
			.map(|(&id, trace)| (id, self.effective(trace, config)))
			.min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
			.map(|(id, _)| id)
	}

	/// Number of tracked memories.
	#[must_use]
	pub fn len(&self) -> usize {
		self.traces.len()
	}

	/// True when no memory is tracked.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.traces.is_empty()
	}

	fn effective(&self, trace: &Trace, config: &ActivationConfig) -> f64 {
		let elapsed = self.turn.saturating_sub(trace.last_updated_turn);
		decay(trace.activation, config.decay_factor, elapsed)
	}
}
