//! Association wiring for newly stored turns.
//!
//! A new memory is linked to the memory stored just before it, to every
//! memory that was selected into the context it was answered with, and to
//! recent memories sharing topic tags. The plan is computed here; the engine
//! writes it to the graph in both directions.
//!
//! A new memory also gets a significance score that sets how strongly it
//! starts out, see [`crate::activation::ActivationConfig::initial_for`].

use serde::{Deserialize, Serialize};

use crate::classify::MAX_TAGS;
use crate::memory::{EdgeKind, MemoryId, MemoryItem, MemoryKind};

/// Content length at which the length component of significance saturates.
const SIGNIFICANCE_FULL_LENGTH: f64 = 100.0;

/// Edge weights for ingestion, the `[graph]` config section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiringConfig {
	/// Weight of the edge to the previous memory
	pub temporal_weight: f64,
	/// Multiplier on the score of each memory the turn was answered with
	pub reference_weight: f64,
	/// Multiplier on tag overlap
	pub cooccurrence_weight: f64,
	/// Most recent tag-sharing memories to link
	pub max_cooccurrence_links: usize,
}

impl Default for WiringConfig {
	fn default() -> Self {
		Self {
			temporal_weight: 0.6,
			reference_weight: 0.8,
			cooccurrence_weight: 0.5,
			max_cooccurrence_links: 8,
		}
	}
}

/// One edge to write, from the new memory to `target`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlannedEdge {
	/// Existing memory
	pub target: MemoryId,
	/// Unclamped weight
	pub weight: f64,
	/// Edge kind
	pub kind: EdgeKind,
}

/// How much a memory of `kind` tends to matter later, in [0, 1].
const fn kind_importance(kind: MemoryKind) -> f64 {
	match kind {
		MemoryKind::EmotionalState => 1.0,
		MemoryKind::Preference | MemoryKind::Task => 0.9,
		MemoryKind::Fact => 0.8,
		MemoryKind::Question => 0.5,
		MemoryKind::General => 0.4,
	}
}

/// Significance of a new memory, in [0, 1].
///
/// `0.3 × length + 0.3 × topics + 0.4 × kind`, where length saturates at 100
/// chars and topics at [`MAX_TAGS`] tags.
#[must_use]
pub fn significance(item: &MemoryItem) -> f64 {
	#[allow(clippy::cast_precision_loss)]
	let (length, topics) = (
		(item.char_len() as f64 / SIGNIFICANCE_FULL_LENGTH).min(1.0),
		item.tags.len().min(MAX_TAGS) as f64 / MAX_TAGS as f64,
	);
	let weighted = 0.3f64.mul_add(topics, 0.4 * kind_importance(item.kind));
	0.3f64.mul_add(length, weighted).clamp(0.0, 1.0)
}

/// Fraction of the smaller tag set shared by both memories, in [0, 1].
#[must_use]
pub fn tag_overlap(a: &MemoryItem, b: &MemoryItem) -> f64 {
	let smaller = a.tags.len().min(b.tags.len());
	if smaller == 0 {
		return 0.0;
	}
	#[allow(clippy::cast_precision_loss)]
	let overlap = a.shared_tags(b) as f64 / smaller as f64;
	overlap
}

/// Edges connecting `new` to existing memories.
///
/// # Arguments
///
/// * `new` - the memory being stored
/// * `previous` - memory stored immediately before, if any
/// * `selected` - `(memory, score)` pairs used as context for this turn
/// * `recent` - existing memories, youngest first
/// * `config` - edge weights
#[must_use]
pub fn plan_edges<'a>(
	new: &MemoryItem,
	previous: Option<MemoryId>,
	selected: &[(MemoryId, f64)],
	recent: impl IntoIterator<Item = &'a MemoryItem>,
	config: &WiringConfig,
) -> Vec<PlannedEdge> {
	let mut plan = Vec::new();

	if let Some(target) = previous.filter(|&id| id != new.id) {
		plan.push(PlannedEdge {
			target,
			weight: config.temporal_weight,
			kind: EdgeKind::Temporal,
		});
	}

	plan.extend(
		selected
			.iter()
			.filter(|(id, score)| *id != new.id && *score > 0.0)
			.map(|&(target, score)| PlannedEdge {
				target,
				weight: config.reference_weight * score,
				kind: EdgeKind::Reference,
			}),
	);

	if !new.tags.is_empty() {
		plan.extend(
			recent
				.into_iter()
				.filter(|item| item.id != new.id)
				.filter_map(|item| {
					let overlap = tag_overlap(new, item);
					(overlap > 0.0).then(|| PlannedEdge {
						target: item.id,
						weight: config.cooccurrence_weight * overlap,
						kind: EdgeKind::CoOccurrence,
					})
				})
				.take(config.max_cooccurrence_links),
		);
	}

	plan
}
