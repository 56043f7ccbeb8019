//! Memory records and association edges.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Embedding vector. Fixed dimensionality per engine.
pub type Embedding = Vec<f64>;

/// Length of `text` in Unicode scalar values, the unit of every char budget.
#[must_use]
pub fn content_len(text: &str) -> usize {
	text.chars().count()
}

/// Stable memory identifier.
///
/// Allocated from a per-user monotonic counter, so a larger id is always a
/// younger memory and ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub u64);

impl fmt::Display for MemoryId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "m{}", self.0)
	}
}

/// Coarse classification of a stored utterance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
	/// Statement about the world or the user
	Fact,
	/// Like / dislike / habit
	Preference,
	/// Mood or feeling
	EmotionalState,
	/// The user asked something
	Question,
	/// Something to do, a goal or plan
	Task,
	/// Nothing more specific matched
	#[default]
	General,
}

/// Why two memories are associated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
	/// Consecutive turns
	Temporal,
	/// New turn was answered using the other memory
	Reference,
	/// Shared topic tags
	CoOccurrence,
}

/// Association between two memories of the same user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEdge {
	/// Source memory
	pub source: MemoryId,
	/// Target memory
	pub target: MemoryId,
	/// Fraction of activation that may cross this edge, in (0, 1]
	pub weight: f64,
	/// Edge kind
	pub kind: EdgeKind,
}

/// One stored utterance.
///
/// Everything except `last_accessed_at` is fixed at creation. Activation lives
/// in [`crate::activation::ActivationState`], not here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryItem {
	/// Identifier
	pub id: MemoryId,
	/// Owning user
	pub user_id: String,
	/// Original text
	pub content: String,
	/// Embedding of `content`
	pub embedding: Embedding,
	/// Classification
	pub kind: MemoryKind,
	/// Topic tags used for co-occurrence wiring
	pub tags: Vec<String>,
	/// Creation time
	pub created_at: DateTime<Utc>,
	/// Last time the memory was selected into a context
	pub last_accessed_at: DateTime<Utc>,
}

impl MemoryItem {
	/// Create a memory stamped with `now`.
	#[must_use]
	pub fn new(
		id: MemoryId,
		user_id: impl Into<String>,
		content: impl Into<String>,
		embedding: Embedding,
		kind: MemoryKind,
		tags: Vec<String>,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			id,
			user_id: user_id.into(),
			content: content.into(),
			embedding,
			kind,
			tags,
			created_at: now,
			last_accessed_at: now,
		}
	}

	/// Content length as counted against the character budget.
	#[must_use]
	pub fn char_len(&self) -> usize {
		content_len(&self.content)
	}

	/// Number of topic tags shared with `other`.
	#[must_use]
	pub fn shared_tags(&self, other: &Self) -> usize {
		self.tags.iter().filter(|t| other.tags.contains(t)).count()
	}
}
