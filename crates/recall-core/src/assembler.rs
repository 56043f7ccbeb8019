//! Context Assembly
//!
//! Fits ranked memories into a hard item and character budget. Selection is
//! greedy in rank order and skips, rather than stops at, an entry that does not
//! fit, so a shorter lower-ranked memory can still be used.

use serde::{Deserialize, Serialize};

use crate::memory::{content_len, MemoryId, MemoryKind};

/// Separator between rendered entries. Its length is what `separator_overhead` accounts for.
pub const ENTRY_SEPARATOR: &str = "\n";

/// Size limits for one assembled context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBudget {
	/// Maximum number of entries
	pub max_items: usize,
	/// Maximum chars, content plus per-entry overhead
	pub max_chars: usize,
	/// Chars charged per entry on top of its content
	pub separator_overhead: usize,
}

impl Default for ContextBudget {
	fn default() -> Self {
		Self {
			max_items: 5,
			max_chars: 200,
			separator_overhead: 1,
		}
	}
}

impl ContextBudget {
	/// Budget with the default separator overhead.
	#[must_use]
	pub const fn new(max_items: usize, max_chars: usize) -> Self {
		Self {
			max_items,
			max_chars,
			separator_overhead: 1,
		}
	}

	/// Whether nothing can ever be assembled under this budget.
	#[must_use]
	pub const fn is_empty(&self) -> bool {
		self.max_items == 0 || self.max_chars == 0
	}

	/// Chars an entry of `len` chars costs.
	#[must_use]
	pub const fn cost(&self, len: usize) -> usize {
		len.saturating_add(self.separator_overhead)
	}
}

/// One memory as handed to the downstream generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
	/// Memory id
	pub id: MemoryId,
	/// Memory content
	pub content: String,
	/// Classification of the memory
	pub kind: MemoryKind,
	/// Ranking score
	pub score: f64,
}

/// Output of [`assemble`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
	/// Accepted entries in rank order
	pub entries: Vec<ContextEntry>,
	/// Chars charged against the budget, overhead included
	pub chars_used: usize,
}

impl AssembledContext {
	/// Number of entries.
	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// True when nothing was selected.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Ids of the selected memories in rank order.
	#[must_use]
	pub fn ids(&self) -> Vec<MemoryId> {
		self.entries.iter().map(|e| e.id).collect()
	}

	/// One line per entry, best first. Empty context renders as "".
	#[must_use]
	pub fn render(&self) -> String {
		self.entries
			.iter()
			.map(|e| e.content.as_str())
			.collect::<Vec<_>>()
			.join(ENTRY_SEPARATOR)
	}
}

/// Greedily select ranked entries under `budget`.
///
/// An entry is accepted iff the item count stays within `max_items` and the
/// running total of content chars plus overhead stays within `max_chars`.
/// Deterministic: the same input always yields the same output.
#[must_use]
pub fn assemble(ranked: &[ContextEntry], budget: &ContextBudget) -> AssembledContext {
	let mut context = AssembledContext::default();
	if budget.is_empty() {
		return context;
	}

	for entry in ranked {
		if context.entries.len() >= budget.max_items {
			break;
		}
		let cost = budget.cost(content_len(&entry.content));
		if context.chars_used.saturating_add(cost) > budget.max_chars {
			continue;
		}
		context.chars_used += cost;
		context.entries.push(entry.clone());
	}

	context
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entries(lengths: &[usize]) -> Vec<ContextEntry> {
		lengths
			.iter()
			.enumerate()
			.map(|(i, &len)| ContextEntry {
				id: MemoryId(i as u64 + 1),
				content: "x".repeat(len),
				kind: MemoryKind::General,
				score: 1.0 - 0.1 * i as f64,
			})
			.collect()
	}

	#[test]
	fn test_item_cap() {
		let context = assemble(&entries(&[20, 20, 20]), &ContextBudget::new(2, 50));
		assert_eq!(context.ids(), vec![MemoryId(1), MemoryId(2)]);
		assert_eq!(context.chars_used, 42);
	}

	#[test]
	fn test_skip_and_continue() {
		// the 30-char entry does not fit after the first, the 5-char one does
		let context = assemble(&entries(&[10, 30, 5]), &ContextBudget::new(5, 20));
		assert_eq!(context.ids(), vec![MemoryId(1), MemoryId(3)]);
	}

	#[test]
	fn test_zero_budget() {
		let ranked = entries(&[1, 2]);
		assert!(assemble(&ranked, &ContextBudget::new(0, 100)).is_empty());
		assert!(assemble(&ranked, &ContextBudget::new(3, 0)).is_empty());
	}

	#[test]
	fn test_idempotent() {
		let ranked = entries(&[12, 40, 3, 9, 25, 1]);
		let budget = ContextBudget::new(3, 45);
		assert_eq!(assemble(&ranked, &budget), assemble(&ranked, &budget));
	}

	#[test]
	fn test_budget_invariant() {
		let ranked = entries(&[7, 19, 3, 44, 0, 12, 8, 31, 2]);
		for max_items in 0..6 {
			for max_chars in (0..80).step_by(7) {
				let budget = ContextBudget::new(max_items, max_chars);
				let context = assemble(&ranked, &budget);
				let total: usize = context
					.entries
					.iter()
					.map(|e| budget.cost(e.content.chars().count()))
					.sum();
				assert!(context.len() <= max_items);
				assert!(total <= max_chars);
				assert_eq!(total, context.chars_used);
			}
		}
	}

	#[test]
	fn test_counts_chars_not_bytes() {
		let ranked = vec![ContextEntry {
			id: MemoryId(1),
			content: "ééééé".to_string(),
			kind: MemoryKind::General,
			score: 1.0,
		}];
		assert_eq!(assemble(&ranked, &ContextBudget::new(1, 6)).len(), 1);
	}

	#[test]
	fn test_render() {
		let context = assemble(
			&[
				ContextEntry {
					id: MemoryId(2),
					content: "likes tea".into(),
					kind: MemoryKind::Preference,
					score: 0.9,
				},
				ContextEntry {
					id: MemoryId(1),
					content: "lives in Oslo".into(),
					kind: MemoryKind::Fact,
					score: 0.5,
				},
			],
			&ContextBudget::default(),
		);
		assert_eq!(context.render(), "likes tea\nlives in Oslo");
		assert_eq!(AssembledContext::default().render(), "");
	}
}
