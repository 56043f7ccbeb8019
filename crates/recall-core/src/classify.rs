//! Keyword classification and topic tagging of incoming turns.
//!
//! Deliberately cheap: a handful of cue words decide the [`MemoryKind`] and
//! the content words become topic tags for co-occurrence edges.

use crate::memory::MemoryKind;

/// Maximum number of topic tags kept per memory.
pub const MAX_TAGS: usize = 8;

/// Minimum length (in chars) of a word to become a tag.
const MIN_TAG_CHARS: usize = 4;

const STOPWORDS: &[&str] = &[
	"a", "about", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as", "at",
	"be", "been", "before", "being", "but", "by", "can", "could", "did", "do", "does", "doing",
	"for", "from", "had", "has", "have", "having", "he", "her", "here", "him", "his", "how", "i",
	"if", "in", "into", "is", "it", "its", "just", "me", "more", "my", "no", "not", "now", "of",
	"on", "or", "our", "out", "over", "she", "should", "so", "some", "such", "than", "that",
	"the", "their", "them", "then", "there", "these", "they", "this", "those", "to", "too",
	"very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "why", "will",
	"with", "would", "you", "your",
];

const PREFERENCE_CUES: &[&str] = &[
	"prefer", "favorite", "favourite", "like", "love", "enjoy", "hate", "dislike", "usually",
	"always", "never",
];

const EMOTION_CUES: &[&str] = &[
	"feel", "feeling", "felt", "happy", "sad", "angry", "anxious", "worried", "stressed",
	"excited", "tired", "lonely", "upset", "frustrated", "nervous",
];

const TASK_CUES: &[&str] = &[
	"need", "todo", "remind", "plan", "goal", "deadline", "must", "going", "tomorrow", "schedule",
];

const QUESTION_CUES: &[&str] =
	&["how", "what", "why", "when", "where", "who", "which", "can", "could"];

const FACT_CUES: &[&str] = &["is", "are", "was", "were", "am", "has", "have"];

/// Lower-cased alphanumeric words of `text`, in order.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
	text.split(|c: char| !c.is_alphanumeric())
		.filter(|w| !w.is_empty())
		.map(str::to_lowercase)
}

/// Whether `word` carries no topical content.
#[must_use]
pub fn is_stopword(word: &str) -> bool {
	STOPWORDS.contains(&word)
}

/// Topic tags of `text`: content words of at least four chars, deduplicated,
/// first occurrence first, at most [`MAX_TAGS`].
#[must_use]
pub fn extract_tags(text: &str) -> Vec<String> {
	let mut tags: Vec<String> = Vec::new();
	for word in tokenize(text) {
		if word.chars().count() < MIN_TAG_CHARS || is_stopword(&word) || tags.contains(&word) {
			continue;
		}
		tags.push(word);
		if tags.len() == MAX_TAGS {
			break;
		}
	}
	tags
}

/// Classify a turn by its cue words.
///
/// Precedence: emotional state, preference, task, question, fact, general.
#[must_use]
pub fn classify(text: &str) -> MemoryKind {
	let words: Vec<String> = tokenize(text).collect();
	let has = |cues: &[&str]| words.iter().any(|w| cues.contains(&w.as_str()));

	if has(EMOTION_CUES) {
		MemoryKind::EmotionalState
	} else if has(PREFERENCE_CUES) {
		MemoryKind::Preference
	} else if has(TASK_CUES) {
		MemoryKind::Task
	} else if text.trim_end().ends_with('?')
		|| words.first().is_some_and(|w| QUESTION_CUES.contains(&w.as_str()))
	{
		MemoryKind::Question
	} else if has(FACT_CUES) {
		MemoryKind::Fact
	} else {
		MemoryKind::General
	}
}
