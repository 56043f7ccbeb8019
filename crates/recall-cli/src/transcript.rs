//! Transcript files for `replay` and `status`.
//!
//! One turn per line, either a JSON object `{"user_id": "...", "text": "..."}`
//! or the shorthand `user: text`. Blank lines and lines starting with `#` are
//! skipped.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// One recorded message.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Turn {
	pub user_id: String,
	pub text: String,
}

pub fn parse(input: &str) -> Result<Vec<Turn>> {
	let mut turns = Vec::new();
	for (index, raw) in input.lines().enumerate() {
		let line = raw.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}
		let number = index + 1;

		if line.starts_with('{') {
			let turn: Turn = serde_json::from_str(line)
				.with_context(|| format!("line {number}: invalid JSON turn"))?;
			turns.push(turn);
			continue;
		}

		let Some((user_id, text)) = line.split_once(':') else {
			bail!("line {number}: expected a JSON object or `user: text`");
		};
		let (user_id, text) = (user_id.trim(), text.trim());
		if user_id.is_empty() || text.is_empty() {
			bail!("line {number}: user and text must both be non-empty");
		}
		turns.push(Turn {
			user_id: user_id.to_string(),
			text: text.to_string(),
		});
	}
	Ok(turns)
}

pub fn read(path: &Path) -> Result<Vec<Turn>> {
	let input = std::fs::read_to_string(path)
		.with_context(|| format!("failed to read transcript {}", path.display()))?;
	parse(&input).with_context(|| format!("in transcript {}", path.display()))
}
