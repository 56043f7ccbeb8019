//! Engine configuration.
//!
//! Loaded once at start-up: defaults, then an optional TOML file, then
//! `RECALL_*` environment overrides, then [`EngineConfig::validate`]. The
//! engine never runs with a configuration that failed validation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::activation::ActivationConfig;
use crate::assembler::ContextBudget;
use crate::backend::{BackendKind, BackendsConfig, RetryPolicy};
use crate::embedding::{Embedder, HashEmbedder};
use crate::error::ConfigError;
use crate::ingest::WiringConfig;
use crate::retrieval::RetrievalConfig;
use crate::spreading::{SpreadingConfig, MAX_ATTENTION_WEIGHT};

/// Deepest spreading traversal accepted.
pub const MAX_SPREADING_DEPTH: usize = 8;

/// Which embedding provider to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
	/// Feature hashing, no model files
	#[default]
	Hash,
	/// BGE through ONNX Runtime (`onnx` feature)
	Onnx,
}

/// The `[embedding]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
	/// Provider
	pub provider: EmbeddingProvider,
	/// Vector length for the hash provider
	pub dimensions: usize,
	/// ONNX model file
	pub model_path: Option<PathBuf>,
	/// Tokenizer file for the ONNX model
	pub tokenizer_path: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
	fn default() -> Self {
		Self {
			provider: EmbeddingProvider::Hash,
			dimensions: 256,
			model_path: None,
			tokenizer_path: None,
		}
	}
}

impl EmbeddingConfig {
	/// Build the configured provider.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Unsupported`] for ONNX without the `onnx`
	/// feature and [`ConfigError::Embedding`] if the model fails to load.
	pub fn build(&self) -> Result<Arc<dyn Embedder>, ConfigError> {
		match self.provider {
			EmbeddingProvider::Hash => Ok(Arc::new(HashEmbedder::new(self.dimensions))),
			#[cfg(feature = "onnx")]
			EmbeddingProvider::Onnx => {
				let config = crate::embedding::OnnxEmbedderConfig::with_paths(
					self.model_path.clone(),
					self.tokenizer_path.clone(),
				);
				Ok(Arc::new(crate::embedding::OnnxEmbedder::load(&config)?))
			}
			#[cfg(not(feature = "onnx"))]
			EmbeddingProvider::Onnx => Err(ConfigError::Unsupported(
				"embedding provider `onnx` (build with the `onnx` feature)".into(),
			)),
		}
	}
}

/// The `[retention]` section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
	/// Memories kept per user before the weakest is evicted; 0 keeps everything
	pub max_memories_per_user: usize,
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	/// Decay, threshold, reinforcement and blend
	pub activation: ActivationConfig,
	/// Graph traversal
	pub spreading: SpreadingConfig,
	/// Candidate generation and input bounds
	pub retrieval: RetrievalConfig,
	/// Default context budget
	pub budget: ContextBudget,
	/// Ingestion edge weights
	pub graph: WiringConfig,
	/// Backend selection
	pub backends: BackendsConfig,
	/// Backend retry policy
	pub retry: RetryPolicy,
	/// Eviction bound
	pub retention: RetentionConfig,
	/// Embedding provider
	pub embedding: EmbeddingConfig,
}

fn check(
	field: &'static str,
	value: f64,
	ok: bool,
	expected: &'static str,
) -> Result<(), ConfigError> {
	if ok && value.is_finite() {
		Ok(())
	} else {
		Err(ConfigError::OutOfRange {
			field,
			value,
			expected,
		})
	}
}

#[allow(clippy::cast_precision_loss)]
const fn as_f64(value: usize) -> f64 {
	value as f64
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
	value.trim().parse().map_err(|_| ConfigError::Env {
		name,
		value: value.to_string(),
	})
}

impl EngineConfig {
	/// Parse a TOML document. Missing sections and fields take their defaults.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Parse`] on malformed TOML or mistyped fields.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	/// Read and parse a TOML file.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&text)
	}

	/// Overlay `RECALL_*` variables from the process environment.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Env`] for a value that does not parse.
	pub fn apply_env(&mut self) -> Result<(), ConfigError> {
		self.apply_env_from(|name| std::env::var(name).ok())
	}

	/// Overlay overrides from an arbitrary lookup.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Env`] for a value that does not parse.
	pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		macro_rules! overlay {
			($name:literal => $field:expr) => {
				if let Some(value) = lookup($name) {
					$field = parse_env($name, &value)?;
				}
			};
		}

		overlay!("RECALL_DECAY_FACTOR" => self.activation.decay_factor);
		overlay!("RECALL_ACTIVATION_THRESHOLD" => self.activation.activation_threshold);
		overlay!("RECALL_REINFORCEMENT_GAIN" => self.activation.reinforcement_gain);
		overlay!("RECALL_BLEND" => self.activation.blend);
		overlay!("RECALL_BUDGET_ITEMS" => self.budget.max_items);
		overlay!("RECALL_BUDGET_CHARS" => self.budget.max_chars);
		overlay!("RECALL_VECTOR_DIM" => self.embedding.dimensions);
		overlay!("RECALL_MAX_DEPTH" => self.spreading.max_depth);

		for (name, slot) in [
			("RECALL_VECTOR_BACKEND", &mut self.backends.vector),
			("RECALL_GRAPH_BACKEND", &mut self.backends.graph),
		] {
			if let Some(value) = lookup(name) {
				*slot = BackendKind::parse(&value).ok_or(ConfigError::Env { name, value })?;
			}
		}

		if let Some(value) = lookup("RECALL_EMBEDDING_PROVIDER") {
			self.embedding.provider = match value.trim().to_ascii_lowercase().as_str() {
				"hash" => EmbeddingProvider::Hash,
				"onnx" => EmbeddingProvider::Onnx,
				_ => {
					return Err(ConfigError::Env {
						name: "RECALL_EMBEDDING_PROVIDER",
						value,
					})
				}
			};
		}

		Ok(())
	}

	/// Check every parameter against its permitted range.
	///
	/// A zero budget is valid and assembles nothing.
	///
	/// # Errors
	///
	/// Returns the first [`ConfigError::OutOfRange`] found.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let a = &self.activation;
		check(
			"activation.decay_factor",
			a.decay_factor,
			a.decay_factor > 0.0 && a.decay_factor < 1.0,
			"must be in (0, 1)",
		)?;
		check(
			"activation.activation_threshold",
			a.activation_threshold,
			a.activation_threshold >= 0.0,
			"must be >= 0",
		)?;
		check(
			"activation.reinforcement_gain",
			a.reinforcement_gain,
			a.reinforcement_gain >= 0.0,
			"must be >= 0",
		)?;
		check(
			"activation.max_activation",
			a.max_activation,
			a.max_activation > 0.0,
			"must be > 0",
		)?;
		check(
			"activation.initial_activation",
			a.initial_activation,
			(0.0..=a.max_activation).contains(&a.initial_activation),
			"must be in [0, max_activation]",
		)?;
		check("activation.blend", a.blend, (0.0..=1.0).contains(&a.blend), "must be in [0, 1]")?;
		check(
			"activation.significance_weight",
			a.significance_weight,
			(0.0..=1.0).contains(&a.significance_weight),
			"must be in [0, 1]",
		)?;

		let s = &self.spreading;
		check(
			"spreading.similarity_floor",
			s.similarity_floor,
			(-1.0..=1.0).contains(&s.similarity_floor),
			"must be in [-1, 1]",
		)?;
		check(
			"spreading.max_depth",
			as_f64(s.max_depth),
			(1..=MAX_SPREADING_DEPTH).contains(&s.max_depth),
			"must be in [1, 8]",
		)?;
		check(
			"spreading.hop_decay",
			s.hop_decay,
			s.hop_decay > 0.0 && s.hop_decay <= 1.0,
			"must be in (0, 1]",
		)?;
		check("spreading.max_nodes", as_f64(s.max_nodes), s.max_nodes >= 1, "must be >= 1")?;
		check(
			"spreading.minimum_energy",
			s.minimum_energy,
			s.minimum_energy >= 0.0,
			"must be >= 0",
		)?;
		for rule in &s.attention {
			check(
				"spreading.attention.weight",
				rule.weight,
				(1.0..=MAX_ATTENTION_WEIGHT).contains(&rule.weight),
				"must be in [1, 4]",
			)?;
		}

		let r = &self.retrieval;
		check(
			"retrieval.candidate_pool",
			as_f64(r.candidate_pool),
			r.candidate_pool >= 1,
			"must be >= 1",
		)?;
		check(
			"retrieval.max_content_chars",
			as_f64(r.max_content_chars),
			r.max_content_chars >= 1,
			"must be >= 1",
		)?;

		let g = &self.graph;
		for (field, weight) in [
			("graph.temporal_weight", g.temporal_weight),
			("graph.reference_weight", g.reference_weight),
			("graph.cooccurrence_weight", g.cooccurrence_weight),
		] {
			check(field, weight, weight > 0.0 && weight <= 1.0, "must be in (0, 1]")?;
		}

		check(
			"retry.backoff_multiplier",
			self.retry.backoff_multiplier,
			self.retry.backoff_multiplier >= 1.0,
			"must be >= 1",
		)?;
		check(
			"embedding.dimensions",
			as_f64(self.embedding.dimensions),
			self.embedding.dimensions >= 1,
			"must be >= 1",
		)?;

		Ok(())
	}

	/// Defaults, optional file, environment, validation.
	///
	/// # Errors
	///
	/// Returns any [`ConfigError`] raised along the way.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config = match path {
			Some(path) => Self::from_file(path)?,
			None => Self::default(),
		};
		config.apply_env()?;
		config.validate()?;
		Ok(config)
	}

	/// Serialise back to TOML.
	///
	/// # Errors
	///
	/// Fails only if a value cannot be represented in TOML.
	pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
		toml::to_string_pretty(self)
	}
}
