//! Text embedding providers.
//!
//! [`HashEmbedder`] is the default: deterministic feature hashing, no model
//! files, identical texts map to identical vectors and texts sharing content
//! words overlap. With the `onnx` feature, [`OnnxEmbedder`] runs BGE-base
//! in-process through ONNX Runtime.

use crate::activation::norm;
use crate::classify::{is_stopword, tokenize};
use crate::error::EmbeddingError;
use crate::memory::Embedding;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxEmbedder, OnnxEmbedderConfig};

/// Turns text into a fixed-size vector.
pub trait Embedder: Send + Sync {
	/// Embed one text.
	///
	/// # Errors
	///
	/// Returns an [`EmbeddingError`] if the provider cannot produce a vector.
	fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

	/// Length of every vector this provider returns.
	fn dimensions(&self) -> usize;

	/// Provider name for logs and status.
	fn name(&self) -> &'static str;
}

// ============================================================================
// Feature hashing
// ============================================================================

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
	bytes.iter().fold(FNV_OFFSET, |hash, &b| {
		(hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
	})
}

/// Signed feature-hashing bag-of-words embedder.
///
/// Each content word adds ±1 to one bucket chosen by its FNV-1a hash; the
/// result is L2-normalised. Text without content words falls back to all of
/// its words, then to the raw text, so no non-empty input embeds to zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashEmbedder {
	dimensions: usize,
}

impl HashEmbedder {
	/// Embedder producing vectors of `dimensions` components (at least one).
	#[must_use]
	pub fn new(dimensions: usize) -> Self {
		Self {
			dimensions: dimensions.max(1),
		}
	}

	fn add_feature(&self, vector: &mut [f64], feature: &str) {
		let hash = fnv1a(feature.as_bytes());
		let bucket = usize::try_from(hash % self.dimensions as u64).unwrap_or(0);
		let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
		vector[bucket] += sign;
	}
}

impl Default for HashEmbedder {
	fn default() -> Self {
		Self::new(256)
	}
}

impl Embedder for HashEmbedder {
	fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
		let mut vector = vec![0.0; self.dimensions];
		let words: Vec<String> = tokenize(text).collect();

		let content: Vec<&String> = words.iter().filter(|w| !is_stopword(w)).collect();
		if content.is_empty() {
			words.iter().for_each(|w| self.add_feature(&mut vector, w));
		} else {
			content.iter().for_each(|w| self.add_feature(&mut vector, w));
		}
		if words.is_empty() && !text.is_empty() {
			self.add_feature(&mut vector, text);
		}

		let magnitude = norm(&vector);
		if magnitude > 0.0 {
			for v in &mut vector {
				*v /= magnitude;
			}
		}
		Ok(vector)
	}

	fn dimensions(&self) -> usize {
		self.dimensions
	}

	fn name(&self) -> &'static str {
		"hash"
	}
}

// ============================================================================
// ONNX
// ============================================================================

#[cfg(feature = "onnx")]
mod onnx {
	use std::path::PathBuf;

	use ndarray::{Array2, ArrayD};
	use ort::session::Session;
	use ort::value::Tensor;
	use parking_lot::Mutex;
	use tokenizers::Tokenizer;

	use super::Embedder;
	use crate::error::EmbeddingError;
	use crate::memory::Embedding;

	const MODEL_NAME: &str = "bge-base-en-v1.5";
	const MODEL_DIMENSIONS: usize = 768;

	/// Default model directory: `~/.recall/models`
	fn default_model_dir() -> PathBuf {
		dirs::home_dir()
			.unwrap_or_else(|| PathBuf::from("."))
			.join(".recall")
			.join("models")
	}

	/// Where to load the ONNX model and tokenizer from.
	#[derive(Debug, Clone)]
	pub struct OnnxEmbedderConfig {
		/// Path to the ONNX model file.
		pub model_path: PathBuf,
		/// Path to the tokenizer.json file.
		pub tokenizer_path: PathBuf,
	}

	impl Default for OnnxEmbedderConfig {
		fn default() -> Self {
			let dir = default_model_dir();
			Self {
				model_path: dir.join(format!("{MODEL_NAME}-fp16.onnx")),
				tokenizer_path: dir.join(format!("{MODEL_NAME}-tokenizer.json")),
			}
		}
	}

	impl OnnxEmbedderConfig {
		/// Use explicit paths where given, defaults otherwise.
		#[must_use]
		pub fn with_paths(model_path: Option<PathBuf>, tokenizer_path: Option<PathBuf>) -> Self {
			let default = Self::default();
			Self {
				model_path: model_path.unwrap_or(default.model_path),
				tokenizer_path: tokenizer_path.unwrap_or(default.tokenizer_path),
			}
		}

		/// Whether both files exist.
		#[must_use]
		pub fn is_available(&self) -> bool {
			self.model_path.exists() && self.tokenizer_path.exists()
		}
	}

	/// In-process BGE embedding model.
	///
	/// `Session::run` needs `&mut self`, so the session sits behind a mutex
	/// held only for the inference call.
	pub struct OnnxEmbedder {
		session: Mutex<Session>,
		tokenizer: Tokenizer,
	}

	impl OnnxEmbedder {
		/// Load the model and tokenizer from disk.
		///
		/// # Errors
		///
		/// Returns an error if either file is missing or fails to load.
		pub fn load(config: &OnnxEmbedderConfig) -> Result<Self, EmbeddingError> {
			if !config.model_path.exists() {
				return Err(EmbeddingError::NotFound(format!(
					"ONNX model not found at {}",
					config.model_path.display()
				)));
			}
			if !config.tokenizer_path.exists() {
				return Err(EmbeddingError::NotFound(format!(
					"Tokenizer not found at {}",
					config.tokenizer_path.display()
				)));
			}

			let session = Session::builder()?.commit_from_file(&config.model_path)?;
			let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
				.map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

			tracing::info!(
				model = MODEL_NAME,
				path = %config.model_path.display(),
				"embedding model loaded"
			);
			Ok(Self {
				session: Mutex::new(session),
				tokenizer,
			})
		}

		fn run_inference(
			&self,
			input_ids: Tensor<i64>,
			attention_mask: Tensor<i64>,
			token_type_ids: Tensor<i64>,
		) -> Result<(ArrayD<f32>, usize), EmbeddingError> {
			let mut session = self.session.lock();
			let outputs = session.run(ort::inputs![
				"input_ids" => input_ids,
				"attention_mask" => attention_mask,
				"token_type_ids" => token_type_ids,
			])?;
			let view = outputs[0].try_extract_array::<f32>()?;
			let dim = view.shape().last().copied().unwrap_or(MODEL_DIMENSIONS);
			Ok((view.into_owned(), dim))
		}
	}

	impl Embedder for OnnxEmbedder {
		fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
			let encoding = self
				.tokenizer
				.encode(text, true)
				.map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

			let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
			let mask: Vec<i64> = encoding
				.get_attention_mask()
				.iter()
				.map(|&m| i64::from(m))
				.collect();
			let len = ids.len();

			let input_ids = Tensor::from_array(Array2::from_shape_vec([1, len], ids)?)?;
			let attention_mask =
				Tensor::from_array(Array2::from_shape_vec([1, len], mask.clone())?)?;
			let token_type_ids =
				Tensor::from_array(Array2::from_shape_vec([1, len], vec![0i64; len])?)?;

			let (output, hidden) = self.run_inference(input_ids, attention_mask, token_type_ids)?;

			// Mean pooling over attended tokens, then L2 normalisation
			let attended: Vec<usize> = (0..len).filter(|&t| mask[t] == 1).collect();
			let mut pooled = vec![0.0f64; hidden];
			for &t in &attended {
				for (d, slot) in pooled.iter_mut().enumerate() {
					*slot += f64::from(output[[0, t, d]]);
				}
			}
			if !attended.is_empty() {
				let divisor = f64::from(u32::try_from(attended.len()).unwrap_or(u32::MAX));
				pooled.iter_mut().for_each(|v| *v /= divisor);
			}
			let magnitude = crate::activation::norm(&pooled);
			if magnitude > 0.0 {
				pooled.iter_mut().for_each(|v| *v /= magnitude);
			}
			Ok(pooled)
		}

		fn dimensions(&self) -> usize {
			MODEL_DIMENSIONS
		}

		fn name(&self) -> &'static str {
			MODEL_NAME
		}
	}

}
