//! Error types for the memory engine.
//!
//! Only [`ConfigError`] and [`InputError`] ever reach the caller of a turn.
//! Backend and embedding failures degrade the turn instead and are reported
//! through [`crate::metrics::Degradation`].

use std::path::PathBuf;

use crate::memory::MemoryId;

/// Invalid or unusable configuration. Fatal at engine construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// A numeric parameter is outside its permitted range.
	#[error("invalid value for `{field}`: {value} ({expected})")]
	OutOfRange {
		/// Dotted path of the offending field
		field: &'static str,
		/// Value that was supplied
		value: f64,
		/// Human-readable description of the permitted range
		expected: &'static str,
	},

	/// Config file could not be read.
	#[error("failed to read config file {path}: {source}")]
	Read {
		/// Path that was read
		path: PathBuf,
		/// Underlying I/O error
		source: std::io::Error,
	},

	/// Config text is not valid TOML or does not match the schema.
	#[error("failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),

	/// Environment override could not be parsed.
	#[error("invalid environment override {name}={value:?}")]
	Env {
		/// Variable name
		name: &'static str,
		/// Raw value
		value: String,
	},

	/// A provider or backend was selected that this build cannot supply.
	#[error("{0} is not available in this build")]
	Unsupported(String),

	/// The embedding provider could not be constructed.
	#[error("embedding provider failed to initialise: {0}")]
	Embedding(#[from] EmbeddingError),
}

/// Rejected turn input. Raised before any memory state is touched.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
	/// Text was empty or whitespace only.
	#[error("message text is empty")]
	EmptyText,

	/// Text exceeds the configured content bound.
	#[error("message is {len} chars, limit is {max}")]
	TooLong {
		/// Length in chars
		len: usize,
		/// Configured maximum
		max: usize,
	},

	/// User id was empty.
	#[error("user id is empty")]
	EmptyUser,

	/// Embedding did not have the configured dimensionality.
	#[error("embedding has {actual} dimensions, expected {expected}")]
	DimensionMismatch {
		/// Configured dimensionality
		expected: usize,
		/// Dimensionality actually produced
		actual: usize,
	},

	/// No session exists for the user.
	#[error("unknown user: {0}")]
	UnknownUser(String),

	/// Memory does not exist in the user's space.
	#[error("unknown memory {0}")]
	UnknownMemory(MemoryId),
}

/// Failure of a vector or graph backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
	/// Backend is unreachable or switched off.
	#[error("{backend} backend unavailable")]
	Unavailable {
		/// Which backend
		backend: &'static str,
	},

	/// Call did not complete within its deadline.
	#[error("{backend} backend timed out after {millis}ms")]
	Timeout {
		/// Which backend
		backend: &'static str,
		/// Deadline in milliseconds
		millis: u64,
	},

	/// Backend refused the operation.
	#[error("{backend} backend rejected request: {reason}")]
	Rejected {
		/// Which backend
		backend: &'static str,
		/// Reason given
		reason: String,
	},

	/// Vector length disagrees with the index dimensionality.
	#[error("vector has {actual} dimensions, index expects {expected}")]
	DimensionMismatch {
		/// Index dimensionality
		expected: usize,
		/// Supplied dimensionality
		actual: usize,
	},

	/// Edge from a node to itself.
	#[error("self-loop on memory {0}")]
	SelfLoop(MemoryId),
}

impl BackendError {
	/// Whether retrying the same call may succeed.
	#[must_use]
	pub const fn is_transient(&self) -> bool {
		matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
	}
}

/// Embedding provider failure.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
	/// ONNX Runtime error.
	#[cfg(feature = "onnx")]
	#[error("ONNX Runtime error: {0}")]
	Ort(#[from] ort::Error),

	/// Shape error from ndarray.
	#[cfg(feature = "onnx")]
	#[error("Shape error: {0}")]
	Shape(#[from] ndarray::ShapeError),

	/// Tokenizer error.
	#[error("Tokenizer error: {0}")]
	Tokenizer(String),

	/// Model files not found.
	#[error("Model files not found: {0}")]
	NotFound(String),
}

/// Error returned to the caller of the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
	/// Configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Malformed input.
	#[error(transparent)]
	Input(#[from] InputError),
}

impl EngineError {
	/// True for input errors, which the caller can fix by changing the request.
	#[must_use]
	pub const fn is_input(&self) -> bool {
		matches!(self, Self::Input(_))
	}
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result alias for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_transient_classification() {
		assert!(BackendError::Unavailable { backend: "vector" }.is_transient());
		assert!(BackendError::Timeout {
			backend: "graph",
			millis: 50
		}
		.is_transient());
		assert!(!BackendError::SelfLoop(MemoryId(3)).is_transient());
		assert!(!BackendError::DimensionMismatch {
			expected: 4,
			actual: 3
		}
		.is_transient());
	}

	#[test]
	fn test_engine_error_wraps_input() {
		let err: EngineError = InputError::EmptyText.into();
		assert!(err.is_input());
		assert_eq!(err.to_string(), "message text is empty");
	}
}
