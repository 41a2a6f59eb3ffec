//! Typed error kinds raised by the model and the codecs.
//!
//! All public operations return [`anyhow::Result`]; whenever a failure belongs to one of the
//! kinds below, the root of the error chain is a [`MapError`]. Use [`MapError::find`] to recover
//! the kind from an [`anyhow::Error`] regardless of how much context was attached on the way up.

use thiserror::Error;

/// The error kinds a caller may want to tell apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
	/// Structurally invalid bytes: truncated varints, length prefixes running past the end of the
	/// stream, out-of-range string table indices, malformed tag index sequences.
	#[error("format error: {0}")]
	Format(String),

	/// Compression or decompression failure, or a size mismatch after decompression.
	#[error("codec error: {0}")]
	Codec(String),

	/// The stream declares a feature this implementation cannot honor.
	#[error("unsupported feature: {0}")]
	UnsupportedFeature(String),

	/// An entity breaks a model rule, e.g. a tag with an empty key.
	#[error("validation error: {0}")]
	Validation(String),

	/// String table index 0 was referenced; it is reserved as a delimiter.
	#[error("string table index 0 is reserved")]
	ReservedIndex,
}

impl MapError {
	pub fn format(msg: impl Into<String>) -> Self {
		MapError::Format(msg.into())
	}

	pub fn codec(msg: impl Into<String>) -> Self {
		MapError::Codec(msg.into())
	}

	pub fn unsupported(msg: impl Into<String>) -> Self {
		MapError::UnsupportedFeature(msg.into())
	}

	pub fn validation(msg: impl Into<String>) -> Self {
		MapError::Validation(msg.into())
	}

	/// Walks the chain of `err` and returns the first [`MapError`] found.
	#[must_use]
	pub fn find(err: &anyhow::Error) -> Option<&MapError> {
		err.chain().find_map(|cause| cause.downcast_ref::<MapError>())
	}

	#[must_use]
	pub fn is_format(&self) -> bool {
		matches!(self, MapError::Format(_))
	}

	#[must_use]
	pub fn is_codec(&self) -> bool {
		matches!(self, MapError::Codec(_))
	}
}
