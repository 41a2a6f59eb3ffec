//! Reader and writer configuration.
//!
//! ```
//! use mapio_core::compression::Compression;
//! use mapio_pbf::PbfWriterOptions;
//!
//! let options = PbfWriterOptions::default()
//!     .with_compression(Compression::None)
//!     .with_dense_format(false)
//!     .with_program_name("importer");
//! assert!(options.write_metadata);
//! ```

use crate::header::HeaderBBox;
use mapio_core::compression::Compression;

/// Entities buffered before a block is written.
pub const DEFAULT_MAX_ENTITIES_PER_BLOCK: usize = 8000;

/// Options for [`PbfReader`](crate::PbfReader).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PbfReaderOptions {
	/// Parse `Info`/`DenseInfo` messages and attach metadata to entities.
	pub read_metadata: bool,
}

impl Default for PbfReaderOptions {
	fn default() -> Self {
		PbfReaderOptions { read_metadata: true }
	}
}

impl PbfReaderOptions {
	#[must_use]
	pub fn with_read_metadata(mut self, read_metadata: bool) -> Self {
		self.read_metadata = read_metadata;
		self
	}
}

/// Options for [`PbfWriter`](crate::PbfWriter).
#[derive(Clone, Debug, PartialEq)]
pub struct PbfWriterOptions {
	/// Emit `Info`/`DenseInfo` messages for entities carrying metadata.
	pub write_metadata: bool,
	/// Encode nodes as dense groups instead of one message per node.
	pub use_dense_format: bool,
	pub compression: Compression,
	/// Written to the header's `writingprogram` field.
	pub program_name: String,
	pub max_entities_per_block: usize,
	pub bbox: Option<HeaderBBox>,
}

impl Default for PbfWriterOptions {
	fn default() -> Self {
		PbfWriterOptions {
			write_metadata: true,
			use_dense_format: true,
			compression: Compression::ZlibDeflate,
			program_name: format!("mapio {}", env!("CARGO_PKG_VERSION")),
			max_entities_per_block: DEFAULT_MAX_ENTITIES_PER_BLOCK,
			bbox: None,
		}
	}
}

impl PbfWriterOptions {
	#[must_use]
	pub fn with_write_metadata(mut self, write_metadata: bool) -> Self {
		self.write_metadata = write_metadata;
		self
	}

	#[must_use]
	pub fn with_dense_format(mut self, use_dense_format: bool) -> Self {
		self.use_dense_format = use_dense_format;
		self
	}

	#[must_use]
	pub fn with_compression(mut self, compression: Compression) -> Self {
		self.compression = compression;
		self
	}

	#[must_use]
	pub fn with_program_name(mut self, program_name: impl Into<String>) -> Self {
		self.program_name = program_name.into();
		self
	}

	/// Sets the block size threshold. Values below 1 are raised to 1.
	#[must_use]
	pub fn with_max_entities_per_block(mut self, max_entities_per_block: usize) -> Self {
		self.max_entities_per_block = max_entities_per_block.max(1);
		self
	}

	#[must_use]
	pub fn with_bbox(mut self, bbox: HeaderBBox) -> Self {
		self.bbox = Some(bbox);
		self
	}
}
