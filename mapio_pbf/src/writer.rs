//! Streaming output of entities into a PBF stream.

use crate::{
	block::BlockBuilder,
	framing::{BlobType, frame_blob},
	header::{FEATURE_DENSE_NODES, FEATURE_HAS_METADATA, FEATURE_OSM_SCHEMA, HeaderBlock},
	options::PbfWriterOptions,
};
use anyhow::{Context, Result, anyhow};
use log::{debug, error};
use mapio_core::{
	Blob,
	compression::Compression,
	model::{Entity, Node, Relation, Way},
};
use std::{
	fs::File,
	io::{BufWriter, Write},
	path::Path,
};

/// Writes entities into a PBF stream.
///
/// The header block is written on construction. Entities are buffered and written as one block
/// whenever `max_entities_per_block` of them have accumulated. [`close`](PbfWriter::close)
/// writes the last, partial block and returns the underlying stream; dropping the writer does the
/// same but can only log a failure.
///
/// Once writing a block has failed, every further call fails.
pub struct PbfWriter<W: Write> {
	writer: Option<W>,
	builder: BlockBuilder,
	compression: Compression,
	failed: bool,
	blocks_written: usize,
}

impl PbfWriter<BufWriter<File>> {
	/// Creates (or truncates) the file at `path`.
	pub fn create_path(path: &Path, options: PbfWriterOptions) -> Result<PbfWriter<BufWriter<File>>> {
		let file = File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))?;
		PbfWriter::new(BufWriter::new(file), options)
	}
}

impl<W: Write> PbfWriter<W> {
	/// Creates a writer and writes the header block.
	pub fn new(mut writer: W, options: PbfWriterOptions) -> Result<PbfWriter<W>> {
		let mut required_features = vec![FEATURE_OSM_SCHEMA.to_string()];
		if options.use_dense_format {
			required_features.push(FEATURE_DENSE_NODES.to_string());
		}
		let mut optional_features = Vec::new();
		if options.write_metadata {
			optional_features.push(FEATURE_HAS_METADATA.to_string());
		}
		let header = HeaderBlock {
			bbox: options.bbox,
			required_features,
			optional_features,
			writing_program: Some(options.program_name.clone()),
			..HeaderBlock::default()
		};

		let frame = frame_blob(&BlobType::Header, &header.to_blob()?, options.compression)
			.context("Failed to frame header block")?;
		writer
			.write_all(frame.as_slice())
			.context("Failed to write header block")?;
		debug!("wrote PBF header: {header:?}");

		Ok(PbfWriter {
			writer: Some(writer),
			builder: BlockBuilder::new(&options),
			compression: options.compression,
			failed: false,
			blocks_written: 0,
		})
	}

	/// Appends an entity, writing a block if the buffer is full.
	pub fn write_entity(&mut self, entity: &Entity) -> Result<()> {
		self.ensure_usable()?;
		self.builder.append(entity)?;
		if self.builder.is_full() {
			self.flush_block()?;
		}
		Ok(())
	}

	pub fn write_node(&mut self, node: Node) -> Result<()> {
		self.write_entity(&Entity::Node(node))
	}

	pub fn write_way(&mut self, way: Way) -> Result<()> {
		self.write_entity(&Entity::Way(way))
	}

	pub fn write_relation(&mut self, relation: Relation) -> Result<()> {
		self.write_entity(&Entity::Relation(relation))
	}

	/// Writes any buffered entities, flushes the stream and returns it.
	pub fn close(mut self) -> Result<W> {
		self.finish()?;
		self.writer.take().ok_or_else(|| anyhow!("PBF writer already closed"))
	}

	fn finish(&mut self) -> Result<()> {
		self.ensure_usable()?;
		self.flush_block()?;
		if let Some(writer) = self.writer.as_mut() {
			if let Err(err) = writer.flush() {
				self.failed = true;
				return Err(err).context("Failed to flush PBF stream");
			}
		}
		debug!("closed PBF stream after {} data blocks", self.blocks_written);
		Ok(())
	}

	fn ensure_usable(&self) -> Result<()> {
		if self.failed {
			return Err(anyhow!("PBF writer is unusable after a failed block write"));
		}
		Ok(())
	}

	fn flush_block(&mut self) -> Result<()> {
		let result = self.try_flush_block();
		if result.is_err() {
			self.failed = true;
		}
		result
	}

	fn try_flush_block(&mut self) -> Result<()> {
		let Some(payload) = self.builder.take_block().context("Failed to serialize data block")? else {
			return Ok(());
		};
		let frame = frame_blob(&BlobType::Data, &payload, self.compression).context("Failed to frame data block")?;
		self.write_frame(&frame)
	}

	fn write_frame(&mut self, frame: &Blob) -> Result<()> {
		let writer = self.writer.as_mut().ok_or_else(|| anyhow!("PBF writer already closed"))?;
		writer
			.write_all(frame.as_slice())
			.context("Failed to write data block")?;
		self.blocks_written += 1;
		Ok(())
	}
}

impl<W: Write> Drop for PbfWriter<W> {
	fn drop(&mut self) {
		if self.writer.is_none() || self.failed {
			return;
		}
		if let Err(err) = self.finish() {
			error!("Failed to finish PBF stream on drop: {err:?}");
		}
	}
}
