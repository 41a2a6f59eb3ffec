//! Pull-based reading of entities from a PBF stream.

use crate::{
	block::decode_block,
	framing::{BlobType, read_blob},
	header::HeaderBlock,
	options::PbfReaderOptions,
};
use anyhow::{Context, Result};
use log::debug;
use mapio_core::{MapError, io::ValueReaderSlice, model::Entity};
use std::{
	fs::File,
	io::{BufReader, Read},
	path::Path,
	vec,
};

/// Reads entities from a PBF stream, one block at a time.
///
/// The header block is read and validated on construction. Entities are then decoded block by
/// block; only the entities of the current block are held in memory. After the first error the
/// reader is finished and returns nothing more.
///
/// ```no_run
/// use mapio_pbf::{PbfReader, PbfReaderOptions};
/// use std::path::Path;
///
/// let reader = PbfReader::open_path(Path::new("berlin.osm.pbf"), PbfReaderOptions::default()).unwrap();
/// for entity in reader {
///     println!("{:?}", entity.unwrap().id());
/// }
/// ```
pub struct PbfReader<R: Read> {
	reader: R,
	header: HeaderBlock,
	options: PbfReaderOptions,
	entities: vec::IntoIter<Entity>,
	finished: bool,
}

impl PbfReader<BufReader<File>> {
	/// Opens the file at `path`.
	///
	/// # Errors
	/// Fails if the file cannot be opened or its header block is invalid.
	pub fn open_path(path: &Path, options: PbfReaderOptions) -> Result<PbfReader<BufReader<File>>> {
		let file = File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
		PbfReader::new(BufReader::new(file), options).with_context(|| format!("Failed to read '{}'", path.display()))
	}
}

impl<R: Read> PbfReader<R> {
	/// Creates a reader and consumes the header block.
	///
	/// # Errors
	/// * `MapError::Format` if the stream does not start with a header block.
	/// * `MapError::UnsupportedFeature` if the header requires a feature this reader lacks.
	pub fn new(mut reader: R, options: PbfReaderOptions) -> Result<PbfReader<R>> {
		let header = match read_blob(&mut reader).context("Failed to read header blob")? {
			Some((BlobType::Header, payload)) => {
				HeaderBlock::read(&mut ValueReaderSlice::new_le(payload.as_slice())).context("Failed to parse header block")?
			}
			Some((blob_type, _)) => {
				return Err(MapError::format(format!("stream starts with a {blob_type} blob instead of OSMHeader")).into());
			}
			None => return Err(MapError::format("stream is empty").into()),
		};
		header.check_required_features()?;
		debug!(
			"opened PBF stream: writing program {:?}, required features {:?}",
			header.writing_program, header.required_features
		);

		Ok(PbfReader {
			reader,
			header,
			options,
			entities: Vec::new().into_iter(),
			finished: false,
		})
	}

	/// The header block the stream started with.
	pub fn header(&self) -> &HeaderBlock {
		&self.header
	}

	/// Returns the next entity, or `None` at the end of the stream.
	///
	/// # Errors
	/// Any error while reading or decoding a block. The reader yields nothing after that.
	pub fn next_entity(&mut self) -> Result<Option<Entity>> {
		loop {
			if let Some(entity) = self.entities.next() {
				return Ok(Some(entity));
			}
			if self.finished {
				return Ok(None);
			}
			match self.load_next_block() {
				Ok(true) => {}
				Ok(false) => {
					self.finished = true;
					return Ok(None);
				}
				Err(err) => {
					self.finished = true;
					return Err(err);
				}
			}
		}
	}

	/// Decodes the next data block into the entity buffer. Returns `false` at the end of the stream.
	fn load_next_block(&mut self) -> Result<bool> {
		loop {
			match read_blob(&mut self.reader)? {
				None => return Ok(false),
				Some((BlobType::Data, payload)) => {
					let entities = decode_block(&payload, self.options.read_metadata).context("Failed to decode data block")?;
					debug!("decoded data block with {} entities", entities.len());
					self.entities = entities.into_iter();
					return Ok(true);
				}
				Some((BlobType::Header, _)) => {
					return Err(MapError::format("unexpected second OSMHeader blob").into());
				}
				Some((blob_type, payload)) => {
					debug!("skipping {} bytes of unknown blob type '{blob_type}'", payload.len());
				}
			}
		}
	}
}

impl<R: Read> Iterator for PbfReader<R> {
	type Item = Result<Entity>;

	fn next(&mut self) -> Option<Self::Item> {
		self.next_entity().transpose()
	}
}
