//! Blob framing.
//!
//! A PBF stream is a sequence of frames, each laid out as
//!
//! ```text
//! [u32 big-endian header length][BlobHeader message][Blob message]
//! ```
//!
//! The `BlobHeader` names the payload type and the byte length of the `Blob` message. The `Blob`
//! carries the payload either verbatim (`raw`) or deflated (`zlib_data`, with `raw_size`).

use anyhow::{Context, Result};
use byteorder::LE;
use log::trace;
use mapio_core::{
	Blob, MapError,
	compression::{Compression, compress_zlib, decompress_zlib},
	io::{ValueReader, ValueReaderSlice, ValueWriter, ValueWriterBlob},
};
use std::{
	fmt::Display,
	io::{ErrorKind, Read},
};

/// Largest `BlobHeader` the format allows.
pub const MAX_BLOB_HEADER_SIZE: u64 = 64 * 1024;

/// Largest `Blob` message, and largest uncompressed payload, the format allows.
pub const MAX_BLOB_SIZE: u64 = 32 * 1024 * 1024;

/// The payload type named in a `BlobHeader`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobType {
	/// `OSMHeader`: the stream's header block.
	Header,
	/// `OSMData`: a primitive block with entities.
	Data,
	/// Any other label. Readers skip these.
	Unknown(String),
}

impl BlobType {
	#[must_use]
	pub fn as_str(&self) -> &str {
		match self {
			BlobType::Header => "OSMHeader",
			BlobType::Data => "OSMData",
			BlobType::Unknown(label) => label,
		}
	}
}

impl From<String> for BlobType {
	fn from(label: String) -> Self {
		match label.as_str() {
			"OSMHeader" => BlobType::Header,
			"OSMData" => BlobType::Data,
			_ => BlobType::Unknown(label),
		}
	}
}

impl Display for BlobType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Frames `payload` as one length-prefixed header/blob pair, compressing it if requested.
///
/// # Errors
///
/// Fails with `MapError::Format` if the payload or the resulting blob exceeds [`MAX_BLOB_SIZE`],
/// and with `MapError::Codec` if compression fails.
pub fn frame_blob(blob_type: &BlobType, payload: &Blob, compression: Compression) -> Result<Blob> {
	if payload.len() > MAX_BLOB_SIZE {
		return Err(MapError::format(format!(
			"block of {} bytes exceeds the maximum of {MAX_BLOB_SIZE} bytes",
			payload.len()
		))
		.into());
	}

	let mut blob_writer = ValueWriterBlob::new_le();
	match compression {
		Compression::None => {
			blob_writer.write_pbf_key(1, 2).context("Failed to write PBF key for raw data")?;
			blob_writer.write_pbf_blob(payload).context("Failed to write raw data")?;
		}
		Compression::ZlibDeflate => {
			let compressed = compress_zlib(payload)?;
			blob_writer.write_pbf_key(2, 0).context("Failed to write PBF key for raw size")?;
			blob_writer.write_varint(payload.len()).context("Failed to write raw size")?;
			blob_writer.write_pbf_key(3, 2).context("Failed to write PBF key for zlib data")?;
			blob_writer.write_pbf_blob(&compressed).context("Failed to write zlib data")?;
		}
	}
	let blob = blob_writer.into_blob();

	let mut header_writer = ValueWriterBlob::new_le();
	header_writer.write_pbf_key(1, 2).context("Failed to write PBF key for blob type")?;
	header_writer
		.write_pbf_string(blob_type.as_str())
		.context("Failed to write blob type")?;
	header_writer.write_pbf_key(3, 0).context("Failed to write PBF key for data size")?;
	header_writer.write_varint(blob.len()).context("Failed to write data size")?;
	let header = header_writer.into_blob();

	let mut writer = ValueWriterBlob::new_be();
	writer.write_u32(u32::try_from(header.len())?).context("Failed to write header length")?;
	writer.write_blob(&header)?;
	writer.write_blob(&blob)?;

	trace!(
		"framed {blob_type} blob: {} payload bytes, {} bytes on the wire",
		payload.len(),
		blob.len()
	);
	Ok(writer.into_blob())
}

/// Reads the next frame from `reader` and returns its type and uncompressed payload.
///
/// Returns `Ok(None)` at a clean end of stream, i.e. when no byte of a further frame is present.
///
/// # Errors
///
/// * `MapError::Format` if the stream ends inside a frame or sizes exceed the format limits.
/// * `MapError::Codec` if the payload cannot be decompressed to its declared size.
/// * `MapError::UnsupportedFeature` if the payload uses a compression other than zlib.
pub fn read_blob(reader: &mut dyn Read) -> Result<Option<(BlobType, Blob)>> {
	let mut prefix = [0u8; 4];
	if !read_exact_or_eof(reader, &mut prefix)? {
		return Ok(None);
	}
	let header_size = u64::from(u32::from_be_bytes(prefix));
	if header_size > MAX_BLOB_HEADER_SIZE {
		return Err(MapError::format(format!(
			"blob header of {header_size} bytes exceeds the maximum of {MAX_BLOB_HEADER_SIZE} bytes"
		))
		.into());
	}

	let header = read_exact(reader, header_size).context("Failed to read blob header")?;
	let (blob_type, data_size) = read_blob_header(&header)?;
	if data_size > MAX_BLOB_SIZE {
		return Err(MapError::format(format!(
			"blob of {data_size} bytes exceeds the maximum of {MAX_BLOB_SIZE} bytes"
		))
		.into());
	}

	let blob = read_exact(reader, data_size).with_context(|| format!("Failed to read {blob_type} blob"))?;
	let payload = read_blob_payload(&blob).with_context(|| format!("Failed to unpack {blob_type} blob"))?;
	trace!("read {blob_type} blob: {} payload bytes", payload.len());
	Ok(Some((blob_type, payload)))
}

fn read_blob_header(header: &Blob) -> Result<(BlobType, u64)> {
	let mut reader = ValueReaderSlice::<LE>::new(header.as_slice());
	let mut blob_type = None;
	let mut data_size = None;

	while reader.has_remaining() {
		match reader.read_pbf_key().context("Failed to read PBF key")? {
			(1, 2) => blob_type = Some(reader.read_pbf_string().context("Failed to read blob type")?),
			(3, 0) => data_size = Some(reader.read_varint().context("Failed to read data size")?),
			(_, w) => reader.skip_pbf_field(w).context("Failed to skip blob header field")?,
		}
	}

	let blob_type = blob_type.ok_or_else(|| MapError::format("blob header lacks a type"))?;
	let data_size = data_size.ok_or_else(|| MapError::format("blob header lacks a data size"))?;
	Ok((BlobType::from(blob_type), data_size))
}

fn read_blob_payload(blob: &Blob) -> Result<Blob> {
	let mut reader = ValueReaderSlice::<LE>::new(blob.as_slice());
	let mut raw = None;
	let mut raw_size = None;
	let mut zlib_data = None;

	while reader.has_remaining() {
		match reader.read_pbf_key().context("Failed to read PBF key")? {
			(1, 2) => raw = Some(reader.read_pbf_blob().context("Failed to read raw data")?),
			(2, 0) => raw_size = Some(reader.read_varint().context("Failed to read raw size")?),
			(3, 2) => zlib_data = Some(reader.read_pbf_blob().context("Failed to read zlib data")?),
			(4, 2) => return Err(MapError::unsupported("lzma compressed blob").into()),
			(5, 2) => return Err(MapError::unsupported("bzip2 compressed blob").into()),
			(6, 2) => return Err(MapError::unsupported("lz4 compressed blob").into()),
			(7, 2) => return Err(MapError::unsupported("zstd compressed blob").into()),
			(_, w) => reader.skip_pbf_field(w).context("Failed to skip blob field")?,
		}
	}

	if let Some(raw) = raw {
		return Ok(raw);
	}
	let zlib_data = zlib_data.ok_or_else(|| MapError::format("blob contains neither raw nor zlib data"))?;
	let raw_size = raw_size.ok_or_else(|| MapError::format("zlib compressed blob lacks its raw size"))?;
	if raw_size > MAX_BLOB_SIZE {
		return Err(MapError::format(format!(
			"declared raw size {raw_size} exceeds the maximum of {MAX_BLOB_SIZE} bytes"
		))
		.into());
	}
	decompress_zlib(&zlib_data, raw_size)
}

/// Fills `buf` completely. Returns `false` if the stream was already at its end.
fn read_exact_or_eof(reader: &mut dyn Read, buf: &mut [u8]) -> Result<bool> {
	let mut filled = 0;
	while filled < buf.len() {
		match reader.read(&mut buf[filled..]) {
			Ok(0) if filled == 0 => return Ok(false),
			Ok(0) => return Err(MapError::format("stream ends inside a blob length prefix").into()),
			Ok(n) => filled += n,
			Err(e) if e.kind() == ErrorKind::Interrupted => {}
			Err(e) => return Err(e).context("Failed to read blob length prefix"),
		}
	}
	Ok(true)
}

fn read_exact(reader: &mut dyn Read, length: u64) -> Result<Blob> {
	let mut buffer = vec![0u8; usize::try_from(length)?];
	reader.read_exact(&mut buffer).map_err(|e| {
		if e.kind() == ErrorKind::UnexpectedEof {
			anyhow::Error::from(MapError::format(format!("stream ends inside a frame of {length} bytes")))
		} else {
			anyhow::Error::from(e)
		}
	})?;
	Ok(Blob::from(buffer))
}
