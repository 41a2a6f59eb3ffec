//! The [`ValueReader`] trait: protobuf wire decoding on top of a bounded byte source.
//!
//! Every structural failure, such as a varint running past the end of the data, a length prefix
//! longer than the remaining bytes or invalid UTF-8, is reported as [`MapError::Format`].

use super::zigzag_decode;
use crate::{Blob, MapError};
use anyhow::{Context, Result};
use byteorder::{ByteOrder, ReadBytesExt};
use std::io::Read;

/// Longest varint accepted, in bytes. A `u64` never needs more than ten.
pub const MAX_VARINT_BYTES: usize = 10;

/// Protobuf wire types.
pub const WIRE_VARINT: u8 = 0;
pub const WIRE_FIXED64: u8 = 1;
pub const WIRE_LEN: u8 = 2;
pub const WIRE_FIXED32: u8 = 5;

/// Decodes protobuf values. Implementors provide the byte source and its bounds.
pub trait ValueReader<'a, E: ByteOrder + 'a> {
	fn get_reader(&mut self) -> &mut dyn Read;

	/// Total number of bytes this reader covers.
	fn len(&self) -> u64;

	/// Bytes consumed so far.
	fn position(&self) -> u64;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn remaining(&self) -> u64 {
		self.len() - self.position()
	}

	fn has_remaining(&self) -> bool {
		self.remaining() > 0
	}

	/// Reads an unsigned base-128 varint.
	///
	/// # Errors
	/// Fails with `MapError::Format` if the data ends inside the varint or if more than
	/// [`MAX_VARINT_BYTES`] bytes carry the continuation bit.
	fn read_varint(&mut self) -> Result<u64> {
		let mut value = 0;
		let mut shift = 0;
		for _ in 0..MAX_VARINT_BYTES {
			let byte = self
				.get_reader()
				.read_u8()
				.map_err(|_| MapError::format("unexpected end of data inside varint"))?;
			value |= (u64::from(byte) & 0x7F) << shift;
			if byte & 0x80 == 0 {
				return Ok(value);
			}
			shift += 7;
		}
		Err(MapError::format("varint too long").into())
	}

	/// Reads a zigzag-encoded signed varint.
	fn read_svarint(&mut self) -> Result<i64> {
		Ok(zigzag_decode(self.read_varint()?))
	}

	/// Reads exactly `length` raw bytes.
	///
	/// # Errors
	/// Fails with `MapError::Format` if fewer than `length` bytes remain.
	fn read_blob(&mut self, length: u64) -> Result<Blob> {
		let remaining = self.remaining();
		if length > remaining {
			return Err(MapError::format(format!("length {length} exceeds the {remaining} remaining bytes")).into());
		}
		let mut buffer = vec![0u8; usize::try_from(length)?];
		self.get_reader().read_exact(&mut buffer)?;
		Ok(Blob::from(buffer))
	}

	/// Splits a field key into `(field_number, wire_type)`.
	fn read_pbf_key(&mut self) -> Result<(u32, u8)> {
		let key = self.read_varint().context("Failed to read field key")?;
		let field_number = u32::try_from(key >> 3).map_err(|_| MapError::format(format!("field key {key} too large")))?;
		Ok((field_number, (key & 0x07) as u8))
	}

	/// Returns a reader over the next `length` bytes and moves past them.
	fn get_sub_reader<'b>(&'b mut self, length: u64) -> Result<Box<dyn ValueReader<'b, E> + 'b>>
	where
		E: 'b;

	/// Like [`get_sub_reader`](ValueReader::get_sub_reader), with the length read from a varint prefix.
	fn get_pbf_sub_reader<'b>(&'b mut self) -> Result<Box<dyn ValueReader<'b, E> + 'b>>
	where
		E: 'b,
	{
		let length = self.read_varint().context("Failed to read length prefix")?;
		self.get_sub_reader(length).context("Failed to read length-delimited field")
	}

	/// Moves past the value of a field whose key was just read.
	///
	/// # Errors
	/// Fails with `MapError::Format` for the deprecated group wire types or values running past the end.
	fn skip_pbf_field(&mut self, wire_type: u8) -> Result<()> {
		let length = match wire_type {
			WIRE_VARINT => {
				self.read_varint()?;
				return Ok(());
			}
			WIRE_FIXED64 => 8,
			WIRE_LEN => self.read_varint().context("Failed to read length of skipped field")?,
			WIRE_FIXED32 => 4,
			w => return Err(MapError::format(format!("unsupported wire type {w}")).into()),
		};
		self.get_sub_reader(length).context("Failed to skip field")?;
		Ok(())
	}

	/// Reads a packed repeated field of plain varints (`uint32`, `int32`, `int64`, enums).
	fn read_pbf_packed_varint(&mut self) -> Result<Vec<u64>> {
		let mut packed = self.get_pbf_sub_reader().context("Failed to open packed field")?;
		let mut values = Vec::with_capacity(usize::try_from(packed.len()).unwrap_or(0));
		while packed.has_remaining() {
			values.push(packed.read_varint().context("Failed to read packed value")?);
		}
		Ok(values)
	}

	fn read_pbf_packed_uint32(&mut self) -> Result<Vec<u32>> {
		self
			.read_pbf_packed_varint()?
			.into_iter()
			.map(|v| u32::try_from(v).map_err(|_| anyhow::Error::from(MapError::format(format!("value {v} overflows uint32")))))
			.collect()
	}

	/// Reads a packed repeated field of zigzag-encoded `sint32`/`sint64` values.
	fn read_pbf_packed_svarint(&mut self) -> Result<Vec<i64>> {
		Ok(self.read_pbf_packed_varint()?.into_iter().map(zigzag_decode).collect())
	}

	/// Reads a length-delimited UTF-8 string.
	fn read_pbf_string(&mut self) -> Result<String> {
		let bytes = self.read_pbf_blob()?.into_vec();
		String::from_utf8(bytes).map_err(|_| MapError::format("string is not valid UTF-8").into())
	}

	/// Reads a length-delimited byte payload.
	fn read_pbf_blob(&mut self) -> Result<Blob> {
		let length = self.read_varint().context("Failed to read length prefix")?;
		self.read_blob(length).context("Failed to read length-delimited bytes")
	}
}
