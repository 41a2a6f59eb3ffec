//! The [`ValueWriter`] trait: protobuf wire encoding on top of any [`std::io::Write`].
//!
//! Implementors only expose their output through [`ValueWriter::get_writer`]; varints, field keys,
//! packed repeated fields and length-delimited payloads are provided.
//!
//! ```rust
//! use mapio_core::io::{ValueWriter, ValueWriterBlob};
//!
//! let mut writer = ValueWriterBlob::new_le();
//! writer.write_pbf_key(1, 0).unwrap();
//! writer.write_varint(150).unwrap();
//! assert_eq!(writer.into_blob().as_slice(), &[0x08, 0x96, 0x01]);
//! ```

use super::{MAX_VARINT_BYTES, ValueWriterBlob, zigzag_encode};
use crate::Blob;
use anyhow::{Context, Result};
use byteorder::{ByteOrder, LE, WriteBytesExt};
use std::io::Write;

pub trait ValueWriter<E: ByteOrder> {
	fn get_writer(&mut self) -> &mut dyn Write;

	/// Writes an unsigned LEB128 varint.
	fn write_varint(&mut self, mut value: u64) -> Result<()> {
		let mut buffer = [0u8; MAX_VARINT_BYTES];
		let mut length = 0;
		loop {
			let byte = (value & 0x7F) as u8;
			value >>= 7;
			if value == 0 {
				buffer[length] = byte;
				length += 1;
				break;
			}
			buffer[length] = byte | 0x80;
			length += 1;
		}
		self.write_slice(&buffer[..length])
	}

	/// Writes a zigzag-encoded signed varint (`sint32`/`sint64`).
	fn write_svarint(&mut self, value: i64) -> Result<()> {
		self.write_varint(zigzag_encode(value))
	}

	/// Writes a fixed-width `u32` in byte order `E`.
	fn write_u32(&mut self, value: u32) -> Result<()> {
		self.get_writer().write_u32::<E>(value).context("Failed to write u32")
	}

	fn write_blob(&mut self, blob: &Blob) -> Result<()> {
		self.write_slice(blob.as_slice())
	}

	fn write_slice(&mut self, buf: &[u8]) -> Result<()> {
		self.get_writer().write_all(buf).context("Failed to write bytes")
	}

	/// Writes a field key: `field_number << 3 | wire_type`.
	fn write_pbf_key(&mut self, field_number: u32, wire_type: u8) -> Result<()> {
		self
			.write_varint((u64::from(field_number) << 3) | u64::from(wire_type))
			.with_context(|| format!("Failed to write key of field {field_number}"))
	}

	fn write_pbf_packed_uint32(&mut self, data: &[u32]) -> Result<()> {
		let packed = pack(data, |w, v| w.write_varint(u64::from(v))).context("Failed to pack uint32 values")?;
		self.write_pbf_blob(&packed)
	}

	/// Writes packed plain `int32`/`int64` values. Negative values occupy ten bytes each.
	fn write_pbf_packed_int(&mut self, data: &[i64]) -> Result<()> {
		let packed = pack(data, |w, v| w.write_varint(v as u64)).context("Failed to pack int values")?;
		self.write_pbf_blob(&packed)
	}

	/// Writes packed zigzag-encoded `sint32`/`sint64` values.
	fn write_pbf_packed_svarint(&mut self, data: &[i64]) -> Result<()> {
		let packed = pack(data, |w, v| w.write_svarint(v)).context("Failed to pack sint values")?;
		self.write_pbf_blob(&packed)
	}

	/// Writes a length-delimited payload.
	fn write_pbf_blob(&mut self, blob: &Blob) -> Result<()> {
		self.write_varint(blob.len()).context("Failed to write payload length")?;
		self.write_blob(blob)
	}

	fn write_pbf_string(&mut self, text: &str) -> Result<()> {
		self
			.write_varint(text.len() as u64)
			.context("Failed to write string length")?;
		self.write_slice(text.as_bytes())
	}
}

fn pack<T: Copy>(values: &[T], mut encode: impl FnMut(&mut ValueWriterBlob<LE>, T) -> Result<()>) -> Result<Blob> {
	let mut writer = ValueWriterBlob::new_le();
	for value in values {
		encode(&mut writer, *value)?;
	}
	Ok(writer.into_blob())
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	/// Writes straight into a `Vec`, exercising only the provided methods.
	struct VecWriter(Vec<u8>);

	impl ValueWriter<LE> for VecWriter {
		fn get_writer(&mut self) -> &mut dyn Write {
			&mut self.0
		}
	}

	fn encoded(f: impl FnOnce(&mut VecWriter) -> Result<()>) -> Vec<u8> {
		let mut writer = VecWriter(Vec::new());
		f(&mut writer).unwrap();
		writer.0
	}

	#[rstest]
	#[case(0, &[0x00])]
	#[case(1, &[0x01])]
	#[case(127, &[0x7F])]
	#[case(128, &[0x80, 0x01])]
	#[case(300, &[0xAC, 0x02])]
	#[case(u64::MAX, &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01])]
	fn varints(#[case] value: u64, #[case] expected: &[u8]) {
		assert_eq!(encoded(|w| w.write_varint(value)), expected);
	}

	#[rstest]
	#[case(0, &[0x00])]
	#[case(-1, &[0x01])]
	#[case(1, &[0x02])]
	#[case(-75, &[0x95, 0x01])]
	fn svarints(#[case] value: i64, #[case] expected: &[u8]) {
		assert_eq!(encoded(|w| w.write_svarint(value)), expected);
	}

	#[test]
	fn keys() {
		assert_eq!(encoded(|w| w.write_pbf_key(1, 2)), [0x0A]);
		assert_eq!(encoded(|w| w.write_pbf_key(17, 0)), [0x88, 0x01]);
	}

	#[test]
	fn packed_fields() {
		assert_eq!(
			encoded(|w| w.write_pbf_packed_uint32(&[100, 150, 300])),
			[0x05, 0x64, 0x96, 0x01, 0xAC, 0x02]
		);
		assert_eq!(
			encoded(|w| w.write_pbf_packed_svarint(&[1, -1, 75])),
			[0x04, 0x02, 0x01, 0x96, 0x01]
		);
		assert_eq!(encoded(|w| w.write_pbf_packed_uint32(&[])), [0x00]);
	}

	#[test]
	fn packed_negative_int_takes_ten_bytes() {
		let bytes = encoded(|w| w.write_pbf_packed_int(&[-1]));
		assert_eq!(bytes.len(), 11);
		assert_eq!(bytes[0], 10);
		assert_eq!(bytes[10], 0x01);
	}

	#[test]
	fn length_delimited() {
		assert_eq!(encoded(|w| w.write_pbf_string("hey")), [0x03, b'h', b'e', b'y']);
		assert_eq!(encoded(|w| w.write_pbf_blob(&Blob::from(&[9u8, 8]))), [0x02, 9, 8]);
	}
}
