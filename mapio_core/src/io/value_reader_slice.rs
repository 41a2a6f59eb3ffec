//! [`ValueReaderSlice`] decodes protobuf values straight from a borrowed byte slice.
//!
//! ```rust
//! use mapio_core::io::{ValueReader, ValueReaderSlice};
//!
//! let mut reader = ValueReaderSlice::new_le(&[0x0A, 0x02, b'o', b'k']);
//! assert_eq!(reader.read_pbf_key().unwrap(), (1, 2));
//! assert_eq!(reader.read_pbf_string().unwrap(), "ok");
//! ```

use super::ValueReader;
use crate::MapError;
use anyhow::Result;
use byteorder::{ByteOrder, LE};
use std::{io::Read, marker::PhantomData};

pub struct ValueReaderSlice<'a, E: ByteOrder> {
	/// Unread tail of the input; reading advances it.
	rest: &'a [u8],
	total: u64,
	_order: PhantomData<E>,
}

impl<'a, E: ByteOrder> ValueReaderSlice<'a, E> {
	#[must_use]
	pub fn new(slice: &'a [u8]) -> ValueReaderSlice<'a, E> {
		ValueReaderSlice {
			rest: slice,
			total: slice.len() as u64,
			_order: PhantomData,
		}
	}
}

impl<'a> ValueReaderSlice<'a, LE> {
	#[must_use]
	pub fn new_le(slice: &'a [u8]) -> ValueReaderSlice<'a, LE> {
		ValueReaderSlice::new(slice)
	}
}

impl<'a, E: ByteOrder + 'a> ValueReader<'a, E> for ValueReaderSlice<'a, E> {
	fn get_reader(&mut self) -> &mut dyn Read {
		&mut self.rest
	}

	fn len(&self) -> u64 {
		self.total
	}

	fn position(&self) -> u64 {
		self.total - self.rest.len() as u64
	}

	fn get_sub_reader<'b>(&'b mut self, length: u64) -> Result<Box<dyn ValueReader<'b, E> + 'b>>
	where
		E: 'b,
	{
		let length = usize::try_from(length)
			.ok()
			.filter(|length| *length <= self.rest.len())
			.ok_or_else(|| MapError::format(format!("sub-reader length {length} exceeds remaining data")))?;
		let rest = self.rest;
		let (head, tail) = rest.split_at(length);
		self.rest = tail;
		Ok(Box::new(ValueReaderSlice::<E>::new(head)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn position_follows_reads() -> Result<()> {
		let mut reader = ValueReaderSlice::new_le(&[0xAC, 0x02, 0x07]);
		assert_eq!(reader.len(), 3);
		assert_eq!(reader.read_varint()?, 300);
		assert_eq!(reader.position(), 2);
		assert_eq!(reader.remaining(), 1);
		reader.read_varint()?;
		assert!(!reader.has_remaining());
		Ok(())
	}

	#[test]
	fn sub_reader_consumes_its_range() -> Result<()> {
		let data = [0x01, 0x02, 0x03, 0x04, 0x05];
		let mut reader = ValueReaderSlice::new_le(&data);
		reader.read_varint()?;
		{
			let mut sub = reader.get_sub_reader(3)?;
			assert_eq!(sub.len(), 3);
			assert_eq!(sub.read_varint()?, 2);
			assert_eq!(sub.read_varint()?, 3);
			assert_eq!(sub.read_varint()?, 4);
			assert!(sub.read_varint().is_err());
		}
		assert_eq!(reader.read_varint()?, 5);
		Ok(())
	}

	#[test]
	fn sub_reader_past_end_is_a_format_error() {
		let mut reader = ValueReaderSlice::new_le(&[0x01, 0x02, 0x03]);
		let err = reader.get_sub_reader(5).err().unwrap();
		assert!(MapError::find(&err).unwrap().is_format());
		assert_eq!(reader.position(), 0);
	}
}
