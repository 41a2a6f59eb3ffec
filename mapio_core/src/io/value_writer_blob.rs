use super::ValueWriter;
use crate::Blob;
use byteorder::{BE, ByteOrder, LE};
use std::{io::Write, marker::PhantomData};

/// A [`ValueWriter`] that collects its output in memory.
///
/// Protobuf messages are built with [`new_le`](ValueWriterBlob::new_le); the big-endian variant
/// only serves the length prefix in front of each frame.
pub struct ValueWriterBlob<E: ByteOrder> {
	buffer: Vec<u8>,
	_order: PhantomData<E>,
}

impl<E: ByteOrder> ValueWriterBlob<E> {
	#[must_use]
	pub fn new() -> ValueWriterBlob<E> {
		ValueWriterBlob {
			buffer: Vec::new(),
			_order: PhantomData,
		}
	}

	/// Bytes written so far.
	#[must_use]
	pub fn len(&self) -> usize {
		self.buffer.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.buffer.is_empty()
	}

	#[must_use]
	pub fn into_blob(self) -> Blob {
		Blob::from(self.buffer)
	}
}

impl ValueWriterBlob<LE> {
	#[must_use]
	pub fn new_le() -> ValueWriterBlob<LE> {
		ValueWriterBlob::new()
	}
}

impl ValueWriterBlob<BE> {
	#[must_use]
	pub fn new_be() -> ValueWriterBlob<BE> {
		ValueWriterBlob::new()
	}
}

impl<E: ByteOrder> ValueWriter<E> for ValueWriterBlob<E> {
	fn get_writer(&mut self) -> &mut dyn Write {
		&mut self.buffer
	}
}

impl<E: ByteOrder> Default for ValueWriterBlob<E> {
	fn default() -> Self {
		Self::new()
	}
}
