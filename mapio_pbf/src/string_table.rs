//! The per-block string pool.
//!
//! Every key, value, role and user name inside a primitive block is stored once in the block's
//! string table and referenced by index. Entry 0 is an empty delimiter that entities never
//! reference; an empty role or user name gets an entry of its own. Other writers do use 0 for
//! those two, so readers accept it there.

use anyhow::{Context, Result};
use byteorder::LE;
use mapio_core::{
	Blob, MapError,
	io::{ValueReader, ValueWriter, ValueWriterBlob},
};
use std::collections::HashMap;

/// Collects strings for one block and assigns 1-based indices in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct StringTableBuilder {
	list: Vec<String>,
	map: HashMap<String, u32>,
}

impl StringTableBuilder {
	#[must_use]
	pub fn new() -> StringTableBuilder {
		StringTableBuilder::default()
	}

	/// Returns the index of `entry`, adding it if it is new. Never returns 0.
	pub fn add(&mut self, entry: &str) -> u32 {
		if let Some(index) = self.map.get(entry) {
			return *index;
		}
		let index = self.list.len() as u32 + 1;
		self.map.insert(entry.to_owned(), index);
		self.list.push(entry.to_owned());
		index
	}

	/// Number of entries, not counting the reserved entry 0.
	#[must_use]
	pub fn len(&self) -> usize {
		self.list.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.list.is_empty()
	}

	/// Serializes the table as a `StringTable` message: entry 0 first, then all others by index.
	pub fn to_blob(&self) -> Result<Blob> {
		let mut writer = ValueWriterBlob::new_le();
		writer
			.write_pbf_key(1, 2)
			.context("Failed to write PBF key for reserved string")?;
		writer
			.write_pbf_string("")
			.context("Failed to write reserved string")?;
		for entry in &self.list {
			writer
				.write_pbf_key(1, 2)
				.context("Failed to write PBF key for string")?;
			writer.write_pbf_string(entry).context("Failed to write string")?;
		}
		Ok(writer.into_blob())
	}
}

/// A decoded string table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StringTable {
	list: Vec<String>,
}

impl StringTable {
	/// Reads a `StringTable` message.
	///
	/// # Errors
	///
	/// Fails with `MapError::Format` on malformed input or entries that are not UTF-8.
	pub fn read(reader: &mut dyn ValueReader<'_, LE>) -> Result<StringTable> {
		let mut list = Vec::new();
		while reader.has_remaining() {
			match reader.read_pbf_key().context("Failed to read PBF key")? {
				(1, 2) => list.push(reader.read_pbf_string().context("Failed to read string table entry")?),
				(_, w) => reader.skip_pbf_field(w).context("Failed to skip unknown field")?,
			}
		}
		Ok(StringTable { list })
	}

	/// Resolves a key, value or user name index.
	///
	/// # Errors
	///
	/// Fails with `MapError::ReservedIndex` for index 0 and `MapError::Format` for indices
	/// beyond the table.
	pub fn get(&self, index: u32) -> Result<&str> {
		if index == 0 {
			return Err(MapError::ReservedIndex.into());
		}
		self
			.list
			.get(index as usize)
			.map(String::as_str)
			.ok_or_else(|| {
				MapError::format(format!(
					"string table index {index} out of range (table has {} entries)",
					self.list.len()
				))
				.into()
			})
	}

	/// Resolves a role or user name index, where 0 denotes the empty string.
	pub fn get_or_empty(&self, index: u32) -> Result<&str> {
		if index == 0 { Ok("") } else { self.get(index) }
	}

	/// Number of entries including entry 0.
	#[must_use]
	pub fn len(&self) -> usize {
		self.list.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.list.is_empty()
	}
}
