//! `Info` and `DenseInfo` messages carrying entity metadata.
//!
//! A `DenseInfo` covers every node of its dense group, so the writer never mixes nodes with and
//! without metadata in one group.

use super::BlockParameters;
use crate::{
	delta::{DeltaDecoder, DeltaEncoder},
	string_table::{StringTable, StringTableBuilder},
};
use anyhow::{Context, Result};
use byteorder::LE;
use mapio_core::{
	Blob, MapError,
	io::{ValueReader, ValueWriter, ValueWriterBlob},
	model::Metadata,
};

/// Serializes one `Info` message.
pub(crate) fn write_info(metadata: &Metadata, params: &BlockParameters, strings: &mut StringTableBuilder) -> Result<Blob> {
	let mut writer = ValueWriterBlob::new_le();
	writer.write_pbf_key(1, 0)?;
	writer.write_varint(i64::from(metadata.version) as u64)?;
	writer.write_pbf_key(2, 0)?;
	writer.write_varint(params.encode_timestamp(&metadata.timestamp) as u64)?;
	writer.write_pbf_key(3, 0)?;
	writer.write_varint(metadata.changeset as u64)?;
	writer.write_pbf_key(4, 0)?;
	writer.write_varint(i64::from(metadata.uid) as u64)?;
	writer.write_pbf_key(5, 0)?;
	writer.write_varint(u64::from(strings.add(&metadata.user)))?;
	Ok(writer.into_blob())
}

/// Reads one `Info` message. Missing fields default to zero.
pub(crate) fn read_info(
	reader: &mut dyn ValueReader<'_, LE>,
	params: &BlockParameters,
	strings: &StringTable,
) -> Result<Metadata> {
	let mut version = 0i32;
	let mut timestamp = 0i64;
	let mut changeset = 0i64;
	let mut uid = 0i32;
	let mut user_sid = 0u32;
	while reader.has_remaining() {
		match reader.read_pbf_key().context("Failed to read PBF key")? {
			(1, 0) => version = reader.read_varint().context("Failed to read version")? as i32,
			(2, 0) => timestamp = reader.read_varint().context("Failed to read timestamp")? as i64,
			(3, 0) => changeset = reader.read_varint().context("Failed to read changeset")? as i64,
			(4, 0) => uid = reader.read_varint().context("Failed to read uid")? as i32,
			(5, 0) => user_sid = reader.read_varint().context("Failed to read user_sid")? as u32,
			(_, w) => reader.skip_pbf_field(w).context("Failed to skip info field")?,
		}
	}
	Ok(Metadata::new(
		version,
		params.decode_timestamp(timestamp)?,
		changeset,
		uid,
		strings.get_or_empty(user_sid)?,
	))
}

/// Collects the columns of a `DenseInfo` message.
#[derive(Debug, Default)]
pub(crate) struct DenseInfoBuilder {
	versions: Vec<i64>,
	timestamps: Vec<i64>,
	changesets: Vec<i64>,
	uids: Vec<i64>,
	user_sids: Vec<i64>,
}

impl DenseInfoBuilder {
	pub(crate) fn push(&mut self, metadata: &Metadata, params: &BlockParameters, strings: &mut StringTableBuilder) {
		self.versions.push(i64::from(metadata.version));
		self.timestamps.push(params.encode_timestamp(&metadata.timestamp));
		self.changesets.push(metadata.changeset);
		self.uids.push(i64::from(metadata.uid));
		self.user_sids.push(i64::from(strings.add(&metadata.user)));
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.versions.is_empty()
	}

	pub(crate) fn to_blob(&self) -> Result<Blob> {
		let delta = |values: &[i64]| -> Vec<i64> {
			let mut encoder = DeltaEncoder::new();
			values.iter().map(|v| encoder.encode(*v)).collect()
		};

		let mut writer = ValueWriterBlob::new_le();
		writer.write_pbf_key(1, 2)?;
		writer
			.write_pbf_packed_int(&self.versions)
			.context("Failed to write dense versions")?;
		writer.write_pbf_key(2, 2)?;
		writer
			.write_pbf_packed_svarint(&delta(&self.timestamps))
			.context("Failed to write dense timestamps")?;
		writer.write_pbf_key(3, 2)?;
		writer
			.write_pbf_packed_svarint(&delta(&self.changesets))
			.context("Failed to write dense changesets")?;
		writer.write_pbf_key(4, 2)?;
		writer
			.write_pbf_packed_svarint(&delta(&self.uids))
			.context("Failed to write dense uids")?;
		writer.write_pbf_key(5, 2)?;
		writer
			.write_pbf_packed_svarint(&delta(&self.user_sids))
			.context("Failed to write dense user_sids")?;
		Ok(writer.into_blob())
	}
}

/// Reads a `DenseInfo` message for `count` nodes.
///
/// # Errors
///
/// `MapError::Format` if a column does not hold exactly `count` entries.
pub(crate) fn read_dense_info(
	reader: &mut dyn ValueReader<'_, LE>,
	count: usize,
	params: &BlockParameters,
	strings: &StringTable,
) -> Result<Vec<Metadata>> {
	let mut versions = Vec::new();
	let mut timestamps = Vec::new();
	let mut changesets = Vec::new();
	let mut uids = Vec::new();
	let mut user_sids = Vec::new();
	while reader.has_remaining() {
		match reader.read_pbf_key().context("Failed to read PBF key")? {
			(1, 2) => versions = reader.read_pbf_packed_varint().context("Failed to read versions")?,
			(2, 2) => timestamps = reader.read_pbf_packed_svarint().context("Failed to read timestamps")?,
			(3, 2) => changesets = reader.read_pbf_packed_svarint().context("Failed to read changesets")?,
			(4, 2) => uids = reader.read_pbf_packed_svarint().context("Failed to read uids")?,
			(5, 2) => user_sids = reader.read_pbf_packed_svarint().context("Failed to read user_sids")?,
			(_, w) => reader.skip_pbf_field(w).context("Failed to skip dense info field")?,
		}
	}

	for (name, len) in [
		("version", versions.len()),
		("timestamp", timestamps.len()),
		("changeset", changesets.len()),
		("uid", uids.len()),
		("user_sid", user_sids.len()),
	] {
		if len != count {
			return Err(MapError::format(format!("dense info has {len} {name} entries for {count} nodes")).into());
		}
	}

	let mut timestamp_decoder = DeltaDecoder::new();
	let mut changeset_decoder = DeltaDecoder::new();
	let mut uid_decoder = DeltaDecoder::new();
	let mut user_sid_decoder = DeltaDecoder::new();

	let mut result = Vec::with_capacity(count);
	for i in 0..count {
		let version = versions[i] as i32;
		let timestamp = timestamp_decoder.decode(timestamps[i]);
		let changeset = changeset_decoder.decode(changesets[i]);
		let uid = uid_decoder.decode(uids[i]);
		let user_sid = user_sid_decoder.decode(user_sids[i]);
		let user_sid = u32::try_from(user_sid).map_err(|_| MapError::format(format!("invalid user_sid {user_sid}")))?;
		result.push(Metadata::new(
			version,
			params.decode_timestamp(timestamp)?,
			changeset,
			uid as i32,
			strings.get_or_empty(user_sid)?,
		));
	}
	Ok(result)
}
