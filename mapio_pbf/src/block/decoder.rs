use super::{
	BlockParameters,
	info::{read_dense_info, read_info},
};
use crate::{delta::decode_delta_sequence, string_table::StringTable};
use anyhow::{Context, Result};
use byteorder::LE;
use log::trace;
use mapio_core::{
	Blob, MapError,
	io::{ValueReader, ValueReaderSlice},
	model::{Coordinate, Entity, EntityKind, Member, Metadata, Node, Relation, TagsCollection, Way},
};

/// Decodes a serialized `PrimitiveBlock` into its entities, in encoded order.
///
/// Metadata is parsed only if `read_metadata` is set; otherwise `Info` and `DenseInfo` messages
/// are skipped and every entity comes back without metadata. The whole block is decoded before
/// anything is returned, so a malformed block never yields partial results.
pub fn decode_block(blob: &Blob, read_metadata: bool) -> Result<Vec<Entity>> {
	let mut reader = ValueReaderSlice::new_le(blob.as_slice());

	// granularity and offsets may follow the groups, so groups are decoded in a second pass
	let mut strings = StringTable::default();
	let mut groups: Vec<Blob> = Vec::new();
	let mut params = BlockParameters::default();
	while reader.has_remaining() {
		match reader.read_pbf_key().context("Failed to read PBF key")? {
			(1, 2) => {
				strings = StringTable::read(
					reader
						.get_pbf_sub_reader()
						.context("Failed to get PBF sub-reader for string table")?
						.as_mut(),
				)
				.context("Failed to read string table")?;
			}
			(2, 2) => groups.push(reader.read_pbf_blob().context("Failed to read primitive group")?),
			(17, 0) => params.granularity = read_i32(&mut reader, "granularity")?,
			(18, 0) => params.date_granularity = read_i32(&mut reader, "date_granularity")?,
			(19, 0) => params.lat_offset = reader.read_varint().context("Failed to read lat_offset")? as i64,
			(20, 0) => params.lon_offset = reader.read_varint().context("Failed to read lon_offset")? as i64,
			(_, w) => reader.skip_pbf_field(w).context("Failed to skip unknown field")?,
		}
	}
	if params.granularity <= 0 || params.date_granularity <= 0 {
		return Err(MapError::format(format!("invalid block parameters {params:?}")).into());
	}

	let decoder = GroupDecoder {
		strings: &strings,
		params,
		read_metadata,
	};
	let mut entities = Vec::new();
	for (index, group) in groups.iter().enumerate() {
		decoder
			.decode_group(group, &mut entities)
			.with_context(|| format!("Failed to decode primitive group {index}"))?;
	}
	trace!(
		"decoded block: {} groups, {} strings, {} entities",
		groups.len(),
		strings.len(),
		entities.len()
	);
	Ok(entities)
}

fn read_i32(reader: &mut dyn ValueReader<'_, LE>, name: &str) -> Result<i32> {
	let value = reader.read_varint().with_context(|| format!("Failed to read {name}"))? as i64;
	i32::try_from(value).map_err(|_| MapError::format(format!("{name} {value} out of range")).into())
}

struct GroupDecoder<'a> {
	strings: &'a StringTable,
	params: BlockParameters,
	read_metadata: bool,
}

impl GroupDecoder<'_> {
	fn decode_group(&self, group: &Blob, entities: &mut Vec<Entity>) -> Result<()> {
		let mut reader = ValueReaderSlice::new_le(group.as_slice());
		while reader.has_remaining() {
			match reader.read_pbf_key().context("Failed to read PBF key")? {
				(1, 2) => {
					let node = self
						.read_node(reader.get_pbf_sub_reader()?.as_mut())
						.context("Failed to read node")?;
					entities.push(node.into());
				}
				(2, 2) => {
					let nodes = self
						.read_dense(reader.get_pbf_sub_reader()?.as_mut())
						.context("Failed to read dense nodes")?;
					entities.extend(nodes.into_iter().map(Entity::from));
				}
				(3, 2) => {
					let way = self
						.read_way(reader.get_pbf_sub_reader()?.as_mut())
						.context("Failed to read way")?;
					entities.push(way.into());
				}
				(4, 2) => {
					let relation = self
						.read_relation(reader.get_pbf_sub_reader()?.as_mut())
						.context("Failed to read relation")?;
					entities.push(relation.into());
				}
				// changesets (5) and anything unknown
				(_, w) => reader.skip_pbf_field(w).context("Failed to skip group field")?,
			}
		}
		Ok(())
	}

	fn read_optional_info(&self, reader: &mut dyn ValueReader<'_, LE>) -> Result<Option<Metadata>> {
		if self.read_metadata {
			let mut sub = reader.get_pbf_sub_reader()?;
			Ok(Some(read_info(sub.as_mut(), &self.params, self.strings).context("Failed to read info")?))
		} else {
			reader.skip_pbf_field(2)?;
			Ok(None)
		}
	}

	fn tags(&self, keys: &[u32], vals: &[u32]) -> Result<TagsCollection> {
		if keys.len() != vals.len() {
			return Err(MapError::format(format!("{} keys but {} values", keys.len(), vals.len())).into());
		}
		let mut tags = TagsCollection::new();
		for (key, value) in keys.iter().zip(vals) {
			self.insert_tag(&mut tags, *key, *value)?;
		}
		Ok(tags)
	}

	fn insert_tag(&self, tags: &mut TagsCollection, key: u32, value: u32) -> Result<()> {
		let key = self.strings.get(key).context("Failed to resolve tag key")?;
		let value = self.strings.get(value).context("Failed to resolve tag value")?;
		if key.is_empty() || value.is_empty() {
			return Err(MapError::format(format!("empty tag string ('{key}' = '{value}')")).into());
		}
		tags.insert(key, value)?;
		Ok(())
	}

	fn read_node(&self, reader: &mut dyn ValueReader<'_, LE>) -> Result<Node> {
		let mut id = 0i64;
		let mut keys = Vec::new();
		let mut vals = Vec::new();
		let mut metadata = None;
		let mut lat = 0i64;
		let mut lon = 0i64;
		while reader.has_remaining() {
			match reader.read_pbf_key().context("Failed to read PBF key")? {
				(1, 0) => id = reader.read_svarint().context("Failed to read node id")?,
				(2, 2) => keys = reader.read_pbf_packed_uint32().context("Failed to read keys")?,
				(3, 2) => vals = reader.read_pbf_packed_uint32().context("Failed to read vals")?,
				(4, 2) => metadata = self.read_optional_info(reader)?,
				(8, 0) => lat = reader.read_svarint().context("Failed to read lat")?,
				(9, 0) => lon = reader.read_svarint().context("Failed to read lon")?,
				(_, w) => reader.skip_pbf_field(w).context("Failed to skip node field")?,
			}
		}
		Ok(Node {
			id,
			coordinate: Coordinate::new(self.params.decode_lat(lat), self.params.decode_lon(lon)),
			tags: self.tags(&keys, &vals).with_context(|| format!("Failed to read tags of node {id}"))?,
			metadata,
		})
	}

	fn read_dense(&self, reader: &mut dyn ValueReader<'_, LE>) -> Result<Vec<Node>> {
		let mut ids = Vec::new();
		let mut lats = Vec::new();
		let mut lons = Vec::new();
		let mut keys_vals = Vec::new();
		let mut dense_info: Option<Blob> = None;
		while reader.has_remaining() {
			match reader.read_pbf_key().context("Failed to read PBF key")? {
				(1, 2) => ids = decode_delta_sequence(&reader.read_pbf_packed_svarint().context("Failed to read ids")?),
				(5, 2) if self.read_metadata => {
					dense_info = Some(reader.read_pbf_blob().context("Failed to read dense info")?);
				}
				(8, 2) => lats = decode_delta_sequence(&reader.read_pbf_packed_svarint().context("Failed to read lats")?),
				(9, 2) => lons = decode_delta_sequence(&reader.read_pbf_packed_svarint().context("Failed to read lons")?),
				(10, 2) => keys_vals = reader.read_pbf_packed_uint32().context("Failed to read keys_vals")?,
				(_, w) => reader.skip_pbf_field(w).context("Failed to skip dense field")?,
			}
		}

		let count = ids.len();
		if lats.len() != count || lons.len() != count {
			return Err(MapError::format(format!(
				"dense nodes have {count} ids, {} lats and {} lons",
				lats.len(),
				lons.len()
			))
			.into());
		}

		let metadata: Vec<Option<Metadata>> = match dense_info {
			Some(blob) => read_dense_info(
				&mut ValueReaderSlice::new_le(blob.as_slice()),
				count,
				&self.params,
				self.strings,
			)?
			.into_iter()
			.map(Some)
			.collect(),
			None => vec![None; count],
		};

		// an absent keys_vals array means that no node has tags
		let has_tags = !keys_vals.is_empty();
		let mut keys_vals = keys_vals.into_iter();
		let mut nodes = Vec::with_capacity(count);
		for (i, metadata) in metadata.into_iter().enumerate() {
			let id = ids[i];
			let tags = if has_tags {
				self
					.read_dense_tags(&mut keys_vals)
					.with_context(|| format!("Failed to read tags of node {id}"))?
			} else {
				TagsCollection::new()
			};
			nodes.push(Node {
				id,
				coordinate: Coordinate::new(self.params.decode_lat(lats[i]), self.params.decode_lon(lons[i])),
				tags,
				metadata,
			});
		}
		if keys_vals.next().is_some() {
			return Err(MapError::format("keys_vals has entries beyond the last node").into());
		}
		Ok(nodes)
	}

	/// Consumes one node's key/value indices up to and including its `0` terminator.
	fn read_dense_tags(&self, keys_vals: &mut impl Iterator<Item = u32>) -> Result<TagsCollection> {
		let mut tags = TagsCollection::new();
		loop {
			let key = match keys_vals.next() {
				Some(0) => return Ok(tags),
				Some(key) => key,
				None => return Err(MapError::format("keys_vals ends without terminating 0").into()),
			};
			let value = keys_vals
				.next()
				.ok_or_else(|| MapError::format(format!("keys_vals key {key} has no value")))?;
			self.insert_tag(&mut tags, key, value)?;
		}
	}

	fn read_way(&self, reader: &mut dyn ValueReader<'_, LE>) -> Result<Way> {
		let mut id = 0i64;
		let mut keys = Vec::new();
		let mut vals = Vec::new();
		let mut metadata = None;
		let mut refs = Vec::new();
		while reader.has_remaining() {
			match reader.read_pbf_key().context("Failed to read PBF key")? {
				(1, 0) => id = reader.read_varint().context("Failed to read way id")? as i64,
				(2, 2) => keys = reader.read_pbf_packed_uint32().context("Failed to read keys")?,
				(3, 2) => vals = reader.read_pbf_packed_uint32().context("Failed to read vals")?,
				(4, 2) => metadata = self.read_optional_info(reader)?,
				(8, 2) => refs = decode_delta_sequence(&reader.read_pbf_packed_svarint().context("Failed to read refs")?),
				(_, w) => reader.skip_pbf_field(w).context("Failed to skip way field")?,
			}
		}
		Ok(Way {
			id,
			refs,
			tags: self.tags(&keys, &vals).with_context(|| format!("Failed to read tags of way {id}"))?,
			metadata,
		})
	}

	fn read_relation(&self, reader: &mut dyn ValueReader<'_, LE>) -> Result<Relation> {
		let mut id = 0i64;
		let mut keys = Vec::new();
		let mut vals = Vec::new();
		let mut metadata = None;
		let mut roles = Vec::new();
		let mut memids = Vec::new();
		let mut types = Vec::new();
		while reader.has_remaining() {
			match reader.read_pbf_key().context("Failed to read PBF key")? {
				(1, 0) => id = reader.read_varint().context("Failed to read relation id")? as i64,
				(2, 2) => keys = reader.read_pbf_packed_uint32().context("Failed to read keys")?,
				(3, 2) => vals = reader.read_pbf_packed_uint32().context("Failed to read vals")?,
				(4, 2) => metadata = self.read_optional_info(reader)?,
				(8, 2) => roles = reader.read_pbf_packed_uint32().context("Failed to read roles")?,
				(9, 2) => memids = decode_delta_sequence(&reader.read_pbf_packed_svarint().context("Failed to read memids")?),
				(10, 2) => types = reader.read_pbf_packed_varint().context("Failed to read member types")?,
				(_, w) => reader.skip_pbf_field(w).context("Failed to skip relation field")?,
			}
		}

		if roles.len() != memids.len() || types.len() != memids.len() {
			return Err(MapError::format(format!(
				"relation {id} has {} roles, {} member ids and {} member types",
				roles.len(),
				memids.len(),
				types.len()
			))
			.into());
		}
		let members = roles
			.iter()
			.zip(memids)
			.zip(types)
			.map(|((role, member_id), kind)| {
				Ok(Member::new(
					EntityKind::try_from(kind)?,
					member_id,
					self.strings.get_or_empty(*role).context("Failed to resolve role")?,
				))
			})
			.collect::<Result<Vec<_>>>()
			.with_context(|| format!("Failed to read members of relation {id}"))?;

		Ok(Relation {
			id,
			members,
			tags: self.tags(&keys, &vals).with_context(|| format!("Failed to read tags of relation {id}"))?,
			metadata,
		})
	}
}
