use super::{
	BlockParameters,
	info::{DenseInfoBuilder, write_info},
};
use crate::{delta::encode_delta_sequence, options::PbfWriterOptions, string_table::StringTableBuilder};
use anyhow::{Context, Result};
use byteorder::LE;
use log::trace;
use mapio_core::{
	Blob, MapError,
	io::{ValueWriter, ValueWriterBlob},
	model::{Entity, Metadata, Node, Relation, TagsCollection, Way},
};

/// Buffers entities and serializes them into `PrimitiveBlock` messages.
///
/// Within one block, nodes are written before ways and ways before relations. Entities of the
/// same kind keep their arrival order.
#[derive(Debug)]
pub struct BlockBuilder {
	nodes: Vec<Node>,
	ways: Vec<Way>,
	relations: Vec<Relation>,
	use_dense_format: bool,
	write_metadata: bool,
	max_entities: usize,
	params: BlockParameters,
}

impl BlockBuilder {
	#[must_use]
	pub fn new(options: &PbfWriterOptions) -> BlockBuilder {
		BlockBuilder {
			nodes: Vec::new(),
			ways: Vec::new(),
			relations: Vec::new(),
			use_dense_format: options.use_dense_format,
			write_metadata: options.write_metadata,
			max_entities: options.max_entities_per_block.max(1),
			params: BlockParameters::default(),
		}
	}

	/// Buffers a copy of `entity`.
	///
	/// # Errors
	///
	/// Fails with `MapError::Validation` for nodes with non-finite coordinates.
	pub fn append(&mut self, entity: &Entity) -> Result<()> {
		match entity {
			Entity::Node(node) => {
				let c = node.coordinate;
				if !c.lat.is_finite() || !c.lon.is_finite() {
					return Err(MapError::validation(format!(
						"node {} has invalid coordinate ({}, {})",
						node.id, c.lat, c.lon
					))
					.into());
				}
				self.nodes.push(node.clone());
			}
			Entity::Way(way) => self.ways.push(way.clone()),
			Entity::Relation(relation) => self.relations.push(relation.clone()),
		}
		Ok(())
	}

	/// Number of buffered entities.
	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.len() + self.ways.len() + self.relations.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Whether the buffer has reached the block size threshold.
	#[must_use]
	pub fn is_full(&self) -> bool {
		self.len() >= self.max_entities
	}

	/// Serializes and clears the buffer. Returns `None` if nothing is buffered.
	pub fn take_block(&mut self) -> Result<Option<Blob>> {
		if self.is_empty() {
			return Ok(None);
		}
		let nodes = std::mem::take(&mut self.nodes);
		let ways = std::mem::take(&mut self.ways);
		let relations = std::mem::take(&mut self.relations);
		trace!(
			"serializing block: {} nodes, {} ways, {} relations",
			nodes.len(),
			ways.len(),
			relations.len()
		);

		// groups first, so that the string table is complete when it is written
		let mut strings = StringTableBuilder::new();
		let mut groups = Vec::new();
		if self.use_dense_format {
			// DenseInfo covers every node of its group: one group per run with or without metadata
			for run in nodes.chunk_by(|a, b| self.has_metadata(a) == self.has_metadata(b)) {
				groups.push(self.dense_group(run, &mut strings).context("Failed to write dense nodes")?);
			}
		} else if !nodes.is_empty() {
			groups.push(self.node_group(&nodes, &mut strings).context("Failed to write nodes")?);
		}
		if !ways.is_empty() {
			groups.push(self.way_group(&ways, &mut strings).context("Failed to write ways")?);
		}
		if !relations.is_empty() {
			groups.push(
				self
					.relation_group(&relations, &mut strings)
					.context("Failed to write relations")?,
			);
		}

		let mut writer = ValueWriterBlob::new_le();
		writer.write_pbf_key(1, 2)?;
		writer
			.write_pbf_blob(&strings.to_blob()?)
			.context("Failed to write string table")?;
		for group in &groups {
			writer.write_pbf_key(2, 2)?;
			writer.write_pbf_blob(group).context("Failed to write primitive group")?;
		}
		Ok(Some(writer.into_blob()))
	}

	fn metadata<'a>(&self, metadata: Option<&'a Metadata>) -> Option<&'a Metadata> {
		if self.write_metadata { metadata } else { None }
	}

	fn has_metadata(&self, node: &Node) -> bool {
		self.metadata(node.metadata.as_ref()).is_some()
	}

	/// Writes one dense group. Either all of `nodes` carry metadata or none do.
	fn dense_group(&self, nodes: &[Node], strings: &mut StringTableBuilder) -> Result<Blob> {
		let mut ids = Vec::with_capacity(nodes.len());
		let mut lats = Vec::with_capacity(nodes.len());
		let mut lons = Vec::with_capacity(nodes.len());
		let mut keys_vals: Vec<u32> = Vec::new();
		let mut info = DenseInfoBuilder::default();
		let has_tags = nodes.iter().any(|n| !n.tags.is_empty());

		for node in nodes {
			ids.push(node.id);
			lats.push(self.params.encode_lat(node.coordinate.lat));
			lons.push(self.params.encode_lon(node.coordinate.lon));
			if has_tags {
				for (key, value) in &node.tags {
					keys_vals.push(strings.add(key));
					keys_vals.push(strings.add(value));
				}
				keys_vals.push(0);
			}
			if let Some(metadata) = self.metadata(node.metadata.as_ref()) {
				info.push(metadata, &self.params, strings);
			}
		}

		let mut dense = ValueWriterBlob::new_le();
		dense.write_pbf_key(1, 2)?;
		dense
			.write_pbf_packed_svarint(&encode_delta_sequence(&ids))
			.context("Failed to write ids")?;
		if !info.is_empty() {
			dense.write_pbf_key(5, 2)?;
			dense.write_pbf_blob(&info.to_blob()?).context("Failed to write dense info")?;
		}
		dense.write_pbf_key(8, 2)?;
		dense
			.write_pbf_packed_svarint(&encode_delta_sequence(&lats))
			.context("Failed to write lats")?;
		dense.write_pbf_key(9, 2)?;
		dense
			.write_pbf_packed_svarint(&encode_delta_sequence(&lons))
			.context("Failed to write lons")?;
		if has_tags {
			dense.write_pbf_key(10, 2)?;
			dense
				.write_pbf_packed_uint32(&keys_vals)
				.context("Failed to write keys_vals")?;
		}

		let mut group = ValueWriterBlob::new_le();
		group.write_pbf_key(2, 2)?;
		group.write_pbf_blob(&dense.into_blob())?;
		Ok(group.into_blob())
	}

	fn node_group(&self, nodes: &[Node], strings: &mut StringTableBuilder) -> Result<Blob> {
		let mut group = ValueWriterBlob::new_le();
		for node in nodes {
			let mut writer = ValueWriterBlob::new_le();
			writer.write_pbf_key(1, 0)?;
			writer.write_svarint(node.id)?;
			write_tags(&mut writer, &node.tags, strings)?;
			self.write_optional_info(&mut writer, node.metadata.as_ref(), strings)?;
			writer.write_pbf_key(8, 0)?;
			writer.write_svarint(self.params.encode_lat(node.coordinate.lat))?;
			writer.write_pbf_key(9, 0)?;
			writer.write_svarint(self.params.encode_lon(node.coordinate.lon))?;

			group.write_pbf_key(1, 2)?;
			group
				.write_pbf_blob(&writer.into_blob())
				.with_context(|| format!("Failed to write node {}", node.id))?;
		}
		Ok(group.into_blob())
	}

	fn way_group(&self, ways: &[Way], strings: &mut StringTableBuilder) -> Result<Blob> {
		let mut group = ValueWriterBlob::new_le();
		for way in ways {
			let mut writer = ValueWriterBlob::new_le();
			writer.write_pbf_key(1, 0)?;
			writer.write_varint(way.id as u64)?;
			write_tags(&mut writer, &way.tags, strings)?;
			self.write_optional_info(&mut writer, way.metadata.as_ref(), strings)?;
			if !way.refs.is_empty() {
				writer.write_pbf_key(8, 2)?;
				writer.write_pbf_packed_svarint(&encode_delta_sequence(&way.refs))?;
			}

			group.write_pbf_key(3, 2)?;
			group
				.write_pbf_blob(&writer.into_blob())
				.with_context(|| format!("Failed to write way {}", way.id))?;
		}
		Ok(group.into_blob())
	}

	fn relation_group(&self, relations: &[Relation], strings: &mut StringTableBuilder) -> Result<Blob> {
		let mut group = ValueWriterBlob::new_le();
		for relation in relations {
			let mut writer = ValueWriterBlob::new_le();
			writer.write_pbf_key(1, 0)?;
			writer.write_varint(relation.id as u64)?;
			write_tags(&mut writer, &relation.tags, strings)?;
			self.write_optional_info(&mut writer, relation.metadata.as_ref(), strings)?;
			if !relation.members.is_empty() {
				let roles: Vec<u32> = relation.members.iter().map(|m| strings.add(&m.role)).collect();
				let ids: Vec<i64> = relation.members.iter().map(|m| m.id).collect();
				let types: Vec<u32> = relation.members.iter().map(|m| m.kind.as_u64() as u32).collect();
				writer.write_pbf_key(8, 2)?;
				writer.write_pbf_packed_uint32(&roles)?;
				writer.write_pbf_key(9, 2)?;
				writer.write_pbf_packed_svarint(&encode_delta_sequence(&ids))?;
				writer.write_pbf_key(10, 2)?;
				writer.write_pbf_packed_uint32(&types)?;
			}

			group.write_pbf_key(4, 2)?;
			group
				.write_pbf_blob(&writer.into_blob())
				.with_context(|| format!("Failed to write relation {}", relation.id))?;
		}
		Ok(group.into_blob())
	}

	fn write_optional_info(
		&self,
		writer: &mut ValueWriterBlob<LE>,
		metadata: Option<&Metadata>,
		strings: &mut StringTableBuilder,
	) -> Result<()> {
		if let Some(metadata) = self.metadata(metadata) {
			writer.write_pbf_key(4, 2)?;
			writer
				.write_pbf_blob(&write_info(metadata, &self.params, strings)?)
				.context("Failed to write info")?;
		}
		Ok(())
	}
}

/// Writes the packed `keys` and `vals` fields, omitting both for untagged entities.
fn write_tags(writer: &mut ValueWriterBlob<LE>, tags: &TagsCollection, strings: &mut StringTableBuilder) -> Result<()> {
	if tags.is_empty() {
		return Ok(());
	}
	let (keys, vals): (Vec<u32>, Vec<u32>) = tags.iter().map(|(k, v)| (strings.add(k), strings.add(v))).unzip();
	writer.write_pbf_key(2, 2)?;
	writer.write_pbf_packed_uint32(&keys).context("Failed to write keys")?;
	writer.write_pbf_key(3, 2)?;
	writer.write_pbf_packed_uint32(&vals).context("Failed to write vals")?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{block::decode_block, delta::decode_delta_sequence};
	use mapio_core::{
		io::{ValueReader, ValueReaderSlice},
		model::{Coordinate, EntityKind, Member},
	};
	use rstest::rstest;
	use time::OffsetDateTime;

	fn builder(dense: bool, max: usize) -> BlockBuilder {
		BlockBuilder::new(
			&PbfWriterOptions::default()
				.with_dense_format(dense)
				.with_max_entities_per_block(max),
		)
	}

	fn cafe() -> Entity {
		Node::new(1, 20.0, 10.0)
			.with_tags(TagsCollection::from_pairs([("amenity", "cafe")]).unwrap())
			.into()
	}

	#[test]
	fn empty_builder_yields_nothing() -> Result<()> {
		let mut b = builder(true, 10);
		assert!(b.is_empty());
		assert_eq!(b.take_block()?, None);
		Ok(())
	}

	#[test]
	fn fills_up_to_threshold() -> Result<()> {
		let mut b = builder(true, 2);
		b.append(&cafe())?;
		assert!(!b.is_full());
		b.append(&Way::new(10, vec![1, 2]).into())?;
		assert!(b.is_full());
		assert_eq!(b.len(), 2);
		assert!(b.take_block()?.is_some());
		assert!(b.is_empty());
		Ok(())
	}

	#[test]
	fn rejects_non_finite_coordinates() {
		let mut b = builder(true, 10);
		let mut node = Node::new(7, 0.0, 0.0);
		node.coordinate = Coordinate::new(f64::NAN, 1.0);
		let err = b.append(&node.into()).unwrap_err();
		assert!(matches!(MapError::find(&err), Some(MapError::Validation(_))));
		assert!(b.is_empty());
	}

	#[test]
	fn block_starts_with_string_table() -> Result<()> {
		let mut b = builder(true, 10);
		b.append(&cafe())?;
		let blob = b.take_block()?.unwrap();
		let mut reader = ValueReaderSlice::new_le(blob.as_slice());
		assert_eq!(reader.read_pbf_key()?, (1, 2));
		let table = reader.read_pbf_blob()?;
		assert_eq!(
			table.as_slice(),
			&[0x0A, 0x00, 0x0A, 0x07, b'a', b'm', b'e', b'n', b'i', b't', b'y', 0x0A, 0x04, b'c', b'a', b'f', b'e']
		);
		assert_eq!(reader.read_pbf_key()?, (2, 2));
		Ok(())
	}

	#[test]
	fn dense_group_layout_without_tags_or_metadata() -> Result<()> {
		let mut b = builder(true, 10);
		b.append(&Node::new(1, 0.0000001, 0.0000002).into())?;
		b.append(&Node::new(3, 0.0, 0.0).into())?;
		let blob = b.take_block()?.unwrap();
		let mut reader = ValueReaderSlice::new_le(blob.as_slice());
		reader.read_pbf_key()?;
		reader.read_pbf_blob()?;
		assert_eq!(reader.read_pbf_key()?, (2, 2));
		let group = reader.read_pbf_blob()?;
		assert_eq!(
			group.as_slice(),
			&[
				0x12, 0x0C, // dense, 12 bytes
				0x0A, 0x02, 0x02, 0x04, // ids 1, +2
				0x42, 0x02, 0x02, 0x01, // lats 1, -1
				0x4A, 0x02, 0x04, 0x03, // lons 2, -2
			]
		);
		Ok(())
	}

	/// Collects every string index an entity references: keys, values, roles and user names.
	fn string_refs(block: &Blob) -> Result<Vec<u32>> {
		let mut refs = Vec::new();
		let mut reader = ValueReaderSlice::new_le(block.as_slice());
		while reader.has_remaining() {
			match reader.read_pbf_key()? {
				(2, 2) => {
					let mut group = reader.get_pbf_sub_reader()?;
					while group.has_remaining() {
						match group.read_pbf_key()? {
							(2, 2) => dense_refs(group.get_pbf_sub_reader()?.as_mut(), &mut refs)?,
							(field @ (1 | 3 | 4), 2) => {
								entity_refs(group.get_pbf_sub_reader()?.as_mut(), field == 4, &mut refs)?;
							}
							(_, w) => group.skip_pbf_field(w)?,
						}
					}
				}
				(_, w) => reader.skip_pbf_field(w)?,
			}
		}
		Ok(refs)
	}

	fn entity_refs(reader: &mut dyn ValueReader<'_, LE>, is_relation: bool, refs: &mut Vec<u32>) -> Result<()> {
		while reader.has_remaining() {
			match reader.read_pbf_key()? {
				(2 | 3, 2) => refs.extend(reader.read_pbf_packed_uint32()?),
				(8, 2) if is_relation => refs.extend(reader.read_pbf_packed_uint32()?),
				(4, 2) => {
					let mut info = reader.get_pbf_sub_reader()?;
					while info.has_remaining() {
						match info.read_pbf_key()? {
							(5, 0) => refs.push(info.read_varint()? as u32),
							(_, w) => info.skip_pbf_field(w)?,
						}
					}
				}
				(_, w) => reader.skip_pbf_field(w)?,
			}
		}
		Ok(())
	}

	fn dense_refs(reader: &mut dyn ValueReader<'_, LE>, refs: &mut Vec<u32>) -> Result<()> {
		while reader.has_remaining() {
			match reader.read_pbf_key()? {
				(10, 2) => {
					// 0 only terminates a node's pairs here
					let mut keys_vals = reader.read_pbf_packed_uint32()?.into_iter();
					while let Some(key) = keys_vals.next() {
						if key != 0 {
							refs.push(key);
							refs.extend(keys_vals.next());
						}
					}
				}
				(5, 2) => {
					let mut info = reader.get_pbf_sub_reader()?;
					while info.has_remaining() {
						match info.read_pbf_key()? {
							(5, 2) => {
								let sids = decode_delta_sequence(&info.read_pbf_packed_svarint()?);
								refs.extend(sids.into_iter().map(|sid| sid as u32));
							}
							(_, w) => info.skip_pbf_field(w)?,
						}
					}
				}
				(_, w) => reader.skip_pbf_field(w)?,
			}
		}
		Ok(())
	}

	#[rstest]
	fn entities_never_reference_index_zero(#[values(true, false)] dense: bool) -> Result<()> {
		let anonymous = Metadata::new(3, OffsetDateTime::from_unix_timestamp(1_600_000_000)?, 9, 0, "");
		let tagged = TagsCollection::from_pairs([("name", "x")])?;
		let entities: Vec<Entity> = vec![
			Node::new(1, 1.0, 1.0)
				.with_tags(tagged.clone())
				.with_metadata(anonymous.clone())
				.into(),
			Way::new(2, vec![1])
				.with_tags(tagged.clone())
				.with_metadata(anonymous.clone())
				.into(),
			Relation::new(3, vec![Member::new(EntityKind::Node, 1, ""), Member::new(EntityKind::Way, 2, "outer")])
				.with_tags(tagged)
				.with_metadata(anonymous.clone())
				.into(),
		];
		let mut b = builder(dense, 10);
		for entity in &entities {
			b.append(entity)?;
		}
		let blob = b.take_block()?.unwrap();

		let refs = string_refs(&blob)?;
		// per entity: one key, one value, one user; plus two roles
		assert_eq!(refs.len(), 11);
		assert!(!refs.contains(&0), "{refs:?}");

		let decoded = decode_block(&blob, true)?;
		assert_eq!(decoded[0].metadata(), Some(&anonymous));
		assert_eq!(decoded[2].as_relation().unwrap().members[0].role, "");
		Ok(())
	}
}
