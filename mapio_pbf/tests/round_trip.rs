use anyhow::Result;
use approx::assert_abs_diff_eq;
use mapio_core::{
	compression::Compression,
	model::{Entity, EntityKind, Member, Metadata, Node, Relation, TagsCollection, Way},
};
use mapio_pbf::{PbfReader, PbfReaderOptions, PbfWriter, PbfWriterOptions, header::HeaderBBox};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::io::Cursor;
use time::OffsetDateTime;

fn tags(pairs: &[(&str, &str)]) -> TagsCollection {
	TagsCollection::from_pairs(pairs.iter().copied()).unwrap()
}

fn metadata(version: i32, user: &str) -> Metadata {
	Metadata::new(
		version,
		OffsetDateTime::from_unix_timestamp(1_400_000_000 + i64::from(version) * 3600).unwrap(),
		20_000_000 + i64::from(version),
		1000 + version,
		user,
	)
}

fn sample() -> Vec<Entity> {
	let mut entities: Vec<Entity> = Vec::new();
	for id in 1..=25 {
		let mut node = Node::new(id * 3, 52.5 + id as f64 * 0.0001, 13.4 - id as f64 * 0.0002);
		if id % 4 == 0 {
			node = node.with_tags(tags(&[("amenity", "bench"), ("backrest", if id % 8 == 0 { "yes" } else { "no" })]));
		}
		if id % 3 != 0 {
			node = node.with_metadata(metadata(id as i32, if id % 2 == 0 { "alice" } else { "" }));
		}
		entities.push(node.into());
	}
	entities.push(
		Way::new(100, vec![3, 6, 9, 12, 3])
			.with_tags(tags(&[("building", "yes"), ("name", "Haus Ä")]))
			.with_metadata(metadata(2, "bob"))
			.into(),
	);
	entities.push(Way::new(101, vec![]).into());
	entities.push(
		Relation::new(
			200,
			vec![
				Member::new(EntityKind::Way, 100, "outer"),
				Member::new(EntityKind::Node, 3, ""),
				Member::new(EntityKind::Relation, 201, "subarea"),
				Member::new(EntityKind::Way, -5, "inner"),
			],
		)
		.with_tags(tags(&[("type", "multipolygon")]))
		.with_metadata(metadata(9, "carol"))
		.into(),
	);
	entities
}

fn write(entities: &[Entity], options: PbfWriterOptions) -> Result<Vec<u8>> {
	let mut writer = PbfWriter::new(Vec::new(), options)?;
	for entity in entities {
		writer.write_entity(entity)?;
	}
	writer.close()
}

fn read(data: Vec<u8>, read_metadata: bool) -> Result<Vec<Entity>> {
	PbfReader::new(Cursor::new(data), PbfReaderOptions::default().with_read_metadata(read_metadata))?.collect()
}

fn strip_metadata(entity: &Entity) -> Entity {
	match entity.clone() {
		Entity::Node(n) => Entity::Node(Node { metadata: None, ..n }),
		Entity::Way(w) => Entity::Way(Way { metadata: None, ..w }),
		Entity::Relation(r) => Entity::Relation(Relation { metadata: None, ..r }),
	}
}

fn assert_entities_eq(actual: &[Entity], expected: &[Entity]) {
	assert_eq!(actual.len(), expected.len());
	for (a, e) in actual.iter().zip(expected) {
		match (a, e) {
			(Entity::Node(a), Entity::Node(e)) => {
				assert_eq!(a.id, e.id);
				assert_abs_diff_eq!(a.coordinate.lat, e.coordinate.lat, epsilon = 1e-7);
				assert_abs_diff_eq!(a.coordinate.lon, e.coordinate.lon, epsilon = 1e-7);
				assert_eq!(a.tags, e.tags);
				assert_eq!(a.metadata, e.metadata);
			}
			_ => assert_eq!(a, e),
		}
	}
}

#[rstest]
fn round_trip(
	#[values(true, false)] dense: bool,
	#[values(true, false)] write_metadata: bool,
	#[values(true, false)] read_metadata: bool,
	#[values(Compression::None, Compression::ZlibDeflate)] compression: Compression,
) -> Result<()> {
	let options = PbfWriterOptions::default()
		.with_dense_format(dense)
		.with_write_metadata(write_metadata)
		.with_compression(compression)
		.with_max_entities_per_block(7);
	let decoded = read(write(&sample(), options)?, read_metadata)?;

	let expected: Vec<Entity> = if write_metadata && read_metadata {
		sample()
	} else {
		sample().iter().map(strip_metadata).collect()
	};
	assert_entities_eq(&decoded, &expected);
	Ok(())
}

#[test]
fn dense_and_explicit_encodings_are_equivalent() -> Result<()> {
	let nodes: Vec<Entity> = sample().into_iter().filter(|e| e.kind() == EntityKind::Node).collect();
	let dense = read(write(&nodes, PbfWriterOptions::default())?, true)?;
	let explicit = read(write(&nodes, PbfWriterOptions::default().with_dense_format(false))?, true)?;
	assert_eq!(dense, explicit);
	Ok(())
}

#[test]
fn compression_only_changes_size() -> Result<()> {
	let entities: Vec<Entity> = (0..2000)
		.map(|id| {
			Node::new(id, 48.0 + id as f64 * 1e-5, 11.0)
				.with_tags(tags(&[("shop", "bakery"), ("opening_hours", "Mo-Sa 06:00-18:00")]))
				.into()
		})
		.collect();
	let raw = write(&entities, PbfWriterOptions::default().with_compression(Compression::None))?;
	let zlib = write(&entities, PbfWriterOptions::default().with_compression(Compression::ZlibDeflate))?;
	assert!(zlib.len() < raw.len());
	assert_eq!(read(raw, true)?, read(zlib, true)?);
	Ok(())
}

#[test]
fn three_node_scenario() -> Result<()> {
	let options = PbfWriterOptions::default()
		.with_dense_format(true)
		.with_compression(Compression::None)
		.with_write_metadata(false);
	let mut writer = PbfWriter::new(Vec::new(), options)?;
	writer.write_node(Node::new(1, 20.0, 10.0).with_tags(tags(&[("amenity", "cafe")])))?;
	writer.write_node(Node::new(5, 20.0005, 10.0005))?;
	writer.write_node(Node::new(100, 21.0, 11.0))?;
	let data = writer.close()?;

	let nodes: Vec<Node> = read(data, true)?
		.into_iter()
		.map(|e| e.as_node().cloned().unwrap())
		.collect();
	assert_eq!(nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 5, 100]);
	for (node, (lat, lon)) in nodes.iter().zip([(20.0, 10.0), (20.0005, 10.0005), (21.0, 11.0)]) {
		assert_abs_diff_eq!(node.coordinate.lat, lat, epsilon = 1e-7);
		assert_abs_diff_eq!(node.coordinate.lon, lon, epsilon = 1e-7);
		assert!(node.metadata.is_none());
	}
	assert_eq!(nodes[0].tags, tags(&[("amenity", "cafe")]));
	assert!(nodes[1].tags.is_empty());
	assert!(nodes[2].tags.is_empty());
	Ok(())
}

#[test]
fn blocks_are_split_at_threshold() -> Result<()> {
	let entities: Vec<Entity> = (0..10).map(|id| Node::new(id, 0.0, 0.0).into()).collect();
	let single = write(&entities, PbfWriterOptions::default().with_compression(Compression::None))?;
	let split = write(
		&entities,
		PbfWriterOptions::default()
			.with_compression(Compression::None)
			.with_max_entities_per_block(3),
	)?;
	// four data blocks instead of one, each framed separately
	assert!(split.len() > single.len());
	assert_eq!(read(split, true)?, read(single, true)?);
	Ok(())
}

#[test]
fn kinds_are_ordered_within_a_block_only() -> Result<()> {
	let entities: Vec<Entity> = vec![
		Way::new(1, vec![1]).into(),
		Node::new(1, 0.0, 0.0).into(),
		Relation::new(1, vec![]).into(),
		Node::new(2, 0.0, 0.0).into(),
	];
	let options = PbfWriterOptions::default().with_max_entities_per_block(2);
	let kinds: Vec<(EntityKind, i64)> = read(write(&entities, options)?, true)?
		.iter()
		.map(|e| (e.kind(), e.id()))
		.collect();
	assert_eq!(
		kinds,
		vec![
			(EntityKind::Node, 1),
			(EntityKind::Way, 1),
			(EntityKind::Node, 2),
			(EntityKind::Relation, 1),
		]
	);
	Ok(())
}

#[test]
fn header_carries_bbox_and_program() -> Result<()> {
	let bbox = HeaderBBox::from_degrees(13.0, 52.3, 13.8, 52.7);
	let data = write(
		&[],
		PbfWriterOptions::default()
			.with_bbox(bbox)
			.with_program_name("integration test"),
	)?;
	let reader = PbfReader::new(Cursor::new(data), PbfReaderOptions::default())?;
	assert_eq!(reader.header().bbox, Some(bbox));
	assert_eq!(reader.header().writing_program.as_deref(), Some("integration test"));
	Ok(())
}

#[test]
fn dropping_the_writer_flushes() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let path = dir.path().join("dropped.osm.pbf");
	{
		let mut writer = PbfWriter::create_path(&path, PbfWriterOptions::default())?;
		writer.write_node(Node::new(42, 1.0, 2.0))?;
	}
	let entities: Vec<Entity> = PbfReader::open_path(&path, PbfReaderOptions::default())?.collect::<Result<_>>()?;
	assert_eq!(entities.len(), 1);
	assert_eq!(entities[0].id(), 42);
	Ok(())
}

#[test]
fn file_round_trip() -> Result<()> {
	let file = tempfile::NamedTempFile::new()?;
	let mut writer = PbfWriter::create_path(file.path(), PbfWriterOptions::default())?;
	for entity in sample() {
		writer.write_entity(&entity)?;
	}
	writer.close()?;

	let decoded: Vec<Entity> = PbfReader::open_path(file.path(), PbfReaderOptions::default())?.collect::<Result<_>>()?;
	assert_entities_eq(&decoded, &sample());
	Ok(())
}
