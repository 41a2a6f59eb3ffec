//! Nodes, ways and relations, and the [`Entity`] variant that unifies them.
//!
//! Ways and relations reference other entities by id only. Resolving a reference to the entity
//! itself is left to the caller.

use super::{Metadata, TagsCollection};
use crate::MapError;
use anyhow::Result;
use std::fmt::Display;

/// A position in degrees (WGS84).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Coordinate {
	pub lat: f64,
	pub lon: f64,
}

impl Coordinate {
	#[must_use]
	pub fn new(lat: f64, lon: f64) -> Coordinate {
		Coordinate { lat, lon }
	}
}

/// The kind of an entity, also used for relation member references.
///
/// Discriminants match the member type values of the PBF format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
	Node = 0,
	Way = 1,
	Relation = 2,
}

impl EntityKind {
	#[must_use]
	pub fn as_u64(&self) -> u64 {
		*self as u64
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		match self {
			EntityKind::Node => "node",
			EntityKind::Way => "way",
			EntityKind::Relation => "relation",
		}
	}
}

impl TryFrom<u64> for EntityKind {
	type Error = anyhow::Error;

	fn try_from(value: u64) -> Result<Self> {
		Ok(match value {
			0 => EntityKind::Node,
			1 => EntityKind::Way,
			2 => EntityKind::Relation,
			v => return Err(MapError::format(format!("unknown member type {v}")).into()),
		})
	}
}

impl Display for EntityKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
	pub id: i64,
	pub coordinate: Coordinate,
	pub tags: TagsCollection,
	pub metadata: Option<Metadata>,
}

impl Node {
	#[must_use]
	pub fn new(id: i64, lat: f64, lon: f64) -> Node {
		Node {
			id,
			coordinate: Coordinate::new(lat, lon),
			tags: TagsCollection::new(),
			metadata: None,
		}
	}

	#[must_use]
	pub fn with_tags(mut self, tags: TagsCollection) -> Node {
		self.tags = tags;
		self
	}

	#[must_use]
	pub fn with_metadata(mut self, metadata: Metadata) -> Node {
		self.metadata = Some(metadata);
		self
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Way {
	pub id: i64,
	/// Ids of the nodes along the way, in order.
	pub refs: Vec<i64>,
	pub tags: TagsCollection,
	pub metadata: Option<Metadata>,
}

impl Way {
	#[must_use]
	pub fn new(id: i64, refs: Vec<i64>) -> Way {
		Way {
			id,
			refs,
			tags: TagsCollection::new(),
			metadata: None,
		}
	}

	#[must_use]
	pub fn with_tags(mut self, tags: TagsCollection) -> Way {
		self.tags = tags;
		self
	}

	#[must_use]
	pub fn with_metadata(mut self, metadata: Metadata) -> Way {
		self.metadata = Some(metadata);
		self
	}
}

/// A reference from a relation to another entity, qualified by a role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
	pub kind: EntityKind,
	pub id: i64,
	pub role: String,
}

impl Member {
	#[must_use]
	pub fn new(kind: EntityKind, id: i64, role: impl Into<String>) -> Member {
		Member {
			kind,
			id,
			role: role.into(),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Relation {
	pub id: i64,
	pub members: Vec<Member>,
	pub tags: TagsCollection,
	pub metadata: Option<Metadata>,
}

impl Relation {
	#[must_use]
	pub fn new(id: i64, members: Vec<Member>) -> Relation {
		Relation {
			id,
			members,
			tags: TagsCollection::new(),
			metadata: None,
		}
	}

	#[must_use]
	pub fn with_tags(mut self, tags: TagsCollection) -> Relation {
		self.tags = tags;
		self
	}

	#[must_use]
	pub fn with_metadata(mut self, metadata: Metadata) -> Relation {
		self.metadata = Some(metadata);
		self
	}
}

/// Any map entity.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
	Node(Node),
	Way(Way),
	Relation(Relation),
}

impl Entity {
	#[must_use]
	pub fn kind(&self) -> EntityKind {
		match self {
			Entity::Node(_) => EntityKind::Node,
			Entity::Way(_) => EntityKind::Way,
			Entity::Relation(_) => EntityKind::Relation,
		}
	}

	#[must_use]
	pub fn id(&self) -> i64 {
		match self {
			Entity::Node(n) => n.id,
			Entity::Way(w) => w.id,
			Entity::Relation(r) => r.id,
		}
	}

	#[must_use]
	pub fn tags(&self) -> &TagsCollection {
		match self {
			Entity::Node(n) => &n.tags,
			Entity::Way(w) => &w.tags,
			Entity::Relation(r) => &r.tags,
		}
	}

	#[must_use]
	pub fn metadata(&self) -> Option<&Metadata> {
		match self {
			Entity::Node(n) => n.metadata.as_ref(),
			Entity::Way(w) => w.metadata.as_ref(),
			Entity::Relation(r) => r.metadata.as_ref(),
		}
	}

	#[must_use]
	pub fn as_node(&self) -> Option<&Node> {
		match self {
			Entity::Node(n) => Some(n),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_way(&self) -> Option<&Way> {
		match self {
			Entity::Way(w) => Some(w),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_relation(&self) -> Option<&Relation> {
		match self {
			Entity::Relation(r) => Some(r),
			_ => None,
		}
	}
}

impl From<Node> for Entity {
	fn from(node: Node) -> Self {
		Entity::Node(node)
	}
}

impl From<Way> for Entity {
	fn from(way: Way) -> Self {
		Entity::Way(way)
	}
}

impl From<Relation> for Entity {
	fn from(relation: Relation) -> Self {
		Entity::Relation(relation)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use time::OffsetDateTime;

	#[test]
	fn entity_kind_wire_values() {
		assert_eq!(EntityKind::Node.as_u64(), 0);
		assert_eq!(EntityKind::Way.as_u64(), 1);
		assert_eq!(EntityKind::Relation.as_u64(), 2);
		assert_eq!(EntityKind::try_from(2).unwrap(), EntityKind::Relation);
		let err = EntityKind::try_from(3).unwrap_err();
		assert!(MapError::find(&err).unwrap().is_format());
	}

	#[test]
	fn shared_accessors() -> Result<()> {
		let tags = TagsCollection::from_pairs([("type", "route")])?;
		let meta = Metadata::new(2, OffsetDateTime::from_unix_timestamp(0)?, 9, 1, "me");
		let relation: Entity = Relation::new(7, vec![Member::new(EntityKind::Way, 3, "outer")])
			.with_tags(tags.clone())
			.with_metadata(meta.clone())
			.into();

		assert_eq!(relation.kind(), EntityKind::Relation);
		assert_eq!(relation.id(), 7);
		assert_eq!(relation.tags(), &tags);
		assert_eq!(relation.metadata(), Some(&meta));
		assert!(relation.as_node().is_none());
		assert_eq!(relation.as_relation().unwrap().members[0].role, "outer");
		Ok(())
	}

	#[test]
	fn node_and_way_builders() {
		let node: Entity = Node::new(1, 52.5, 13.4).into();
		assert_eq!(node.as_node().unwrap().coordinate, Coordinate::new(52.5, 13.4));
		assert!(node.metadata().is_none());

		let way: Entity = Way::new(2, vec![1, 2, 3]).into();
		assert_eq!(way.kind().to_string(), "way");
		assert_eq!(way.as_way().unwrap().refs, vec![1, 2, 3]);
	}
}
