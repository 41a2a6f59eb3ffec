use crate::MapError;
use anyhow::Result;
use std::{
	collections::{BTreeMap, btree_map},
	fmt::Debug,
};

/// Free-form key/value tags of an entity.
///
/// Keys are unique and neither keys nor values may be empty; every constructor and mutator
/// enforces this with [`MapError::Validation`]. Iteration is in key order, equality ignores the
/// order in which tags were added.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TagsCollection {
	tags: BTreeMap<String, String>,
}

impl TagsCollection {
	#[must_use]
	pub fn new() -> TagsCollection {
		TagsCollection { tags: BTreeMap::new() }
	}

	/// Builds a collection from `(key, value)` pairs. Later duplicates overwrite earlier ones.
	///
	/// ```rust
	/// use mapio_core::model::TagsCollection;
	///
	/// let tags = TagsCollection::from_pairs([("amenity", "cafe")]).unwrap();
	/// assert_eq!(tags.get("amenity"), Some("cafe"));
	/// assert!(TagsCollection::from_pairs([("", "cafe")]).is_err());
	/// ```
	pub fn from_pairs<I, K, V>(pairs: I) -> Result<TagsCollection>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let mut tags = TagsCollection::new();
		for (key, value) in pairs {
			tags.insert(key, value)?;
		}
		Ok(tags)
	}

	/// Inserts a tag, returning the previous value of `key` if there was one.
	///
	/// # Errors
	///
	/// Fails with `MapError::Validation` if `key` or `value` is empty.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Option<String>> {
		let key = key.into();
		let value = value.into();
		if key.is_empty() {
			return Err(MapError::validation(format!("tag key must not be empty (value '{value}')")).into());
		}
		if value.is_empty() {
			return Err(MapError::validation(format!("tag value of '{key}' must not be empty")).into());
		}
		Ok(self.tags.insert(key, value))
	}

	pub fn remove(&mut self, key: &str) -> Option<String> {
		self.tags.remove(key)
	}

	#[must_use]
	pub fn get(&self, key: &str) -> Option<&str> {
		self.tags.get(key).map(String::as_str)
	}

	#[must_use]
	pub fn contains_key(&self, key: &str) -> bool {
		self.tags.contains_key(key)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.tags.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.tags.is_empty()
	}

	pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
		self.tags.iter()
	}
}

impl<'a> IntoIterator for &'a TagsCollection {
	type Item = (&'a String, &'a String);
	type IntoIter = btree_map::Iter<'a, String, String>;
	fn into_iter(self) -> Self::IntoIter {
		self.tags.iter()
	}
}

impl IntoIterator for TagsCollection {
	type Item = (String, String);
	type IntoIter = btree_map::IntoIter<String, String>;
	fn into_iter(self) -> Self::IntoIter {
		self.tags.into_iter()
	}
}

impl Debug for TagsCollection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_map().entries(self.tags.iter()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[test]
	fn insert_and_get() -> Result<()> {
		let mut tags = TagsCollection::new();
		assert_eq!(tags.insert("highway", "residential")?, None);
		assert_eq!(tags.insert("highway", "service")?, Some("residential".to_string()));
		assert_eq!(tags.get("highway"), Some("service"));
		assert_eq!(tags.len(), 1);
		assert!(tags.contains_key("highway"));
		assert_eq!(tags.remove("highway"), Some("service".to_string()));
		assert!(tags.is_empty());
		Ok(())
	}

	#[rstest]
	#[case("", "value")]
	#[case("key", "")]
	#[case("", "")]
	fn rejects_empty_strings(#[case] key: &str, #[case] value: &str) {
		let err = TagsCollection::from_pairs([(key, value)]).unwrap_err();
		assert!(matches!(MapError::find(&err), Some(MapError::Validation(_))));
	}

	#[test]
	fn equality_ignores_insertion_order() -> Result<()> {
		let a = TagsCollection::from_pairs([("a", "1"), ("b", "2")])?;
		let b = TagsCollection::from_pairs([("b", "2"), ("a", "1")])?;
		assert_eq!(a, b);
		Ok(())
	}

	#[test]
	fn debug_format() -> Result<()> {
		let tags = TagsCollection::from_pairs([("name", "Cafe"), ("amenity", "cafe")])?;
		assert_eq!(format!("{tags:?}"), r#"{"amenity": "cafe", "name": "Cafe"}"#);
		Ok(())
	}
}
