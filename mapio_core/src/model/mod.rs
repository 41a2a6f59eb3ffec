//! The entity model shared by every codec: nodes, ways and relations with tags and optional
//! revision metadata. Nothing in here performs I/O.

mod entity;
mod metadata;
mod tags;

pub use entity::*;
pub use metadata::*;
pub use tags::*;
