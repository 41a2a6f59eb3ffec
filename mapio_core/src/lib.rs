//! Shared building blocks for map entity interchange: the entity model, typed error kinds,
//! protobuf wire-level I/O and blob compression.

pub mod compression;
pub mod error;
pub mod io;
pub mod model;
pub mod types;

pub use error::MapError;
pub use types::*;
