//! Reading and writing map entities in the PBF exchange format.
//!
//! A PBF stream starts with a header block followed by data blocks. Each data block carries its
//! own string table and groups of nodes (dense or explicit), ways and relations.
//!
//! ```
//! use mapio_core::model::{Entity, Node};
//! use mapio_pbf::{PbfReader, PbfReaderOptions, PbfWriter, PbfWriterOptions};
//! use std::io::Cursor;
//!
//! let mut writer = PbfWriter::new(Vec::new(), PbfWriterOptions::default()).unwrap();
//! writer.write_node(Node::new(1, 52.52, 13.405)).unwrap();
//! let data = writer.close().unwrap();
//!
//! let reader = PbfReader::new(Cursor::new(data), PbfReaderOptions::default()).unwrap();
//! let entities: Vec<Entity> = reader.collect::<anyhow::Result<_>>().unwrap();
//! assert_eq!(entities[0].id(), 1);
//! ```

pub mod block;
pub mod delta;
pub mod framing;
pub mod header;
mod options;
mod reader;
pub mod string_table;
mod writer;

pub use options::*;
pub use reader::PbfReader;
pub use writer::PbfWriter;
