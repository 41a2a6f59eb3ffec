//! Protobuf wire-level readers and writers.
//!
//! The readers decode from byte slices, the writers encode into in-memory blobs. Both are generic
//! over a [`byteorder::ByteOrder`] used for fixed-width values: protobuf messages use little-endian,
//! blob length prefixes use big-endian.

mod value_reader;
mod value_reader_slice;
mod value_writer;
mod value_writer_blob;
mod zigzag;

pub use value_reader::*;
pub use value_reader_slice::*;
pub use value_writer::*;
pub use value_writer_blob::*;
pub use zigzag::*;
