//! Blob payload compression.
//!
//! [`Compression`] selects how a writer stores block payloads. Readers never need it: the framing
//! tells them which representation is present.

use crate::{Blob, MapError};
use anyhow::{Context, Result};
use flate2::bufread::{ZlibDecoder, ZlibEncoder};
use std::{fmt::Display, io::Read};

/// Compression applied to each blob payload on write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
	/// Payloads are stored verbatim in the `raw` field.
	None,
	/// Payloads are deflated into the `zlib_data` field.
	#[default]
	ZlibDeflate,
}

impl Compression {
	#[must_use]
	pub fn as_str(&self) -> &str {
		match self {
			Compression::None => "none",
			Compression::ZlibDeflate => "zlib",
		}
	}
}

impl Display for Compression {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Deflates `blob` into a zlib stream using the default compression level.
///
/// # Errors
///
/// Fails with `MapError::Codec` if the encoder fails.
pub fn compress_zlib(blob: &Blob) -> Result<Blob> {
	let mut encoder = ZlibEncoder::new(blob.as_slice(), flate2::Compression::default());
	let mut compressed_data = Vec::new();
	encoder
		.read_to_end(&mut compressed_data)
		.map_err(|e| MapError::codec(format!("zlib compression failed: {e}")))
		.with_context(|| format!("Compressing blob ({} bytes) using zlib", blob.len()))?;
	Ok(Blob::from(compressed_data))
}

/// Inflates a zlib stream that must expand to exactly `expected_size` bytes.
///
/// At most `expected_size + 1` bytes are inflated, so a corrupt size declaration cannot make the
/// decoder run away.
///
/// # Errors
///
/// Fails with `MapError::Codec` if the stream is corrupt or its length differs from `expected_size`.
pub fn decompress_zlib(blob: &Blob, expected_size: u64) -> Result<Blob> {
	let mut decoder = ZlibDecoder::new(blob.as_slice()).take(expected_size.saturating_add(1));
	let mut decompressed_data = Vec::with_capacity(usize::try_from(expected_size).unwrap_or(0));
	decoder
		.read_to_end(&mut decompressed_data)
		.map_err(|e| MapError::codec(format!("zlib decompression failed: {e}")))
		.with_context(|| format!("Decompressing blob ({} bytes) using zlib", blob.len()))?;

	if decompressed_data.len() as u64 != expected_size {
		return Err(MapError::codec(format!(
			"decompressed size {} differs from declared size {expected_size}",
			decompressed_data.len()
		))
		.into());
	}
	Ok(Blob::from(decompressed_data))
}
