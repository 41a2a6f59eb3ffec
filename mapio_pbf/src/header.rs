//! The header block that opens every PBF stream.

use anyhow::{Context, Result};
use byteorder::LE;
use mapio_core::{
	Blob, MapError,
	io::{ValueReader, ValueWriter, ValueWriterBlob},
};

// required features
pub const FEATURE_OSM_SCHEMA: &str = "OsmSchema-V0.6";
pub const FEATURE_DENSE_NODES: &str = "DenseNodes";
pub const FEATURE_HISTORICAL_INFORMATION: &str = "HistoricalInformation";

// optional features
pub const FEATURE_HAS_METADATA: &str = "Has_Metadata";

/// Required features this implementation can read.
pub const SUPPORTED_FEATURES: [&str; 2] = [FEATURE_OSM_SCHEMA, FEATURE_DENSE_NODES];

/// Bounding box of a stream, in nanodegrees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderBBox {
	pub left: i64,
	pub right: i64,
	pub top: i64,
	pub bottom: i64,
}

impl HeaderBBox {
	/// Creates a bounding box from degrees, rounding to the nearest nanodegree.
	#[must_use]
	pub fn from_degrees(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> HeaderBBox {
		let nano = |deg: f64| (deg * 1e9).round() as i64;
		HeaderBBox {
			left: nano(min_lon),
			right: nano(max_lon),
			top: nano(max_lat),
			bottom: nano(min_lat),
		}
	}

	/// Returns `[min_lon, min_lat, max_lon, max_lat]` in degrees.
	#[must_use]
	pub fn as_degrees(&self) -> [f64; 4] {
		let deg = |nano: i64| nano as f64 / 1e9;
		[deg(self.left), deg(self.bottom), deg(self.right), deg(self.top)]
	}

	fn read(reader: &mut dyn ValueReader<'_, LE>) -> Result<HeaderBBox> {
		let mut bbox = HeaderBBox {
			left: 0,
			right: 0,
			top: 0,
			bottom: 0,
		};
		while reader.has_remaining() {
			match reader.read_pbf_key().context("Failed to read PBF key")? {
				(1, 0) => bbox.left = reader.read_svarint().context("Failed to read left")?,
				(2, 0) => bbox.right = reader.read_svarint().context("Failed to read right")?,
				(3, 0) => bbox.top = reader.read_svarint().context("Failed to read top")?,
				(4, 0) => bbox.bottom = reader.read_svarint().context("Failed to read bottom")?,
				(_, w) => reader.skip_pbf_field(w).context("Failed to skip bbox field")?,
			}
		}
		Ok(bbox)
	}

	fn to_blob(self) -> Result<Blob> {
		let mut writer = ValueWriterBlob::new_le();
		for (field, value) in [(1, self.left), (2, self.right), (3, self.top), (4, self.bottom)] {
			writer.write_pbf_key(field, 0)?;
			writer.write_svarint(value)?;
		}
		Ok(writer.into_blob())
	}
}

/// Decoded `HeaderBlock` message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderBlock {
	pub bbox: Option<HeaderBBox>,
	pub required_features: Vec<String>,
	pub optional_features: Vec<String>,
	pub writing_program: Option<String>,
	pub source: Option<String>,
	pub replication_timestamp: Option<i64>,
	pub replication_sequence_number: Option<i64>,
	pub replication_base_url: Option<String>,
}

impl HeaderBlock {
	pub fn read(reader: &mut dyn ValueReader<'_, LE>) -> Result<HeaderBlock> {
		let mut header = HeaderBlock::default();
		while reader.has_remaining() {
			match reader.read_pbf_key().context("Failed to read PBF key")? {
				(1, 2) => {
					header.bbox = Some(
						HeaderBBox::read(
							reader
								.get_pbf_sub_reader()
								.context("Failed to get PBF sub-reader for bbox")?
								.as_mut(),
						)
						.context("Failed to read bbox")?,
					);
				}
				(4, 2) => header
					.required_features
					.push(reader.read_pbf_string().context("Failed to read required feature")?),
				(5, 2) => header
					.optional_features
					.push(reader.read_pbf_string().context("Failed to read optional feature")?),
				(16, 2) => header.writing_program = Some(reader.read_pbf_string().context("Failed to read writing program")?),
				(17, 2) => header.source = Some(reader.read_pbf_string().context("Failed to read source")?),
				(32, 0) => header.replication_timestamp = Some(reader.read_varint()? as i64),
				(33, 0) => header.replication_sequence_number = Some(reader.read_varint()? as i64),
				(34, 2) => header.replication_base_url = Some(reader.read_pbf_string().context("Failed to read base url")?),
				(_, w) => reader.skip_pbf_field(w).context("Failed to skip header field")?,
			}
		}
		Ok(header)
	}

	pub fn to_blob(&self) -> Result<Blob> {
		let mut writer = ValueWriterBlob::new_le();

		if let Some(bbox) = self.bbox {
			writer.write_pbf_key(1, 2).context("Failed to write PBF key for bbox")?;
			writer.write_pbf_blob(&bbox.to_blob()?).context("Failed to write bbox")?;
		}
		for feature in &self.required_features {
			writer.write_pbf_key(4, 2)?;
			writer.write_pbf_string(feature).context("Failed to write required feature")?;
		}
		for feature in &self.optional_features {
			writer.write_pbf_key(5, 2)?;
			writer.write_pbf_string(feature).context("Failed to write optional feature")?;
		}
		if let Some(program) = &self.writing_program {
			writer.write_pbf_key(16, 2)?;
			writer.write_pbf_string(program).context("Failed to write writing program")?;
		}
		if let Some(source) = &self.source {
			writer.write_pbf_key(17, 2)?;
			writer.write_pbf_string(source).context("Failed to write source")?;
		}
		if let Some(timestamp) = self.replication_timestamp {
			writer.write_pbf_key(32, 0)?;
			writer.write_varint(timestamp as u64)?;
		}
		if let Some(sequence_number) = self.replication_sequence_number {
			writer.write_pbf_key(33, 0)?;
			writer.write_varint(sequence_number as u64)?;
		}
		if let Some(url) = &self.replication_base_url {
			writer.write_pbf_key(34, 2)?;
			writer.write_pbf_string(url).context("Failed to write base url")?;
		}

		Ok(writer.into_blob())
	}

	/// Fails if any required feature is outside [`SUPPORTED_FEATURES`].
	///
	/// # Errors
	///
	/// `MapError::UnsupportedFeature` naming the first unsupported feature.
	pub fn check_required_features(&self) -> Result<()> {
		match self
			.required_features
			.iter()
			.find(|feature| !SUPPORTED_FEATURES.contains(&feature.as_str()))
		{
			Some(feature) => Err(MapError::unsupported(format!("required feature '{feature}'")).into()),
			None => Ok(()),
		}
	}
}
