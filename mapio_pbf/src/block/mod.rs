//! Primitive blocks: grouping entities into blocks on write and expanding blocks back into
//! entities on read.
//!
//! A `PrimitiveBlock` message holds
//!  * field 1: the string table
//!  * field 2: repeated primitive groups (nodes, dense nodes, ways or relations)
//!  * field 17: `granularity` in nanodegrees (default 100)
//!  * field 18: `date_granularity` in milliseconds (default 1000)
//!  * fields 19/20: `lat_offset`/`lon_offset` in nanodegrees (default 0)

mod builder;
mod decoder;
mod info;

pub use builder::*;
pub use decoder::*;

use anyhow::Result;
use mapio_core::MapError;
use time::OffsetDateTime;

pub const DEFAULT_GRANULARITY: i32 = 100;
pub const DEFAULT_DATE_GRANULARITY: i32 = 1000;

/// Scale and offsets that map the integers inside a block to degrees and instants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockParameters {
	pub granularity: i32,
	pub date_granularity: i32,
	pub lat_offset: i64,
	pub lon_offset: i64,
}

impl Default for BlockParameters {
	fn default() -> Self {
		BlockParameters {
			granularity: DEFAULT_GRANULARITY,
			date_granularity: DEFAULT_DATE_GRANULARITY,
			lat_offset: 0,
			lon_offset: 0,
		}
	}
}

impl BlockParameters {
	#[must_use]
	pub fn encode_lat(&self, degrees: f64) -> i64 {
		self.encode_coordinate(degrees, self.lat_offset)
	}

	#[must_use]
	pub fn encode_lon(&self, degrees: f64) -> i64 {
		self.encode_coordinate(degrees, self.lon_offset)
	}

	#[must_use]
	pub fn decode_lat(&self, raw: i64) -> f64 {
		self.decode_coordinate(raw, self.lat_offset)
	}

	#[must_use]
	pub fn decode_lon(&self, raw: i64) -> f64 {
		self.decode_coordinate(raw, self.lon_offset)
	}

	fn encode_coordinate(&self, degrees: f64, offset: i64) -> i64 {
		((degrees * 1e9 - offset as f64) / f64::from(self.granularity)).round() as i64
	}

	fn decode_coordinate(&self, raw: i64, offset: i64) -> f64 {
		// integer nanodegrees first: dividing an exact integer by 1e9 yields the closest double
		offset.wrapping_add(i64::from(self.granularity).wrapping_mul(raw)) as f64 / 1e9
	}

	/// Converts an instant to units of `date_granularity`, rounding towards negative infinity.
	#[must_use]
	pub fn encode_timestamp(&self, timestamp: &OffsetDateTime) -> i64 {
		let millis = (timestamp.unix_timestamp_nanos() / 1_000_000) as i64;
		millis.div_euclid(i64::from(self.date_granularity))
	}

	/// Converts units of `date_granularity` back to an instant.
	///
	/// # Errors
	///
	/// Fails with `MapError::Format` if the result is outside the representable range.
	pub fn decode_timestamp(&self, raw: i64) -> Result<OffsetDateTime> {
		let nanos = i128::from(raw) * i128::from(self.date_granularity) * 1_000_000;
		OffsetDateTime::from_unix_timestamp_nanos(nanos)
			.map_err(|_| MapError::format(format!("timestamp {raw} out of range")).into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;
	use rstest::rstest;

	#[rstest]
	#[case(20.0, 200_000_000)]
	#[case(20.0005, 200_005_000)]
	#[case(-33.868_82, -338_688_200)]
	#[case(0.000_000_04, 0)]
	#[case(0.000_000_05, 1)]
	fn coordinates_with_default_granularity(#[case] degrees: f64, #[case] raw: i64) {
		let params = BlockParameters::default();
		assert_eq!(params.encode_lat(degrees), raw);
		assert_abs_diff_eq!(params.decode_lat(raw), degrees, epsilon = 1e-7);
	}

	#[test]
	fn seven_decimals_round_trip_exactly() {
		let params = BlockParameters::default();
		for degrees in [52.520_008_1, -122.419_415_5, 179.999_999_9, -90.0] {
			assert_eq!(params.decode_lon(params.encode_lon(degrees)), degrees);
		}
	}

	#[test]
	fn coordinates_with_offsets() {
		let params = BlockParameters {
			granularity: 1000,
			lat_offset: 5_000_000_000,
			lon_offset: -1_000_000_000,
			..BlockParameters::default()
		};
		assert_eq!(params.encode_lat(10.0), 5_000_000);
		assert_abs_diff_eq!(params.decode_lat(5_000_000), 10.0, epsilon = 1e-9);
		assert_eq!(params.encode_lon(-1.0), 0);
		assert_abs_diff_eq!(params.decode_lon(0), -1.0, epsilon = 1e-9);
	}

	#[test]
	fn timestamps() -> Result<()> {
		let params = BlockParameters::default();
		let instant = OffsetDateTime::from_unix_timestamp(1_700_000_000)?;
		assert_eq!(params.encode_timestamp(&instant), 1_700_000_000);
		assert_eq!(params.decode_timestamp(1_700_000_000)?, instant);

		let before_epoch = OffsetDateTime::from_unix_timestamp_nanos(-1_500_000_000)?;
		assert_eq!(params.encode_timestamp(&before_epoch), -2);
		Ok(())
	}

	#[test]
	fn timestamp_out_of_range() {
		let err = BlockParameters::default().decode_timestamp(i64::MAX).unwrap_err();
		assert!(MapError::find(&err).unwrap().is_format());
	}
}
