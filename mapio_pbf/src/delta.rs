//! Zigzag and delta transforms for sequences of signed integers.
//!
//! Dense node arrays, way node references and relation member ids are written as the difference
//! to the previous value, zigzag-mapped so that small negative steps stay small on the wire.
//! Each sequence starts from a running value of 0.

pub use mapio_core::io::{zigzag_decode, zigzag_encode};

/// Turns absolute values into deltas against the previously encoded value.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeltaEncoder {
	prev: i64,
}

impl DeltaEncoder {
	#[must_use]
	pub fn new() -> DeltaEncoder {
		DeltaEncoder::default()
	}

	/// Returns `value - prev` and remembers `value`. Wraps on overflow, as does the decoder.
	pub fn encode(&mut self, value: i64) -> i64 {
		let delta = value.wrapping_sub(self.prev);
		self.prev = value;
		delta
	}
}

/// Accumulates deltas back into absolute values.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeltaDecoder {
	prev: i64,
}

impl DeltaDecoder {
	#[must_use]
	pub fn new() -> DeltaDecoder {
		DeltaDecoder::default()
	}

	pub fn decode(&mut self, delta: i64) -> i64 {
		self.prev = self.prev.wrapping_add(delta);
		self.prev
	}
}

#[must_use]
pub fn encode_delta_sequence(values: &[i64]) -> Vec<i64> {
	let mut encoder = DeltaEncoder::new();
	values.iter().map(|v| encoder.encode(*v)).collect()
}

#[must_use]
pub fn decode_delta_sequence(deltas: &[i64]) -> Vec<i64> {
	let mut decoder = DeltaDecoder::new();
	deltas.iter().map(|d| decoder.decode(*d)).collect()
}
