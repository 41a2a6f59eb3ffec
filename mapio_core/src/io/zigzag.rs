/// Maps a signed value onto an unsigned one: 0, -1, 1, -2, 2, ... become 0, 1, 2, 3, 4, ...
#[must_use]
pub fn zigzag_encode(value: i64) -> u64 {
	((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[must_use]
pub fn zigzag_decode(value: u64) -> i64 {
	((value >> 1) as i64) ^ -((value & 1) as i64)
}
