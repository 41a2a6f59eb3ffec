use time::OffsetDateTime;

/// Revision metadata of an entity.
///
/// Timestamps are stored by the PBF codec in units of the block's date granularity (one second by
/// default), so sub-second parts do not survive a round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
	pub version: i32,
	pub timestamp: OffsetDateTime,
	pub changeset: i64,
	pub uid: i32,
	pub user: String,
}

impl Metadata {
	#[must_use]
	pub fn new(version: i32, timestamp: OffsetDateTime, changeset: i64, uid: i32, user: impl Into<String>) -> Metadata {
		Metadata {
			version,
			timestamp,
			changeset,
			uid,
			user: user.into(),
		}
	}

	/// Milliseconds since the Unix epoch.
	#[must_use]
	pub fn timestamp_millis(&self) -> i64 {
		(self.timestamp.unix_timestamp_nanos() / 1_000_000) as i64
	}
}
