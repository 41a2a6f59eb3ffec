use std::fmt;

/// Owned bytes: a serialized message, a block payload or a framed blob.
///
/// ```rust
/// use mapio_core::Blob;
///
/// let blob = Blob::from(vec![0x08, 0x96, 0x01]);
/// assert_eq!(blob.len(), 3);
/// assert_eq!(format!("{blob:?}"), "Blob(3): 08 96 01");
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
	#[must_use]
	pub fn new_empty() -> Blob {
		Blob::default()
	}

	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}

	/// Length in bytes, as `u64` to line up with varint lengths.
	#[must_use]
	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<u8>> for Blob {
	fn from(bytes: Vec<u8>) -> Self {
		Blob(bytes)
	}
}

impl From<&[u8]> for Blob {
	fn from(bytes: &[u8]) -> Self {
		Blob(bytes.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(bytes: &[u8; N]) -> Self {
		Blob(bytes.to_vec())
	}
}

impl From<&str> for Blob {
	fn from(text: &str) -> Self {
		Blob(text.as_bytes().to_vec())
	}
}

impl fmt::Debug for Blob {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Blob({}):", self.0.len())?;
		for byte in &self.0 {
			write!(f, " {byte:02x}")?;
		}
		Ok(())
	}
}
