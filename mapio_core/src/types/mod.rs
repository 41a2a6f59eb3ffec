//! Contains shared value types.

mod blob;
pub use blob::*;
