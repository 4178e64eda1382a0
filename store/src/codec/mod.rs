//! Binary encodings: value order-preservation, identity hashing, and the
//! typed key layouts built on top of both.

pub mod identity;
pub mod key;
pub mod value;

pub use identity::{ContentHash, EntityId, IdSource};
pub use value::Value;
