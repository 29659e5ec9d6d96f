//! Digest calculation over stored objects.
//!
//! [`DigestCalculator`] streams an object from an [`ObjectStore`] through a
//! [`DigestAlgorithm`] without ever holding the whole object in memory:
//!
//! 1. `head` the object; absent objects fail with `NotFound`, objects above
//!    the size cap fail with `TooLarge`
//! 2. pick a read buffer from the object size ([`buffer_size_for`])
//! 3. feed the stream into the hasher chunk by chunk
//! 4. fail with `SizeMismatch` if the byte count differs from step 1
//!
//! [`ObjectStore`]: crate::store::ObjectStore

mod algorithm;
mod calculator;

pub use algorithm::{DigestAlgorithm, Hasher};
pub use calculator::{
    DEFAULT_MAX_OBJECT_SIZE, DigestCalculator, LARGE_BUFFER, MEDIUM_BUFFER, SMALL_BUFFER,
    buffer_size_for,
};
