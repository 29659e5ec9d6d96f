//! Object store contract and bundled backends.
//!
//! The fixity engine never owns object bytes. It only needs to ask a store
//! for an object's size and to open a byte stream over it, keyed by
//! [`ObjectRef`](crate::object::ObjectRef). Two backends ship with the crate:
//!
//! - **FilesystemObjectStore**: objects live at `<root>/<container>/<key>`
//! - **MemoryObjectStore**: DashMap-backed, for tests and embedding
//!
//! # Custom Backends
//!
//! Implement [`ObjectStore`] to verify objects held elsewhere:
//!
//! ```ignore
//! use fixity::store::{ObjectHead, ObjectReader, ObjectStore};
//!
//! struct S3Store { /* ... */ }
//!
//! #[async_trait::async_trait]
//! impl ObjectStore for S3Store { /* head + open */ }
//! ```

mod backend;
mod filesystem;
mod memory;
mod validation;

pub use backend::{ObjectHead, ObjectReader, ObjectStore};
pub use filesystem::FilesystemObjectStore;
pub use memory::MemoryObjectStore;
