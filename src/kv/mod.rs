//! Ordered key-value storage backing the verification ledger.
//!
//! Two backends ship with the crate:
//!
//! - **RedbBackend**: persistent storage with ACID guarantees (default for the CLI and daemon)
//! - **MemoryBackend**: non-persistent storage for tests and embedding
//!
//! Keys are scanned in lexicographic order so callers can page through the
//! whole keyspace with a continuation key.
//!
//! # Custom Backends
//!
//! ```ignore
//! use fixity::kv::KvBackend;
//!
//! struct DynamoBackend { /* ... */ }
//! impl KvBackend for DynamoBackend { /* ... */ }
//! ```

mod backend;
mod memory;
mod redb;

pub use backend::{KvBackend, KvPage};
pub use memory::MemoryBackend;
pub use redb::RedbBackend;
