//! Streaming digest calculator.

use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::algorithm::DigestAlgorithm;
use crate::error::{Error, Result, StorageResultExt as _};
use crate::object::ObjectRef;
use crate::store::ObjectStore;

const KIB: usize = 1024;
const MIB: u64 = 1024 * 1024;

/// Largest object the calculator will hash (20 GiB).
///
/// Bounds worst-case latency of a single unit of work.
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 20 * 1024 * MIB;

/// Read buffer for objects under 1 MiB.
pub const SMALL_BUFFER: usize = 64 * KIB;
/// Read buffer for objects from 1 MiB up to (excluding) 100 MiB.
pub const MEDIUM_BUFFER: usize = 512 * KIB;
/// Read buffer for objects of 100 MiB and above.
pub const LARGE_BUFFER: usize = 2 * 1024 * KIB;

/// Read buffer size as a step function of object size.
pub const fn buffer_size_for(size: u64) -> usize {
    if size < MIB {
        SMALL_BUFFER
    } else if size < 100 * MIB {
        MEDIUM_BUFFER
    } else {
        LARGE_BUFFER
    }
}

/// Computes content digests by streaming objects from a store.
///
/// All failures are returned as errors and never retried here; re-delivery
/// is the caller's concern.
#[derive(Clone)]
pub struct DigestCalculator {
    store: Arc<dyn ObjectStore>,
    algorithm: DigestAlgorithm,
    max_object_size: u64,
}

impl DigestCalculator {
    /// Creates a calculator using the default algorithm and size cap.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            algorithm: DigestAlgorithm::default(),
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
        }
    }

    #[must_use]
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_max_object_size(mut self, max_object_size: u64) -> Self {
        self.max_object_size = max_object_size;
        self
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Streams `object` through the configured hasher and returns its hex digest.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the object is absent at `head` or `open`
    /// - [`Error::TooLarge`] if the object exceeds the size cap
    /// - [`Error::SizeMismatch`] if the stream length differs from `head`
    /// - [`Error::StorageIo`] for any store or read failure
    pub async fn compute_digest(&self, object: &ObjectRef) -> Result<String> {
        let head = self
            .store
            .head(object)
            .await
            .storage_context(format!("metadata lookup for {object}"))?
            .ok_or_else(|| Error::not_found(object))?;

        if head.size > self.max_object_size {
            return Err(Error::too_large(object, head.size, self.max_object_size));
        }

        tracing::debug!(
            container = object.container(),
            key = object.key(),
            size = head.size,
            algorithm = %self.algorithm,
            "Starting digest calculation"
        );

        let mut reader = self
            .store
            .open(object)
            .await
            .storage_context(format!("opening {object}"))?
            .ok_or_else(|| Error::not_found(object))?;

        let mut buffer = vec![0u8; buffer_size_for(head.size)];
        let mut hasher = self.algorithm.hasher();
        let mut total: u64 = 0;

        loop {
            let read = reader
                .read(&mut buffer)
                .await
                .map_err(|e| Error::storage(format!("reading {object}"), e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            total += read as u64;
        }

        if total != head.size {
            return Err(Error::size_mismatch(object, head.size, total));
        }

        let digest = hasher.finalize_hex();
        tracing::debug!(
            container = object.container(),
            key = object.key(),
            bytes = total,
            checksum = %digest,
            "Calculated digest"
        );

        Ok(digest)
    }
}
