//! # Content Storage Layer
//!
//! Flow files never carry their bytes around. They carry a [`ContentClaim`],
//! a handle naming an entry in a shared content repository. Many flow files
//! may share one claim; the bytes are reclaimed only when the last of them lets
//! go.
//!
//! ## Layers
//!
//! 1. [`ByteStream`]: read/write/seek over one entry, with a private cursor.
//! 2. [`ContentRepository`]: the raw key to bytes store. This trait handles
//!    the "how" of storage (memory vs disk).
//! 3. [`ContentStore`]: the "what". Claim creation and reference counting on
//!    top of any repository.
//!
//! ## Implementations
//!
//! - [`volatile::VolatileRepository`]: in-memory entries, nothing survives a
//!   restart.
//! - [`fs_repo::FileSystemRepository`]: one file per key in a directory.
//!
//! ## Concurrency
//!
//! One repository instance is shared by every processor thread. The key map is
//! guarded by a single mutex; a stream obtained from `read`/`write` keeps its
//! own cursor and needs no further locking. Writers to the same claim are not
//! coordinated: callers keep one writer per claim at a time.
//!
//! ## Size Accounting
//!
//! `repository_size()` always equals the sum of stored entry sizes:
//! - a truncating write subtracts the old length before accepting bytes,
//! - each accepted byte is added as it is written,
//! - removing a key subtracts its length,
//! - a failed write rolls back whatever it tentatively added.

use crate::error::Result;

pub mod claim;
pub mod content_store;
pub mod fs_repo;
pub mod stream;
pub mod volatile;

pub use claim::ContentClaim;
pub use content_store::{ContentStore, RepositoryStats};
pub use fs_repo::FileSystemRepository;
pub use stream::ByteStream;
pub use volatile::VolatileRepository;

/// Abstract interface for raw content storage.
pub trait ContentRepository: Send + Sync {
    /// Open a write stream bound to the claim's entry.
    ///
    /// With `append = false` any existing bytes are discarded first.
    fn write(&self, claim: &ContentClaim, append: bool) -> Result<Box<dyn ByteStream>>;

    /// Open a read-only view over the bytes currently stored for the claim.
    /// Returns `Ok(None)` if the claim has no entry yet.
    fn read(&self, claim: &ContentClaim) -> Result<Option<Box<dyn ByteStream>>>;

    fn exists(&self, claim: &ContentClaim) -> bool;

    /// Erase the entry stored under `key`. Removing a missing key succeeds.
    fn remove_key(&self, key: &str) -> Result<bool>;

    /// Release the claim's entry.
    fn close(&self, claim: &ContentClaim) -> Result<bool> {
        self.remove_key(claim.content_path())
    }

    /// Keys of every stored entry (for orphan cleanup).
    fn list_keys(&self) -> Result<Vec<String>>;

    /// Sum of all stored entry sizes, in bytes.
    fn repository_size(&self) -> u64;

    fn repository_entry_count(&self) -> u64;

    fn max_repository_size(&self) -> u64 {
        u64::MAX
    }

    fn is_full(&self) -> bool {
        self.repository_size() >= self.max_repository_size()
    }
}

impl<R: ContentRepository + ?Sized> ContentRepository for Box<R> {
    fn write(&self, claim: &ContentClaim, append: bool) -> Result<Box<dyn ByteStream>> {
        (**self).write(claim, append)
    }

    fn read(&self, claim: &ContentClaim) -> Result<Option<Box<dyn ByteStream>>> {
        (**self).read(claim)
    }

    fn exists(&self, claim: &ContentClaim) -> bool {
        (**self).exists(claim)
    }

    fn remove_key(&self, key: &str) -> Result<bool> {
        (**self).remove_key(key)
    }

    fn close(&self, claim: &ContentClaim) -> Result<bool> {
        (**self).close(claim)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        (**self).list_keys()
    }

    fn repository_size(&self) -> u64 {
        (**self).repository_size()
    }

    fn repository_entry_count(&self) -> u64 {
        (**self).repository_entry_count()
    }

    fn max_repository_size(&self) -> u64 {
        (**self).max_repository_size()
    }

    fn is_full(&self) -> bool {
        (**self).is_full()
    }
}
