use super::{ByteStream, ContentClaim, ContentRepository};
use crate::error::{EdgeflowError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Point-in-time view of repository usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepositoryStats {
    /// Claims the store currently tracks, attached or not.
    pub claims: u64,
    pub entries: u64,
    pub bytes: u64,
    pub max_bytes: u64,
    pub full: bool,
}

/// Claim lifecycle on top of a [`ContentRepository`].
///
/// Claimant counts live here, under one lock, rather than inside the claims.
/// An entry is released exactly when its count drops back to zero after
/// having been positive.
pub struct ContentStore<R: ContentRepository> {
    /// The underlying repository.
    /// Exposed as pub(crate) for testing and internal access only.
    pub(crate) repository: R,
    claimants: Mutex<HashMap<String, usize>>,
}

impl<R: ContentRepository> ContentStore<R> {
    pub fn with_repository(repository: R) -> Self {
        Self {
            repository,
            claimants: Mutex::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Create a new claim with a claimant count of zero. Nothing is written
    /// until the first `write`.
    pub fn create_claim(&self) -> ContentClaim {
        let claim = ContentClaim::new();
        self.claimants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(claim.content_path().to_string(), 0);
        claim
    }

    pub fn increment_claimant_count(&self, claim: &ContentClaim) -> usize {
        let mut claimants = self.claimants.lock().unwrap_or_else(PoisonError::into_inner);
        let count = claimants
            .entry(claim.content_path().to_string())
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Drop one claimant. When the last one goes, the backing entry is
    /// removed from the repository.
    pub fn decrement_claimant_count(&self, claim: &ContentClaim) -> Result<usize> {
        let mut claimants = self.claimants.lock().unwrap_or_else(PoisonError::into_inner);
        let key = claim.content_path();
        let count = match claimants.get_mut(key) {
            Some(count) if *count > 0 => count,
            _ => {
                return Err(EdgeflowError::ClaimNotFound(format!(
                    "{} has no claimants to release",
                    claim
                )))
            }
        };
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            claimants.remove(key);
            // Still under the claimant lock: nobody can re-attach mid-removal.
            self.repository.close(claim)?;
            debug!(key, "Released last claimant");
        }
        Ok(remaining)
    }

    pub fn claimant_count(&self, claim: &ContentClaim) -> usize {
        self.claimants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(claim.content_path())
            .copied()
            .unwrap_or(0)
    }

    pub fn write(&self, claim: &ContentClaim, append: bool) -> Result<Box<dyn ByteStream>> {
        self.repository.write(claim, append)
    }

    pub fn read(&self, claim: &ContentClaim) -> Result<Option<Box<dyn ByteStream>>> {
        self.repository.read(claim)
    }

    pub fn exists(&self, claim: &ContentClaim) -> bool {
        self.repository.exists(claim)
    }

    /// Write a whole buffer through a fresh stream.
    pub fn write_bytes(&self, claim: &ContentClaim, bytes: &[u8], append: bool) -> Result<()> {
        let mut stream = self.repository.write(claim, append)?;
        stream.write_all(bytes)
    }

    pub fn read_bytes(&self, claim: &ContentClaim) -> Result<Option<Vec<u8>>> {
        match self.repository.read(claim)? {
            Some(mut stream) => Ok(Some(stream.read_to_end()?)),
            None => Ok(None),
        }
    }

    /// Remove every stored entry nobody holds a claim on. Returns how many
    /// entries were removed.
    pub fn clear_orphans(&self) -> Result<usize> {
        let claimants = self.claimants.lock().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for key in self.repository.list_keys()? {
            let held = claimants.get(&key).is_some_and(|count| *count > 0);
            if held {
                continue;
            }
            match self.repository.remove_key(&key) {
                Ok(_) => removed += 1,
                Err(e) => warn!(key, error = %e, "Could not remove orphaned content"),
            }
        }
        Ok(removed)
    }

    pub fn stats(&self) -> RepositoryStats {
        let claims = self
            .claimants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64;
        RepositoryStats {
            claims,
            entries: self.repository.repository_entry_count(),
            bytes: self.repository.repository_size(),
            max_bytes: self.repository.max_repository_size(),
            full: self.repository.is_full(),
        }
    }
}
