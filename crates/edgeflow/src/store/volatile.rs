use super::stream::{read_only_error, ByteStream};
use super::{ContentClaim, ContentRepository};
use crate::error::{EdgeflowError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::info;

#[derive(Default)]
struct EntryData {
    bytes: Vec<u8>,
    /// Cleared when the entry is removed or replaced by a truncating write.
    /// Writers holding a stale entry must not touch the size counter.
    live: bool,
}

type EntryRef = Arc<RwLock<EntryData>>;

fn new_entry() -> EntryRef {
    Arc::new(RwLock::new(EntryData {
        bytes: Vec::new(),
        live: true,
    }))
}

/// In-memory content repository.
///
/// Entries live in a key map behind one mutex. Each entry is its own
/// `RwLock`ed buffer so open streams never need the map lock again.
pub struct VolatileRepository {
    entries: Mutex<HashMap<String, EntryRef>>,
    total_size: Arc<AtomicU64>,
    simulate_write_error: AtomicBool,
}

impl Default for VolatileRepository {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            total_size: Arc::new(AtomicU64::new(0)),
            simulate_write_error: AtomicBool::new(false),
        }
    }
}

impl VolatileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }

    fn retire(&self, entry: &EntryRef) {
        let mut data = entry.write().unwrap_or_else(PoisonError::into_inner);
        if data.live {
            data.live = false;
            self.total_size
                .fetch_sub(data.bytes.len() as u64, Ordering::SeqCst);
        }
    }
}

impl ContentRepository for VolatileRepository {
    fn write(&self, claim: &ContentClaim, append: bool) -> Result<Box<dyn ByteStream>> {
        if self.simulate_write_error.load(Ordering::SeqCst) {
            return Err(EdgeflowError::Storage("Simulated write error".to_string()));
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = claim.content_path().to_string();
        let entry = if append {
            Arc::clone(entries.entry(key).or_insert_with(new_entry))
        } else {
            // Open readers keep the old buffer; the new one starts empty.
            let fresh = new_entry();
            if let Some(old) = entries.insert(key, Arc::clone(&fresh)) {
                self.retire(&old);
            }
            fresh
        };

        Ok(Box::new(VolatileStream {
            entry,
            total_size: Arc::clone(&self.total_size),
            cursor: 0,
            limit: None,
        }))
    }

    fn read(&self, claim: &ContentClaim) -> Result<Option<Box<dyn ByteStream>>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = entries.get(claim.content_path()) else {
            return Ok(None);
        };
        let visible = entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .bytes
            .len() as u64;
        Ok(Some(Box::new(VolatileStream {
            entry: Arc::clone(entry),
            total_size: Arc::clone(&self.total_size),
            cursor: 0,
            limit: Some(visible),
        })))
    }

    fn exists(&self, claim: &ContentClaim) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(claim.content_path())
    }

    fn remove_key(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.remove(key) {
            self.retire(&entry);
            info!(key, "Deleting resource");
        }
        Ok(true)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }

    fn repository_size(&self) -> u64 {
        self.total_size.load(Ordering::SeqCst)
    }

    fn repository_entry_count(&self) -> u64 {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }
}

/// Stream over one in-memory entry.
///
/// Read streams are bounded by the entry length at open time (`limit`), so a
/// later append by a separate writer is never observed.
struct VolatileStream {
    entry: EntryRef,
    total_size: Arc<AtomicU64>,
    cursor: u64,
    limit: Option<u64>,
}

impl ByteStream for VolatileStream {
    fn size(&self) -> u64 {
        match self.limit {
            Some(limit) => limit,
            None => self
                .entry
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .bytes
                .len() as u64,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let end = self.size();
        let data = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        let end = end.min(data.bytes.len() as u64);
        if self.cursor >= end {
            return Ok(0);
        }
        let available = (end - self.cursor) as usize;
        let n = available.min(buf.len());
        let start = self.cursor as usize;
        buf[..n].copy_from_slice(&data.bytes[start..start + n]);
        self.cursor += n as u64;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.limit.is_some() {
            return Err(read_only_error());
        }
        let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        if !entry.live {
            return Err(EdgeflowError::Storage(
                "content entry was removed or truncated by another writer".to_string(),
            ));
        }
        entry.bytes.extend_from_slice(data);
        self.total_size
            .fetch_add(data.len() as u64, Ordering::SeqCst);
        Ok(data.len())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.cursor = offset.min(self.size());
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.cursor
    }
}
