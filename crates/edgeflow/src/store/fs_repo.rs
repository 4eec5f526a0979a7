use super::stream::{read_only_error, ByteStream};
use super::{ContentClaim, ContentRepository};
use crate::error::{EdgeflowError, Result};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

struct FsEntry {
    size: u64,
    /// Changes whenever the entry is replaced, so writers opened on an older
    /// file can be told apart.
    generation: u64,
}

struct FsInner {
    directory: PathBuf,
    /// Known entries, keyed by content path. Guarded together with the
    /// files themselves: every size change happens under this lock.
    sizes: Mutex<HashMap<String, FsEntry>>,
    total_size: AtomicU64,
    next_generation: AtomicU64,
    max_size: u64,
}

impl FsInner {
    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }
}

/// Content repository storing one file per key inside a directory.
///
/// The size index is rebuilt by scanning the directory at open time, so
/// content written by a previous run is accounted for.
#[derive(Clone)]
pub struct FileSystemRepository {
    inner: Arc<FsInner>,
}

impl FileSystemRepository {
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        Self::with_max_size(directory, u64::MAX)
    }

    pub fn with_max_size(directory: impl Into<PathBuf>, max_size: u64) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(EdgeflowError::Io)?;

        let mut sizes = HashMap::new();
        let mut total = 0u64;
        for entry in fs::read_dir(&directory).map_err(EdgeflowError::Io)? {
            let entry = entry.map_err(EdgeflowError::Io)?;
            let meta = entry.metadata().map_err(EdgeflowError::Io)?;
            if !meta.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_key(name).is_ok() {
                    total += meta.len();
                    let generation = sizes.len() as u64;
                    sizes.insert(
                        name.to_string(),
                        FsEntry {
                            size: meta.len(),
                            generation,
                        },
                    );
                }
            }
        }
        debug!(
            directory = %directory.display(),
            entries = sizes.len(),
            bytes = total,
            "Opened filesystem content repository"
        );

        Ok(Self {
            inner: Arc::new(FsInner {
                directory,
                next_generation: AtomicU64::new(sizes.len() as u64),
                sizes: Mutex::new(sizes),
                total_size: AtomicU64::new(total),
                max_size,
            }),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.inner.directory.join(key))
    }
}

/// Keys become file names, so anything that could escape the directory is
/// rejected.
fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
        || key.ends_with(".tmp");
    if bad {
        return Err(EdgeflowError::InvalidKey(key.to_string()));
    }
    Ok(())
}

impl ContentRepository for FileSystemRepository {
    fn write(&self, claim: &ContentClaim, append: bool) -> Result<Box<dyn ByteStream>> {
        let key = claim.content_path();
        let path = self.entry_path(key)?;

        let mut sizes = self.inner.sizes.lock().unwrap_or_else(PoisonError::into_inner);
        let (file, generation) = if append {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(EdgeflowError::Io)?;
            let entry = sizes.entry(key.to_string()).or_insert_with(|| FsEntry {
                size: 0,
                generation: self.inner.next_generation(),
            });
            (file, entry.generation)
        } else {
            // A fresh file renamed over the old one: open readers keep the
            // old bytes, writers still holding the old file go stale.
            let tmp = path.with_file_name(format!("{}.tmp", key));
            let file = File::create(&tmp).map_err(EdgeflowError::Io)?;
            if let Err(e) = fs::rename(&tmp, &path) {
                fs::remove_file(&tmp).ok();
                return Err(EdgeflowError::Io(e));
            }
            let generation = self.inner.next_generation();
            let replaced = sizes.insert(key.to_string(), FsEntry { size: 0, generation });
            if let Some(old) = replaced {
                self.inner.total_size.fetch_sub(old.size, Ordering::SeqCst);
            }
            (file, generation)
        };

        Ok(Box::new(FsWriteStream {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
            generation,
            file,
        }))
    }

    fn read(&self, claim: &ContentClaim) -> Result<Option<Box<dyn ByteStream>>> {
        let path = self.entry_path(claim.content_path())?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EdgeflowError::Io(e)),
        };
        let size = file.metadata().map_err(EdgeflowError::Io)?.len();
        Ok(Some(Box::new(FsReadStream {
            file,
            size,
            cursor: 0,
        })))
    }

    fn exists(&self, claim: &ContentClaim) -> bool {
        self.inner
            .sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(claim.content_path())
    }

    fn remove_key(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key)?;
        let mut sizes = self.inner.sizes.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(EdgeflowError::Io(e)),
        }
        if let Some(entry) = sizes.remove(key) {
            self.inner.total_size.fetch_sub(entry.size, Ordering::SeqCst);
            info!(key, "Deleting resource");
        }
        Ok(true)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let sizes = self.inner.sizes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(sizes.keys().cloned().collect())
    }

    fn repository_size(&self) -> u64 {
        self.inner.total_size.load(Ordering::SeqCst)
    }

    fn repository_entry_count(&self) -> u64 {
        self.inner
            .sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }

    fn max_repository_size(&self) -> u64 {
        self.inner.max_size
    }
}

struct FsWriteStream {
    inner: Arc<FsInner>,
    key: String,
    generation: u64,
    file: File,
}

impl ByteStream for FsWriteStream {
    fn size(&self) -> u64 {
        self.inner
            .sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.key)
            .filter(|entry| entry.generation == self.generation)
            .map_or(0, |entry| entry.size)
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut sizes = self.inner.sizes.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = match sizes.get_mut(&self.key) {
            Some(entry) if entry.generation == self.generation => entry,
            _ => {
                return Err(EdgeflowError::Storage(format!(
                    "content entry '{}' was removed or replaced",
                    self.key
                )))
            }
        };
        // Other writers may have appended since this one last wrote.
        self.file.seek(SeekFrom::End(0)).map_err(EdgeflowError::Io)?;
        write_counted(&mut self.file, data, &self.inner.total_size, &mut entry.size)
    }

    fn seek(&mut self, _offset: u64) -> Result<()> {
        Ok(())
    }

    fn tell(&self) -> u64 {
        0
    }
}

/// Write `data` to `out`, keeping `total` and `entry_size` in step with what
/// `out` actually accepted. The total is counted up front and given back for
/// whatever was refused.
fn write_counted<W: Write>(
    out: &mut W,
    data: &[u8],
    total: &AtomicU64,
    entry_size: &mut u64,
) -> Result<usize> {
    let requested = data.len() as u64;
    total.fetch_add(requested, Ordering::SeqCst);
    match out.write(data) {
        Ok(n) => {
            let accepted = n as u64;
            if accepted < requested {
                total.fetch_sub(requested - accepted, Ordering::SeqCst);
            }
            *entry_size += accepted;
            Ok(n)
        }
        Err(e) => {
            total.fetch_sub(requested, Ordering::SeqCst);
            Err(EdgeflowError::Io(e))
        }
    }
}

struct FsReadStream {
    file: File,
    size: u64,
    cursor: u64,
}

impl ByteStream for FsReadStream {
    fn size(&self) -> u64 {
        self.size
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.size.saturating_sub(self.cursor) as usize;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = remaining.min(buf.len());
        let n = self.file.read(&mut buf[..want]).map_err(EdgeflowError::Io)?;
        self.cursor += n as u64;
        Ok(n)
    }

    fn write(&mut self, _data: &[u8]) -> Result<usize> {
        Err(read_only_error())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        let target = offset.min(self.size);
        self.file
            .seek(SeekFrom::Start(target))
            .map_err(EdgeflowError::Io)?;
        self.cursor = target;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.cursor
    }
}
