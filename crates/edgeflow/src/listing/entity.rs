use super::filter::FileFilter;
use crate::error::{EdgeflowError, Result};
use crate::flow::{FlowFile, ABSOLUTE_PATH, FILENAME, PATH};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use tracing::warn;

/// One file observed during a listing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntity {
    path: PathBuf,
    size: u64,
    last_modified: DateTime<Utc>,
}

impl ListedEntity {
    pub fn new(path: impl Into<PathBuf>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            size,
            last_modified,
        }
    }

    /// Stat a file on disk.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = fs::metadata(&path).map_err(EdgeflowError::Io)?;
        let modified = meta.modified().map_err(EdgeflowError::Io)?;
        Ok(Self::new(path, meta.len(), modified.into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key under which the entity is remembered in the listing state.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.last_modified.timestamp_millis()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn matches(&self, filter: &FileFilter, now: DateTime<Utc>) -> bool {
        filter.matches(self, now)
    }

    /// Attribute-only flow file describing this entity. `path` is the parent
    /// directory relative to `input_directory`, always ending in a separator.
    pub fn to_flow_file(&self, input_directory: &Path) -> FlowFile {
        let parent = self.path.parent().unwrap_or_else(|| Path::new(""));
        let relative = match parent.strip_prefix(input_directory) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => parent.to_string_lossy().into_owned(),
        };

        let mut flow_file = FlowFile::new()
            .with_attribute(FILENAME, self.file_name())
            .with_attribute(PATH, with_trailing_separator(&relative))
            .with_attribute(
                ABSOLUTE_PATH,
                with_trailing_separator(&parent.to_string_lossy()),
            )
            .with_attribute("file.size", self.size.to_string())
            .with_attribute(
                "file.lastModifiedTime",
                self.last_modified.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            );
        // Unknown values are still emitted, as empty strings.
        let ownership = Ownership::of(&self.path).unwrap_or_else(|| {
            warn!(path = %self.path.display(), "Failed to get permissions and owner of file");
            Ownership::default()
        });
        flow_file.set_attribute("file.permissions", ownership.permissions);
        flow_file.set_attribute("file.owner", ownership.owner);
        flow_file.set_attribute("file.group", ownership.group);
        flow_file
    }
}

fn with_trailing_separator(path: &str) -> String {
    if path.ends_with(MAIN_SEPARATOR) {
        path.to_string()
    } else {
        format!("{}{}", path, MAIN_SEPARATOR)
    }
}

/// Permissions (`rwxr-x---` style), owner and group of a file. Owner and
/// group fall back to the numeric id when it has no name.
#[derive(Debug, Default, PartialEq, Eq)]
struct Ownership {
    permissions: String,
    owner: String,
    group: String,
}

#[cfg(unix)]
impl Ownership {
    fn of(path: &Path) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        let meta = fs::metadata(path).ok()?;
        Some(Self {
            permissions: permission_string(meta.mode()),
            owner: unix_names::user(meta.uid()).unwrap_or_else(|| meta.uid().to_string()),
            group: unix_names::group(meta.gid()).unwrap_or_else(|| meta.gid().to_string()),
        })
    }
}

#[cfg(not(unix))]
impl Ownership {
    fn of(_path: &Path) -> Option<Self> {
        None
    }
}

#[cfg(unix)]
fn permission_string(mode: u32) -> String {
    let flags = ['r', 'w', 'x'];
    (0..9)
        .map(|i| {
            if mode & (0o400 >> i) != 0 {
                flags[i % 3]
            } else {
                '-'
            }
        })
        .collect()
}

/// uid/gid to name lookups through the reentrant libc calls.
#[cfg(unix)]
mod unix_names {
    use std::ffi::CStr;

    const MAX_BUFFER: usize = 1 << 16;

    pub fn user(uid: u32) -> Option<String> {
        let mut size = 1024;
        while size <= MAX_BUFFER {
            let mut buf = vec![0 as libc::c_char; size];
            // SAFETY: passwd is plain old data, filled in by getpwuid_r.
            let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
            let mut result: *mut libc::passwd = std::ptr::null_mut();
            // SAFETY: every pointer refers to a live local for the whole call.
            let rc = unsafe {
                libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
            };
            if rc == libc::ERANGE {
                size *= 2;
                continue;
            }
            if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
                return None;
            }
            // SAFETY: pw_name points into `buf`, which is still alive.
            let name = unsafe { CStr::from_ptr(pwd.pw_name) };
            return Some(name.to_string_lossy().into_owned());
        }
        None
    }

    pub fn group(gid: u32) -> Option<String> {
        let mut size = 1024;
        while size <= MAX_BUFFER {
            let mut buf = vec![0 as libc::c_char; size];
            // SAFETY: group is plain old data, filled in by getgrgid_r.
            let mut grp: libc::group = unsafe { std::mem::zeroed() };
            let mut result: *mut libc::group = std::ptr::null_mut();
            // SAFETY: every pointer refers to a live local for the whole call.
            let rc = unsafe {
                libc::getgrgid_r(gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result)
            };
            if rc == libc::ERANGE {
                size *= 2;
                continue;
            }
            if rc != 0 || result.is_null() || grp.gr_name.is_null() {
                return None;
            }
            // SAFETY: gr_name points into `buf`, which is still alive.
            let name = unsafe { CStr::from_ptr(grp.gr_name) };
            return Some(name.to_string_lossy().into_owned());
        }
        None
    }
}
