use crate::error::{EdgeflowError, Result};
use crc32fast::Hasher;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// CRC32 of the first `len` bytes of the file at `path`.
///
/// Returns `Ok(None)` if the file is missing or shorter than `len`.
pub fn prefix_checksum(path: &Path, len: u64) -> Result<Option<u32>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EdgeflowError::Io(e)),
    };

    let mut hasher = Hasher::new();
    let mut remaining = len;
    let mut reader = file.take(len);
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let n = reader.read(&mut buf).map_err(EdgeflowError::Io)?;
        if n == 0 {
            return Ok(None);
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(Some(hasher.finalize()))
}

/// Continue `checksum` (covering some prefix) over the bytes that follow it.
pub fn extend_checksum(checksum: u32, bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new_with_initial(checksum);
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_prefix_checksum_matches_direct_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"one,two,three\nfour").unwrap();

        assert_eq!(
            prefix_checksum(&path, 14).unwrap(),
            Some(crc32fast::hash(b"one,two,three\n"))
        );
        assert_eq!(prefix_checksum(&path, 0).unwrap(), Some(0));
    }

    #[test]
    fn test_prefix_checksum_of_short_or_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        assert_eq!(prefix_checksum(&path, 1).unwrap(), None);
        fs::write(&path, b"abc").unwrap();
        assert_eq!(prefix_checksum(&path, 4).unwrap(), None);
    }

    #[test]
    fn test_extend_checksum_equals_whole_hash() {
        let head = crc32fast::hash(b"hello ");
        assert_eq!(extend_checksum(head, b"world"), crc32fast::hash(b"hello world"));
        assert_eq!(extend_checksum(0, b"abc"), crc32fast::hash(b"abc"));
    }
}
