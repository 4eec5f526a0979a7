use crate::error::{EdgeflowError, Result};

/// Minimal read/write/seek contract over a byte sequence.
///
/// Every stream keeps its own cursor, so two readers over the same claim never
/// interfere. Writes always append at the end of the backing entry; the cursor
/// only affects reads.
pub trait ByteStream: Send {
    /// Number of bytes visible through this stream.
    fn size(&self) -> u64;

    /// Read into `buf` from the cursor, returning the number of bytes copied.
    /// Returns `Ok(0)` at the end of the visible bytes.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Append `data` to the backing entry, returning the number of bytes
    /// accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Move the read cursor, clamped to [`ByteStream::size`].
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Current read cursor.
    fn tell(&self) -> u64;

    fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size().saturating_sub(self.tell()) as usize);
        let mut chunk = [0u8; 8192];
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = self.write(data)?;
            if n == 0 {
                return Err(EdgeflowError::Storage(
                    "stream stopped accepting bytes".to_string(),
                ));
            }
            data = &data[n..];
        }
        Ok(())
    }
}

pub(crate) fn read_only_error() -> EdgeflowError {
    EdgeflowError::Storage("stream was opened for reading only".to_string())
}
