use crate::error::{EdgeflowError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Decode the configured delimiter.
///
/// Empty means "no delimiter". `\n`, `\t`, `\r` and `\\` escapes are
/// accepted; the result must be a single byte.
pub fn parse_delimiter(raw: &str) -> Result<Option<u8>> {
    let decoded = match raw {
        "" => return Ok(None),
        "\\n" => "\n",
        "\\t" => "\t",
        "\\r" => "\r",
        "\\\\" => "\\",
        other => other,
    };
    match decoded.as_bytes() {
        [byte] => Ok(Some(*byte)),
        _ => Err(EdgeflowError::Config(format!(
            "delimiter must be a single byte, got '{}'",
            raw
        ))),
    }
}

/// One record read from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Byte offset of the first byte in the file.
    pub offset: u64,
    pub bytes: Vec<u8>,
}

impl Record {
    pub fn end(&self) -> u64 {
        self.offset + self.bytes.len() as u64
    }
}

/// How far to read in one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    pub delimiter: Option<u8>,
    pub max_records: Option<u64>,
    /// Consume a trailing record that has no delimiter yet. Used for rotated
    /// files, which will never grow again.
    pub drain: bool,
}

/// Read complete records from `path` starting at `position`.
///
/// Without a delimiter the whole unread remainder is one record. With one,
/// every record ends with it; a trailing partial record is left unread unless
/// `drain` is set.
pub fn read_records(path: &Path, position: u64, limits: ReadLimits) -> Result<Vec<Record>> {
    let mut file = File::open(path).map_err(EdgeflowError::Io)?;
    file.seek(SeekFrom::Start(position))
        .map_err(EdgeflowError::Io)?;
    let mut reader = BufReader::new(file);

    let Some(delimiter) = limits.delimiter else {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(EdgeflowError::Io)?;
        return Ok(if bytes.is_empty() {
            Vec::new()
        } else {
            vec![Record {
                offset: position,
                bytes,
            }]
        });
    };

    let mut records = Vec::new();
    let mut offset = position;
    loop {
        if limits
            .max_records
            .is_some_and(|max| records.len() as u64 >= max)
        {
            break;
        }
        let mut bytes = Vec::new();
        let n = reader
            .read_until(delimiter, &mut bytes)
            .map_err(EdgeflowError::Io)?;
        if n == 0 {
            break;
        }
        let complete = bytes.last() == Some(&delimiter);
        if !complete && !limits.drain {
            break;
        }
        records.push(Record { offset, bytes });
        offset += n as u64;
        if !complete {
            break;
        }
    }
    Ok(records)
}
