use crate::error::{EdgeflowError, Result};
use crate::state::StateMap;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// What a pass concluded about a tailed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    /// No state yet; the initial start position applies.
    Unknown,
    /// Stored prefix still matches; continue at the stored position.
    Tracked,
    /// The tracked content moved to a rotated file; drain it first.
    RotatedAway,
    /// The file shrank or was rewritten with no rotated copy; start over.
    Truncated,
}

/// Persisted read position of one tailed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailState {
    pub file_name: String,
    /// Absolute path of the file being tailed.
    pub path: PathBuf,
    pub position: u64,
    /// CRC32 of the first `position` bytes. `None` when imported from a
    /// format that did not record it.
    pub checksum: Option<u32>,
    pub last_read_time: DateTime<Utc>,
}

impl TailState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            file_name: file_name_of(&path),
            path,
            position: 0,
            checksum: Some(0),
            last_read_time: DateTime::<Utc>::default(),
        }
    }

    /// Forget everything read so far.
    pub fn reset(&mut self) {
        self.position = 0;
        self.checksum = Some(0);
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn key(index: usize, field: &str) -> String {
    format!("file.{}.{}", index, field)
}

/// True if `map` holds states in the `file.N.*` layout.
pub fn has_keyed_state(map: &StateMap) -> bool {
    map.contains_key(&key(0, "name"))
}

pub fn states_to_map<'a>(states: impl IntoIterator<Item = &'a TailState>) -> StateMap {
    let mut map = StateMap::new();
    for (i, state) in states.into_iter().enumerate() {
        map.insert(key(i, "name"), state.file_name.clone());
        map.insert(key(i, "position"), state.position.to_string());
        map.insert(key(i, "current"), state.path.to_string_lossy().into_owned());
        if let Some(checksum) = state.checksum {
            map.insert(key(i, "checksum"), checksum.to_string());
        }
        map.insert(
            key(i, "last_read_time"),
            state.last_read_time.timestamp_millis().to_string(),
        );
    }
    map
}

/// Read `file.0.*`, `file.1.*`, ... until an index has no name.
///
/// A missing checksum or read time is tolerated; anything unparsable is an
/// `InvalidState` error.
pub fn states_from_map(map: &StateMap) -> Result<Vec<TailState>> {
    let mut states = Vec::new();
    for i in 0.. {
        let Some(name) = map.get(&key(i, "name")) else {
            break;
        };
        let position = match map.get(&key(i, "position")) {
            Some(raw) => parse_field::<u64>(raw, &key(i, "position"))?,
            None => 0,
        };
        let path = match map.get(&key(i, "current")) {
            Some(current) if !current.is_empty() => PathBuf::from(current),
            _ => {
                return Err(EdgeflowError::InvalidState(format!(
                    "{} is missing",
                    key(i, "current")
                )))
            }
        };
        let checksum = map
            .get(&key(i, "checksum"))
            .map(|raw| parse_field::<u32>(raw, &key(i, "checksum")))
            .transpose()?;
        let last_read_time = match map.get(&key(i, "last_read_time")) {
            Some(raw) => {
                let ms = parse_field::<i64>(raw, &key(i, "last_read_time"))?;
                DateTime::from_timestamp_millis(ms).ok_or_else(|| {
                    EdgeflowError::InvalidState(format!("last read time {} out of range", ms))
                })?
            }
            None => DateTime::<Utc>::default(),
        };
        states.push(TailState {
            file_name: name.clone(),
            path,
            position,
            checksum,
            last_read_time,
        });
    }
    Ok(states)
}

fn parse_field<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| EdgeflowError::InvalidState(format!("{} has invalid value '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_survive_the_map_layout() {
        let mut first = TailState::new("/var/log/app.log");
        first.position = 35;
        first.checksum = Some(crc32fast::hash(b"x"));
        first.last_read_time = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let second = TailState::new("/var/log/db.log");

        let map = states_to_map([&first, &second]);
        assert_eq!(map.get("file.0.name").map(String::as_str), Some("app.log"));
        assert_eq!(map.get("file.0.position").map(String::as_str), Some("35"));
        assert_eq!(
            map.get("file.1.current").map(String::as_str),
            Some("/var/log/db.log")
        );
        assert!(has_keyed_state(&map));

        assert_eq!(states_from_map(&map).unwrap(), vec![first, second]);
    }

    #[test]
    fn test_missing_checksum_and_read_time_are_tolerated() {
        let map: StateMap = [
            ("file.0.name", "agent-tmpfile.txt"),
            ("file.0.position", "14"),
            ("file.0.current", "/tmp/agent-tmpfile.txt"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let states = states_from_map(&map).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].position, 14);
        assert_eq!(states[0].checksum, None);
        assert_eq!(states[0].last_read_time, DateTime::<Utc>::default());
    }

    #[test]
    fn test_garbage_position_is_invalid_state() {
        let map: StateMap = [
            ("file.0.name", "a"),
            ("file.0.position", "lots"),
            ("file.0.current", "/a"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert!(matches!(
            states_from_map(&map),
            Err(EdgeflowError::InvalidState(_))
        ));
    }

    #[test]
    fn test_reset_clears_position_and_checksum() {
        let mut state = TailState::new("/a/b.log");
        state.position = 10;
        state.checksum = None;
        state.reset();
        assert_eq!(state.position, 0);
        assert_eq!(state.checksum, Some(0));
    }
}
