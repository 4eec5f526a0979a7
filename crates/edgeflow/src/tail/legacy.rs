//! Import of the line-oriented state files written by older agents.
//!
//! Two layouts exist:
//!
//! ```text
//! FILENAME=/var/log/app.log          FILENAME=app.log
//! POSITION=14                        POSITION.app.log=14
//!                                    CURRENT.app.log=/var/log/app.log
//! ```
//!
//! The second one may repeat `FILENAME` for several files. Paths that are
//! not absolute are resolved by the caller; checksums were never recorded.

use super::state::TailState;
use crate::error::{EdgeflowError, Result};
use std::path::PathBuf;

/// Parse a legacy state file. Unknown keys are ignored.
pub fn parse_legacy_state(raw: &str) -> Result<Vec<TailState>> {
    let mut states: Vec<TailState> = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        if key == "FILENAME" {
            let mut state = TailState::new(PathBuf::from(value));
            state.checksum = None;
            states.push(state);
        } else if key == "POSITION" {
            let position = parse_position(value)?;
            if let Some(last) = states.last_mut() {
                last.position = position;
            }
        } else if let Some(name) = key.strip_prefix("POSITION.") {
            let position = parse_position(value)?;
            if let Some(state) = find_by_name(&mut states, name) {
                state.position = position;
            }
        } else if let Some(name) = key.strip_prefix("CURRENT.") {
            if let Some(state) = find_by_name(&mut states, name) {
                state.path = PathBuf::from(value);
            }
        }
    }
    Ok(states)
}

fn find_by_name<'a>(states: &'a mut [TailState], name: &str) -> Option<&'a mut TailState> {
    states.iter_mut().find(|s| s.file_name == name)
}

fn parse_position(raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| EdgeflowError::InvalidState(format!("legacy position '{}' is not a number", raw)))
}
