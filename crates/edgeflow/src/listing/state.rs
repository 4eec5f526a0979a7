use super::entity::ListedEntity;
use crate::error::{EdgeflowError, Result};
use crate::state::StateMap;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const LISTED_TIMESTAMP_KEY: &str = "listed_timestamp";
const ENTITY_PREFIX: &str = "entity.";

/// How the listing decides that an entity was already emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingStrategy {
    /// Only modification times count; anything older than the newest listed
    /// timestamp is skipped.
    #[default]
    TrackingTimestamps,
    /// Every path is remembered with its size; a size change is new content.
    TrackingEntities,
}

impl ListingStrategy {
    /// Name stored alongside the persisted state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStrategy::TrackingTimestamps => "Tracking Timestamps",
            ListingStrategy::TrackingEntities => "Tracking Entities",
        }
    }
}

impl fmt::Display for ListingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStrategy {
    type Err = EdgeflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamps" | "tracking timestamps" => Ok(ListingStrategy::TrackingTimestamps),
            "entities" | "tracking entities" => Ok(ListingStrategy::TrackingEntities),
            other => Err(EdgeflowError::Config(format!(
                "unknown listing strategy '{}' (expected timestamps or entities)",
                other
            ))),
        }
    }
}

/// What is remembered about one listed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListedRecord {
    pub size: u64,
    pub timestamp_ms: i64,
}

/// Entities already handled, keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingState {
    strategy: ListingStrategy,
    entities: BTreeMap<String, ListedRecord>,
    /// Newest modification time ever listed.
    listed_timestamp: Option<i64>,
}

impl ListingState {
    pub fn new(strategy: ListingStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn strategy(&self) -> ListingStrategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn record(&self, key: &str) -> Option<&ListedRecord> {
        self.entities.get(key)
    }

    pub fn listed_timestamp(&self) -> Option<i64> {
        self.listed_timestamp
    }

    pub fn was_object_listed_already(&self, entity: &ListedEntity) -> bool {
        let timestamp = entity.timestamp_ms();
        let known = self.entities.get(&entity.key());

        match self.strategy {
            ListingStrategy::TrackingEntities => {
                known.is_some_and(|r| r.timestamp_ms >= timestamp && r.size == entity.size())
            }
            // Equal to the newest listed instant counts as seen, whatever the
            // path or size.
            ListingStrategy::TrackingTimestamps => {
                known.is_some_and(|r| r.timestamp_ms >= timestamp)
                    || self.listed_timestamp.is_some_and(|newest| timestamp <= newest)
            }
        }
    }

    pub fn update_state(&mut self, entity: &ListedEntity) {
        let timestamp = entity.timestamp_ms();
        self.entities.insert(
            entity.key(),
            ListedRecord {
                size: entity.size(),
                timestamp_ms: timestamp,
            },
        );
        self.listed_timestamp = Some(self.listed_timestamp.map_or(timestamp, |t| t.max(timestamp)));
    }

    /// Forget records older than `cutoff_ms`.
    pub fn prune_older_than(&mut self, cutoff_ms: i64) {
        self.entities.retain(|_, r| r.timestamp_ms >= cutoff_ms);
    }

    /// Drop what the strategy no longer needs before persisting. Timestamp
    /// tracking only needs the paths listed at the newest timestamp.
    pub fn compact(&mut self) {
        if self.strategy == ListingStrategy::TrackingTimestamps {
            if let Some(newest) = self.listed_timestamp {
                self.entities.retain(|_, r| r.timestamp_ms == newest);
            }
        }
    }

    pub(crate) fn write_to(&self, map: &mut StateMap) {
        if let Some(ts) = self.listed_timestamp {
            map.insert(LISTED_TIMESTAMP_KEY.to_string(), ts.to_string());
        }
        for (i, (name, record)) in self.entities.iter().enumerate() {
            map.insert(format!("{}{}.name", ENTITY_PREFIX, i), name.clone());
            map.insert(format!("{}{}.size", ENTITY_PREFIX, i), record.size.to_string());
            map.insert(
                format!("{}{}.timestamp", ENTITY_PREFIX, i),
                record.timestamp_ms.to_string(),
            );
        }
    }

    pub(crate) fn read_from(strategy: ListingStrategy, map: &StateMap) -> Result<Self> {
        let mut state = Self::new(strategy);
        if let Some(ts) = map.get(LISTED_TIMESTAMP_KEY) {
            state.listed_timestamp = Some(parse_number(LISTED_TIMESTAMP_KEY, ts)?);
        }

        let mut i = 0;
        while let Some(name) = map.get(&format!("{}{}.name", ENTITY_PREFIX, i)) {
            let size_key = format!("{}{}.size", ENTITY_PREFIX, i);
            let ts_key = format!("{}{}.timestamp", ENTITY_PREFIX, i);
            let size = map
                .get(&size_key)
                .ok_or_else(|| EdgeflowError::InvalidState(format!("missing {}", size_key)))?;
            let timestamp = map
                .get(&ts_key)
                .ok_or_else(|| EdgeflowError::InvalidState(format!("missing {}", ts_key)))?;
            state.entities.insert(
                name.clone(),
                ListedRecord {
                    size: parse_number(&size_key, size)?,
                    timestamp_ms: parse_number(&ts_key, timestamp)?,
                },
            );
            i += 1;
        }

        if state.listed_timestamp.is_none() {
            state.listed_timestamp = state.entities.values().map(|r| r.timestamp_ms).max();
        }
        Ok(state)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        EdgeflowError::InvalidState(format!("{} is not a number: '{}'", key, value))
    })
}
