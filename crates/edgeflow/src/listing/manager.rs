use super::state::{ListingState, ListingStrategy};
use crate::error::Result;
use crate::state::{StateMap, StateStore};
use tracing::{debug, warn};

const LISTING_STRATEGY_KEY: &str = "listing_strategy";
const HOSTNAME_KEY: &str = "hostname";
const USERNAME_KEY: &str = "username";
const REMOTE_PATH_KEY: &str = "remote_path";

/// Settings a persisted listing state is only valid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSettings {
    pub strategy: ListingStrategy,
    pub hostname: String,
    pub username: String,
    pub remote_path: String,
}

impl ListingSettings {
    fn fields(&self) -> [(&'static str, &'static str, String); 4] {
        [
            ("Listing Strategy", LISTING_STRATEGY_KEY, self.strategy.as_str().to_string()),
            ("Hostname", HOSTNAME_KEY, self.hostname.clone()),
            ("Username", USERNAME_KEY, self.username.clone()),
            ("Remote Path", REMOTE_PATH_KEY, self.remote_path.clone()),
        ]
    }
}

/// Loads and stores [`ListingState`] through a [`StateStore`], validating the
/// persisted settings against the active ones.
pub struct ListingStateManager<S: StateStore> {
    store: S,
    settings: ListingSettings,
}

impl<S: StateStore> ListingStateManager<S> {
    pub fn new(store: S, settings: ListingSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ListingSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// State persisted by the previous pass, or an empty one when there is
    /// none or it was written under different settings.
    pub fn get_current_state(&self) -> Result<ListingState> {
        let empty = ListingState::new(self.settings.strategy);
        let Some(map) = self.store.get()? else {
            return Ok(empty);
        };

        if !self.settings_match(&map) {
            return Ok(empty);
        }

        match ListingState::read_from(self.settings.strategy, &map) {
            Ok(state) => {
                debug!(entities = state.len(), "Successfully loaded state");
                Ok(state)
            }
            Err(e) => {
                warn!(error = %e, "Persisted listing state is unreadable, ignoring");
                Ok(empty)
            }
        }
    }

    /// Persist the full state, replacing whatever was stored.
    pub fn store_state(&self, state: &ListingState) -> Result<()> {
        let mut map = StateMap::new();
        for (_, key, value) in self.settings.fields() {
            map.insert(key.to_string(), value);
        }
        let mut state = state.clone();
        state.compact();
        state.write_to(&mut map);
        self.store.set(&map)
    }

    /// Maps written without any settings keys predate them and are accepted.
    fn settings_match(&self, map: &StateMap) -> bool {
        let fields = self.settings.fields();
        if fields.iter().all(|(_, key, _)| !map.contains_key(*key)) {
            return true;
        }

        let matches = fields
            .iter()
            .all(|(_, key, current)| map.get(*key).map(String::as_str) == Some(current.as_str()));
        if !matches {
            let details = fields
                .iter()
                .map(|(label, key, current)| {
                    let stored = map.get(*key).map(String::as_str).unwrap_or_default();
                    format!("{}: \"{}\" vs. \"{}\"", label, stored, current)
                })
                .collect::<Vec<_>>()
                .join(", ");
            warn!(
                "Processor state was persisted with different settings than the current ones, ignoring. {}",
                details
            );
        }
        matches
    }
}
