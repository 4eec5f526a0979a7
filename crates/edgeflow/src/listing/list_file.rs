use super::entity::ListedEntity;
use super::filter::FileFilter;
use super::manager::{ListingSettings, ListingStateManager};
use super::state::{ListingStrategy, ListingState};
use super::walker::list_dir;
use crate::config::ListingConfig;
use crate::error::{EdgeflowError, Result};
use crate::flow::FlowSession;
use crate::state::StateStore;
use crate::units::{parse_optional, parse_time_period};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of one listing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListingReport {
    pub listed: usize,
    pub already_listed: usize,
    pub filtered: usize,
}

/// Lists new files of a local directory, one attribute-only flow file each.
pub struct ListFile<S: StateStore> {
    input_directory: PathBuf,
    recurse_subdirectories: bool,
    filter: FileFilter,
    tracking_window: Option<chrono::Duration>,
    state_manager: ListingStateManager<S>,
}

impl<S: StateStore> ListFile<S> {
    /// Validate the configuration and compile the filter.
    pub fn on_schedule(config: &ListingConfig, state_store: S) -> Result<Self> {
        let input_directory = config
            .input_directory
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                EdgeflowError::Config("Input Directory property missing or invalid".to_string())
            })?;
        let input_directory = PathBuf::from(input_directory);
        if !input_directory.is_dir() {
            return Err(EdgeflowError::Config(format!(
                "Input Directory '{}' is not an existing directory",
                input_directory.display()
            )));
        }

        let strategy: ListingStrategy = config.listing_strategy.parse()?;
        let tracking_window =
            parse_optional(config.entity_tracking_time_window.as_deref(), parse_time_period)?
                .map(|window| {
                    chrono::Duration::from_std(window).map_err(|e| {
                        EdgeflowError::Config(format!("entity tracking time window: {}", e))
                    })
                })
                .transpose()?;
        if tracking_window.is_some() && strategy != ListingStrategy::TrackingEntities {
            warn!("Entity tracking time window is ignored when tracking timestamps");
        }

        let settings = ListingSettings {
            strategy,
            hostname: config.hostname.clone(),
            username: config.username.clone(),
            remote_path: input_directory.to_string_lossy().into_owned(),
        };

        Ok(Self {
            filter: FileFilter::from_config(config)?,
            recurse_subdirectories: config.recurse_subdirectories,
            tracking_window: tracking_window
                .filter(|_| strategy == ListingStrategy::TrackingEntities),
            state_manager: ListingStateManager::new(state_store, settings),
            input_directory,
        })
    }

    pub fn input_directory(&self) -> &Path {
        &self.input_directory
    }

    pub fn state_manager(&self) -> &ListingStateManager<S> {
        &self.state_manager
    }

    /// Run one pass at the current time.
    pub fn on_trigger(&self, session: &mut dyn FlowSession) -> Result<ListingReport> {
        self.on_trigger_at(session, Utc::now())
    }

    /// Run one pass as if the clock read `now` (file ages, tracking window).
    pub fn on_trigger_at(
        &self,
        session: &mut dyn FlowSession,
        now: DateTime<Utc>,
    ) -> Result<ListingReport> {
        let stored = self.state_manager.get_current_state()?;
        let cutoff = self.tracking_window.map(|window| now - window);

        // 1. Decide on every entity before anything is transferred.
        let mut report = ListingReport::default();
        let mut new_entities = Vec::new();
        list_dir(
            &self.input_directory,
            self.recurse_subdirectories,
            &mut |parent: &Path, name: &str| {
                let entity = match ListedEntity::from_path(parent.join(name)) {
                    Ok(entity) => entity,
                    Err(e) => {
                        warn!(path = %parent.join(name).display(), error = %e, "Failed to stat file, skipping");
                        return true;
                    }
                };
                if cutoff.is_some_and(|c| entity.last_modified() < c) {
                    report.filtered += 1;
                } else if stored.was_object_listed_already(&entity) {
                    report.already_listed += 1;
                } else if !entity.matches(&self.filter, now) {
                    report.filtered += 1;
                } else {
                    new_entities.push(entity);
                }
                true
            },
        );

        // 2. Transfer and fold into the next state.
        let mut latest: ListingState = stored;
        for entity in &new_entities {
            session.transfer(entity.to_flow_file(&self.input_directory));
            latest.update_state(entity);
        }
        report.listed = new_entities.len();

        // 3. Persist once for the whole pass.
        if let Some(cutoff) = cutoff {
            latest.prune_older_than(cutoff.timestamp_millis());
        }
        self.state_manager.store_state(&latest)?;

        if report.listed == 0 {
            debug!(
                "No new files were found in input directory '{}' to list",
                self.input_directory.display()
            );
            session.yield_processor();
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{RecordingSession, FILENAME};
    use crate::state::MemStateStore;
    use std::fs;
    use tempfile::TempDir;

    fn config(dir: &Path) -> ListingConfig {
        ListingConfig {
            input_directory: Some(dir.display().to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_schedule_requires_input_directory() {
        let err = ListFile::on_schedule(&ListingConfig::default(), MemStateStore::new())
            .err()
            .unwrap();
        assert!(matches!(err, EdgeflowError::Config(_)));
    }

    #[test]
    fn test_schedule_rejects_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = ListFile::on_schedule(&config(&dir.path().join("gone")), MemStateStore::new())
            .err()
            .unwrap();
        assert!(matches!(err, EdgeflowError::Config(_)));
    }

    #[test]
    fn test_schedule_rejects_unknown_strategy() {
        let dir = TempDir::new().unwrap();
        let cfg = ListingConfig {
            listing_strategy: "newest-first".to_string(),
            ..config(dir.path())
        };
        assert!(ListFile::on_schedule(&cfg, MemStateStore::new()).is_err());
    }

    #[test]
    fn test_first_pass_lists_everything_then_yields() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "aaaa").unwrap();
        fs::write(dir.path().join("b.txt"), "bb").unwrap();
        fs::write(dir.path().join(".hidden"), "h").unwrap();

        let store = MemStateStore::new();
        let list = ListFile::on_schedule(&config(dir.path()), &store).unwrap();

        let mut session = RecordingSession::new();
        let report = list.on_trigger(&mut session).unwrap();
        assert_eq!(report.listed, 2);
        let mut names = session.attribute_values(FILENAME);
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert!(!session.yielded());
        assert_eq!(store.write_count(), 1);

        session.reset();
        let report = list.on_trigger(&mut session).unwrap();
        assert_eq!(report.listed, 0);
        assert_eq!(report.already_listed, 2);
        assert!(session.yielded());
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_state_write_failure_surfaces() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let store = MemStateStore::new();
        store.set_simulate_write_error(true);
        let list = ListFile::on_schedule(&config(dir.path()), &store).unwrap();

        let mut session = RecordingSession::new();
        assert!(list.on_trigger(&mut session).is_err());
    }
}
