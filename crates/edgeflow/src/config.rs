//! # Configuration
//!
//! Agent configuration is managed by [`confique`], which handles layered loading
//! from a TOML file, environment variables, and compiled defaults.
//!
//! ## Resolution Order
//!
//! 1. **Environment variables**: `EDGEFLOW_CONTENT_DIR`, `EDGEFLOW_STATE_DIR`.
//! 2. **Config file**: `edgeflow.toml` (path chosen by the caller).
//! 3. **Compiled Defaults**: `#[config(default = ...)]`.
//!
//! ## Sections
//!
//! | Section | Used by |
//! |---------|---------|
//! | `[content_repository]` | where flow-file content lives (`volatile` or `filesystem`) |
//! | `[state]` | directory of the persisted component state |
//! | `[listing]` | the ListFile pass |
//! | `[tail]` | the TailFile pass |
//!
//! Processor properties stay plain strings here. They are parsed and compiled
//! when a processor is scheduled, so a bad value fails scheduling with
//! [`EdgeflowError::Config`] instead of failing the whole file load.

use crate::error::{EdgeflowError, Result};
use crate::store::fs_repo::FileSystemRepository;
use crate::store::volatile::VolatileRepository;
use crate::store::ContentRepository;
use crate::units::{parse_data_size, parse_optional};
use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "edgeflow.toml";

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct AgentConfig {
    #[config(nested)]
    pub content_repository: ContentRepositoryConfig,

    #[config(nested)]
    pub state: StateConfig,

    #[config(nested)]
    pub listing: ListingConfig,

    #[config(nested)]
    pub tail: TailConfig,
}

impl AgentConfig {
    /// Load from environment and, if it exists, the file at `path`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Self::builder().env();
        if let Some(path) = path {
            builder = builder.file(path);
        }
        builder
            .load()
            .map_err(|e| EdgeflowError::Config(e.to_string()))
    }

    /// A commented sample `edgeflow.toml`.
    pub fn template() -> String {
        confique::toml::template::<Self>(confique::toml::FormatOptions::default())
    }
}

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContentRepositoryConfig {
    /// "volatile" keeps content in memory, "filesystem" stores one file per
    /// claim under `directory`.
    #[config(default = "volatile")]
    pub kind: String,

    #[config(env = "EDGEFLOW_CONTENT_DIR")]
    pub directory: Option<String>,

    /// Capacity reported by the filesystem repository (e.g. "10 GB").
    pub max_size: Option<String>,
}

impl Default for ContentRepositoryConfig {
    fn default() -> Self {
        Self {
            kind: "volatile".to_string(),
            directory: None,
            max_size: None,
        }
    }
}

impl ContentRepositoryConfig {
    pub fn open(&self) -> Result<Box<dyn ContentRepository>> {
        match self.kind.trim().to_ascii_lowercase().as_str() {
            "volatile" => Ok(Box::new(VolatileRepository::new())),
            "filesystem" => {
                let directory = self.directory.as_deref().filter(|d| !d.trim().is_empty());
                let Some(directory) = directory else {
                    return Err(EdgeflowError::Config(
                        "content_repository.directory is required for the filesystem repository"
                            .to_string(),
                    ));
                };
                let max_size = parse_optional(self.max_size.as_deref(), parse_data_size)?
                    .unwrap_or(u64::MAX);
                Ok(Box::new(FileSystemRepository::with_max_size(
                    directory, max_size,
                )?))
            }
            other => Err(EdgeflowError::Config(format!(
                "unknown content repository kind '{}' (expected volatile or filesystem)",
                other
            ))),
        }
    }
}

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    #[config(default = ".edgeflow/state", env = "EDGEFLOW_STATE_DIR")]
    pub directory: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            directory: ".edgeflow/state".to_string(),
        }
    }
}

impl StateConfig {
    pub fn directory(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }
}

/// ListFile properties.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ListingConfig {
    pub input_directory: Option<String>,

    #[config(default = true)]
    pub recurse_subdirectories: bool,

    /// Regex the whole file name must match.
    pub file_filter: Option<String>,

    /// Regex the full parent directory path must match. Only used when
    /// recursing.
    pub path_filter: Option<String>,

    #[config(default = "0 sec")]
    pub minimum_file_age: String,

    pub maximum_file_age: Option<String>,

    #[config(default = "0 B")]
    pub minimum_file_size: String,

    pub maximum_file_size: Option<String>,

    #[config(default = true)]
    pub ignore_hidden_files: bool,

    /// "timestamps" or "entities".
    #[config(default = "timestamps")]
    pub listing_strategy: String,

    pub entity_tracking_time_window: Option<String>,

    /// Recorded with the state so that a listing of another host is never
    /// mistaken for this one.
    #[config(default = "localhost")]
    pub hostname: String,

    #[config(default = "")]
    pub username: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            input_directory: None,
            recurse_subdirectories: true,
            file_filter: None,
            path_filter: None,
            minimum_file_age: "0 sec".to_string(),
            maximum_file_age: None,
            minimum_file_size: "0 B".to_string(),
            maximum_file_size: None,
            ignore_hidden_files: true,
            listing_strategy: "timestamps".to_string(),
            entity_tracking_time_window: None,
            hostname: "localhost".to_string(),
            username: String::new(),
        }
    }
}

/// TailFile properties.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TailConfig {
    /// "single" or "multiple".
    #[config(default = "single")]
    pub mode: String,

    /// Single mode: path of the file to tail. Multiple mode: regex matched
    /// against file names under `base_directory`.
    pub file_name: Option<String>,

    pub base_directory: Option<String>,

    #[config(default = false)]
    pub recursive_lookup: bool,

    #[config(default = "10 min")]
    pub lookup_frequency: String,

    #[config(default = "${filename}.*")]
    pub rolling_filename_pattern: String,

    /// Single byte, escapes `\n`, `\t` and `\\` allowed. Empty means the
    /// whole unread remainder is one record.
    #[config(default = "\\n")]
    pub delimiter: String,

    /// "beginning_of_file", "beginning_of_time" or "current_time".
    #[config(default = "beginning_of_file")]
    pub initial_start_position: String,

    pub batch_size: Option<u64>,

    /// "per_delimiter" or "per_batch".
    #[config(default = "per_delimiter")]
    pub result_mode: String,

    /// State file written by older agents, imported once.
    pub legacy_state_file: Option<String>,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            mode: "single".to_string(),
            file_name: None,
            base_directory: None,
            recursive_lookup: false,
            lookup_frequency: "10 min".to_string(),
            rolling_filename_pattern: "${filename}.*".to_string(),
            delimiter: "\\n".to_string(),
            initial_start_position: "beginning_of_file".to_string(),
            batch_size: None,
            result_mode: "per_delimiter".to_string(),
            legacy_state_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.content_repository.kind, "volatile");
        assert_eq!(config.state.directory, ".edgeflow/state");
        assert!(config.listing.recurse_subdirectories);
        assert_eq!(config.listing.listing_strategy, "timestamps");
        assert_eq!(config.tail.rolling_filename_pattern, "${filename}.*");
        assert_eq!(config.tail.delimiter, "\\n");
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(
            &path,
            r#"
[listing]
input_directory = "/var/spool/in"
listing_strategy = "entities"
ignore_hidden_files = false

[tail]
mode = "multiple"
batch_size = 5
"#,
        )
        .unwrap();

        let config = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(config.listing.input_directory.as_deref(), Some("/var/spool/in"));
        assert_eq!(config.listing.listing_strategy, "entities");
        assert!(!config.listing.ignore_hidden_files);
        assert_eq!(config.listing.minimum_file_age, "0 sec");
        assert_eq!(config.tail.mode, "multiple");
        assert_eq!(config.tail.batch_size, Some(5));
        assert_eq!(config.tail.lookup_frequency, "10 min");
    }

    #[test]
    fn test_load_rejects_wrong_types() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, "[tail]\nbatch_size = \"lots\"\n").unwrap();
        assert!(matches!(
            AgentConfig::load(Some(&path)).unwrap_err(),
            EdgeflowError::Config(_)
        ));
    }

    #[test]
    fn test_serialized_config_parses_back() {
        let config = AgentConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AgentConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_open_filesystem_repository_requires_directory() {
        let config = ContentRepositoryConfig {
            kind: "filesystem".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.open().err().unwrap(), EdgeflowError::Config(_)));
    }

    #[test]
    fn test_open_unknown_repository_kind() {
        let config = ContentRepositoryConfig {
            kind: "cloud".to_string(),
            ..Default::default()
        };
        assert!(config.open().is_err());
    }

    #[test]
    fn test_open_filesystem_repository_with_max_size() {
        let dir = TempDir::new().unwrap();
        let config = ContentRepositoryConfig {
            kind: "filesystem".to_string(),
            directory: Some(dir.path().display().to_string()),
            max_size: Some("1 KB".to_string()),
        };
        let repo = config.open().unwrap();
        assert_eq!(repo.max_repository_size(), 1024);
        assert_eq!(repo.repository_size(), 0);
    }
}
