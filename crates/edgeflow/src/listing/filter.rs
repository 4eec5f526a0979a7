use super::entity::ListedEntity;
use crate::config::ListingConfig;
use crate::error::Result;
use crate::units::{parse_data_size, parse_optional, parse_time_period};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::time::Duration;

/// Predicate over listed files, compiled once when the processor is scheduled.
///
/// Regexes must match the whole string, not a substring.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub filename_filter: Option<Regex>,
    /// Matched against the full parent directory path.
    pub path_filter: Option<Regex>,
    pub minimum_file_age: Option<Duration>,
    pub maximum_file_age: Option<Duration>,
    pub minimum_file_size: Option<u64>,
    pub maximum_file_size: Option<u64>,
    pub ignore_hidden_files: bool,
}

/// Compile `pattern` so that it only matches whole strings.
pub fn full_match_regex(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})$", pattern))?)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl FileFilter {
    pub fn from_config(config: &ListingConfig) -> Result<Self> {
        let filename_filter = non_blank(&config.file_filter)
            .map(full_match_regex)
            .transpose()?;
        // Without recursion every file sits in the input directory itself.
        let path_filter = if config.recurse_subdirectories {
            non_blank(&config.path_filter)
                .map(full_match_regex)
                .transpose()?
        } else {
            None
        };

        let minimum_file_age =
            parse_optional(Some(config.minimum_file_age.as_str()), parse_time_period)?;
        let maximum_file_age =
            parse_optional(config.maximum_file_age.as_deref(), parse_time_period)?;
        let minimum_file_size =
            parse_optional(Some(config.minimum_file_size.as_str()), parse_data_size)?;
        let maximum_file_size =
            parse_optional(config.maximum_file_size.as_deref(), parse_data_size)?;

        Ok(Self {
            filename_filter,
            path_filter,
            minimum_file_age,
            maximum_file_age,
            minimum_file_size,
            maximum_file_size,
            ignore_hidden_files: config.ignore_hidden_files,
        })
    }

    pub fn matches(&self, entity: &ListedEntity, now: DateTime<Utc>) -> bool {
        let name = entity.file_name();
        if self.ignore_hidden_files && name.starts_with('.') {
            return false;
        }

        if let Some(filter) = &self.filename_filter {
            if !filter.is_match(&name) {
                return false;
            }
        }

        if let Some(filter) = &self.path_filter {
            let parent = entity
                .path()
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !filter.is_match(&parent) {
                return false;
            }
        }

        // Files modified "in the future" have age zero.
        let age = (now - entity.last_modified()).to_std().unwrap_or(Duration::ZERO);
        if self.minimum_file_age.is_some_and(|min| age < min) {
            return false;
        }
        if self.maximum_file_age.is_some_and(|max| age > max) {
            return false;
        }

        if self.minimum_file_size.is_some_and(|min| entity.size() < min) {
            return false;
        }
        if self.maximum_file_size.is_some_and(|max| entity.size() > max) {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EdgeflowError;
    use chrono::Duration as ChronoDuration;

    fn entity(path: &str, size: u64, age_secs: i64, now: DateTime<Utc>) -> ListedEntity {
        ListedEntity::new(path, size, now - ChronoDuration::seconds(age_secs))
    }

    #[test]
    fn test_default_config_filter_accepts_plain_files() {
        let filter = FileFilter::from_config(&ListingConfig::default()).unwrap();
        let now = Utc::now();
        assert!(filter.matches(&entity("/in/a.txt", 0, 0, now), now));
        assert!(!filter.matches(&entity("/in/.hidden", 5, 10, now), now));
    }

    #[test]
    fn test_filename_filter_is_anchored() {
        let config = ListingConfig {
            file_filter: Some(r".*\.log".to_string()),
            ..Default::default()
        };
        let filter = FileFilter::from_config(&config).unwrap();
        let now = Utc::now();
        assert!(filter.matches(&entity("/in/app.log", 1, 1, now), now));
        assert!(!filter.matches(&entity("/in/app.log.1", 1, 1, now), now));
    }

    #[test]
    fn test_path_filter_only_when_recursing() {
        let now = Utc::now();
        let recursing = ListingConfig {
            path_filter: Some("/in/keep.*".to_string()),
            ..Default::default()
        };
        let filter = FileFilter::from_config(&recursing).unwrap();
        assert!(filter.matches(&entity("/in/keep/a", 1, 1, now), now));
        assert!(!filter.matches(&entity("/in/drop/a", 1, 1, now), now));

        let flat = ListingConfig {
            recurse_subdirectories: false,
            ..recursing
        };
        let filter = FileFilter::from_config(&flat).unwrap();
        assert!(filter.matches(&entity("/in/drop/a", 1, 1, now), now));
    }

    #[test]
    fn test_age_and_size_bounds() {
        let config = ListingConfig {
            minimum_file_age: "10 sec".to_string(),
            maximum_file_age: Some("1 min".to_string()),
            minimum_file_size: "2 B".to_string(),
            maximum_file_size: Some("1 KB".to_string()),
            ..Default::default()
        };
        let filter = FileFilter::from_config(&config).unwrap();
        let now = Utc::now();

        assert!(filter.matches(&entity("/in/ok", 100, 30, now), now));
        assert!(!filter.matches(&entity("/in/young", 100, 5, now), now));
        assert!(!filter.matches(&entity("/in/old", 100, 120, now), now));
        assert!(!filter.matches(&entity("/in/tiny", 1, 30, now), now));
        assert!(!filter.matches(&entity("/in/huge", 1025, 30, now), now));
    }

    #[test]
    fn test_invalid_regex_fails_compilation() {
        let config = ListingConfig {
            file_filter: Some("(unclosed".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            FileFilter::from_config(&config).unwrap_err(),
            EdgeflowError::Regex(_)
        ));
    }

    #[test]
    fn test_invalid_age_fails_compilation() {
        let config = ListingConfig {
            minimum_file_age: "soon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            FileFilter::from_config(&config).unwrap_err(),
            EdgeflowError::Config(_)
        ));
    }
}
