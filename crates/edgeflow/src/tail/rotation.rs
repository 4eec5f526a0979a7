use crate::error::{EdgeflowError, Result};
use chrono::{DateTime, Utc};
use globset::{GlobBuilder, GlobMatcher};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

const FILENAME_PLACEHOLDER: &str = "${filename}";

/// A file that looks like a rotated copy of a tailed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Glob template for rotated file names, e.g. `${filename}.*`.
///
/// `${filename}` is replaced by the tailed file's name without extension.
/// The glob is matched against names in the tailed file's directory.
/// Each stem's glob is compiled once and reused on later passes.
#[derive(Debug)]
pub struct RollingPattern {
    template: String,
    matchers: Mutex<HashMap<String, GlobMatcher>>,
}

impl RollingPattern {
    /// Validate the template once by compiling it with a sample name.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let pattern = Self {
            template: template.into(),
            matchers: Mutex::new(HashMap::new()),
        };
        pattern.compile("sample")?;
        Ok(pattern)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// The glob for one tailed file stem.
    pub fn matcher_for(&self, stem: &str) -> Result<GlobMatcher> {
        let mut matchers = self.matchers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(matcher) = matchers.get(stem) {
            return Ok(matcher.clone());
        }
        let matcher = self.compile(stem)?;
        matchers.insert(stem.to_string(), matcher.clone());
        Ok(matcher)
    }

    pub fn cached_matchers(&self) -> usize {
        self.matchers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn compile(&self, stem: &str) -> Result<GlobMatcher> {
        let glob = self
            .template
            .replace(FILENAME_PLACEHOLDER, &escape_glob(stem));
        let matcher = GlobBuilder::new(&glob)
            .literal_separator(true)
            .build()?
            .compile_matcher();
        Ok(matcher)
    }

    /// Rotated copies of `active`, oldest first (mtime, then name).
    ///
    /// The active file itself never counts as a candidate.
    pub fn candidates(&self, active: &Path) -> Result<Vec<RotatedFile>> {
        let (Some(dir), Some(name)) = (active.parent(), active.file_name()) else {
            return Err(EdgeflowError::Config(format!(
                "'{}' has no parent directory",
                active.display()
            )));
        };
        let name = name.to_string_lossy();
        let matcher = self.matcher_for(file_stem(&name))?;

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to open directory while looking for rotated files");
                return Ok(Vec::new());
            }
        };

        let mut found = Vec::new();
        for entry in entries.flatten() {
            let candidate_name = entry.file_name();
            let candidate_name = candidate_name.to_string_lossy();
            if candidate_name == name || !matcher.is_match(&*candidate_name) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            found.push(RotatedFile {
                path: entry.path(),
                size: meta.len(),
                modified,
            });
        }
        found.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(found)
    }
}

/// Name without its last extension: `app.log` -> `app`, `app` -> `app`.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Extension after the last dot, if any.
pub fn file_extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '*' | '?' | '[' | ']' | '{' | '}' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
