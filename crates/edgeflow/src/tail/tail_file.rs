use super::checksum::{extend_checksum, prefix_checksum};
use super::legacy::parse_legacy_state;
use super::reader::{parse_delimiter, read_records, ReadLimits, Record};
use super::rotation::{file_extension, file_stem, RollingPattern};
use super::state::{
    file_name_of, has_keyed_state, states_from_map, states_to_map, TailState, TrackingStatus,
};
use crate::config::TailConfig;
use crate::error::{EdgeflowError, Result};
use crate::flow::{FlowFile, FlowSession, ABSOLUTE_PATH, FILENAME, PATH};
use crate::listing::filter::full_match_regex;
use crate::listing::walker::list_dir;
use crate::state::StateStore;
use crate::store::{ContentRepository, ContentStore};
use crate::units::parse_time_period;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const FRAGMENT_BASE_NAME: &str = "fragment.base.name";
pub const FRAGMENT_POST_NAME: &str = "fragment.post.name";
pub const FRAGMENT_OFFSET: &str = "fragment.offset";

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailMode {
    Single,
    Multiple,
}

impl FromStr for TailMode {
    type Err = EdgeflowError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "single" | "single_file" => Ok(Self::Single),
            "multiple" | "multiple_file" | "multiple_files" => Ok(Self::Multiple),
            _ => Err(EdgeflowError::Config(format!("unknown tail mode '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialStartPosition {
    BeginningOfFile,
    BeginningOfTime,
    CurrentTime,
}

impl FromStr for InitialStartPosition {
    type Err = EdgeflowError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "beginning_of_file" => Ok(Self::BeginningOfFile),
            "beginning_of_time" => Ok(Self::BeginningOfTime),
            "current_time" => Ok(Self::CurrentTime),
            _ => Err(EdgeflowError::Config(format!(
                "unknown initial start position '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMode {
    PerDelimiter,
    PerBatch,
}

impl FromStr for ResultMode {
    type Err = EdgeflowError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "per_delimiter" | "flow_file_per_delimiter" => Ok(Self::PerDelimiter),
            "per_batch" | "flow_file_per_batch" => Ok(Self::PerBatch),
            _ => Err(EdgeflowError::Config(format!("unknown result mode '{}'", s))),
        }
    }
}

/// Outcome of one tailing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TailReport {
    pub flow_files: usize,
    pub records: usize,
    pub bytes: u64,
    /// Files skipped because they could not be read.
    pub skipped: usize,
}

/// Records read from one physical file during a pass.
struct Chunk {
    source: PathBuf,
    records: Vec<Record>,
}

enum Collected {
    Read(Vec<Chunk>),
    Missing,
}

/// Tails one file, or every file of a directory whose name matches a regex,
/// emitting new delimited records as flow files.
pub struct TailFile<S: StateStore> {
    mode: TailMode,
    file: Option<PathBuf>,
    base_directory: Option<PathBuf>,
    name_regex: Option<Regex>,
    recursive_lookup: bool,
    lookup_frequency: chrono::Duration,
    last_lookup: Option<DateTime<Utc>>,
    discovered: BTreeSet<PathBuf>,
    rolling: RollingPattern,
    limits: ReadLimits,
    initial_start: InitialStartPosition,
    result_mode: ResultMode,
    legacy_state_file: Option<PathBuf>,
    store: S,
}

impl<S: StateStore> TailFile<S> {
    /// Validate the configuration and compile patterns.
    pub fn on_schedule(config: &TailConfig, store: S) -> Result<Self> {
        let mode: TailMode = config.mode.parse()?;
        let file_name = config
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| {
                EdgeflowError::Config("File to Tail property missing or invalid".to_string())
            })?;

        let (file, base_directory, name_regex) = match mode {
            TailMode::Single => {
                let path = PathBuf::from(file_name);
                if path.parent().map_or(true, |p| p.as_os_str().is_empty()) {
                    return Err(EdgeflowError::Config(format!(
                        "File to Tail '{}' must include its directory",
                        file_name
                    )));
                }
                (Some(path), None, None)
            }
            TailMode::Multiple => {
                let base = config
                    .base_directory
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(PathBuf::from)
                    .ok_or_else(|| {
                        EdgeflowError::Config(
                            "Base Directory is required in multiple file mode".to_string(),
                        )
                    })?;
                if !base.is_dir() {
                    return Err(EdgeflowError::Config(format!(
                        "Base Directory '{}' is not an existing directory",
                        base.display()
                    )));
                }
                (None, Some(base), Some(full_match_regex(file_name)?))
            }
        };

        let lookup_frequency = chrono::Duration::from_std(parse_time_period(
            &config.lookup_frequency,
        )?)
        .map_err(|e| EdgeflowError::Config(format!("lookup frequency: {}", e)))?;

        Ok(Self {
            mode,
            file,
            base_directory,
            name_regex,
            recursive_lookup: config.recursive_lookup,
            lookup_frequency,
            last_lookup: None,
            discovered: BTreeSet::new(),
            rolling: RollingPattern::new(config.rolling_filename_pattern.clone())?,
            limits: ReadLimits {
                delimiter: parse_delimiter(&config.delimiter)?,
                max_records: config.batch_size.filter(|&n| n > 0),
                drain: false,
            },
            initial_start: config.initial_start_position.parse()?,
            result_mode: config.result_mode.parse()?,
            legacy_state_file: config
                .legacy_state_file
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            store,
        })
    }

    pub fn mode(&self) -> TailMode {
        self.mode
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one pass at the current time.
    pub fn on_trigger<R: ContentRepository>(
        &mut self,
        content: &ContentStore<R>,
        session: &mut dyn FlowSession,
    ) -> Result<TailReport> {
        self.on_trigger_at(content, session, Utc::now())
    }

    /// Run one pass as if the clock read `now`.
    pub fn on_trigger_at<R: ContentRepository>(
        &mut self,
        content: &ContentStore<R>,
        session: &mut dyn FlowSession,
        now: DateTime<Utc>,
    ) -> Result<TailReport> {
        // 1. Load everything before touching any file.
        let mut stored: BTreeMap<PathBuf, TailState> = self
            .load_states()?
            .into_iter()
            .map(|state| (state.path.clone(), state))
            .collect();
        let targets = self.targets(&stored, now);

        // 2. Read and emit per file. Files that cannot be read or stored keep
        //    their old state.
        let mut report = TailReport::default();
        let mut next = Vec::new();
        for path in targets {
            let (previous, is_new) = match stored.remove(&path) {
                Some(state) => (state, false),
                None => (TailState::new(&path), true),
            };
            let mut state = previous.clone();
            match self.collect(&mut state, is_new, now) {
                Ok(Collected::Read(chunks)) => match self.emit(&chunks, content, &mut report) {
                    Ok(flow_files) => {
                        for flow_file in flow_files {
                            session.transfer(flow_file);
                        }
                        next.push(state);
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to store tailed content, keeping previous position"
                        );
                        report.skipped += 1;
                        if !is_new {
                            next.push(previous);
                        }
                    }
                },
                Ok(Collected::Missing) => {
                    if self.mode == TailMode::Single && !is_new {
                        next.push(state);
                    } else {
                        debug!(path = %path.display(), "Tailed file is gone, dropping its state");
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read file, skipping");
                    report.skipped += 1;
                    if !is_new {
                        next.push(previous);
                    }
                }
            }
        }

        // 3. Persist once for the whole pass.
        self.store.set(&states_to_map(next.iter()))?;

        if report.records == 0 {
            debug!("No new data in tailed files");
            session.yield_processor();
        }
        Ok(report)
    }

    fn load_states(&self) -> Result<Vec<TailState>> {
        if let Some(map) = self.store.get()? {
            if has_keyed_state(&map) {
                return match states_from_map(&map) {
                    Ok(states) => {
                        debug!(files = states.len(), "Successfully loaded state");
                        Ok(states)
                    }
                    Err(e) => {
                        warn!(error = %e, "Stored tail state is unreadable, starting over");
                        Ok(Vec::new())
                    }
                };
            }
        }
        match &self.legacy_state_file {
            Some(legacy) if legacy.is_file() => match self.migrate_legacy(legacy) {
                Ok(states) => Ok(states),
                Err(e) => {
                    warn!(
                        path = %legacy.display(),
                        error = %e,
                        "Legacy tail state is unreadable, starting over"
                    );
                    Ok(Vec::new())
                }
            },
            _ => Ok(Vec::new()),
        }
    }

    fn migrate_legacy(&self, legacy: &Path) -> Result<Vec<TailState>> {
        let raw = fs::read_to_string(legacy).map_err(EdgeflowError::Io)?;
        let mut states = parse_legacy_state(&raw)?;
        let directory = self.lookup_directory();
        for state in &mut states {
            if state.path.is_relative() {
                if let Some(dir) = directory {
                    state.path = dir.join(&state.path);
                }
            }
            state.checksum = prefix_checksum(&state.path, state.position)?;
        }
        info!(
            path = %legacy.display(),
            files = states.len(),
            "Migrated legacy tail state"
        );
        Ok(states)
    }

    fn lookup_directory(&self) -> Option<&Path> {
        match self.mode {
            TailMode::Single => self.file.as_deref().and_then(Path::parent),
            TailMode::Multiple => self.base_directory.as_deref(),
        }
    }

    fn targets(
        &mut self,
        stored: &BTreeMap<PathBuf, TailState>,
        now: DateTime<Utc>,
    ) -> BTreeSet<PathBuf> {
        match self.mode {
            TailMode::Single => self.file.iter().cloned().collect(),
            TailMode::Multiple => {
                let due = self
                    .last_lookup
                    .map_or(true, |last| now - last >= self.lookup_frequency);
                if due {
                    self.discovered = self.lookup();
                    self.last_lookup = Some(now);
                }
                let mut targets = self.discovered.clone();
                targets.extend(stored.keys().filter(|p| self.in_scope(p)).cloned());
                targets
            }
        }
    }

    fn lookup(&self) -> BTreeSet<PathBuf> {
        let mut found = BTreeSet::new();
        let (Some(base), Some(regex)) = (&self.base_directory, &self.name_regex) else {
            return found;
        };
        list_dir(base, self.recursive_lookup, &mut |parent: &Path, name: &str| {
            if regex.is_match(name) {
                found.insert(parent.join(name));
            }
            true
        });
        debug!(base = %base.display(), files = found.len(), "Looked up files to tail");
        found
    }

    fn in_scope(&self, path: &Path) -> bool {
        let (Some(base), Some(regex)) = (&self.base_directory, &self.name_regex) else {
            return false;
        };
        let under_base = if self.recursive_lookup {
            path.starts_with(base)
        } else {
            path.parent() == Some(base.as_path())
        };
        under_base && regex.is_match(&file_name_of(path))
    }

    /// Work out the tracking status of one file and read whatever is new.
    fn collect(&self, state: &mut TailState, is_new: bool, now: DateTime<Utc>) -> Result<Collected> {
        let active_len = match fs::metadata(&state.path) {
            Ok(meta) if meta.is_file() => Some(meta.len()),
            Ok(_) => None,
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(EdgeflowError::Io(e)),
        };

        let (status, rotated) = if is_new {
            (TrackingStatus::Unknown, Vec::new())
        } else {
            self.assess(state, active_len)?
        };

        let mut chunks = Vec::new();
        match status {
            TrackingStatus::Unknown => {
                let Some(len) = active_len else {
                    return Ok(Collected::Missing);
                };
                match self.initial_start {
                    InitialStartPosition::CurrentTime => {
                        state.position = len;
                        state.checksum = prefix_checksum(&state.path, len)?;
                        state.last_read_time = now;
                        return Ok(Collected::Read(chunks));
                    }
                    InitialStartPosition::BeginningOfTime => {
                        for candidate in self.rolling.candidates(&state.path)? {
                            chunks.push(self.drain(&candidate.path, 0)?);
                        }
                    }
                    InitialStartPosition::BeginningOfFile => {}
                }
            }
            TrackingStatus::Tracked => {}
            TrackingStatus::RotatedAway => {
                info!(
                    path = %state.path.display(),
                    position = state.position,
                    rotated = rotated.len(),
                    "Rotation detected, finishing rotated files first"
                );
                for (path, start) in &rotated {
                    chunks.push(self.drain(path, *start)?);
                }
                state.reset();
                if active_len.is_none() {
                    state.last_read_time = now;
                    return Ok(Collected::Read(chunks));
                }
            }
            TrackingStatus::Truncated => {
                if active_len.is_none() {
                    return Ok(Collected::Missing);
                }
                warn!(
                    path = %state.path.display(),
                    position = state.position,
                    "File content no longer matches the stored checksum, reading from the beginning"
                );
                state.reset();
            }
        }

        let records = read_records(&state.path, state.position, self.limits)?;
        if let Some(last) = records.last() {
            let mut checksum = state.checksum.unwrap_or_default();
            for record in &records {
                checksum = extend_checksum(checksum, &record.bytes);
            }
            state.position = last.end();
            state.checksum = Some(checksum);
        }
        if !records.is_empty() || !chunks.is_empty() || is_new {
            state.last_read_time = now;
        }
        chunks.push(Chunk {
            source: state.path.clone(),
            records,
        });
        Ok(Collected::Read(chunks))
    }

    /// Decide between tracked, rotated away and truncated. A state without a
    /// checksum trusts its position as long as the file is long enough.
    fn assess(
        &self,
        state: &mut TailState,
        active_len: Option<u64>,
    ) -> Result<(TrackingStatus, Vec<(PathBuf, u64)>)> {
        if active_len.is_some_and(|len| len >= state.position) {
            match state.checksum {
                None => {
                    state.checksum = prefix_checksum(&state.path, state.position)?;
                    return Ok((TrackingStatus::Tracked, Vec::new()));
                }
                Some(expected) => {
                    if state.position == 0
                        || prefix_checksum(&state.path, state.position)? == Some(expected)
                    {
                        return Ok((TrackingStatus::Tracked, Vec::new()));
                    }
                }
            }
        }

        let rotated = self.rotation_plan(state)?;
        if rotated.is_empty() {
            Ok((TrackingStatus::Truncated, rotated))
        } else {
            Ok((TrackingStatus::RotatedAway, rotated))
        }
    }

    /// Rotated files to drain, with the offset to start each at.
    ///
    /// The continuation is the oldest candidate whose prefix has the stored
    /// checksum; it is read from the stored position. Newer candidates follow
    /// from offset 0 unless they are older than the last read (to the second).
    fn rotation_plan(&self, state: &TailState) -> Result<Vec<(PathBuf, u64)>> {
        let Some(checksum) = state.checksum else {
            return Ok(Vec::new());
        };
        if state.position == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.rolling.candidates(&state.path)?;
        let mut continuation = None;
        for (idx, candidate) in candidates.iter().enumerate() {
            if candidate.size >= state.position
                && prefix_checksum(&candidate.path, state.position)? == Some(checksum)
            {
                continuation = Some(idx);
                break;
            }
        }
        let Some(idx) = continuation else {
            return Ok(Vec::new());
        };

        let floor = DateTime::from_timestamp(state.last_read_time.timestamp(), 0).unwrap_or_default();
        let mut plan = vec![(candidates[idx].path.clone(), state.position)];
        plan.extend(
            candidates[idx + 1..]
                .iter()
                .filter(|c| c.modified >= floor)
                .map(|c| (c.path.clone(), 0)),
        );
        Ok(plan)
    }

    fn drain(&self, path: &Path, start: u64) -> Result<Chunk> {
        let limits = ReadLimits {
            max_records: None,
            drain: true,
            ..self.limits
        };
        Ok(Chunk {
            source: path.to_path_buf(),
            records: read_records(path, start, limits)?,
        })
    }

    /// Store every fragment of one file. Nothing is handed out unless all
    /// of them were stored; on failure the fragments already written are
    /// released again.
    fn emit<R: ContentRepository>(
        &self,
        chunks: &[Chunk],
        content: &ContentStore<R>,
        report: &mut TailReport,
    ) -> Result<Vec<FlowFile>> {
        let mut flow_files = Vec::new();
        let mut records = 0;
        let mut bytes_out = 0;
        for chunk in chunks.iter().filter(|c| !c.records.is_empty()) {
            records += chunk.records.len();
            let fragments: Vec<(u64, Vec<u8>)> = match self.result_mode {
                ResultMode::PerDelimiter => chunk
                    .records
                    .iter()
                    .map(|r| (r.offset, r.bytes.clone()))
                    .collect(),
                ResultMode::PerBatch => vec![(
                    chunk.records[0].offset,
                    chunk
                        .records
                        .iter()
                        .flat_map(|r| r.bytes.iter().copied())
                        .collect(),
                )],
            };
            for (offset, bytes) in fragments {
                match store_fragment(&chunk.source, offset, &bytes, content) {
                    Ok(flow_file) => {
                        bytes_out += bytes.len() as u64;
                        flow_files.push(flow_file);
                    }
                    Err(e) => {
                        release(&flow_files, content);
                        return Err(e);
                    }
                }
            }
        }
        report.records += records;
        report.flow_files += flow_files.len();
        report.bytes += bytes_out;
        Ok(flow_files)
    }
}

/// `app.log` bytes 14..=34 become `app.14-34.log`.
pub fn fragment_name(file_name: &str, start: u64, len: u64) -> String {
    let end = (start + len).saturating_sub(1);
    let stem = file_stem(file_name);
    match file_extension(file_name) {
        Some(ext) => format!("{}.{}-{}.{}", stem, start, end, ext),
        None => format!("{}.{}-{}", stem, start, end),
    }
}

fn store_fragment<R: ContentRepository>(
    source: &Path,
    offset: u64,
    bytes: &[u8],
    content: &ContentStore<R>,
) -> Result<FlowFile> {
    let name = file_name_of(source);
    let claim = content.create_claim();
    content.increment_claimant_count(&claim);
    if let Err(e) = content.write_bytes(&claim, bytes, false) {
        if let Err(release_err) = content.decrement_claimant_count(&claim) {
            warn!(claim = %claim, error = %release_err, "Failed to release content claim");
        }
        return Err(e);
    }

    let directory = source
        .parent()
        .map(|p| format!("{}{}", p.display(), MAIN_SEPARATOR))
        .unwrap_or_default();
    let mut flow_file = FlowFile::new()
        .with_attribute(FILENAME, fragment_name(&name, offset, bytes.len() as u64))
        .with_attribute(PATH, directory)
        .with_attribute(ABSOLUTE_PATH, source.to_string_lossy())
        .with_attribute(FRAGMENT_BASE_NAME, file_stem(&name))
        .with_attribute(FRAGMENT_POST_NAME, file_extension(&name).unwrap_or_default())
        .with_attribute(FRAGMENT_OFFSET, offset.to_string());
    flow_file.set_content(claim, bytes.len() as u64);
    Ok(flow_file)
}

fn release<R: ContentRepository>(flow_files: &[FlowFile], content: &ContentStore<R>) {
    for claim in flow_files.iter().filter_map(FlowFile::claim) {
        if let Err(e) = content.decrement_claimant_count(claim) {
            warn!(claim = %claim, error = %e, "Failed to release content claim");
        }
    }
}
