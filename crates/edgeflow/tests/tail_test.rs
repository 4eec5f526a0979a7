use chrono::{DateTime, Utc};
use edgeflow::config::TailConfig;
use edgeflow::flow::{RecordingSession, FILENAME};
use edgeflow::state::{FileStateStore, MemStateStore, StateMap, StateStore};
use edgeflow::store::{ByteStream, ContentClaim, ContentRepository, ContentStore, VolatileRepository};
use edgeflow::tail::TailFile;
use edgeflow::{EdgeflowError, Result};
use filetime::{set_file_mtime, FileTime};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    content: ContentStore<VolatileRepository>,
}

fn setup() -> Harness {
    Harness {
        dir: TempDir::new().unwrap(),
        content: ContentStore::with_repository(VolatileRepository::new()),
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn single(path: &Path) -> TailConfig {
    TailConfig {
        file_name: Some(path.display().to_string()),
        ..Default::default()
    }
}

fn append(path: &Path, data: &str) {
    let mut file = OpenOptions::new().append(true).create(true).open(path).unwrap();
    file.write_all(data.as_bytes()).unwrap();
}

fn set_mtime(path: &Path, secs: i64) {
    set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

fn texts(h: &Harness, session: &RecordingSession) -> Vec<String> {
    session
        .transferred
        .iter()
        .map(|ff| String::from_utf8(h.content.read_bytes(ff.claim().unwrap()).unwrap().unwrap()).unwrap())
        .collect()
}

fn position(store: &dyn StateStore, index: usize) -> Option<String> {
    store
        .get()
        .unwrap()
        .and_then(|map| map.get(&format!("file.{}.position", index)).cloned())
}

#[test]
fn test_restart_with_unchanged_file_emits_nothing() {
    let h = setup();
    let path = h.dir.path().join("app.log");
    fs::write(&path, "first\nsecond\n").unwrap();
    let state_dir = h.dir.path().join("state");

    let mut tail = TailFile::on_schedule(&single(&path), FileStateStore::new(&state_dir, "tail-file")).unwrap();
    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["first\n", "second\n"]);

    // A new processor over the same state directory.
    let mut tail = TailFile::on_schedule(&single(&path), FileStateStore::new(&state_dir, "tail-file")).unwrap();
    let mut session = RecordingSession::new();
    let report = tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(report.records, 0);
    assert!(session.yielded());
}

#[test]
fn test_truncated_file_is_read_from_start() {
    let h = setup();
    let path = h.dir.path().join("app.log");
    fs::write(&path, "abcdef\n").unwrap();
    let store = MemStateStore::new();
    let mut tail = TailFile::on_schedule(&single(&path), &store).unwrap();
    tail.on_trigger(&h.content, &mut RecordingSession::new()).unwrap();
    assert_eq!(position(&store, 0).as_deref(), Some("7"));

    // Shorter than the stored position.
    fs::write(&path, "xy\n").unwrap();
    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["xy\n"]);
    assert_eq!(position(&store, 0).as_deref(), Some("3"));

    // Same length or longer, different prefix.
    fs::write(&path, "XY\nmore\n").unwrap();
    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["XY\n", "more\n"]);
    assert_eq!(position(&store, 0).as_deref(), Some("8"));
}

#[test]
fn test_rotated_file_is_finished_before_new_one() {
    let h = setup();
    let path = h.dir.path().join("app.log");
    fs::write(&path, "0123456789abcdefghi\n").unwrap();
    let store = MemStateStore::new();
    let mut tail = TailFile::on_schedule(&single(&path), &store).unwrap();
    tail.on_trigger(&h.content, &mut RecordingSession::new()).unwrap();
    assert_eq!(position(&store, 0).as_deref(), Some("20"));

    append(&path, "tail of old\n");
    fs::rename(&path, h.dir.path().join("app.log.1")).unwrap();
    fs::write(&path, "fresh\n").unwrap();

    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["tail of old\n", "fresh\n"]);
    assert_eq!(
        session.attribute_values(FILENAME),
        vec!["app.log.20-31.1", "app.0-5.log"]
    );
    assert_eq!(position(&store, 0).as_deref(), Some("6"));
}

#[test]
fn test_rotated_file_without_trailing_delimiter_is_drained() {
    let h = setup();
    let path = h.dir.path().join("app.log");
    fs::write(&path, "done\npartial").unwrap();
    let store = MemStateStore::new();
    let mut tail = TailFile::on_schedule(&single(&path), &store).unwrap();
    tail.on_trigger(&h.content, &mut RecordingSession::new()).unwrap();
    assert_eq!(position(&store, 0).as_deref(), Some("5"));

    fs::rename(&path, h.dir.path().join("app.0")).unwrap();
    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["partial"]);
}

#[test]
fn test_several_rotations_between_passes() {
    let h = setup();
    let path = h.dir.path().join("fruit.log");
    let store = MemStateStore::new();
    fs::write(&path, "apple\n").unwrap();
    let mut tail = TailFile::on_schedule(&single(&path), &store).unwrap();
    tail.on_trigger_at(&h.content, &mut RecordingSession::new(), at(1_000)).unwrap();

    // A stale rotated file from long ago that must be ignored.
    let stale = h.dir.path().join("fruit.old");
    fs::write(&stale, "ancient\n").unwrap();
    set_mtime(&stale, 500);

    append(&path, "banana\n");
    fs::rename(&path, h.dir.path().join("fruit.0")).unwrap();
    set_mtime(&h.dir.path().join("fruit.0"), 1_010);
    fs::write(&path, "cherry\n").unwrap();
    fs::rename(&path, h.dir.path().join("fruit.1")).unwrap();
    set_mtime(&h.dir.path().join("fruit.1"), 1_020);
    fs::write(&path, "date\n").unwrap();

    let mut session = RecordingSession::new();
    tail.on_trigger_at(&h.content, &mut session, at(1_030)).unwrap();
    assert_eq!(texts(&h, &session), vec!["banana\n", "cherry\n", "date\n"]);
    assert_eq!(
        session.attribute_values(FILENAME),
        vec!["fruit.6-12.0", "fruit.0-6.1", "fruit.0-4.log"]
    );
}

#[test]
fn test_beginning_of_time_reads_rotated_files_first() {
    let h = setup();
    let path = h.dir.path().join("app.log");
    fs::write(h.dir.path().join("app.log.2"), "oldest\n").unwrap();
    set_mtime(&h.dir.path().join("app.log.2"), 100);
    fs::write(h.dir.path().join("app.log.1"), "older\n").unwrap();
    set_mtime(&h.dir.path().join("app.log.1"), 200);
    fs::write(&path, "current\n").unwrap();

    let cfg = TailConfig {
        initial_start_position: "beginning_of_time".to_string(),
        ..single(&path)
    };
    let mut tail = TailFile::on_schedule(&cfg, MemStateStore::new()).unwrap();
    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["oldest\n", "older\n", "current\n"]);
}

#[test]
fn test_cleared_state_rereads_file() {
    let h = setup();
    let path = h.dir.path().join("app.log");
    fs::write(&path, "one\n").unwrap();
    let store = MemStateStore::new();
    let mut tail = TailFile::on_schedule(&single(&path), &store).unwrap();
    tail.on_trigger(&h.content, &mut RecordingSession::new()).unwrap();

    store.clear().unwrap();
    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["one\n"]);
}

#[test]
fn test_switching_file_starts_fresh() {
    let h = setup();
    let first = h.dir.path().join("first.log");
    let second = h.dir.path().join("second.log");
    fs::write(&first, "1\n").unwrap();
    fs::write(&second, "2\n").unwrap();
    let store = MemStateStore::new();

    let mut tail = TailFile::on_schedule(&single(&first), &store).unwrap();
    tail.on_trigger(&h.content, &mut RecordingSession::new()).unwrap();

    let mut tail = TailFile::on_schedule(&single(&second), &store).unwrap();
    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["2\n"]);

    let map = store.get().unwrap().unwrap();
    assert_eq!(map.get("file.0.name").map(String::as_str), Some("second.log"));
    assert!(!map.contains_key("file.1.name"));
}

#[test]
fn test_legacy_state_is_migrated_once() {
    let h = setup();
    let path = h.dir.path().join("agent-tmpfile.txt");
    fs::write(&path, "one,two,three\nfour,five,six, seven\n").unwrap();
    let legacy = h.dir.path().join("tail.state");
    fs::write(&legacy, format!("FILENAME={}\nPOSITION=14\n", path.display())).unwrap();

    let cfg = TailConfig {
        legacy_state_file: Some(legacy.display().to_string()),
        ..single(&path)
    };
    let store = MemStateStore::new();
    let mut tail = TailFile::on_schedule(&cfg, &store).unwrap();

    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(
        session.attribute_values(FILENAME),
        vec!["agent-tmpfile.14-34.txt"]
    );
    assert_eq!(position(&store, 0).as_deref(), Some("35"));
    let map = store.get().unwrap().unwrap();
    assert_eq!(
        map.get("file.0.checksum"),
        Some(&crc32fast::hash(b"one,two,three\nfour,five,six, seven\n").to_string())
    );

    // Keyed state now exists; the legacy file no longer matters.
    append(&path, "eight\n");
    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["eight\n"]);
}

#[test]
fn test_legacy_state_with_several_files() {
    let h = setup();
    let a = h.dir.path().join("a.log");
    let b = h.dir.path().join("b.log");
    fs::write(&a, "xx\nyy\n").unwrap();
    fs::write(&b, "zz\n").unwrap();
    let legacy = h.dir.path().join("tail.state");
    fs::write(
        &legacy,
        format!(
            "FILENAME=a.log\nPOSITION.a.log=3\nCURRENT.a.log={}\nFILENAME=b.log\nPOSITION.b.log=3\n",
            a.display()
        ),
    )
    .unwrap();

    let cfg = TailConfig {
        mode: "multiple".to_string(),
        file_name: Some(".*\\.log".to_string()),
        base_directory: Some(h.dir.path().display().to_string()),
        legacy_state_file: Some(legacy.display().to_string()),
        ..Default::default()
    };
    let mut tail = TailFile::on_schedule(&cfg, MemStateStore::new()).unwrap();
    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["yy\n"]);
}

#[test]
fn test_unreadable_legacy_state_starts_over() {
    let h = setup();
    let path = h.dir.path().join("app.log");
    fs::write(&path, "a\nb\n").unwrap();
    let legacy = h.dir.path().join("tail.state");
    fs::write(&legacy, "FILENAME=app.log\nPOSITION=garbage\n").unwrap();

    let cfg = TailConfig {
        legacy_state_file: Some(legacy.display().to_string()),
        ..single(&path)
    };
    let store = MemStateStore::new();
    let mut tail = TailFile::on_schedule(&cfg, &store).unwrap();

    let mut session = RecordingSession::new();
    tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(texts(&h, &session), vec!["a\n", "b\n"]);
    assert_eq!(position(&store, 0).as_deref(), Some("4"));

    let mut session = RecordingSession::new();
    let report = tail.on_trigger(&h.content, &mut session).unwrap();
    assert_eq!(report.records, 0);
}

fn multiple(dir: &Path) -> TailConfig {
    TailConfig {
        mode: "multiple".to_string(),
        file_name: Some(".*\\.log".to_string()),
        base_directory: Some(dir.display().to_string()),
        lookup_frequency: "0 sec".to_string(),
        ..Default::default()
    }
}

#[test]
fn test_unreadable_file_is_skipped_and_others_still_emit() {
    let h = setup();
    fs::write(h.dir.path().join("a.log"), "a1\n").unwrap();
    fs::write(h.dir.path().join("b.log"), "").unwrap();
    // A regular file used as a directory: stat fails with something other
    // than "not found".
    fs::write(h.dir.path().join("plain"), "x").unwrap();
    let broken = h.dir.path().join("plain").join("x.log");

    let mut map = StateMap::new();
    map.insert("file.0.name".to_string(), "x.log".to_string());
    map.insert("file.0.position".to_string(), "2".to_string());
    map.insert("file.0.current".to_string(), broken.display().to_string());
    let store = MemStateStore::new();
    store.set(&map).unwrap();

    let cfg = TailConfig {
        recursive_lookup: true,
        ..multiple(h.dir.path())
    };
    let mut tail = TailFile::on_schedule(&cfg, &store).unwrap();
    let mut session = RecordingSession::new();
    let report = tail.on_trigger(&h.content, &mut session).unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(texts(&h, &session), vec!["a1\n"]);
    // b.log had nothing, a.log had a record: no yield.
    assert!(!session.yielded());

    let map = store.get().unwrap().unwrap();
    let names: Vec<&str> = (0..3)
        .filter_map(|i| map.get(&format!("file.{}.name", i)).map(String::as_str))
        .collect();
    assert_eq!(names, vec!["a.log", "b.log", "x.log"]);
}

/// Volatile repository whose `fail_at`-th write (1-based) fails.
struct FailingWrite {
    inner: VolatileRepository,
    fail_at: usize,
    writes: AtomicUsize,
}

impl ContentRepository for FailingWrite {
    fn write(&self, claim: &ContentClaim, append: bool) -> Result<Box<dyn ByteStream>> {
        if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
            return Err(EdgeflowError::Storage("disk full".to_string()));
        }
        self.inner.write(claim, append)
    }

    fn read(&self, claim: &ContentClaim) -> Result<Option<Box<dyn ByteStream>>> {
        self.inner.read(claim)
    }

    fn exists(&self, claim: &ContentClaim) -> bool {
        self.inner.exists(claim)
    }

    fn remove_key(&self, key: &str) -> Result<bool> {
        self.inner.remove_key(key)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        self.inner.list_keys()
    }

    fn repository_size(&self) -> u64 {
        self.inner.repository_size()
    }

    fn repository_entry_count(&self) -> u64 {
        self.inner.repository_entry_count()
    }
}

#[test]
fn test_write_failure_skips_only_that_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.log"), "a1\n").unwrap();
    fs::write(dir.path().join("b.log"), "b1\nb2\n").unwrap();
    let content = ContentStore::with_repository(FailingWrite {
        inner: VolatileRepository::new(),
        fail_at: 3,
        writes: AtomicUsize::new(0),
    });
    let read = |session: &RecordingSession| -> Vec<String> {
        session
            .transferred
            .iter()
            .map(|ff| String::from_utf8(content.read_bytes(ff.claim().unwrap()).unwrap().unwrap()).unwrap())
            .collect()
    };
    let store = MemStateStore::new();
    let mut tail = TailFile::on_schedule(&multiple(dir.path()), &store).unwrap();

    // 1. b.log's second fragment fails: its first one is released again.
    let mut session = RecordingSession::new();
    let report = tail.on_trigger(&content, &mut session).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.records, 1);
    assert_eq!(read(&session), vec!["a1\n"]);
    assert_eq!(content.stats().entries, 1);
    assert_eq!(content.stats().claims, 1);
    assert_eq!(position(&store, 0).as_deref(), Some("3"));
    assert!(!store.get().unwrap().unwrap().contains_key("file.1.name"));

    // 2. a.log is not re-emitted; b.log is read in full.
    let mut session = RecordingSession::new();
    tail.on_trigger(&content, &mut session).unwrap();
    assert_eq!(read(&session), vec!["b1\n", "b2\n"]);
}
