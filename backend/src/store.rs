//! On-disk storage for the service: two singleton JSON documents replaced
//! atomically and one append-only event log.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicU64, Ordering},
};

use common::req::{LogChunk, Reading, State};
use serde::{de::DeserializeOwned, Serialize};

pub const LATEST_FILE: &str = "latest.json";
pub const STATE_FILE: &str = "state.json";
pub const LOG_FILE: &str = "events.log";

/// Bytes served when a client's offset no longer fits the log.
pub const TAIL_WINDOW: u64 = 8192;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to a fresh temp file next to `path`, then rename it over
/// `path`. Readers see either the old or the new content.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let tmp = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let res = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp, path));

    if res.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    res
}

/// A typed JSON document stored as a single file.
pub struct JsonDocument<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonDocument<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` if the document was never written.
    pub fn load(&self) -> io::Result<Option<T>> {
        match self.load_raw()? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn load_raw(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, doc: &T) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        write_atomic(&self.path, &bytes)
    }
}

/// Append-only plaintext log, tailed by byte offset.
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line under an exclusive file lock so concurrent writers
    /// never interleave.
    pub fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock()?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }

    /// Everything after byte `after`. An offset beyond the end of the log is
    /// realigned to the last [`TAIL_WINDOW`] bytes.
    pub fn tail(&self, after: u64) -> io::Result<LogChunk> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LogChunk::default()),
            Err(e) => return Err(e),
        };

        let size = file.metadata()?.len();
        let start = if after > size {
            size.saturating_sub(TAIL_WINDOW)
        } else {
            after
        };

        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        Ok(LogChunk {
            offset: start + buf.len() as u64,
            chunk: String::from_utf8_lossy(&buf).into_owned(),
            size,
        })
    }
}

/// The data directory and everything in it.
pub struct Store {
    pub latest: JsonDocument<Reading>,
    pub state: JsonDocument<State>,
    pub log: EventLog,
}

impl Store {
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            latest: JsonDocument::new(dir.join(LATEST_FILE)),
            state: JsonDocument::new(dir.join(STATE_FILE)),
            log: EventLog::new(dir.join(LOG_FILE)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    fn reading(temperature: f64) -> Reading {
        Reading {
            device: "medbot-01".to_string(),
            temperature,
            humidity: 45.0,
            time: 1_700_000_000,
            brand: "medbot".to_string(),
            rssi: Some(-61),
        }
    }

    #[test]
    fn missing_document_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert!(store.latest.load().unwrap().is_none());
        assert!(store.latest.load_raw().unwrap().is_none());
    }

    #[test]
    fn save_replaces_document_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.latest.save(&reading(20.0)).unwrap();
        store.latest.save(&reading(21.5)).unwrap();

        assert_eq!(store.latest.load().unwrap(), Some(reading(21.5)));
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![LATEST_FILE.to_string()]);
    }

    #[test]
    fn corrupted_document_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        fs::write(store.state.path(), b"{\"mode\": nope}").unwrap();

        let err = store.state.load().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let doc = JsonDocument::<Reading>::new(dir.path().join("gone").join(LATEST_FILE));
        assert!(doc.save(&reading(20.0)).is_err());
    }

    #[test]
    fn concurrent_saves_always_leave_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        store.latest.save(&reading(0.0)).unwrap();

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for n in 0..50 {
                        store.latest.save(&reading((i * 50 + n) as f64 / 10.0)).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            let doc = store.latest.load().unwrap();
            assert!(doc.is_some());
        }
        for w in writers {
            w.join().unwrap();
        }
        assert!(store.latest.load().unwrap().is_some());
    }

    #[test]
    fn concurrent_appends_keep_lines_whole() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    let line = format!("writer-{} {}\n", i, "x".repeat(512));
                    for _ in 0..25 {
                        store.log.append(&line).unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let log = fs::read_to_string(store.log.path()).unwrap();
        assert_eq!(log.lines().count(), 100);
        for line in log.lines() {
            assert!(line.starts_with("writer-"));
            assert!(line.ends_with(&"x".repeat(512)));
        }
    }

    #[test]
    fn tail_without_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.log.tail(0).unwrap(), LogChunk::default());
        assert_eq!(store.log.tail(500).unwrap(), LogChunk::default());
    }

    #[test]
    fn tail_resumes_from_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.log.append("first\n").unwrap();

        let chunk = store.log.tail(0).unwrap();
        assert_eq!(chunk.chunk, "first\n");
        assert_eq!(chunk.offset, 6);
        assert_eq!(chunk.size, 6);

        store.log.append("second\n").unwrap();
        let chunk = store.log.tail(chunk.offset).unwrap();
        assert_eq!(chunk.chunk, "second\n");
        assert_eq!(chunk.offset, 13);

        let chunk = store.log.tail(chunk.offset).unwrap();
        assert_eq!(chunk.chunk, "");
        assert_eq!(chunk.offset, chunk.size);
    }

    #[test]
    fn stale_offset_realigns_to_trailing_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let line = format!("{}\n", "a".repeat(99));
        for _ in 0..200 {
            store.log.append(&line).unwrap();
        }

        let chunk = store.log.tail(1_000_000).unwrap();
        assert_eq!(chunk.size, 20_000);
        assert_eq!(chunk.chunk.len() as u64, TAIL_WINDOW);
        assert_eq!(chunk.offset, chunk.size);
    }

    #[test]
    fn stale_offset_on_small_log_returns_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.log.append("only line\n").unwrap();

        let chunk = store.log.tail(4096).unwrap();
        assert_eq!(chunk.chunk, "only line\n");
        assert_eq!(chunk.offset, 10);
    }
}
