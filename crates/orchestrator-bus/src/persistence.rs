//! Durable JSONL sink for the Event Bus (C2).
//!
//! One event per line, UTF-8, LF-terminated, rotated by size. File names
//! follow `events-YYYYMMDD-HHMMSS-<startseq>.jsonl`, so a directory
//! listing sorts into creation order even across a clock that's been
//! reset, with the zero-padded start `seq` as the final, always-reliable
//! tiebreaker.

use orchestrator_core::event::Event;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Configuration for the JSONL sink's durability cadence and rotation.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// fsync after this many appended events, whichever of this and
    /// `fsync_every_ms` comes first.
    pub fsync_every_events: u32,
    /// fsync after this many milliseconds since the last fsync.
    pub fsync_every_ms: u64,
    /// Rotate to a new file once the current one reaches this size.
    pub rotate_bytes: u64,
    /// Whether `heartbeat` events are written to the log at all.
    /// Persisted by default.
    pub persist_heartbeats: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            fsync_every_events: 32,
            fsync_every_ms: 200,
            rotate_bytes: 64 * 1024 * 1024,
            persist_heartbeats: true,
        }
    }
}

/// Append-only JSONL writer backing one bus. Single-writer by
/// construction: the bus holds the only handle and serializes all
/// appends through its own lock before calling [`Self::append`].
pub struct EventLogWriter {
    dir: PathBuf,
    config: LogConfig,
    file: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    bytes_written: u64,
    events_since_fsync: u32,
    last_fsync: std::time::Instant,
}

impl EventLogWriter {
    /// Create a writer that will create files under `dir` (created if
    /// missing) as events are appended. No file is opened until the
    /// first `append`.
    pub fn new(dir: impl Into<PathBuf>, config: LogConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
            file: None,
            current_path: None,
            bytes_written: 0,
            events_since_fsync: 0,
            last_fsync: std::time::Instant::now(),
        }
    }

    /// Path of the file currently being written, if any has been opened yet.
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    async fn ensure_open(&mut self, start_seq: u64) -> std::io::Result<()> {
        if self.file.is_some() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).await?;
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = self.dir.join(format!("events-{timestamp}-{start_seq:020}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        self.bytes_written = file.metadata().await.map(|m| m.len()).unwrap_or(0);
        self.file = Some(BufWriter::new(file));
        self.current_path = Some(path);
        Ok(())
    }

    async fn rotate(&mut self, next_seq: u64) -> std::io::Result<()> {
        if let Some(mut f) = self.file.take() {
            f.flush().await?;
            f.get_ref().sync_all().await?;
        }
        self.current_path = None;
        self.bytes_written = 0;
        self.ensure_open(next_seq).await
    }

    /// Serialize and append one event, rotating and fsyncing per
    /// `LogConfig`. Returns whether this call fsynced (and so left
    /// nothing from this event, or any earlier unfsynced one, pending).
    /// Heartbeats are skipped entirely when `persist_heartbeats` is
    /// `false`, which leaves nothing pending for them either.
    pub async fn append(&mut self, event: &Event) -> std::io::Result<bool> {
        if !self.config.persist_heartbeats && event.act == orchestrator_core::payload::Act::Heartbeat {
            return Ok(true);
        }
        if self.bytes_written >= self.config.rotate_bytes {
            self.rotate(event.seq).await?;
        } else {
            self.ensure_open(event.seq).await?;
        }

        let mut line = serde_json::to_vec(event)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        line.push(b'\n');
        let len = line.len() as u64;

        let file = self.file.as_mut().expect("ensure_open just ran");
        file.write_all(&line).await?;
        self.bytes_written += len;
        self.events_since_fsync += 1;

        let due_by_count = self.events_since_fsync >= self.config.fsync_every_events;
        let due_by_time = self.last_fsync.elapsed().as_millis() as u64 >= self.config.fsync_every_ms;
        if due_by_count || due_by_time {
            self.fsync().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Force an fsync now, resetting the cadence counters.
    pub async fn fsync(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().await?;
            file.get_ref().sync_all().await?;
        }
        self.events_since_fsync = 0;
        self.last_fsync = std::time::Instant::now();
        Ok(())
    }
}

/// Scan `dir` for the highest `seq` recorded across all `events-*.jsonl`
/// files, tolerating a truncated final line in the most recent file.
/// Returns `0` (meaning "start fresh") if `dir` does not exist or
/// contains no well-formed lines.
pub async fn recover_last_seq(dir: &Path) -> std::io::Result<u64> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut last_seq = 0u64;
    for path in paths {
        let contents = fs::read_to_string(&path).await?;
        for line in contents.lines() {
            if let Ok(event) = serde_json::from_str::<Event>(line) {
                last_seq = last_seq.max(event.seq);
            }
            // A truncated final line fails to parse; skip it and continue,
            // per spec: readers tolerate a truncated final line on startup.
        }
    }
    Ok(last_seq)
}
