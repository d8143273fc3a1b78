//! Append-only JSONL audit trail of store writes.
//!
//! One self-contained JSON object per line, assembled in memory and written
//! with a single `write_all` so tailing readers never see a partial line.
//!
//! Fallback chain:
//! 1. Primary file path
//! 2. stderr with `[KIB-AUDIT]` prefix
//! 3. Silent discard (a write operation never fails because auditing did)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{KibError, Result};
use crate::store::WriteBatch;

/// One audited write operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    /// Operation name, e.g. `rename_pet`.
    pub op: String,
    pub device: String,
    /// Every path the batch wrote.
    pub paths: Vec<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditEntry {
    /// Entry stamped with the current UTC time.
    pub fn new(op: &str, device: &str, batch: &WriteBatch) -> Self {
        Self {
            ts: format_utc_now(),
            op: op.to_string(),
            device: device.to_string(),
            paths: batch.paths().iter().map(ToString::to_string).collect(),
            ok: true,
            error_code: None,
            error_message: None,
        }
    }

    #[must_use]
    pub fn failed(mut self, err: &KibError) -> Self {
        self.ok = false;
        self.error_code = Some(err.code().to_string());
        self.error_message = Some(err.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub path: PathBuf,
    /// Rotate once the file would grow past this. Default: 10 MiB.
    pub max_size_bytes: u64,
    /// Rotated files to keep. Default: 3.
    pub max_rotated_files: u32,
}

impl AuditConfig {
    #[must_use]
    pub fn at(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

/// Rotating JSONL writer. Not shared; see [`AuditLog`] for the `&self` handle.
pub struct AuditWriter {
    config: AuditConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
}

impl AuditWriter {
    /// Open the log file, falling through the degradation chain on failure.
    pub fn open(config: AuditConfig) -> Self {
        let mut w = Self {
            config,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
        };
        match open_append(&w.config.path) {
            Ok((file, size)) => {
                w.writer = Some(BufWriter::new(file));
                w.state = WriterState::Normal;
                w.bytes_written = size;
            }
            Err(err) => {
                let _ = writeln!(io::stderr(), "[KIB-AUDIT] {err}; auditing to stderr");
                w.state = WriterState::Stderr;
            }
        }
        w
    }

    pub fn write_entry(&mut self, entry: &AuditEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[KIB-AUDIT] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    pub fn state(&self) -> &str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.state == WriterState::Normal
            && self.bytes_written + line.len() as u64 > self.config.max_size_bytes
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal => {
                let written = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).and_then(|()| w.flush()).is_ok());
                if written {
                    self.bytes_written += line.len() as u64;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                if write!(io::stderr(), "[KIB-AUDIT] {line}").is_err() {
                    self.degrade();
                }
            }
            WriterState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        self.state = match self.state {
            WriterState::Normal => {
                let _ = writeln!(io::stderr(), "[KIB-AUDIT] file write failed, using stderr");
                WriterState::Stderr
            }
            WriterState::Stderr | WriterState::Discard => WriterState::Discard,
        };
    }

    fn rotate(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
        self.writer = None;
        let base = self.config.path.clone();

        // .N is dropped, .N-1 → .N, ..., current → .1
        let _ = fs::remove_file(rotated_name(&base, self.config.max_rotated_files));
        for i in (1..self.config.max_rotated_files).rev() {
            let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        let _ = rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                self.writer = Some(BufWriter::new(file));
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

impl Drop for AuditWriter {
    fn drop(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }
}

/// Thread-safe audit handle shared by write operations.
pub struct AuditLog {
    inner: Mutex<AuditWriter>,
}

impl AuditLog {
    pub fn open(config: AuditConfig) -> Self {
        Self {
            inner: Mutex::new(AuditWriter::open(config)),
        }
    }

    pub fn record(&self, entry: &AuditEntry) {
        self.inner.lock().write_entry(entry);
    }

    pub fn state(&self) -> String {
        self.inner.lock().state().to_string()
    }
}

/// Parse every well-formed entry in an audit file; malformed lines are skipped.
pub fn read_entries(path: &Path) -> Result<Vec<AuditEntry>> {
    let raw = fs::read_to_string(path).map_err(|source| KibError::io(path, source))?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| KibError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| KibError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `audit.jsonl` → `audit.jsonl.2`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

pub(crate) fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
