//! JSONL activity log: one self-contained JSON object per line.
//!
//! Lines are built in memory and handed to the sink with a single
//! `write_all`, so a tailing reader never sees half a record.
//!
//! Sinks degrade in order: primary file, fallback file, stderr
//! (`[CFE-JSONL]` prefix), discard. Logging never fails the engine.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::LoggingConfig;
use crate::core::errors::{FeedError, Result};
use crate::feed::model::{AnnouncementId, FilterKey, SectionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Activity record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EngineStart,
    SelectionChange,
    FetchFailure,
    StaleDiscard,
    ReadAcknowledged,
    AcknowledgeFailure,
    TraversalStart,
    TraversalExhausted,
    SessionChange,
    Error,
}

/// One JSONL record. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<AnnouncementId>,
    /// Selection epoch or traversal session the record belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Empty record stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            section: None,
            filter: None,
            item_id: None,
            epoch: None,
            cursor: None,
            remaining: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    /// Attach the code and message of `error`.
    #[must_use]
    pub fn with_error(mut self, error: &FeedError) -> Self {
        self.ok = Some(false);
        self.error_code = Some(error.code().to_string());
        self.error_message = Some(error.to_string());
        self
    }
}

/// Where lines currently go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkLevel {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl SinkLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the active file would exceed this size.
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

impl From<&LoggingConfig> for JsonlConfig {
    fn from(cfg: &LoggingConfig) -> Self {
        Self {
            path: cfg.jsonl_log.clone(),
            fallback_path: cfg.fallback_path.clone(),
            max_size_bytes: cfg.max_size_bytes,
            max_rotated_files: cfg.max_rotated_files,
        }
    }
}

struct OpenFile {
    path: PathBuf,
    out: BufWriter<File>,
    size: u64,
}

/// Append-only writer with size rotation and sink degradation.
pub struct JsonlWriter {
    config: JsonlConfig,
    level: SinkLevel,
    file: Option<OpenFile>,
    lines: u64,
}

impl JsonlWriter {
    /// Open the best available sink.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            level: SinkLevel::Primary,
            file: None,
            lines: 0,
        };
        writer.settle(SinkLevel::Primary);
        writer
    }

    #[must_use]
    pub const fn level(&self) -> SinkLevel {
        self.level
    }

    /// Lines accepted by a file sink since open.
    #[must_use]
    pub const fn lines_written(&self) -> u64 {
        self.lines
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.write_line(&line);
            }
            Err(error) => {
                let _ = writeln!(io::stderr(), "[CFE-JSONL] serialize error: {error}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.out.flush();
        }
    }

    /// Return to the primary file if it has become writable again.
    pub fn try_recover(&mut self) {
        if self.level == SinkLevel::Primary {
            return;
        }
        if let Ok(file) = open_append(&self.config.path) {
            self.flush();
            self.file = Some(file);
            self.level = SinkLevel::Primary;
        }
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        loop {
            match self.level {
                SinkLevel::Primary | SinkLevel::Fallback => {
                    let needs_rotation = self
                        .file
                        .as_ref()
                        .is_some_and(|f| f.size > 0 && f.size + len > self.config.max_size_bytes);
                    if needs_rotation {
                        self.rotate();
                        continue;
                    }
                    let written = self
                        .file
                        .as_mut()
                        .is_some_and(|f| f.out.write_all(line.as_bytes()).is_ok());
                    if written {
                        if let Some(file) = self.file.as_mut() {
                            file.size += len;
                        }
                        self.lines += 1;
                        return;
                    }
                    self.degrade();
                }
                SinkLevel::Stderr => {
                    if write!(io::stderr(), "[CFE-JSONL] {line}").is_err() {
                        self.level = SinkLevel::Discard;
                    }
                    return;
                }
                SinkLevel::Discard => return,
            }
        }
    }

    /// Open the first working sink at or below `from`.
    fn settle(&mut self, from: SinkLevel) {
        self.file = None;
        if from == SinkLevel::Primary {
            if let Ok(file) = open_append(&self.config.path) {
                self.file = Some(file);
                self.level = SinkLevel::Primary;
                return;
            }
        }
        if matches!(from, SinkLevel::Primary | SinkLevel::Fallback) {
            if let Some(fallback) = self.config.fallback_path.as_deref() {
                if let Ok(file) = open_append(fallback) {
                    let _ = writeln!(
                        io::stderr(),
                        "[CFE-JSONL] primary log unavailable, using {}",
                        fallback.display()
                    );
                    self.file = Some(file);
                    self.level = SinkLevel::Fallback;
                    return;
                }
            }
            let _ = writeln!(io::stderr(), "[CFE-JSONL] no writable log file, using stderr");
            self.level = SinkLevel::Stderr;
            return;
        }
        self.level = from;
    }

    fn degrade(&mut self) {
        let next = match self.level {
            SinkLevel::Primary => SinkLevel::Fallback,
            SinkLevel::Fallback => SinkLevel::Stderr,
            SinkLevel::Stderr | SinkLevel::Discard => SinkLevel::Discard,
        };
        self.settle(next);
    }

    fn rotate(&mut self) {
        let Some(mut file) = self.file.take() else {
            self.degrade();
            return;
        };
        let _ = file.out.flush();
        let base = file.path;
        drop(file.out);

        let keep = self.config.max_rotated_files;
        let _ = fs::remove_file(rotated_name(&base, keep));
        for index in (1..keep).rev() {
            let _ = fs::rename(rotated_name(&base, index), rotated_name(&base, index + 1));
        }
        let _ = fs::rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok(fresh) => self.file = Some(fresh),
            Err(_) => self.degrade(),
        }
    }
}

fn open_append(path: &Path) -> Result<OpenFile> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| FeedError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| FeedError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok(OpenFile {
        path: path.to_path_buf(),
        out: BufWriter::new(file),
        size,
    })
}

/// `activity.jsonl` → `activity.jsonl.2`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
