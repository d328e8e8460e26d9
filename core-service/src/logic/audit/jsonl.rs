//! Append-only JSONL audit file with size rotation.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::sink::AuditSink;
use super::types::AuditEntry;
use crate::error::{StoreError, StoreResult};

/// Rotate once the current file would exceed this (50 MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const FILE_PREFIX: &str = "audit_";
const FILE_EXT: &str = ".jsonl";

struct Writer {
    writer: BufWriter<File>,
    rotations: u32,
    current_file: PathBuf,
    current_size: u64,
}

pub struct JsonlAuditSink {
    base_dir: PathBuf,
    max_file_size: u64,
    state: Mutex<Writer>,
}

impl JsonlAuditSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        Self::with_max_size(base_dir, DEFAULT_MAX_FILE_SIZE)
    }

    pub fn with_max_size(base_dir: impl Into<PathBuf>, max_file_size: u64) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        let (current_file, file) = Self::open_new_file(&base_dir, 0)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            base_dir,
            max_file_size,
            state: Mutex::new(Writer {
                writer: BufWriter::new(file),
                rotations: 0,
                current_file,
                current_size,
            }),
        })
    }

    fn open_new_file(base_dir: &Path, rotation: u32) -> std::io::Result<(PathBuf, File)> {
        let filename = format!(
            "{}{}_{:04}{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            rotation,
            FILE_EXT
        );
        let path = base_dir.join(filename);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        log::info!("Opened audit log: {:?}", path);
        Ok((path, file))
    }

    pub fn current_file(&self) -> PathBuf {
        self.state.lock().current_file.clone()
    }

    /// All audit files, oldest first
    pub fn files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.base_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_EXT))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut state = self.state.lock();
        let len = line.len() as u64 + 1;

        if state.current_size > 0 && state.current_size + len > self.max_file_size {
            state.writer.flush()?;
            state.rotations += 1;
            let (path, file) = Self::open_new_file(&self.base_dir, state.rotations)?;
            log::info!("Rotated audit log from {:?} to {:?}", state.current_file, path);
            state.writer = BufWriter::new(file);
            state.current_file = path;
            state.current_size = 0;
        }

        state.writer.write_all(line.as_bytes())?;
        state.writer.write_all(b"\n")?;
        state.writer.flush()?;
        state.current_size += len;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, entry: &AuditEntry) -> StoreResult<()> {
        let line = serde_json::to_string(entry).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.write_line(&line)
            .map_err(|e| StoreError::Unavailable(format!("audit file: {}", e)))
    }
}
