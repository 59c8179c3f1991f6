// src/recorder/retention_fs.rs
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local, NaiveDateTime};
use log::{info, warn};

use crate::core::lock::lock_mutex;
use crate::core::timestamp::{format_file_stamp, parse_file_stamp};
use crate::core::{ConfigError, FilesystemError, PipelineError};

use super::sink_avi::AVI_EXTENSION;

/// Bounded, oldest-evicted set of video files in one directory.
///
/// All rotators writing into the same directory share one instance; the
/// count/delete/create sequence runs under `lock`, so two connections rotating
/// at the same moment cannot both see spare capacity. The lock also guards
/// the set of files still being written.
///
/// Capacity wins over open files: with more writers than `capacity`, the
/// oldest file is evicted even while another connection is still writing it.
/// That is logged and counted in `evicted_while_open`.
pub struct RetentionRing {
    base_dir: PathBuf,
    capacity: usize,
    lock: Mutex<HashSet<PathBuf>>,
    evicted_open: AtomicU64,
}

impl RetentionRing {
    pub fn new(base_dir: PathBuf, capacity: usize) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(ConfigError::message("max_files must be at least 1").into());
        }
        fs::create_dir_all(&base_dir)
            .map_err(|e| FilesystemError::new("create output dir", &base_dir, e))?;

        Ok(Self {
            base_dir,
            capacity,
            lock: Mutex::new(HashSet::new()),
            evicted_open: AtomicU64::new(0),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Files evicted while a writer still had them open.
    pub fn evicted_while_open(&self) -> u64 {
        self.evicted_open.load(Ordering::Relaxed)
    }

    /// Files handed out by `create_next` and not yet released.
    pub fn open_files(&self) -> usize {
        lock_mutex(&self.lock, "RetentionRing::open_files").len()
    }

    /// Marks a file from `create_next` as finished.
    pub fn release(&self, path: &Path) {
        lock_mutex(&self.lock, "RetentionRing::release").remove(path);
    }

    /// Video files, oldest first.
    pub fn entries(&self) -> Result<Vec<PathBuf>, FilesystemError> {
        let _guard = lock_mutex(&self.lock, "RetentionRing::entries");
        self.list_sorted()
    }

    /// Trims the directory to `capacity` files, e.g. after the capacity was
    /// lowered between runs. Returns the removed paths.
    pub fn enforce(&self) -> Result<Vec<PathBuf>, FilesystemError> {
        let mut open = lock_mutex(&self.lock, "RetentionRing::enforce");
        let entries = self.list_sorted()?;
        self.evict_oldest(&mut open, &entries, self.capacity)
    }

    /// Evicts down to `capacity - 1` files, then creates the file for `at`.
    pub fn create_next(&self, at: &DateTime<Local>) -> Result<(PathBuf, File), FilesystemError> {
        let mut open = lock_mutex(&self.lock, "RetentionRing::create_next");

        let entries = self.list_sorted()?;
        self.evict_oldest(&mut open, &entries, self.capacity - 1)?;

        let stem = format_file_stamp(at);
        let mut path = self.base_dir.join(format!("{}.{}", stem, AVI_EXTENSION));
        let mut suffix = 1;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    info!("[retention] new file {:?}", path);
                    open.insert(path.clone());
                    return Ok((path, file));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    path = self
                        .base_dir
                        .join(format!("{}_{}.{}", stem, suffix, AVI_EXTENSION));
                    suffix += 1;
                }
                Err(e) => return Err(FilesystemError::new("create", &path, e)),
            }
        }
    }

    fn evict_oldest(
        &self,
        open: &mut HashSet<PathBuf>,
        sorted: &[PathBuf],
        keep: usize,
    ) -> Result<Vec<PathBuf>, FilesystemError> {
        let excess = sorted.len().saturating_sub(keep);
        let mut removed = Vec::with_capacity(excess);
        for oldest in sorted.iter().take(excess) {
            match fs::remove_file(oldest) {
                Ok(()) => info!("[retention] removed {:?}", oldest),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(FilesystemError::new("evict", oldest, e)),
            }
            if open.remove(oldest) {
                self.evicted_open.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "[retention] evicted {:?} while still being written; {} writers share max_files={}",
                    oldest,
                    open.len() + 1,
                    self.capacity
                );
            }
            removed.push(oldest.clone());
        }
        Ok(removed)
    }

    fn list_sorted(&self) -> Result<Vec<PathBuf>, FilesystemError> {
        let entries = fs::read_dir(&self.base_dir)
            .map_err(|e| FilesystemError::new("list", &self.base_dir, e))?;

        let mut files: Vec<(NaiveDateTime, String, PathBuf)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(AVI_EXTENSION) {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            let created = match path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(parse_file_stamp)
            {
                Some(t) => t,
                None => modified_local(&entry),
            };
            files.push((created, name, path));
        }

        files.sort();
        Ok(files.into_iter().map(|(_, _, p)| p).collect())
    }
}

fn modified_local(entry: &fs::DirEntry) -> NaiveDateTime {
    entry
        .metadata()
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Local>::from(t).naive_local())
        .unwrap_or_default()
}
