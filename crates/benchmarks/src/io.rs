//! Reading and writing record files.
//!
//! Each sweep is persisted as one JSON array in
//! `<dir>/records_<stamp>.json`. The stamp is a fixed-width UTC time (see
//! [`echobench_core::timestamp`]), so the lexicographically greatest file
//! name in a directory is the most recent run.

use crate::error::{BenchError, Result};
use crate::markdown;
use crate::record::BenchmarkRecord;
use echobench_core::timestamp::{self, STAMP_LEN};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default directory for record files.
pub const RECORD_DIR: &str = "docs/record";

/// Default directory for rendered charts.
pub const IMG_DIR: &str = "docs/img";

/// File name prefix of record files.
pub const RECORD_PREFIX: &str = "records_";

/// File name extension of record files.
pub const RECORD_EXTENSION: &str = ".json";

const STAGING_PREFIX: &str = ".records-";
const STAGING_SUFFIX: &str = ".partial";

/// Persists sweeps as time-stamped JSON files in one directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    directory: PathBuf,
}

impl RecordStore {
    /// Create a store rooted at `directory`. Nothing is touched on disk yet.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Directory holding the record files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write `records` to a new file and return its path.
    ///
    /// The directory is created if needed. An existing file is never
    /// overwritten.
    pub fn save(&self, records: &[BenchmarkRecord]) -> Result<PathBuf> {
        save(records, &self.directory)
    }

    /// Load the most recent record file.
    pub fn load_latest(&self) -> Result<Vec<BenchmarkRecord>> {
        load_latest(&self.directory)
    }

    /// Path of the most recent record file.
    pub fn latest_path(&self) -> Result<PathBuf> {
        latest_path(&self.directory)
    }
}

/// Write `records` to `<directory>/records_<stamp>.json`.
///
/// The JSON is staged in a hidden temporary file in the same directory and
/// moved into place only once fully written, so a failed write never
/// leaves a truncated record file behind.
pub fn save(records: &[BenchmarkRecord], directory: &Path) -> Result<PathBuf> {
    fs::create_dir_all(directory)?;
    let json = serde_json::to_string_pretty(records)?;

    let mut staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(STAGING_SUFFIX)
        .tempfile_in(directory)?;
    staged.write_all(json.as_bytes())?;
    staged.write_all(b"\n")?;
    staged.as_file().sync_all()?;

    loop {
        let path = directory.join(record_file_name(&timestamp::generation_stamp()));
        match staged.persist_noclobber(&path) {
            Ok(_) => {
                info!(path = %path.display(), records = records.len(), "saved records");
                return Ok(path);
            }
            // Another process claimed this stamp; take the next one.
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "record file exists, retrying");
                staged = err.file;
            }
            Err(err) => return Err(err.error.into()),
        }
    }
}

/// Load the record file with the greatest stamp in `directory`.
pub fn load_latest(directory: &Path) -> Result<Vec<BenchmarkRecord>> {
    let path = latest_path(directory)?;
    debug!(path = %path.display(), "loading records");
    read_records(&path)
}

/// Read records from a specific file.
pub fn read_records(path: &Path) -> Result<Vec<BenchmarkRecord>> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Find the record file with the greatest stamp in `directory`.
pub fn latest_path(directory: &Path) -> Result<PathBuf> {
    let not_found = || BenchError::NoReportFound {
        directory: directory.to_path_buf(),
    };

    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(not_found()),
        Err(err) => return Err(err.into()),
    };

    let mut latest: Option<String> = None;
    for entry in entries {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !is_record_file_name(&name) || !entry.file_type()?.is_file() {
            continue;
        }
        if latest.as_deref().map_or(true, |current| name.as_str() > current) {
            latest = Some(name);
        }
    }

    latest.map(|name| directory.join(name)).ok_or_else(not_found)
}

/// Write a markdown summary next to `record_path`, sharing its stamp.
pub fn write_summary(records: &[BenchmarkRecord], record_path: &Path) -> Result<PathBuf> {
    let stem = record_path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix(RECORD_PREFIX))
        .and_then(|name| name.strip_suffix(RECORD_EXTENSION))
        .ok_or_else(|| {
            std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a record file: {}", record_path.display()),
            )
        })?;
    let path = record_path.with_file_name(format!("summary_{stem}.md"));
    fs::write(&path, markdown::generate_summary(records))?;
    Ok(path)
}

/// File name for a record file with the given stamp.
pub fn record_file_name(stamp: &str) -> String {
    format!("{RECORD_PREFIX}{stamp}{RECORD_EXTENSION}")
}

fn is_record_file_name(name: &str) -> bool {
    name.strip_prefix(RECORD_PREFIX)
        .and_then(|rest| rest.strip_suffix(RECORD_EXTENSION))
        .map_or(false, |stamp| {
            stamp.len() == STAMP_LEN && timestamp::parse_stamp(stamp).is_some()
        })
}
