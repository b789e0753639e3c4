//! Index Module
//!
//! Persisted index of store metadata and the directory scan used to
//! reconcile it with what is actually on disk.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::entry::{record_payload_len, RECORD_HEADER_LEN};
use crate::cache::store::write_atomic;
use crate::cache::{CacheEntry, CacheKey};
use crate::error::{CacheError, Result};

/// Current on-disk index format.
pub const INDEX_VERSION: u32 = 1;

/// Suffix of in-progress writes.
pub const TEMP_SUFFIX: &str = "tmp";

// == Index File ==
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexFile {
    pub version: u32,
    /// Logical clock value at the time of writing
    pub clock: u64,
    pub entries: Vec<IndexRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexRecord {
    pub key: String,
    pub size_bytes: u64,
    pub last_access: u64,
    pub inserted_at: u64,
    pub stored_at_ms: u64,
}

impl From<&CacheEntry> for IndexRecord {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.to_hex(),
            size_bytes: entry.size_bytes,
            last_access: entry.last_access,
            inserted_at: entry.inserted_at,
            stored_at_ms: entry.stored_at_ms,
        }
    }
}

impl IndexRecord {
    pub fn to_entry(&self) -> Result<CacheEntry> {
        Ok(CacheEntry {
            key: self.key.parse()?,
            size_bytes: self.size_bytes,
            last_access: self.last_access,
            inserted_at: self.inserted_at,
            stored_at_ms: self.stored_at_ms,
        })
    }
}

// == Load / Write ==
/// Reads the index at `path`. A missing file is `Ok(None)`.
pub fn load_index(path: &Path) -> Result<Option<IndexFile>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::storage("read index", path, e)),
    };

    let index: IndexFile = serde_json::from_slice(&bytes).map_err(|e| CacheError::CorruptEntry {
        key: "index".to_string(),
        reason: e.to_string(),
    })?;

    if index.version != INDEX_VERSION {
        return Err(CacheError::CorruptEntry {
            key: "index".to_string(),
            reason: format!("unsupported index version {}", index.version),
        });
    }
    Ok(Some(index))
}

/// Writes the index atomically.
pub fn write_index(path: &Path, index: &IndexFile) -> Result<()> {
    let bytes = serde_json::to_vec(index).map_err(|e| CacheError::Internal(e.to_string()))?;
    write_atomic(path, &bytes)
}

// == Directory Scan ==
/// A content file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub key: CacheKey,
    /// Payload length from the record header
    pub size_bytes: u64,
    /// File modification time (Unix milliseconds)
    pub modified_ms: u64,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    /// Files with a valid key name whose header or length is wrong
    pub corrupt: Vec<(PathBuf, String)>,
}

/// Lists content records in `dir`.
///
/// Leftover temp files are deleted. Files whose names are not cache keys are
/// ignored.
pub fn scan_content_dir(dir: &Path) -> Result<ScanResult> {
    let mut result = ScanResult::default();

    let read_dir = fs::read_dir(dir).map_err(|e| CacheError::storage("scan", dir, e))?;
    for dir_entry in read_dir {
        let dir_entry = dir_entry.map_err(|e| CacheError::storage("scan", dir, e))?;
        let path = dir_entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if path.extension().is_some_and(|ext| ext == TEMP_SUFFIX) {
            debug!(path = %path.display(), "Removing stale temp file");
            fs::remove_file(&path).map_err(|e| CacheError::storage("remove temp", &path, e))?;
            continue;
        }

        let Ok(key) = name.parse::<CacheKey>() else {
            continue;
        };

        let metadata = dir_entry
            .metadata()
            .map_err(|e| CacheError::storage("stat", &path, e))?;
        if !metadata.is_file() {
            continue;
        }

        match read_declared_len(&path, metadata.len()) {
            Ok(size_bytes) => {
                let modified_ms = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                result.files.push(ScannedFile {
                    key,
                    size_bytes,
                    modified_ms,
                });
            }
            Err(reason) => result.corrupt.push((path, reason)),
        }
    }

    Ok(result)
}

/// Reads the header of the record at `path` and checks it against the file length.
fn read_declared_len(path: &Path, file_len: u64) -> std::result::Result<u64, String> {
    let mut header = [0u8; RECORD_HEADER_LEN];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map_err(|e| format!("unreadable header: {e}"))?;

    let declared = record_payload_len(&header)?;
    if file_len != RECORD_HEADER_LEN as u64 + declared {
        return Err(format!(
            "file length {} does not match declared payload length {}",
            file_len, declared
        ));
    }
    Ok(declared)
}
