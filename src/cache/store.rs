//! Disk Store Module
//!
//! Main cache engine: one content record per key on disk, in-memory metadata
//! with LRU tracking, byte-bounded capacity and optional max age.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use crate::cache::entry::{decode_record, encode_record, RECORD_HEADER_LEN};
use crate::cache::index::{
    load_index, scan_content_dir, write_index, IndexFile, IndexRecord, INDEX_VERSION, TEMP_SUFFIX,
};
use crate::cache::{CacheEntry, CacheKey, CacheStats, LruTracker};
use crate::config::CacheOptions;
use crate::error::{CacheError, ErrorReporter, Result};

const CONTENT_DIR: &str = "content";
const INDEX_FILE: &str = "index.json";

// == Disk Store ==
/// Disk-backed payload storage with LRU eviction.
///
/// Invariants between calls: `total_bytes` equals the sum of all entry sizes,
/// and never exceeds `max_capacity_bytes`.
#[derive(Debug)]
pub struct DiskStore {
    content_dir: PathBuf,
    index_path: PathBuf,
    /// Metadata for every live record
    entries: HashMap<CacheKey, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    total_bytes: u64,
    max_capacity_bytes: u64,
    max_age: Option<Duration>,
    /// Logical clock for recency, strictly increasing
    clock: u64,
    /// Metadata changed since the index was last written
    dirty: bool,
    reporter: ErrorReporter,
}

impl DiskStore {
    // == Constructor ==
    /// Opens (or creates) a store under `options.content_root`.
    ///
    /// Rebuilds metadata from the persisted index reconciled with a scan of
    /// the content directory. Files the index does not know are adopted in
    /// modification-time order; indexed entries whose files are gone are
    /// dropped. Evicts immediately if the result exceeds capacity.
    pub fn open(options: &CacheOptions, reporter: ErrorReporter) -> Result<Self> {
        let content_dir = options.content_root.join(CONTENT_DIR);
        fs::create_dir_all(&content_dir)
            .map_err(|e| CacheError::storage("create content dir", &content_dir, e))?;

        let mut store = Self {
            index_path: options.content_root.join(INDEX_FILE),
            content_dir,
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(options.max_capacity_bytes),
            total_bytes: 0,
            max_capacity_bytes: options.max_capacity_bytes,
            max_age: options.max_age,
            clock: 0,
            dirty: false,
            reporter,
        };
        store.restore()?;

        info!(
            entries = store.entries.len(),
            bytes = store.total_bytes,
            capacity = store.max_capacity_bytes,
            "Disk store opened at {}",
            options.content_root.display()
        );
        Ok(store)
    }

    fn restore(&mut self) -> Result<()> {
        let scan = scan_content_dir(&self.content_dir)?;

        for (path, reason) in scan.corrupt {
            self.stats.record_corruption();
            self.reporter.report(&CacheError::CorruptEntry {
                key: file_label(&path),
                reason,
            });
            if let Err(e) = remove_file_if_exists(&path) {
                self.reporter.report(&e);
            }
        }

        let index = match load_index(&self.index_path) {
            Ok(index) => index.unwrap_or_default(),
            Err(e) => {
                self.reporter.report(&e);
                IndexFile::default()
            }
        };
        let indexed: HashMap<String, &IndexRecord> =
            index.entries.iter().map(|r| (r.key.clone(), r)).collect();

        let mut known = Vec::new();
        let mut adopted = Vec::new();
        for file in scan.files {
            match indexed.get(&file.key.to_hex()) {
                Some(record) if record.size_bytes == file.size_bytes => match record.to_entry() {
                    Ok(entry) => known.push(entry),
                    Err(_) => adopted.push(file),
                },
                _ => adopted.push(file),
            }
        }
        known.sort_by_key(|e| (e.last_access, e.inserted_at));
        adopted.sort_by_key(|f| (f.modified_ms, f.key));

        // Renumber ticks so restored recency is dense and unique.
        let adopted = adopted.into_iter().map(|f| CacheEntry {
            key: f.key,
            size_bytes: f.size_bytes,
            last_access: 0,
            inserted_at: 0,
            stored_at_ms: f.modified_ms,
        });
        let mut tick = 0;
        for mut entry in known.into_iter().chain(adopted) {
            tick += 1;
            entry.last_access = tick;
            if entry.inserted_at == 0 {
                entry.inserted_at = tick;
            }
            self.lru.touch(entry.key, (entry.last_access, entry.inserted_at));
            self.total_bytes += entry.size_bytes;
            self.entries.insert(entry.key, entry);
        }
        self.clock = tick.max(index.clock);
        if let Some(max_inserted) = self.entries.values().map(|e| e.inserted_at).max() {
            self.clock = self.clock.max(max_inserted);
        }

        self.dirty = true;
        self.evict_to_capacity();
        self.refresh_usage();
        self.persist_index()
    }

    // == Get ==
    /// Returns the payload for `key` and marks it most recently used.
    ///
    /// Absent keys are `NotFound`; entries past max age are removed and
    /// reported as `Expired`. A record that is missing, unreadable or fails
    /// validation is removed and reported out-of-band, then treated as
    /// `NotFound`.
    pub fn get(&mut self, key: &CacheKey) -> Result<Bytes> {
        let result = self.lookup(key);
        match &result {
            Ok(_) => self.stats.record_hit(),
            Err(_) => self.stats.record_miss(),
        }
        result
    }

    /// `get` without touching hit/miss counters.
    pub fn get_uncounted(&mut self, key: &CacheKey) -> Result<Bytes> {
        self.lookup(key)
    }

    fn lookup(&mut self, key: &CacheKey) -> Result<Bytes> {
        let Some(entry) = self.entries.get(key) else {
            return Err(CacheError::NotFound(key.to_hex()));
        };
        let expected_size = entry.size_bytes;

        if entry.is_expired(self.max_age) {
            debug!(%key, age_ms = entry.age_ms(), "Entry expired");
            self.drop_entry(key);
            self.stats.record_expiration();
            self.refresh_usage();
            return Err(CacheError::Expired(key.to_hex()));
        }

        let path = self.entry_path(key);
        let record = match fs::read(&path) {
            Ok(record) => record,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(self.heal_corrupt(key, "record file missing".to_string()));
            }
            Err(e) => return Err(self.heal_corrupt(key, format!("unreadable record: {e}"))),
        };

        match decode_record(&record) {
            Ok(payload) if payload.len() as u64 == expected_size => {}
            Ok(payload) => {
                let reason = format!(
                    "payload length {} differs from indexed size {}",
                    payload.len(),
                    expected_size
                );
                return Err(self.heal_corrupt(key, reason));
            }
            Err(reason) => return Err(self.heal_corrupt(key, reason)),
        }

        let tick = self.tick();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_access = tick;
            self.lru.touch(*key, (tick, entry.inserted_at));
        }
        self.dirty = true;

        Ok(Bytes::from(record).slice(RECORD_HEADER_LEN..))
    }

    // == Put ==
    /// Durably stores `payload` under `key`, replacing any previous version.
    ///
    /// The record is written to a temp file, synced and renamed into place,
    /// so readers never see a partial record. Evicts least recently used
    /// entries before returning until usage is within capacity. A payload
    /// larger than the whole capacity is rejected with `PayloadTooLarge`
    /// and nothing is written.
    pub fn put(&mut self, key: CacheKey, payload: &[u8]) -> Result<()> {
        let size = payload.len() as u64;
        if size > self.max_capacity_bytes {
            return Err(CacheError::PayloadTooLarge {
                size,
                capacity: self.max_capacity_bytes,
            });
        }

        write_atomic(&self.entry_path(&key), &encode_record(payload))?;

        let tick = self.tick();
        if let Some(old) = self.entries.insert(key, CacheEntry::new(key, size, tick)) {
            self.total_bytes -= old.size_bytes;
        }
        self.total_bytes += size;
        self.lru.touch(key, (tick, tick));
        self.dirty = true;
        debug!(%key, size, total = self.total_bytes, "Stored entry");

        self.evict_to_capacity();
        self.refresh_usage();
        Ok(())
    }

    // == Remove ==
    /// Deletes the entry for `key`.
    pub fn remove(&mut self, key: &CacheKey) -> Result<()> {
        let Some(entry) = self.entries.remove(key) else {
            return Err(CacheError::NotFound(key.to_hex()));
        };
        self.lru.remove(key);
        self.total_bytes -= entry.size_bytes;
        self.dirty = true;
        self.refresh_usage();

        remove_file_if_exists(&self.entry_path(key))
    }

    // == Clear ==
    /// Store-wide invalidation. Returns the number of entries removed.
    pub fn clear(&mut self) -> Result<usize> {
        let count = self.entries.len();
        let mut first_error = None;
        for key in self.entries.keys() {
            if let Err(e) = remove_file_if_exists(&self.entry_path(key)) {
                first_error.get_or_insert(e);
            }
        }
        self.entries.clear();
        self.lru.clear();
        self.total_bytes = 0;
        self.dirty = true;
        self.refresh_usage();
        info!(count, "Disk store cleared");

        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    // == Cleanup Expired ==
    /// Removes all entries past max age. Returns the number removed.
    pub fn purge_expired(&mut self) -> usize {
        let expired: Vec<CacheKey> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(self.max_age))
            .map(|entry| entry.key)
            .collect();

        for key in &expired {
            self.drop_entry(key);
            self.stats.record_expiration();
        }
        self.refresh_usage();
        expired.len()
    }

    // == Persist Index ==
    /// Writes the metadata index if anything changed since the last write.
    pub fn persist_index(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let index = IndexFile {
            version: INDEX_VERSION,
            clock: self.clock,
            entries: self
                .lru
                .iter()
                .filter_map(|key| self.entries.get(key))
                .map(IndexRecord::from)
                .collect(),
        };
        write_index(&self.index_path, &index)?;
        self.dirty = false;
        Ok(())
    }

    // == Accessors ==
    /// O(1) aggregate of stored payload bytes.
    pub fn current_usage_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn max_capacity_bytes(&self) -> u64 {
        self.max_capacity_bytes
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Metadata for `key`, without touching recency.
    pub fn entry(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Live keys from least to most recently used.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.lru.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    /// Location of the record for `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.content_dir.join(key.to_hex())
    }

    // == Internals ==
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn refresh_usage(&mut self) {
        self.stats.set_usage(self.entries.len(), self.total_bytes);
    }

    /// Evicts LRU entries until usage is within capacity.
    fn evict_to_capacity(&mut self) -> usize {
        let mut evicted = 0;
        while self.total_bytes > self.max_capacity_bytes {
            let Some(victim) = self.lru.evict_oldest() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                self.total_bytes -= entry.size_bytes;
                info!(key = %victim, size = entry.size_bytes, "Evicted LRU entry");
            }
            if let Err(e) = remove_file_if_exists(&self.entry_path(&victim)) {
                self.reporter.report(&e);
            }
            self.stats.record_eviction();
            self.dirty = true;
            evicted += 1;
        }
        evicted
    }

    /// Removes metadata and file; file errors go to the reporter.
    fn drop_entry(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.total_bytes -= entry.size_bytes;
        }
        self.lru.remove(key);
        self.dirty = true;
        if let Err(e) = remove_file_if_exists(&self.entry_path(key)) {
            self.reporter.report(&e);
        }
    }

    fn heal_corrupt(&mut self, key: &CacheKey, reason: String) -> CacheError {
        self.drop_entry(key);
        self.stats.record_corruption();
        self.refresh_usage();
        self.reporter.report(&CacheError::CorruptEntry {
            key: key.to_hex(),
            reason,
        });
        CacheError::NotFound(key.to_hex())
    }
}

// == Filesystem Helpers ==
/// Writes `bytes` to `<path>.tmp`, syncs it, then renames over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(TEMP_SUFFIX);
    let written = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .map_err(|e| CacheError::storage("write", &tmp, e))
        .and_then(|()| fs::rename(&tmp, path).map_err(|e| CacheError::storage("rename", path, e)));

    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::storage("remove", path, e)),
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::{tempdir, TempDir};

    fn k(n: u8) -> CacheKey {
        CacheKey::from_bytes([n; 32])
    }

    fn open(dir: &TempDir, capacity: u64) -> DiskStore {
        DiskStore::open(&CacheOptions::new(dir.path(), capacity), ErrorReporter::default()).unwrap()
    }

    fn recording_reporter() -> (ErrorReporter, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = ErrorReporter::new(move |e| sink.lock().unwrap().push(e.to_string()));
        (reporter, seen)
    }

    #[test]
    fn test_store_new() {
        let dir = tempdir().unwrap();
        let store = open(&dir, 100);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.current_usage_bytes(), 0);
        assert!(dir.path().join("content").is_dir());
    }

    #[test]
    fn test_store_put_and_get() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir, 100);

        store.put(k(1), b"value1").unwrap();
        let value = store.get(&k(1)).unwrap();

        assert_eq!(&value[..], b"value1");
        assert_eq!(store.len(), 1);
        assert_eq!(store.current_usage_bytes(), 6);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir, 100);

        assert!(matches!(store.get(&k(1)), Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_store_remove() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir, 100);

        store.put(k(1), b"value1").unwrap();
        store.remove(&k(1)).unwrap();

        assert!(store.is_empty());
        assert_eq!(store.current_usage_bytes(), 0);
        assert!(!store.entry_path(&k(1)).exists());
        assert!(matches!(store.remove(&k(1)), Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_store_overwrite_adjusts_usage() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir, 100);

        store.put(k(1), b"value1").unwrap();
        store.put(k(1), b"v2").unwrap();

        assert_eq!(&store.get(&k(1)).unwrap()[..], b"v2");
        assert_eq!(store.len(), 1);
        assert_eq!(store.current_usage_bytes(), 2);
    }

    #[test]
    fn test_store_evicts_lru_by_bytes() {
        // capacity 10: A(6) then B(6) leaves only B
        let dir = tempdir().unwrap();
        let mut store = open(&dir, 10);

        store.put(k(0xA), b"aaaaaa").unwrap();
        store.put(k(0xB), b"bbbbbb").unwrap();

        assert_eq!(store.current_usage_bytes(), 6);
        assert!(matches!(store.get(&k(0xA)), Err(CacheError::NotFound(_))));

        let before = store.entry(&k(0xB)).unwrap().last_access;
        assert_eq!(&store.get(&k(0xB)).unwrap()[..], b"bbbbbb");
        assert!(store.entry(&k(0xB)).unwrap().last_access > before);
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir, 9);

        store.put(k(1), b"111").unwrap();
        store.put(k(2), b"222").unwrap();
        store.put(k(3), b"333").unwrap();

        // Access key 1 to make it most recently used
        store.get(&k(1)).unwrap();

        // Adding key 4 should evict key 2 (now oldest)
        store.put(k(4), b"444").unwrap();

        assert!(store.contains(&k(1)));
        assert!(!store.contains(&k(2)));
        assert_eq!(store.keys(), vec![k(3), k(1), k(4)]);
    }

    #[test]
    fn test_store_rejects_oversized_payload() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir, 4);
        store.put(k(1), b"ok").unwrap();

        let result = store.put(k(2), b"too large");

        assert!(matches!(
            result,
            Err(CacheError::PayloadTooLarge { size: 9, capacity: 4 })
        ));
        assert!(store.contains(&k(1)));
        assert!(!store.entry_path(&k(2)).exists());
        assert_eq!(store.current_usage_bytes(), 2);
    }

    #[test]
    fn test_store_payload_equal_to_capacity_is_admitted() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir, 4);
        store.put(k(1), b"ab").unwrap();

        store.put(k(2), b"wxyz").unwrap();

        assert_eq!(store.keys(), vec![k(2)]);
        assert_eq!(store.current_usage_bytes(), 4);
    }

    #[test]
    fn test_store_corrupt_record_is_miss() {
        let dir = tempdir().unwrap();
        let (reporter, seen) = recording_reporter();
        let mut store =
            DiskStore::open(&CacheOptions::new(dir.path(), 100), reporter).unwrap();
        store.put(k(1), b"hello world").unwrap();
        store.put(k(2), b"other").unwrap();

        // Truncate out of band
        let path = store.entry_path(&k(1));
        let record = fs::read(&path).unwrap();
        fs::write(&path, &record[..record.len() - 4]).unwrap();

        assert!(matches!(store.get(&k(1)), Err(CacheError::NotFound(_))));
        assert!(!store.contains(&k(1)));
        assert!(!path.exists());
        assert_eq!(store.current_usage_bytes(), 5);
        assert_eq!(store.stats().corrupt_entries, 1);
        assert!(seen.lock().unwrap()[0].contains("Corrupt entry"));

        // Repopulates cleanly
        store.put(k(1), b"hello world").unwrap();
        assert_eq!(&store.get(&k(1)).unwrap()[..], b"hello world");
    }

    #[test]
    fn test_store_missing_file_self_heals() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir, 100);
        store.put(k(1), b"abc").unwrap();

        fs::remove_file(store.entry_path(&k(1))).unwrap();

        assert!(store.get(&k(1)).is_err());
        assert_eq!(store.current_usage_bytes(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_max_age_expiration() {
        let dir = tempdir().unwrap();
        let options = CacheOptions::new(dir.path(), 100).with_max_age(Duration::ZERO);
        let mut store = DiskStore::open(&options, ErrorReporter::default()).unwrap();

        store.put(k(1), b"value").unwrap();

        assert!(matches!(store.get(&k(1)), Err(CacheError::Expired(_))));
        assert!(store.is_empty());
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn test_store_purge_expired() {
        let dir = tempdir().unwrap();
        let options = CacheOptions::new(dir.path(), 100).with_max_age(Duration::from_secs(60));
        let mut store = DiskStore::open(&options, ErrorReporter::default()).unwrap();
        store.put(k(1), b"old").unwrap();
        store.put(k(2), b"new").unwrap();

        // Age key 1 past the limit
        store.entries.get_mut(&k(1)).unwrap().stored_at_ms -= 120_000;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&k(2)));
        assert_eq!(store.current_usage_bytes(), 3);
    }

    #[test]
    fn test_store_clear() {
        let dir = tempdir().unwrap();
        let mut store = open(&dir, 100);
        store.put(k(1), b"a").unwrap();
        store.put(k(2), b"b").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.is_empty());
        assert_eq!(store.current_usage_bytes(), 0);
        assert!(!store.entry_path(&k(1)).exists());
    }

    #[test]
    fn test_store_reopen_restores_state() {
        let dir = tempdir().unwrap();
        {
            let mut store = open(&dir, 100);
            store.put(k(1), b"one").unwrap();
            store.put(k(2), b"two!").unwrap();
            store.get(&k(1)).unwrap();
            store.persist_index().unwrap();
        }

        let mut store = open(&dir, 100);

        assert_eq!(store.len(), 2);
        assert_eq!(store.current_usage_bytes(), 7);
        assert_eq!(store.keys(), vec![k(2), k(1)]);
        assert_eq!(&store.get(&k(2)).unwrap()[..], b"two!");
    }

    #[test]
    fn test_store_reopen_adopts_unindexed_files() {
        let dir = tempdir().unwrap();
        {
            let mut store = open(&dir, 100);
            store.put(k(1), b"indexed").unwrap();
            store.persist_index().unwrap();
            // Written after the last index flush, as after a crash
            store.put(k(2), b"orphan").unwrap();
        }

        let mut store = open(&dir, 100);

        assert_eq!(store.len(), 2);
        assert_eq!(store.current_usage_bytes(), 13);
        assert_eq!(&store.get(&k(2)).unwrap()[..], b"orphan");
    }

    #[test]
    fn test_store_reopen_with_smaller_capacity_evicts() {
        let dir = tempdir().unwrap();
        {
            let mut store = open(&dir, 100);
            store.put(k(1), b"aaaa").unwrap();
            store.put(k(2), b"bbbb").unwrap();
            store.persist_index().unwrap();
        }

        let store = open(&dir, 5);

        assert_eq!(store.keys(), vec![k(2)]);
        assert_eq!(store.current_usage_bytes(), 4);
    }

    #[test]
    fn test_store_reopen_discards_corrupt_files() {
        let dir = tempdir().unwrap();
        let path = {
            let mut store = open(&dir, 100);
            store.put(k(1), b"fine").unwrap();
            store.put(k(2), b"to be damaged").unwrap();
            store.persist_index().unwrap();
            store.entry_path(&k(2))
        };
        fs::write(&path, b"RCE1garbage").unwrap();

        let (reporter, seen) = recording_reporter();
        let store = DiskStore::open(&CacheOptions::new(dir.path(), 100), reporter).unwrap();

        assert_eq!(store.keys(), vec![k(1)]);
        assert_eq!(store.current_usage_bytes(), 4);
        assert!(!path.exists());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
